//! The block assembler and the packet layer around it.
//!
//! A block is a set of named column codecs sharing a row count. This module
//! puts blocks on the wire (native TCP packets or an HTTP `Native` body) and
//! reads them back, handing non-data packets to hooks.

pub mod format;

mod block;
mod http;
mod packets;
mod reader;

pub use block::{decode_block, encode_block, Block, BlockInfo, BlockOptions, NamedColumn, RowRef};
pub use http::{decode_native_body, encode_native_body};
pub use packets::{
    read_exception, read_packet, write_data_packet, write_exception, PacketOptions, ProfileInfo,
    Progress, ServerPacket,
};
pub use reader::{BlockReader, Rows};
