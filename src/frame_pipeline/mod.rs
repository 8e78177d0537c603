//! This module is the compression framing layer of the native transport.
//!
//! When compression is negotiated, every block travels as one or more
//! checksummed frames:
//!
//! ```text
//! [16-byte CityHash128][method u8][compressed size u32][decompressed size u32][payload]
//! ```
//!
//! The compressed size counts the 9 header bytes, and the checksum covers the
//! header and payload. Frames are stateless: each one compresses and
//! decompresses on its own.

mod frame;
mod reader;
mod writer;

pub use frame::{decode_frame, encode_frame, read_frame, FrameMethod, CHECKSUM_SIZE, HEADER_SIZE};
pub use reader::CompressedReader;
pub use writer::FrameWriter;
