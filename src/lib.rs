//! This file is the root of the `chwire` Rust crate.
//!
//! Its responsibilities are strictly limited to:
//! 1.  Declaring all the top-level modules of the library (`column`, `bridge`,
//!     `batch`, etc.) so the Rust compiler knows they exist.
//! 2.  Re-exporting the handful of types most callers need, so that
//!     `use chwire::{Batch, Value, parse_type}` is enough for an insert loop.

//==================================================================================
// 0. Constants
//==================================================================================
/// The crate version, automatically set from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Fixed-width columns are cast straight to and from wire bytes.
#[cfg(not(target_endian = "little"))]
compile_error!("chwire requires a little-endian target");

//==================================================================================
// 1. Module Declarations
//==================================================================================
#[macro_use]
mod observability; // Make macros available throughout the crate

pub mod batch;
pub mod bridge;
pub mod column;
pub mod config;
pub mod frame_pipeline;
pub mod kernels;
pub mod transport;
pub mod types;
pub mod value;

mod error;
mod null_handling;
mod traits;
mod utils;
mod wire;

//==================================================================================
// 2. Public Surface
//==================================================================================
pub use batch::{Batch, BatchState, ColumnWriter};
pub use bridge::{Block, BlockReader};
pub use config::{ClientConfig, CompressionMethod};
pub use error::{ChwireError, ConversionError, FrameCorruption, ParseError, ServerException};
pub use observability::enable_verbose_logging;
pub use transport::{CancellationToken, MemoryTransport, TcpTransport, Transport};
pub use types::{parse_type, TypeCache, TypeDescriptor};
pub use value::{Decimal, FromRow, FromValue, Record, Value};
