//! This module is the public entry point for all low-level, stateless kernels.
//!
//! Kernels work on plain byte slices and know nothing about columns, blocks or
//! batches. The frame pipeline and the block codec compose them.

pub mod checksum;
pub mod http;
pub mod leb128;
pub mod lz4;
pub mod zstd;
