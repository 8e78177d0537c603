//! Splitting an encoded block into frames on the way to the transport.

use std::io::Write;

use super::frame::{encode_frame, FrameMethod};
use crate::config::ClientConfig;
use crate::error::ChwireError;

/// Frames blocks with a fixed method, level and maximum frame size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameWriter {
    method: FrameMethod,
    level: i32,
    max_frame_size: usize,
}

impl FrameWriter {
    pub fn new(method: FrameMethod, level: i32, max_frame_size: usize) -> Self {
        Self {
            method,
            level,
            max_frame_size: max_frame_size.max(1),
        }
    }

    /// The writer for a config, `None` when compression is disabled.
    pub fn from_config(config: &ClientConfig) -> Option<Self> {
        FrameMethod::for_compression(config.compression)
            .map(|method| Self::new(method, config.compression_level, config.max_frame_size))
    }

    pub fn method(&self) -> FrameMethod {
        self.method
    }

    /// Encodes `block` as one frame per `max_frame_size` chunk.
    pub fn encode(&self, block: &[u8]) -> Result<Vec<u8>, ChwireError> {
        let mut out = Vec::with_capacity(block.len() / 2 + 32);
        if block.is_empty() {
            encode_frame(block, self.method, self.level, &mut out)?;
            return Ok(out);
        }
        for chunk in block.chunks(self.max_frame_size) {
            encode_frame(chunk, self.method, self.level, &mut out)?;
        }
        Ok(out)
    }

    /// Encodes `block` and writes the frames to `out`, returning the number of
    /// bytes written.
    pub fn write_block<W: Write + ?Sized>(&self, out: &mut W, block: &[u8]) -> Result<usize, ChwireError> {
        let frames = self.encode(block)?;
        out.write_all(&frames)?;
        Ok(frames.len())
    }
}
