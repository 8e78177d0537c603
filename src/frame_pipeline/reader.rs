//! A streaming `io::Read` over a sequence of compressed frames.

use std::io::{self, Read};

use super::frame::read_frame;
use crate::error::{ChwireError, FrameCorruption};

/// Pulls frames from `inner` on demand and serves their decompressed bytes.
///
/// A frame that fails validation surfaces as an `io::Error` carrying a
/// `FrameCorruption`, which converts back into `ChwireError::CorruptFrame`.
#[derive(Debug)]
pub struct CompressedReader<R: Read> {
    inner: R,
    buffer: Vec<u8>,
    position: usize,
    frames_read: u64,
}

impl<R: Read> CompressedReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buffer: Vec::new(),
            position: 0,
            frames_read: 0,
        }
    }

    /// Decompressed bytes of the current frame not yet consumed.
    pub fn buffered(&self) -> usize {
        self.buffer.len() - self.position
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

fn to_io_error(err: ChwireError) -> io::Error {
    match err {
        ChwireError::Transport(e) => e,
        ChwireError::CorruptFrame(reason) => {
            io::Error::new(io::ErrorKind::InvalidData, FrameCorruption(reason))
        }
        other => io::Error::new(io::ErrorKind::InvalidData, FrameCorruption(other.to_string())),
    }
}

impl<R: Read> Read for CompressedReader<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        while self.position == self.buffer.len() {
            match read_frame(&mut self.inner).map_err(to_io_error)? {
                Some(data) => {
                    self.frames_read += 1;
                    self.buffer = data;
                    self.position = 0;
                }
                None => return Ok(0),
            }
        }
        let n = out.len().min(self.buffer.len() - self.position);
        out[..n].copy_from_slice(&self.buffer[self.position..self.position + n]);
        self.position += n;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_pipeline::{encode_frame, FrameMethod, CHECKSUM_SIZE};
    use std::io::Cursor;

    #[test]
    fn test_reads_across_frame_boundaries() {
        let mut stream = Vec::new();
        encode_frame(b"hello ", FrameMethod::Lz4, 0, &mut stream).unwrap();
        encode_frame(b"", FrameMethod::None, 0, &mut stream).unwrap();
        encode_frame(b"world", FrameMethod::Zstd, 3, &mut stream).unwrap();

        let mut reader = CompressedReader::new(Cursor::new(stream));
        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        assert_eq!(out, "hello world");
        assert_eq!(reader.frames_read(), 3);
        assert_eq!(reader.buffered(), 0);
    }

    #[test]
    fn test_frames_are_pulled_lazily() {
        let mut stream = Vec::new();
        encode_frame(b"abc", FrameMethod::None, 0, &mut stream).unwrap();
        encode_frame(b"def", FrameMethod::None, 0, &mut stream).unwrap();
        let mut reader = CompressedReader::new(Cursor::new(stream));
        let mut first = [0u8; 2];
        reader.read_exact(&mut first).unwrap();
        assert_eq!(reader.frames_read(), 1);
        assert_eq!(reader.buffered(), 1);
    }

    #[test]
    fn test_corruption_restores_corrupt_frame() {
        let mut stream = Vec::new();
        encode_frame(b"payload", FrameMethod::None, 0, &mut stream).unwrap();
        stream[CHECKSUM_SIZE + 10] ^= 0xff;
        let mut reader = CompressedReader::new(Cursor::new(stream));
        let mut out = Vec::new();
        let err: ChwireError = reader.read_to_end(&mut out).unwrap_err().into();
        assert!(matches!(err, ChwireError::CorruptFrame(_)));
        assert!(err.is_connection_fatal());
    }
}
