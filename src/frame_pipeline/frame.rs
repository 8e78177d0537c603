//! Encoding and validation of a single compressed frame.

use std::io::{ErrorKind, Read};

use crate::config::CompressionMethod;
use crate::error::ChwireError;
use crate::kernels::{checksum, lz4, zstd};
use crate::utils::MAX_READ_ALLOCATION;

pub const CHECKSUM_SIZE: usize = 16;
pub const HEADER_SIZE: usize = 9;

/// The method byte of a frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameMethod {
    None = 0x02,
    Lz4 = 0x82,
    Zstd = 0x90,
}

impl FrameMethod {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x02 => Some(FrameMethod::None),
            0x82 => Some(FrameMethod::Lz4),
            0x90 => Some(FrameMethod::Zstd),
            _ => None,
        }
    }

    /// The frame method for a configured compression, `None` when blocks are
    /// not framed at all.
    pub fn for_compression(method: CompressionMethod) -> Option<Self> {
        match method {
            CompressionMethod::Disabled => None,
            CompressionMethod::None => Some(FrameMethod::None),
            CompressionMethod::Lz4 => Some(FrameMethod::Lz4),
            CompressionMethod::Zstd => Some(FrameMethod::Zstd),
        }
    }
}

//==================================================================================
// 1. Encoding
//==================================================================================

/// Compresses `payload` into one frame appended to `out`.
pub fn encode_frame(
    payload: &[u8],
    method: FrameMethod,
    level: i32,
    out: &mut Vec<u8>,
) -> Result<(), ChwireError> {
    let mut body = Vec::with_capacity(HEADER_SIZE + payload.len());
    body.push(method as u8);
    body.extend_from_slice(&[0u8; 8]);
    match method {
        FrameMethod::None => body.extend_from_slice(payload),
        FrameMethod::Lz4 => lz4::encode(payload, &mut body),
        FrameMethod::Zstd => zstd::encode(payload, &mut body, level)?,
    }

    let too_large = |what: &str, len: usize| {
        ChwireError::Compression(format!("{} size {} does not fit a frame header", what, len))
    };
    let compressed_size = u32::try_from(body.len()).map_err(|_| too_large("compressed", body.len()))?;
    let decompressed_size =
        u32::try_from(payload.len()).map_err(|_| too_large("decompressed", payload.len()))?;
    body[1..5].copy_from_slice(&compressed_size.to_le_bytes());
    body[5..9].copy_from_slice(&decompressed_size.to_le_bytes());

    out.extend_from_slice(&checksum::frame_checksum(&body));
    out.extend_from_slice(&body);
    Ok(())
}

//==================================================================================
// 2. Decoding
//==================================================================================

struct Header {
    method: FrameMethod,
    compressed_size: usize,
    decompressed_size: usize,
}

fn parse_header(header: &[u8]) -> Result<Header, ChwireError> {
    let method = FrameMethod::from_byte(header[0]).ok_or_else(|| {
        ChwireError::CorruptFrame(format!("unknown compression method 0x{:02x}", header[0]))
    })?;
    let le_u32 = |bytes: &[u8]| u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    let compressed_size = le_u32(&header[1..5]);
    let decompressed_size = le_u32(&header[5..9]);
    if compressed_size < HEADER_SIZE {
        return Err(ChwireError::CorruptFrame(format!(
            "compressed size {} is smaller than the frame header",
            compressed_size
        )));
    }
    if compressed_size > MAX_READ_ALLOCATION || decompressed_size > MAX_READ_ALLOCATION {
        return Err(ChwireError::CorruptFrame(format!(
            "frame of {} -> {} bytes exceeds the size limit",
            compressed_size, decompressed_size
        )));
    }
    Ok(Header {
        method,
        compressed_size,
        decompressed_size,
    })
}

/// Checks the checksum of `body` (header plus payload) and decompresses it.
fn open_frame(expected: &[u8], body: &[u8], header: &Header) -> Result<Vec<u8>, ChwireError> {
    if checksum::frame_checksum(body).as_slice() != expected {
        return Err(ChwireError::CorruptFrame("checksum mismatch".into()));
    }
    let payload = &body[HEADER_SIZE..];
    let data = match header.method {
        FrameMethod::None => payload.to_vec(),
        FrameMethod::Lz4 => lz4::decode(payload, header.decompressed_size)?,
        FrameMethod::Zstd => zstd::decode(payload, header.decompressed_size)?,
    };
    if data.len() != header.decompressed_size {
        return Err(ChwireError::CorruptFrame(format!(
            "frame decompressed to {} bytes, header says {}",
            data.len(),
            header.decompressed_size
        )));
    }
    Ok(data)
}

/// Decodes the frame at the start of `bytes`, returning the payload and the
/// number of bytes the frame occupied.
pub fn decode_frame(bytes: &[u8]) -> Result<(Vec<u8>, usize), ChwireError> {
    if bytes.len() < CHECKSUM_SIZE + HEADER_SIZE {
        return Err(ChwireError::CorruptFrame("truncated frame header".into()));
    }
    let header = parse_header(&bytes[CHECKSUM_SIZE..CHECKSUM_SIZE + HEADER_SIZE])?;
    let end = CHECKSUM_SIZE + header.compressed_size;
    if bytes.len() < end {
        return Err(ChwireError::CorruptFrame("truncated frame payload".into()));
    }
    let data = open_frame(&bytes[..CHECKSUM_SIZE], &bytes[CHECKSUM_SIZE..end], &header)?;
    Ok((data, end))
}

/// Fills `buf`, returning `false` if the stream ended before its first byte.
fn read_exact_or_eof(reader: &mut dyn Read, buf: &mut [u8]) -> Result<bool, ChwireError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => return Err(ChwireError::CorruptFrame("truncated frame header".into())),
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(true)
}

/// Reads and opens the next frame of a stream. `Ok(None)` means the stream
/// ended cleanly between frames.
pub fn read_frame(reader: &mut dyn Read) -> Result<Option<Vec<u8>>, ChwireError> {
    let mut checksum = [0u8; CHECKSUM_SIZE];
    if !read_exact_or_eof(reader, &mut checksum)? {
        return Ok(None);
    }
    let mut body = vec![0u8; HEADER_SIZE];
    reader.read_exact(&mut body).map_err(truncated)?;
    let header = parse_header(&body)?;
    body.resize(header.compressed_size, 0);
    reader.read_exact(&mut body[HEADER_SIZE..]).map_err(truncated)?;
    open_frame(&checksum, &body, &header).map(Some)
}

fn truncated(err: std::io::Error) -> ChwireError {
    if err.kind() == ErrorKind::UnexpectedEof {
        ChwireError::CorruptFrame("truncated frame".into())
    } else {
        err.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample() -> Vec<u8> {
        b"native block bytes, native block bytes, native block bytes".repeat(8)
    }

    #[test]
    fn test_every_method_roundtrips() {
        for method in [FrameMethod::None, FrameMethod::Lz4, FrameMethod::Zstd] {
            let mut frame = Vec::new();
            encode_frame(&sample(), method, 3, &mut frame).unwrap();
            assert_eq!(frame[CHECKSUM_SIZE], method as u8);
            let (data, used) = decode_frame(&frame).unwrap();
            assert_eq!(data, sample());
            assert_eq!(used, frame.len());
        }
    }

    #[test]
    fn test_header_sizes_include_header() {
        let mut frame = Vec::new();
        encode_frame(b"abc", FrameMethod::None, 0, &mut frame).unwrap();
        assert_eq!(frame.len(), CHECKSUM_SIZE + HEADER_SIZE + 3);
        assert_eq!(&frame[17..21], &12u32.to_le_bytes());
        assert_eq!(&frame[21..25], &3u32.to_le_bytes());
    }

    #[test]
    fn test_flipped_payload_bit_fails_checksum() {
        let mut frame = Vec::new();
        encode_frame(&sample(), FrameMethod::Lz4, 0, &mut frame).unwrap();
        let last = frame.len() - 1;
        frame[last] ^= 0x01;
        assert!(matches!(decode_frame(&frame), Err(ChwireError::CorruptFrame(ref m)) if m.contains("checksum")));
    }

    #[test]
    fn test_flipped_checksum_bit_is_detected() {
        let mut frame = Vec::new();
        encode_frame(&sample(), FrameMethod::Zstd, 1, &mut frame).unwrap();
        frame[3] ^= 0x80;
        assert!(matches!(decode_frame(&frame), Err(ChwireError::CorruptFrame(_))));
    }

    #[test]
    fn test_unknown_method_and_bad_sizes() {
        let mut frame = Vec::new();
        encode_frame(b"xyz", FrameMethod::None, 0, &mut frame).unwrap();
        let mut unknown = frame.clone();
        unknown[CHECKSUM_SIZE] = 0x55;
        assert!(matches!(decode_frame(&unknown), Err(ChwireError::CorruptFrame(ref m)) if m.contains("method")));

        let mut tiny = frame.clone();
        tiny[17..21].copy_from_slice(&4u32.to_le_bytes());
        assert!(matches!(decode_frame(&tiny), Err(ChwireError::CorruptFrame(_))));
    }

    #[test]
    fn test_declared_size_mismatch_is_corrupt() {
        // A None frame whose decompressed size disagrees with its payload.
        let mut body = vec![FrameMethod::None as u8];
        body.extend_from_slice(&12u32.to_le_bytes());
        body.extend_from_slice(&5u32.to_le_bytes());
        body.extend_from_slice(b"abc");
        let mut frame = checksum::frame_checksum(&body).to_vec();
        frame.extend_from_slice(&body);
        assert!(matches!(decode_frame(&frame), Err(ChwireError::CorruptFrame(_))));
    }

    #[test]
    fn test_read_frame_stream_boundaries() {
        let mut stream = Vec::new();
        encode_frame(b"one", FrameMethod::None, 0, &mut stream).unwrap();
        encode_frame(b"two", FrameMethod::Lz4, 0, &mut stream).unwrap();
        let mut cursor = Cursor::new(stream.clone());
        assert_eq!(read_frame(&mut cursor).unwrap(), Some(b"one".to_vec()));
        assert_eq!(read_frame(&mut cursor).unwrap(), Some(b"two".to_vec()));
        assert_eq!(read_frame(&mut cursor).unwrap(), None);

        stream.truncate(stream.len() - 2);
        let mut cursor = Cursor::new(stream);
        read_frame(&mut cursor).unwrap();
        assert!(matches!(read_frame(&mut cursor), Err(ChwireError::CorruptFrame(_))));
    }
}
