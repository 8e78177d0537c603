//! Raw LZ4 block compression, as carried by method `0x82` frames. The frame
//! header stores the decompressed size, so the block itself has no size prefix.

use crate::error::ChwireError;

pub fn encode(input_bytes: &[u8], output_buf: &mut Vec<u8>) {
    output_buf.extend_from_slice(&lz4_flex::block::compress(input_bytes));
}

pub fn decode(input_bytes: &[u8], expected_len: usize) -> Result<Vec<u8>, ChwireError> {
    lz4_flex::block::decompress(input_bytes, expected_len)
        .map_err(|e| ChwireError::CorruptFrame(format!("lz4: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lz4_roundtrip() {
        let original = b"abcabcabcabcabcabcabcabc-native-block".repeat(20);
        let mut compressed = Vec::new();
        encode(&original, &mut compressed);
        assert_eq!(decode(&compressed, original.len()).unwrap(), original);
    }

    #[test]
    fn test_lz4_truncated_is_corrupt_frame() {
        let original = vec![7u8; 1000];
        let mut compressed = Vec::new();
        encode(&original, &mut compressed);
        compressed.truncate(compressed.len() / 2);
        assert!(matches!(
            decode(&compressed, original.len()),
            Err(ChwireError::CorruptFrame(_))
        ));
    }
}
