//! The 128-bit CityHash (v1.0.2) checksum that prefixes every compressed frame.

/// Checksum of `bytes` in its on-wire byte order: the high 64 bits first,
/// each half little-endian.
pub fn frame_checksum(bytes: &[u8]) -> [u8; 16] {
    let hash = cityhash_rs::cityhash_102_128(bytes);
    hash.rotate_right(64).to_le_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_is_deterministic_and_sensitive() {
        let a = frame_checksum(b"\x82\x0c\x00\x00\x00\x03\x00\x00\x00abc");
        let b = frame_checksum(b"\x82\x0c\x00\x00\x00\x03\x00\x00\x00abc");
        let c = frame_checksum(b"\x82\x0c\x00\x00\x00\x03\x00\x00\x00abd");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_checksum_half_order() {
        let bytes = b"frame";
        let hash = cityhash_rs::cityhash_102_128(bytes);
        let wire = frame_checksum(bytes);
        assert_eq!(&wire[..8], &((hash >> 64) as u64).to_le_bytes());
        assert_eq!(&wire[8..], &(hash as u64).to_le_bytes());
    }
}
