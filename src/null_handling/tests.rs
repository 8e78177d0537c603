use std::io::Cursor;

use super::*;

#[test]
fn test_read_valid_null_map() {
    let map = read_null_map(&mut Cursor::new(vec![0u8, 1, 1, 0]), 4).unwrap();
    assert_eq!(map, vec![0, 1, 1, 0]);
}

#[test]
fn test_invalid_null_byte_is_corrupt_block() {
    let result = read_null_map(&mut Cursor::new(vec![0u8, 2]), 2);
    match result {
        Err(ChwireError::CorruptBlock { reason, .. }) => assert!(reason.contains("row 1")),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_short_null_map_is_transport_eof() {
    let result = read_null_map(&mut Cursor::new(vec![0u8]), 3);
    assert!(matches!(result, Err(ChwireError::Transport(_))));
}

#[test]
fn test_write_is_verbatim() {
    let mut buf = vec![9u8];
    write_null_map(&mut buf, &[1, 0]);
    assert_eq!(buf, vec![9, 1, 0]);
}
