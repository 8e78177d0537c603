//! The `Native` format as an HTTP body: blocks back to back, without block
//! info, with an optional whole-body content-encoding.

use std::io::Cursor;

use super::block::{decode_block, encode_block, Block, BlockOptions};
use crate::column::CodecOptions;
use crate::config::HttpEncoding;
use crate::error::ChwireError;
use crate::kernels::http;

/// Revision 0 selects the HTTP block layout.
const HTTP_REVISION: u64 = 0;

pub fn encode_native_body(
    blocks: &[Block],
    encoding: Option<HttpEncoding>,
) -> Result<Vec<u8>, ChwireError> {
    let mut body = Vec::new();
    for block in blocks {
        block.check_row_counts()?;
        encode_block(block, HTTP_REVISION, &mut body);
    }
    match encoding {
        Some(encoding) => http::encode(&body, encoding),
        None => Ok(body),
    }
}

pub fn decode_native_body(
    body: &[u8],
    encoding: Option<HttpEncoding>,
    codec: &CodecOptions,
) -> Result<Vec<Block>, ChwireError> {
    let decoded;
    let plain = match encoding {
        Some(encoding) => {
            decoded = http::decode(body, encoding)?;
            decoded.as_slice()
        }
        None => body,
    };
    let options = BlockOptions {
        revision: HTTP_REVISION,
        codec: *codec,
        type_cache: None,
    };
    let mut cursor = Cursor::new(plain);
    let mut blocks = Vec::new();
    while (cursor.position() as usize) < plain.len() {
        blocks.push(decode_block(&mut cursor, &options)?);
    }
    Ok(blocks)
}
