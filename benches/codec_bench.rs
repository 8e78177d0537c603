// In benches/codec_bench.rs

use std::io::Cursor;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use chwire::bridge::{decode_block, encode_block, Block, BlockOptions};
use chwire::column::CodecOptions;
use chwire::frame_pipeline::{CompressedReader, FrameMethod, FrameWriter};
use chwire::{parse_type, Value};

// --- Mock Data Generation ---

const BENCH_ROWS: usize = 65536;
const REVISION: u64 = 54460;

/// Builds a block shaped like a typical event table.
fn generate_event_block(rows: usize) -> Block {
    let schema = vec![
        ("id".to_string(), parse_type("UInt64").unwrap()),
        ("kind".to_string(), parse_type("LowCardinality(String)").unwrap()),
        ("score".to_string(), parse_type("Nullable(Float64)").unwrap()),
        ("tags".to_string(), parse_type("Array(String)").unwrap()),
    ];
    let mut block = Block::with_schema(&schema, &CodecOptions::default()).unwrap();
    let kinds = ["click", "view", "purchase", "scroll"];
    for i in 0..rows {
        let columns = block.columns_mut();
        columns[0].column.append(&Value::UInt64(i as u64)).unwrap();
        columns[1].column.append(&Value::from(kinds[i % kinds.len()])).unwrap();
        let score = if i % 10 == 0 { Value::Null } else { Value::Float64(i as f64 * 0.5) };
        columns[2].column.append(&score).unwrap();
        let tags = (0..i % 3).map(|t| Value::String(format!("t{}", t))).collect();
        columns[3].column.append(&Value::Array(tags)).unwrap();
    }
    block
}

// --- Benchmark Suite ---

fn bench_block_codec(c: &mut Criterion) {
    let block = generate_event_block(BENCH_ROWS);
    let mut encoded = Vec::new();
    encode_block(&block, REVISION, &mut encoded);

    let mut group = c.benchmark_group("Native Block Codec");
    group.throughput(Throughput::Bytes(encoded.len() as u64));

    group.bench_function("Encode block", |b| {
        b.iter(|| {
            let mut buf = Vec::with_capacity(encoded.len());
            encode_block(black_box(&block), REVISION, &mut buf);
            buf
        })
    });
    group.bench_function("Decode block", |b| {
        let options = BlockOptions::default();
        b.iter(|| decode_block(&mut Cursor::new(black_box(&encoded)), &options).unwrap())
    });
    group.finish();
}

fn bench_framing(c: &mut Criterion) {
    let block = generate_event_block(BENCH_ROWS);
    let mut encoded = Vec::new();
    encode_block(&block, REVISION, &mut encoded);

    let mut group = c.benchmark_group("Compressed Framing");
    group.throughput(Throughput::Bytes(encoded.len() as u64));

    for (label, method) in [("LZ4", FrameMethod::Lz4), ("ZSTD", FrameMethod::Zstd)] {
        let writer = FrameWriter::new(method, 3, 1 << 20);
        let framed = writer.encode(&encoded).unwrap();

        group.bench_function(format!("Frame [{}]", label), |b| {
            b.iter(|| writer.encode(black_box(&encoded)).unwrap())
        });
        group.bench_function(format!("Unframe + decode [{}]", label), |b| {
            let options = BlockOptions::default();
            b.iter(|| {
                let mut reader = CompressedReader::new(Cursor::new(black_box(&framed)));
                decode_block(&mut reader, &options).unwrap()
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_block_codec, bench_framing);
criterion_main!(benches);
