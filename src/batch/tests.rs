use std::io::Cursor;
use std::sync::Arc;

use chrono::TimeZone;
use chrono_tz::Tz;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::*;
use crate::bridge::format::server;
use crate::bridge::{decode_block, write_exception};
use crate::config::CompressionMethod;
use crate::error::ServerException;
use crate::frame_pipeline::CompressedReader;
use crate::transport::MemoryTransport;
use crate::types::parse_type;
use crate::wire;

//==================================================================================
// Helpers
//==================================================================================

fn schema(columns: &[(&str, &str)]) -> Vec<(String, TypeDescriptor)> {
    columns
        .iter()
        .map(|(name, ty)| (name.to_string(), parse_type(ty).unwrap()))
        .collect()
}

fn config(compression: CompressionMethod, tweak: impl FnOnce(&mut ClientConfig)) -> Arc<ClientConfig> {
    let mut config = ClientConfig {
        compression,
        ..ClientConfig::default()
    };
    tweak(&mut config);
    Arc::new(config)
}

fn end_of_stream() -> Vec<u8> {
    let mut buf = Vec::new();
    wire::write_varint(&mut buf, server::END_OF_STREAM);
    buf
}

/// Splits what the client wrote back into the blocks of its Data packets.
fn sent_blocks(written: &[u8], compressed: bool) -> Vec<Block> {
    let options = BlockOptions::default();
    let mut cursor = Cursor::new(written);
    let mut blocks = Vec::new();
    while (cursor.position() as usize) < written.len() {
        assert_eq!(wire::read_varint(&mut cursor).unwrap(), client::DATA);
        assert_eq!(wire::read_string(&mut cursor).unwrap(), "");
        let block = if compressed {
            let mut framed = CompressedReader::new(&mut cursor);
            decode_block(&mut framed, &options).unwrap()
        } else {
            decode_block(&mut cursor, &options).unwrap()
        };
        blocks.push(block);
    }
    blocks
}

fn data_rows(blocks: &[Block]) -> Vec<Vec<Value>> {
    blocks
        .iter()
        .flat_map(|b| (0..b.rows()).map(move |i| b.values(i).unwrap()))
        .collect()
}

fn pair_batch(transport: &MemoryTransport, config: Arc<ClientConfig>) -> Batch<MemoryTransport> {
    Batch::new(
        "pairs",
        &schema(&[("id", "UInt32"), ("label", "String")]),
        transport.clone(),
        config,
    )
    .unwrap()
}

//==================================================================================
// Round Trips
//==================================================================================

#[test]
fn test_hundred_rows_scan_back_in_order() {
    let transport = MemoryTransport::with_incoming(&end_of_stream());
    let columns = schema(&[
        ("flag", "UInt8"),
        ("name", "String"),
        ("samples", "Array(Int16)"),
        ("at", "DateTime"),
    ]);
    let mut batch = Batch::new(
        "events",
        &columns,
        transport.clone(),
        config(CompressionMethod::Lz4, |_| {}),
    )
    .unwrap();

    let mut expected = Vec::new();
    for i in 0..100u32 {
        let row = vec![
            Value::UInt8((i % 256) as u8),
            Value::String(format!("event-{}", i)),
            Value::Array((0..(i % 5) as i16).map(|v| Value::Int16(v - 2)).collect()),
            Value::DateTime(Tz::UTC.timestamp_opt(1_700_000_000 + i as i64, 0).unwrap()),
        ];
        batch.append_row(&row).unwrap();
        expected.push(row);
    }
    batch.send().unwrap();
    assert!(batch.is_sent());

    let blocks = sent_blocks(&transport.written(), true);
    assert_eq!(blocks.len(), 2);
    assert_eq!(blocks[1].rows(), 0);
    assert_eq!(blocks[1].column_count(), 0);
    assert_eq!(data_rows(&blocks), expected);
}

#[test]
fn test_flush_then_send_transmits_union_once() {
    let transport = MemoryTransport::with_incoming(&end_of_stream());
    let mut batch = pair_batch(&transport, config(CompressionMethod::Disabled, |_| {}));
    for i in 0..3u32 {
        batch.append([Value::UInt32(i), Value::from("early")]).unwrap();
    }
    batch.flush().unwrap();
    batch.flush().unwrap();
    for i in 3..5u32 {
        batch.append([Value::UInt32(i), Value::from("late")]).unwrap();
    }
    batch.send().unwrap();

    let blocks = sent_blocks(&transport.written(), false);
    let sizes: Vec<usize> = blocks.iter().map(|b| b.rows()).collect();
    assert_eq!(sizes, vec![3, 2, 0]);
    let ids: Vec<Value> = data_rows(&blocks).into_iter().map(|row| row[0].clone()).collect();
    assert_eq!(ids, (0..5u32).map(Value::UInt32).collect::<Vec<_>>());
    assert_eq!(batch.rows_sent(), 5);
    assert_eq!(batch.blocks_sent(), 2);
}

#[test]
fn test_hundred_thousand_rows_with_periodic_flush() {
    let transport = MemoryTransport::with_incoming(&end_of_stream());
    let columns = schema(&[("k", "UInt64"), ("v", "Nullable(Float64)"), ("tag", "LowCardinality(String)")]);
    let cfg = config(CompressionMethod::Zstd, |c| c.batch.flush_threshold_rows = Some(10_000));
    let mut batch = Batch::new("metrics", &columns, transport.clone(), cfg).unwrap();

    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut key_sum: u64 = 0;
    for _ in 0..100_000 {
        let k = rng.random_range(0..1_000_000u64);
        key_sum += k;
        let v = if rng.random_bool(0.1) {
            Value::Null
        } else {
            Value::Float64(rng.random::<f64>())
        };
        let tag = format!("tag{}", rng.random_range(0..7));
        batch.append([Value::UInt64(k), v, Value::String(tag)]).unwrap();
    }
    assert_eq!(batch.rows(), 0);
    batch.send().unwrap();

    let blocks = sent_blocks(&transport.written(), true);
    let data: Vec<&Block> = blocks.iter().filter(|b| b.rows() > 0).collect();
    assert_eq!(data.len(), 10);
    assert!(data.iter().all(|b| b.rows() == 10_000));
    let total: usize = data.iter().map(|b| b.rows()).sum();
    assert_eq!(total, 100_000);
    let decoded_sum: u64 = data
        .iter()
        .flat_map(|b| (0..b.rows()).map(move |i| b.values(i).unwrap()[0].clone()))
        .map(|v| match v {
            Value::UInt64(k) => k,
            other => panic!("unexpected {:?}", other),
        })
        .sum();
    assert_eq!(decoded_sum, key_sum);
}

#[test]
fn test_batch_from_server_header() {
    let header = Block::with_schema(
        &schema(&[("id", "UInt64"), ("payload", "Map(String, UInt8)")]),
        &Default::default(),
    )
    .unwrap();
    let transport = MemoryTransport::with_incoming(&end_of_stream());
    let mut batch = Batch::from_header("t", &header, transport.clone(), Arc::new(ClientConfig::default())).unwrap();
    assert_eq!(batch.column_names().collect::<Vec<_>>(), vec!["id", "payload"]);
    batch
        .append([
            Value::UInt64(1),
            Value::Map(vec![(Value::from("a"), Value::UInt8(2))]),
        ])
        .unwrap();
    batch.send().unwrap();
    assert_eq!(sent_blocks(&transport.written(), false)[0].rows(), 1);
}

//==================================================================================
// Poisoning
//==================================================================================

#[test]
fn test_incompatible_enum_value_poisons_the_batch() {
    let transport = MemoryTransport::new();
    let mut batch = Batch::new(
        "letters",
        &schema(&[("letter", "Enum8('A' = 1, 'B' = 2)")]),
        transport.clone(),
        Arc::new(ClientConfig::default()),
    )
    .unwrap();
    batch.append([Value::from("A")]).unwrap();

    let err = batch.append([Value::from("C")]).unwrap_err();
    match &err {
        ChwireError::Conversion(e) => assert_eq!(e.column, "letter"),
        other => panic!("unexpected {:?}", other),
    }
    match batch.send() {
        Err(ChwireError::BatchInvalid(message)) => assert_eq!(message, err.to_string()),
        other => panic!("unexpected {:?}", other),
    }
    assert!(matches!(batch.append([Value::from("B")]), Err(ChwireError::BatchInvalid(_))));
    assert!(transport.written().is_empty());
}

#[test]
fn test_poison_wins_over_an_empty_batch() {
    let transport = MemoryTransport::new();
    let mut batch = pair_batch(&transport, Arc::new(ClientConfig::default()));
    // Wrong arity on the very first row: nothing is staged, yet the batch is dead.
    assert!(matches!(batch.append([Value::UInt32(1)]), Err(ChwireError::Conversion(_))));
    assert_eq!(batch.rows(), 0);
    assert!(matches!(batch.send(), Err(ChwireError::BatchInvalid(_))));
    assert!(transport.written().is_empty());
}

#[test]
fn test_failed_row_is_rolled_back() {
    let transport = MemoryTransport::new();
    let mut batch = pair_batch(&transport, Arc::new(ClientConfig::default()));
    batch.append([Value::UInt32(1), Value::from("ok")]).unwrap();
    assert!(batch.append([Value::UInt32(2), Value::Int64(5)]).is_err());
    assert_eq!(batch.rows(), 1);
    assert!(batch.staging.columns().iter().all(|c| c.column.rows() == 1));
}

#[test]
fn test_abort_semantics() {
    let transport = MemoryTransport::new();
    let mut batch = pair_batch(&transport, Arc::new(ClientConfig::default()));
    batch.append([Value::UInt32(1), Value::from("x")]).unwrap();
    batch.abort().unwrap();
    batch.abort().unwrap();
    assert_eq!(batch.state(), &BatchState::Aborted);
    assert!(matches!(batch.append([Value::UInt32(2), Value::from("y")]), Err(ChwireError::BatchAborted)));
    assert!(matches!(batch.send(), Err(ChwireError::BatchAborted)));
    assert!(transport.written().is_empty());
    assert_eq!(transport.close_calls(), 0);

    // A poisoned batch can still be aborted.
    let mut poisoned = pair_batch(&transport, Arc::new(ClientConfig::default()));
    let _ = poisoned.append([Value::from("wrong"), Value::from("y")]);
    poisoned.abort().unwrap();
    assert_eq!(poisoned.state(), &BatchState::Aborted);
}

#[test]
fn test_struct_matching_by_name_and_position() {
    struct Reading {
        sensor: u32,
        label: String,
    }
    crate::impl_record!(Reading { label => "label", sensor => "id" });

    let transport = MemoryTransport::with_incoming(&end_of_stream());
    let mut batch = pair_batch(&transport, Arc::new(ClientConfig::default()));
    batch
        .append_struct(Reading {
            sensor: 7,
            label: "north".into(),
        })
        .unwrap();
    batch.send().unwrap();
    let rows = data_rows(&sent_blocks(&transport.written(), false));
    assert_eq!(rows, vec![vec![Value::UInt32(7), Value::from("north")]]);

    // Positional matching takes fields in declaration order: label lands in `id`.
    let transport = MemoryTransport::new();
    let cfg = config(CompressionMethod::Disabled, |c| {
        c.batch.struct_matching = StructMatching::Positional
    });
    let mut positional = pair_batch(&transport, cfg);
    let err = positional
        .append_struct(Reading {
            sensor: 7,
            label: "north".into(),
        })
        .unwrap_err();
    assert!(matches!(err, ChwireError::Conversion(ref e) if e.column == "id"));
}

#[test]
fn test_missing_struct_field_poisons() {
    struct OnlyId {
        id: u32,
    }
    crate::impl_record!(OnlyId { id => "id" });

    let transport = MemoryTransport::new();
    let mut batch = pair_batch(&transport, Arc::new(ClientConfig::default()));
    let err = batch.append_struct(OnlyId { id: 1 }).unwrap_err();
    assert!(matches!(err, ChwireError::Conversion(ref e) if e.column == "label"));
    assert!(matches!(batch.state(), BatchState::Invalid(_)));
}

//==================================================================================
// Column Writers
//==================================================================================

#[test]
fn test_column_wise_appends() {
    let transport = MemoryTransport::with_incoming(&end_of_stream());
    let mut batch = pair_batch(&transport, Arc::new(ClientConfig::default()));
    assert_eq!(batch.column(1).name(), Some("label"));
    batch.column(0).append([1u32, 2]).unwrap();
    batch.column(1).append(["a", "b"]).unwrap();
    batch.column(0).append_row(3u32).unwrap();
    batch.column(1).append_row("c").unwrap();
    batch.send().unwrap();
    assert_eq!(sent_blocks(&transport.written(), false)[0].rows(), 3);
}

#[test]
fn test_out_of_range_column_writer_poisons() {
    let transport = MemoryTransport::new();
    let mut batch = pair_batch(&transport, Arc::new(ClientConfig::default()));
    let mut writer = batch.column(5);
    assert_eq!(writer.name(), None);
    let err = writer.append_row(1u32).unwrap_err();
    assert!(matches!(err, ChwireError::ColumnIndexOutOfRange { index: 5, columns: 2 }));
    assert!(matches!(batch.send(), Err(ChwireError::BatchInvalid(_))));
}

#[test]
fn test_uneven_columns_fail_at_flush() {
    let transport = MemoryTransport::new();
    let mut batch = pair_batch(&transport, Arc::new(ClientConfig::default()));
    batch.column(0).append([1u32, 2]).unwrap();
    batch.column(1).append_row("only one").unwrap();
    assert!(batch.flush().is_err());
    assert!(matches!(batch.state(), BatchState::Invalid(_)));
    assert!(transport.written().is_empty());
}

//==================================================================================
// Send And Close
//==================================================================================

#[test]
fn test_send_is_at_most_once() {
    let transport = MemoryTransport::with_incoming(&end_of_stream());
    let mut batch = pair_batch(&transport, Arc::new(ClientConfig::default()));
    batch.append([Value::UInt32(1), Value::from("once")]).unwrap();
    batch.send().unwrap();
    let written = transport.written();

    assert!(matches!(batch.send(), Err(ChwireError::BatchAlreadySent)));
    assert!(matches!(batch.flush(), Err(ChwireError::BatchAlreadySent)));
    assert!(matches!(batch.abort(), Err(ChwireError::BatchAlreadySent)));
    assert_eq!(transport.written(), written);
}

#[test]
fn test_zero_row_send_still_finishes_the_insert() {
    let transport = MemoryTransport::with_incoming(&end_of_stream());
    let mut batch = pair_batch(&transport, Arc::new(ClientConfig::default()));
    batch.flush().unwrap();
    assert_eq!(transport.write_calls(), 0);

    batch.send().unwrap();
    assert!(batch.is_sent());
    assert_eq!(batch.rows_sent(), 0);
    assert_eq!(batch.blocks_sent(), 0);
    // Only the end-of-insert block goes out, and the acknowledgement is read.
    let blocks = sent_blocks(&transport.written(), false);
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].rows(), 0);
    assert_eq!(blocks[0].column_count(), 0);
    let mut rest = Vec::new();
    std::io::Read::read_to_end(&mut transport.clone(), &mut rest).unwrap();
    assert!(rest.is_empty());
}

#[test]
fn test_server_exception_surfaces_and_invalidates() {
    let mut script = Vec::new();
    wire::write_varint(&mut script, server::PROGRESS);
    Progress {
        written_rows: 1,
        ..Progress::default()
    }
    .write(&mut script, crate::bridge::format::CLIENT_PROTOCOL_REVISION);
    wire::write_varint(&mut script, server::EXCEPTION);
    write_exception(
        &mut script,
        &ServerException {
            code: 53,
            name: "DB::Exception".into(),
            message: "Type mismatch in VALUES section".into(),
            stack_trace: String::new(),
            nested: None,
        },
    );
    let transport = MemoryTransport::with_incoming(&script);
    let mut batch = pair_batch(&transport, Arc::new(ClientConfig::default()));
    batch.append([Value::UInt32(1), Value::from("x")]).unwrap();

    let err = batch.send().unwrap_err();
    assert!(matches!(err, ChwireError::Server(ref e) if e.code == 53));
    assert_eq!(batch.progress().written_rows, 1);
    assert!(matches!(batch.state(), BatchState::Invalid(_)));
    // The connection survives a server exception.
    assert!(!transport.is_closed());
    assert!(matches!(batch.send(), Err(ChwireError::BatchInvalid(_))));
}

#[test]
fn test_close_sends_then_closes_once() {
    let transport = MemoryTransport::with_incoming(&end_of_stream());
    let mut batch = pair_batch(&transport, Arc::new(ClientConfig::default()));
    batch.append([Value::UInt32(9), Value::from("bye")]).unwrap();
    batch.close().unwrap();
    batch.close().unwrap();
    assert!(batch.is_sent());
    assert!(transport.is_closed());
    assert_eq!(transport.close_calls(), 1);
    assert_eq!(sent_blocks(&transport.written(), false).len(), 2);
}

#[test]
fn test_close_on_flush_reconnects() {
    let first = MemoryTransport::with_incoming(&end_of_stream());
    let second = MemoryTransport::with_incoming(&end_of_stream());
    let mut spare = Some(second.clone());
    let cfg = config(CompressionMethod::None, |c| c.batch.close_on_flush = true);
    let mut batch = pair_batch(&first, cfg)
        .with_reconnect(move || spare.take().ok_or(ChwireError::ConnectionClosed));

    batch.append([Value::UInt32(1), Value::from("a")]).unwrap();
    batch.flush().unwrap();
    assert!(first.is_closed());
    assert!(batch.transport().is_none());

    batch.append([Value::UInt32(2), Value::from("b")]).unwrap();
    batch.send().unwrap();
    assert!(second.is_closed());

    for (handle, id) in [(&first, 1u32), (&second, 2)] {
        let blocks = sent_blocks(&handle.written(), true);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].values(0).unwrap()[0], Value::UInt32(id));
        assert_eq!(blocks[1].rows(), 0);
    }
}

#[test]
fn test_lost_connection_mid_insert_is_not_replaced() {
    let first = MemoryTransport::new();
    let second = MemoryTransport::with_incoming(&end_of_stream());
    let mut spare = Some(second.clone());
    let mut batch = pair_batch(&first, Arc::new(ClientConfig::default()))
        .with_reconnect(move || spare.take().ok_or(ChwireError::ConnectionClosed));

    batch.append([Value::UInt32(1), Value::from("a")]).unwrap();
    batch.flush().unwrap();
    {
        let mut dropped = first.clone();
        dropped.close().unwrap();
    }

    batch.append([Value::UInt32(2), Value::from("b")]).unwrap();
    assert!(matches!(batch.flush(), Err(ChwireError::ConnectionClosed)));
    assert!(matches!(batch.state(), BatchState::Invalid(_)));
    assert!(matches!(batch.send(), Err(ChwireError::BatchInvalid(_))));
    assert_eq!(batch.rows_sent(), 1);
    assert!(second.written().is_empty());
}

#[test]
fn test_close_on_flush_without_rows_finishes_the_first_insert() {
    let first = MemoryTransport::with_incoming(&end_of_stream());
    let cfg = config(CompressionMethod::None, |c| c.batch.close_on_flush = true);
    let mut batch = pair_batch(&first, cfg)
        .with_reconnect(|| Err(ChwireError::ConnectionClosed));
    batch.send().unwrap();
    let blocks = sent_blocks(&first.written(), true);
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].rows(), 0);
}

#[test]
fn test_cancellation_closes_the_transport() {
    let transport = MemoryTransport::with_incoming(&end_of_stream());
    let token = CancellationToken::new();
    let mut batch = pair_batch(&transport, Arc::new(ClientConfig::default())).with_cancellation(token.clone());
    batch.append([Value::UInt32(1), Value::from("a")]).unwrap();
    token.cancel();
    assert!(matches!(batch.send(), Err(ChwireError::Cancelled)));
    assert!(transport.is_closed());
    assert!(transport.written().is_empty());
    assert!(matches!(batch.state(), BatchState::Invalid(_)));
}

#[test]
fn test_write_failure_poisons_without_retry() {
    let transport = MemoryTransport::new();
    transport.fail_writes_after(0);
    let mut batch = pair_batch(&transport, Arc::new(ClientConfig::default()));
    batch.append([Value::UInt32(1), Value::from("a")]).unwrap();
    assert!(matches!(batch.flush(), Err(ChwireError::Transport(_))));
    assert!(transport.is_closed());
    assert!(matches!(batch.send(), Err(ChwireError::BatchInvalid(_))));
    assert_eq!(transport.write_calls(), 0);
}
