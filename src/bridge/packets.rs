//! Server packets and the client `Data` packet.
//!
//! Only the block part of `Data`, `Totals` and `Extremes` packets is framed
//! when compression is on; the packet id and the table name that precede it
//! are always plain. `Log` and `ProfileEvents` blocks are never compressed.

use std::io::Read;

use uuid::Uuid;

use super::block::{decode_block, encode_block, Block, BlockOptions};
use super::format::{self, server};
use crate::error::{ChwireError, ServerException};
use crate::frame_pipeline::{CompressedReader, FrameWriter};
use crate::utils::{read_bytes, MAX_READ_ALLOCATION};
use crate::wire;

//==================================================================================
// 1. Packet Payloads
//==================================================================================

/// Query progress counters, as deltas since the previous packet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub rows: u64,
    pub bytes: u64,
    pub total_rows: u64,
    pub total_bytes: u64,
    pub written_rows: u64,
    pub written_bytes: u64,
    pub elapsed_ns: u64,
}

impl Progress {
    pub fn read(reader: &mut dyn Read, revision: u64) -> Result<Self, ChwireError> {
        let mut progress = Progress {
            rows: wire::read_varint(reader)?,
            bytes: wire::read_varint(reader)?,
            total_rows: wire::read_varint(reader)?,
            ..Progress::default()
        };
        if revision >= format::DBMS_MIN_PROTOCOL_VERSION_WITH_TOTAL_BYTES_IN_PROGRESS {
            progress.total_bytes = wire::read_varint(reader)?;
        }
        if revision >= format::DBMS_MIN_REVISION_WITH_CLIENT_WRITE_INFO {
            progress.written_rows = wire::read_varint(reader)?;
            progress.written_bytes = wire::read_varint(reader)?;
        }
        if revision >= format::DBMS_MIN_REVISION_WITH_SERVER_QUERY_TIME_IN_PROGRESS {
            progress.elapsed_ns = wire::read_varint(reader)?;
        }
        Ok(progress)
    }

    pub fn write(&self, buf: &mut Vec<u8>, revision: u64) {
        wire::write_varint(buf, self.rows);
        wire::write_varint(buf, self.bytes);
        wire::write_varint(buf, self.total_rows);
        if revision >= format::DBMS_MIN_PROTOCOL_VERSION_WITH_TOTAL_BYTES_IN_PROGRESS {
            wire::write_varint(buf, self.total_bytes);
        }
        if revision >= format::DBMS_MIN_REVISION_WITH_CLIENT_WRITE_INFO {
            wire::write_varint(buf, self.written_rows);
            wire::write_varint(buf, self.written_bytes);
        }
        if revision >= format::DBMS_MIN_REVISION_WITH_SERVER_QUERY_TIME_IN_PROGRESS {
            wire::write_varint(buf, self.elapsed_ns);
        }
    }
}

/// Final statistics of a query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProfileInfo {
    pub rows: u64,
    pub blocks: u64,
    pub bytes: u64,
    pub applied_limit: bool,
    pub rows_before_limit: u64,
    pub calculated_rows_before_limit: bool,
    pub applied_aggregation: bool,
    pub rows_before_aggregation: u64,
}

impl ProfileInfo {
    pub fn read(reader: &mut dyn Read, revision: u64) -> Result<Self, ChwireError> {
        let mut info = ProfileInfo {
            rows: wire::read_varint(reader)?,
            blocks: wire::read_varint(reader)?,
            bytes: wire::read_varint(reader)?,
            applied_limit: wire::read_bool(reader)?,
            rows_before_limit: wire::read_varint(reader)?,
            calculated_rows_before_limit: wire::read_bool(reader)?,
            ..ProfileInfo::default()
        };
        if revision >= format::DBMS_MIN_REVISION_WITH_ROWS_BEFORE_AGGREGATION {
            info.applied_aggregation = wire::read_bool(reader)?;
            info.rows_before_aggregation = wire::read_varint(reader)?;
        }
        Ok(info)
    }

    pub fn write(&self, buf: &mut Vec<u8>, revision: u64) {
        wire::write_varint(buf, self.rows);
        wire::write_varint(buf, self.blocks);
        wire::write_varint(buf, self.bytes);
        wire::write_bool(buf, self.applied_limit);
        wire::write_varint(buf, self.rows_before_limit);
        wire::write_bool(buf, self.calculated_rows_before_limit);
        if revision >= format::DBMS_MIN_REVISION_WITH_ROWS_BEFORE_AGGREGATION {
            wire::write_bool(buf, self.applied_aggregation);
            wire::write_varint(buf, self.rows_before_aggregation);
        }
    }
}

/// Reads an exception and the chain of exceptions nested in it.
pub fn read_exception(reader: &mut dyn Read) -> Result<ServerException, ChwireError> {
    let mut chain = Vec::new();
    loop {
        let code = wire::read_i32(reader)?;
        let name = wire::read_string(reader)?;
        let message = wire::read_string(reader)?;
        let stack_trace = wire::read_string(reader)?;
        let has_nested = wire::read_bool(reader)?;
        chain.push(ServerException {
            code,
            name,
            message,
            stack_trace,
            nested: None,
        });
        if !has_nested {
            break;
        }
    }
    let mut nested: Option<Box<ServerException>> = None;
    while let Some(mut exception) = chain.pop() {
        exception.nested = nested;
        nested = Some(Box::new(exception));
    }
    nested
        .map(|e| *e)
        .ok_or_else(|| ChwireError::Protocol("empty exception packet".into()))
}

pub fn write_exception(buf: &mut Vec<u8>, exception: &ServerException) {
    let mut current = Some(exception);
    while let Some(e) = current {
        wire::write_i32(buf, e.code);
        wire::write_string(buf, e.name.as_bytes());
        wire::write_string(buf, e.message.as_bytes());
        wire::write_string(buf, e.stack_trace.as_bytes());
        wire::write_bool(buf, e.nested.is_some());
        current = e.nested.as_deref();
    }
}

//==================================================================================
// 2. Server Packets
//==================================================================================

#[derive(Debug)]
pub enum ServerPacket {
    Data(Block),
    Totals(Block),
    Extremes(Block),
    Exception(ServerException),
    Progress(Progress),
    Pong,
    EndOfStream,
    ProfileInfo(ProfileInfo),
    Log(Block),
    ProfileEvents(Block),
    TableColumns { table: String, description: String },
    PartUuids(Vec<Uuid>),
    ReadTaskRequest,
}

/// How packet bodies are decoded.
#[derive(Debug, Clone, Default)]
pub struct PacketOptions {
    pub block: BlockOptions,
    /// Whether data blocks arrive in compressed frames.
    pub compressed: bool,
}

fn read_block(
    reader: &mut dyn Read,
    options: &PacketOptions,
    compressed: bool,
) -> Result<Block, ChwireError> {
    // Temporary table name; empty for regular results.
    let _table = wire::read_string(reader)?;
    if !compressed {
        return decode_block(reader, &options.block);
    }
    let mut framed = CompressedReader::new(reader);
    let block = decode_block(&mut framed, &options.block)?;
    if framed.buffered() != 0 {
        return Err(ChwireError::Protocol(format!(
            "{} decompressed bytes left after a block",
            framed.buffered()
        )));
    }
    Ok(block)
}

/// Reads the next server packet.
pub fn read_packet(reader: &mut dyn Read, options: &PacketOptions) -> Result<ServerPacket, ChwireError> {
    let id = wire::read_varint(reader)?;
    let revision = options.block.revision;
    let packet = match id {
        server::DATA => ServerPacket::Data(read_block(reader, options, options.compressed)?),
        server::TOTALS => ServerPacket::Totals(read_block(reader, options, options.compressed)?),
        server::EXTREMES => ServerPacket::Extremes(read_block(reader, options, options.compressed)?),
        server::LOG => ServerPacket::Log(read_block(reader, options, false)?),
        server::PROFILE_EVENTS => ServerPacket::ProfileEvents(read_block(reader, options, false)?),
        server::EXCEPTION => ServerPacket::Exception(read_exception(reader)?),
        server::PROGRESS => ServerPacket::Progress(Progress::read(reader, revision)?),
        server::PROFILE_INFO => ServerPacket::ProfileInfo(ProfileInfo::read(reader, revision)?),
        server::PONG => ServerPacket::Pong,
        server::END_OF_STREAM => ServerPacket::EndOfStream,
        server::READ_TASK_REQUEST => ServerPacket::ReadTaskRequest,
        server::TABLE_COLUMNS => ServerPacket::TableColumns {
            table: wire::read_string(reader)?,
            description: wire::read_string(reader)?,
        },
        server::PART_UUIDS => {
            let count = wire::read_len(reader)?;
            if count > MAX_READ_ALLOCATION / 16 {
                return Err(ChwireError::Protocol(format!("{} part UUIDs", count)));
            }
            let bytes = read_bytes(reader, count * 16)?;
            ServerPacket::PartUuids(
                bytes
                    .chunks_exact(16)
                    .map(|chunk| {
                        let mut raw = [0u8; 16];
                        raw.copy_from_slice(chunk);
                        Uuid::from_bytes(raw)
                    })
                    .collect(),
            )
        }
        other => {
            return Err(ChwireError::Protocol(format!(
                "unexpected server packet {} ({})",
                other,
                server::name(other)
            )))
        }
    };
    Ok(packet)
}

/// Appends a `Data`-shaped packet: id, empty table name, then the block,
/// framed when `framer` is set.
pub fn write_data_packet(
    buf: &mut Vec<u8>,
    packet_id: u64,
    block: &Block,
    revision: u64,
    framer: Option<&FrameWriter>,
) -> Result<(), ChwireError> {
    wire::write_varint(buf, packet_id);
    wire::write_string(buf, b"");
    let mut body = Vec::new();
    encode_block(block, revision, &mut body);
    match framer {
        Some(framer) => buf.extend_from_slice(&framer.encode(&body)?),
        None => buf.extend_from_slice(&body),
    }
    Ok(())
}
