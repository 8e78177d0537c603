//! A pull-based reader over the packet stream of a query result.
//!
//! Only `Data` blocks reach the caller. Progress, profile and log packets are
//! routed to optional hooks; totals and extremes are kept for later.
//!
//! A reader stopped by cancellation or a read error leaves the stream in the
//! middle of a response. Such a connection cannot carry another query; get it
//! back through `into_connection`, which closes it instead of returning it.

use std::io::Read;
use std::marker::PhantomData;

use super::block::Block;
use super::packets::{read_packet, PacketOptions, ProfileInfo, Progress, ServerPacket};
use crate::error::ChwireError;
use crate::transport::{CancellationToken, Transport};
use crate::value::FromRow;

type Hook<T> = Box<dyn FnMut(&T) + Send>;

pub struct BlockReader<R: Read> {
    stream: R,
    options: PacketOptions,
    cancel: Option<CancellationToken>,
    on_progress: Option<Hook<Progress>>,
    on_profile_info: Option<Hook<ProfileInfo>>,
    on_log: Option<Hook<Block>>,
    on_profile_events: Option<Hook<Block>>,
    header: Option<Block>,
    totals: Option<Block>,
    extremes: Option<Block>,
    packets_read: u64,
    finished: bool,
    /// Finished without reaching `EndOfStream` or an exception.
    abandoned: bool,
}

impl<R: Read> BlockReader<R> {
    pub fn new(stream: R, options: PacketOptions) -> Self {
        Self {
            stream,
            options,
            cancel: None,
            on_progress: None,
            on_profile_info: None,
            on_log: None,
            on_profile_events: None,
            header: None,
            totals: None,
            extremes: None,
            packets_read: 0,
            finished: false,
            abandoned: false,
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn on_progress(mut self, hook: impl FnMut(&Progress) + Send + 'static) -> Self {
        self.on_progress = Some(Box::new(hook));
        self
    }

    pub fn on_profile_info(mut self, hook: impl FnMut(&ProfileInfo) + Send + 'static) -> Self {
        self.on_profile_info = Some(Box::new(hook));
        self
    }

    pub fn on_log(mut self, hook: impl FnMut(&Block) + Send + 'static) -> Self {
        self.on_log = Some(Box::new(hook));
        self
    }

    pub fn on_profile_events(mut self, hook: impl FnMut(&Block) + Send + 'static) -> Self {
        self.on_profile_events = Some(Box::new(hook));
        self
    }

    /// The first, zero-row data block of the result, which carries the schema.
    pub fn header(&self) -> Option<&Block> {
        self.header.as_ref()
    }

    pub fn totals(&self) -> Option<&Block> {
        self.totals.as_ref()
    }

    pub fn extremes(&self) -> Option<&Block> {
        self.extremes.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Whether the response was cut short, leaving unread packets behind.
    pub fn is_abandoned(&self) -> bool {
        self.abandoned
    }

    pub fn into_inner(self) -> R {
        self.stream
    }

    /// Returns the next non-empty data block, or `None` once the server has
    /// sent `EndOfStream`. A server exception ends the stream with an error.
    pub fn next_block(&mut self) -> Result<Option<Block>, ChwireError> {
        while !self.finished {
            if let Some(token) = &self.cancel {
                if let Err(e) = token.check() {
                    self.finished = true;
                    self.abandoned = true;
                    return Err(e);
                }
            }
            let packet = match read_packet(&mut self.stream, &self.options) {
                Ok(packet) => packet,
                Err(e) => {
                    self.finished = true;
                    self.abandoned = true;
                    return Err(e);
                }
            };
            self.packets_read += 1;
            match packet {
                ServerPacket::Data(block) if block.rows() == 0 => {
                    if self.header.is_none() {
                        self.header = Some(block);
                    }
                }
                ServerPacket::Data(block) => return Ok(Some(block)),
                ServerPacket::Totals(block) => self.totals = Some(block),
                ServerPacket::Extremes(block) => self.extremes = Some(block),
                ServerPacket::Exception(exception) => {
                    self.finished = true;
                    log::debug!("query failed with server exception {}", exception.code);
                    return Err(exception.into());
                }
                ServerPacket::EndOfStream => {
                    self.finished = true;
                    log_metric!("event" = "read_complete", "packets" = self.packets_read);
                }
                ServerPacket::Progress(progress) => {
                    if let Some(hook) = self.on_progress.as_mut() {
                        hook(&progress);
                    }
                }
                ServerPacket::ProfileInfo(info) => {
                    if let Some(hook) = self.on_profile_info.as_mut() {
                        hook(&info);
                    }
                }
                ServerPacket::Log(block) => {
                    if let Some(hook) = self.on_log.as_mut() {
                        hook(&block);
                    }
                }
                ServerPacket::ProfileEvents(block) => {
                    if let Some(hook) = self.on_profile_events.as_mut() {
                        hook(&block);
                    }
                }
                other => log::debug!("skipping server packet {:?}", other),
            }
        }
        Ok(None)
    }

    /// Iterates the remaining rows of the result, scanned into `T`.
    pub fn rows<T: FromRow>(&mut self) -> Rows<'_, R, T> {
        Rows {
            reader: self,
            block: None,
            index: 0,
            failed: false,
            _row: PhantomData,
        }
    }
}

impl<R: Transport> BlockReader<R> {
    /// Hands the connection back once the response was read to its end.
    /// A cut-short or unfinished response closes the connection and yields
    /// `None`.
    pub fn into_connection(mut self) -> Result<Option<R>, ChwireError> {
        if self.finished && !self.abandoned {
            return Ok(Some(self.stream));
        }
        log::debug!(
            "closing a connection left mid-response after {} packets",
            self.packets_read
        );
        self.stream.close()?;
        Ok(None)
    }
}

pub struct Rows<'r, R: Read, T> {
    reader: &'r mut BlockReader<R>,
    block: Option<Block>,
    index: usize,
    failed: bool,
    _row: PhantomData<T>,
}

impl<R: Read, T: FromRow> Iterator for Rows<'_, R, T> {
    type Item = Result<T, ChwireError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            if let Some(block) = &self.block {
                if self.index < block.rows() {
                    let row = block.scan_row(self.index);
                    self.index += 1;
                    if row.is_err() {
                        self.failed = true;
                    }
                    return Some(row);
                }
            }
            match self.reader.next_block() {
                Ok(Some(block)) => {
                    self.block = Some(block);
                    self.index = 0;
                }
                Ok(None) => return None,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::format::server;
    use crate::bridge::packets::{write_data_packet, write_exception};
    use crate::column::CodecOptions;
    use crate::error::ServerException;
    use crate::transport::MemoryTransport;
    use crate::types::parse_type;
    use crate::value::Value;
    use crate::wire;
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};

    const REVISION: u64 = 54460;

    fn block(ids: &[u32]) -> Block {
        let schema = vec![
            ("id".to_string(), parse_type("UInt32").unwrap()),
            ("name".to_string(), parse_type("String").unwrap()),
        ];
        let mut block = Block::with_schema(&schema, &CodecOptions::default()).unwrap();
        for id in ids {
            let columns = block.columns_mut();
            columns[0].column.append(&Value::UInt32(*id)).unwrap();
            columns[1].column.append(&Value::String(format!("row{}", id))).unwrap();
        }
        block
    }

    fn progress_packet(buf: &mut Vec<u8>, rows: u64) {
        wire::write_varint(buf, server::PROGRESS);
        Progress {
            rows,
            ..Progress::default()
        }
        .write(buf, REVISION);
    }

    fn options() -> PacketOptions {
        let mut options = PacketOptions::default();
        options.block.revision = REVISION;
        options
    }

    #[test]
    fn test_routes_side_packets_to_hooks() {
        let mut stream = Vec::new();
        write_data_packet(&mut stream, server::DATA, &block(&[]), REVISION, None).unwrap();
        progress_packet(&mut stream, 2);
        write_data_packet(&mut stream, server::DATA, &block(&[1, 2]), REVISION, None).unwrap();
        write_data_packet(&mut stream, server::LOG, &block(&[9]), REVISION, None).unwrap();
        progress_packet(&mut stream, 1);
        write_data_packet(&mut stream, server::DATA, &block(&[3]), REVISION, None).unwrap();
        write_data_packet(&mut stream, server::TOTALS, &block(&[0]), REVISION, None).unwrap();
        wire::write_varint(&mut stream, server::END_OF_STREAM);

        let seen_rows = Arc::new(Mutex::new(0u64));
        let logs = Arc::new(Mutex::new(0usize));
        let (seen, log_count) = (seen_rows.clone(), logs.clone());
        let mut reader = BlockReader::new(Cursor::new(stream), options())
            .on_progress(move |p| *seen.lock().unwrap() += p.rows)
            .on_log(move |b| *log_count.lock().unwrap() += b.rows());

        let rows: Vec<(u32, String)> = reader.rows().collect::<Result<_, _>>().unwrap();
        assert_eq!(
            rows,
            vec![(1, "row1".to_string()), (2, "row2".to_string()), (3, "row3".to_string())]
        );
        assert_eq!(*seen_rows.lock().unwrap(), 3);
        assert_eq!(*logs.lock().unwrap(), 1);
        assert_eq!(reader.header().map(|h| h.column_count()), Some(2));
        assert_eq!(reader.totals().map(|t| t.rows()), Some(1));
        assert!(reader.is_finished());
        assert!(reader.next_block().unwrap().is_none());
    }

    #[test]
    fn test_exception_ends_the_stream() {
        let mut stream = Vec::new();
        write_data_packet(&mut stream, server::DATA, &block(&[1]), REVISION, None).unwrap();
        wire::write_varint(&mut stream, server::EXCEPTION);
        write_exception(
            &mut stream,
            &ServerException {
                code: 158,
                name: "DB::Exception".into(),
                message: "Limit for rows exceeded".into(),
                stack_trace: String::new(),
                nested: None,
            },
        );

        let mut reader = BlockReader::new(Cursor::new(stream), options());
        assert_eq!(reader.next_block().unwrap().map(|b| b.rows()), Some(1));
        let err = reader.next_block().unwrap_err();
        assert!(matches!(err, ChwireError::Server(ref e) if e.code == 158));
        assert!(!err.is_connection_fatal());
        assert!(reader.next_block().unwrap().is_none());
    }

    #[test]
    fn test_cancelled_reader_stops_before_reading() {
        let mut stream = Vec::new();
        write_data_packet(&mut stream, server::DATA, &block(&[1]), REVISION, None).unwrap();
        let token = CancellationToken::new();
        let mut reader =
            BlockReader::new(Cursor::new(stream), options()).with_cancellation(token.clone());
        token.cancel();
        assert!(matches!(reader.next_block(), Err(ChwireError::Cancelled)));
        assert_eq!(reader.into_inner().position(), 0);
    }

    #[test]
    fn test_cut_short_response_closes_the_connection() {
        let mut stream = Vec::new();
        write_data_packet(&mut stream, server::DATA, &block(&[1]), REVISION, None).unwrap();
        write_data_packet(&mut stream, server::DATA, &block(&[2]), REVISION, None).unwrap();
        wire::write_varint(&mut stream, server::END_OF_STREAM);
        let transport = MemoryTransport::with_incoming(&stream);
        let token = CancellationToken::new();
        let mut reader =
            BlockReader::new(transport.clone(), options()).with_cancellation(token.clone());
        assert_eq!(reader.next_block().unwrap().map(|b| b.rows()), Some(1));
        token.cancel();
        assert!(matches!(reader.next_block(), Err(ChwireError::Cancelled)));
        assert!(reader.is_abandoned());
        assert!(reader.into_connection().unwrap().is_none());
        assert!(transport.is_closed());
    }

    #[test]
    fn test_complete_response_hands_the_connection_back() {
        let mut stream = Vec::new();
        write_data_packet(&mut stream, server::DATA, &block(&[1]), REVISION, None).unwrap();
        wire::write_varint(&mut stream, server::END_OF_STREAM);
        let transport = MemoryTransport::with_incoming(&stream);
        let mut reader = BlockReader::new(transport.clone(), options());
        while reader.next_block().unwrap().is_some() {}
        assert!(!reader.is_abandoned());
        let connection = reader.into_connection().unwrap();
        assert!(connection.is_some_and(|c| c.is_alive()));
        assert!(!transport.is_closed());
    }

    #[test]
    fn test_scan_mismatch_is_yielded_once() {
        let mut stream = Vec::new();
        write_data_packet(&mut stream, server::DATA, &block(&[1, 2]), REVISION, None).unwrap();
        wire::write_varint(&mut stream, server::END_OF_STREAM);
        let mut reader = BlockReader::new(Cursor::new(stream), options());
        let mut rows = reader.rows::<(u32,)>();
        assert!(matches!(rows.next(), Some(Err(ChwireError::Conversion(_)))));
        assert!(rows.next().is_none());
    }
}
