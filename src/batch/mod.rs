//! The insert-side batch: a state machine that stages rows in column codecs,
//! ships them as native blocks and finalizes the insert.
//!
//! Any error raised while staging or sending poisons the batch. A poisoned
//! batch keeps the original message and refuses every further operation, so
//! a partially appended row or a half-written block is never sent.

mod column_writer;
#[cfg(test)]
mod tests;

use std::fmt;
use std::io::Write;
use std::sync::Arc;

pub use column_writer::ColumnWriter;

use crate::bridge::format::client;
use crate::bridge::{read_packet, write_data_packet, Block, BlockOptions, PacketOptions, Progress, ServerPacket};
use crate::config::{ClientConfig, StructMatching};
use crate::error::{ChwireError, ConversionError};
use crate::frame_pipeline::FrameWriter;
use crate::transport::{CancellationToken, Transport};
use crate::types::TypeDescriptor;
use crate::value::{Record, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchState {
    Open,
    /// Between the start of `send` and the server acknowledgement.
    Sending,
    Sent,
    /// Poisoned; carries the message of the error that caused it.
    Invalid(String),
    Aborted,
}

type Reconnect<T> = Box<dyn FnMut() -> Result<T, ChwireError> + Send>;

pub struct Batch<T: Transport> {
    table: String,
    config: Arc<ClientConfig>,
    state: BatchState,
    staging: Block,
    transport: Option<T>,
    reconnect: Option<Reconnect<T>>,
    cancel: Option<CancellationToken>,
    framer: Option<FrameWriter>,
    packets: PacketOptions,
    progress: Progress,
    rows_sent: u64,
    blocks_sent: u64,
    /// Set once a close-on-flush flush has finalized and closed its own
    /// connection; the only case where the reconnect hook may run.
    handed_back: bool,
}

impl<T: Transport> Batch<T> {
    //==================================================================================
    // 1. Construction
    //==================================================================================

    /// Creates an open batch for `table` whose rows follow `columns`.
    ///
    /// The transport must already be positioned inside an `INSERT`: the query
    /// has been sent and the server's header block consumed.
    pub fn new(
        table: impl Into<String>,
        columns: &[(String, TypeDescriptor)],
        transport: T,
        config: Arc<ClientConfig>,
    ) -> Result<Self, ChwireError> {
        config.validate()?;
        let block_options = BlockOptions::from_config(&config)?;
        let staging = Block::with_schema(columns, &block_options.codec)?;
        let framer = FrameWriter::from_config(&config);
        let packets = PacketOptions {
            block: block_options,
            compressed: config.compression.is_framed(),
        };
        let table = table.into();
        log::debug!("opened batch for `{}` with {} columns", table, columns.len());
        Ok(Self {
            table,
            config,
            state: BatchState::Open,
            staging,
            transport: Some(transport),
            reconnect: None,
            cancel: None,
            framer,
            packets,
            progress: Progress::default(),
            rows_sent: 0,
            blocks_sent: 0,
            handed_back: false,
        })
    }

    /// Creates a batch whose columns copy the names and types of the header
    /// block the server returns for an `INSERT`.
    pub fn from_header(
        table: impl Into<String>,
        header: &Block,
        transport: T,
        config: Arc<ClientConfig>,
    ) -> Result<Self, ChwireError> {
        let columns: Vec<(String, TypeDescriptor)> = header
            .columns()
            .iter()
            .map(|c| (c.name.clone(), c.column.descriptor().clone()))
            .collect();
        Self::new(table, &columns, transport, config)
    }

    /// Installs the hook that opens a fresh connection, positioned inside the
    /// same `INSERT`, after a close-on-flush finalized the previous one.
    pub fn with_reconnect(
        mut self,
        hook: impl FnMut() -> Result<T, ChwireError> + Send + 'static,
    ) -> Self {
        self.reconnect = Some(Box::new(hook));
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    //==================================================================================
    // 2. Accessors
    //==================================================================================

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn state(&self) -> &BatchState {
        &self.state
    }

    pub fn is_sent(&self) -> bool {
        self.state == BatchState::Sent
    }

    /// Rows staged and not yet flushed.
    pub fn rows(&self) -> usize {
        self.staging.rows()
    }

    pub fn rows_sent(&self) -> u64 {
        self.rows_sent
    }

    pub fn blocks_sent(&self) -> u64 {
        self.blocks_sent
    }

    pub fn column_count(&self) -> usize {
        self.staging.column_count()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.staging.names()
    }

    /// Progress reported by the server while finalizing inserts, summed.
    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    pub fn transport(&self) -> Option<&T> {
        self.transport.as_ref()
    }

    //==================================================================================
    // 3. Staging
    //==================================================================================

    /// Appends one row given as values in column order.
    pub fn append<I, V>(&mut self, values: I) -> Result<(), ChwireError>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let row: Vec<Value> = values.into_iter().map(Into::into).collect();
        self.append_row(&row)
    }

    /// Appends one row. Either every column takes its value or none does.
    pub fn append_row(&mut self, row: &[Value]) -> Result<(), ChwireError> {
        self.ensure_open()?;
        let columns = self.staging.column_count();
        if row.len() != columns {
            let err = ConversionError::new(
                format!("row of {} columns", columns),
                format!("row of {} values", row.len()),
                "the row arity does not match the table",
            );
            return Err(self.poison(err.into()));
        }

        let marks: Vec<usize> = self.staging.columns().iter().map(|c| c.column.rows()).collect();
        let failure = row
            .iter()
            .zip(self.staging.columns_mut().iter_mut())
            .find_map(|(value, named)| {
                named.column.append(value).err().map(|e| e.in_column(&named.name))
            });
        if let Some(err) = failure {
            for (named, rows) in self.staging.columns_mut().iter_mut().zip(marks) {
                named.column.truncate(rows);
            }
            return Err(self.poison(err.into()));
        }
        self.flush_if_full()
    }

    /// Appends a record, mapping its fields to columns by name or by position
    /// as `BatchConfig::struct_matching` says.
    pub fn append_struct<R: Record>(&mut self, record: R) -> Result<(), ChwireError> {
        self.ensure_open()?;
        let fields = record.into_fields();
        let row = match self.config.batch.struct_matching {
            StructMatching::Positional => fields.into_iter().map(|(_, value)| value).collect(),
            StructMatching::ByName => match self.match_fields(fields) {
                Ok(row) => row,
                Err(err) => return Err(self.poison(err.into())),
            },
        };
        self.append_row(&row)
    }

    fn match_fields(&self, fields: Vec<(&'static str, Value)>) -> Result<Vec<Value>, ConversionError> {
        let mut fields: Vec<Option<(&'static str, Value)>> = fields.into_iter().map(Some).collect();
        let mut row = Vec::with_capacity(self.staging.column_count());
        for named in self.staging.columns() {
            let field = fields
                .iter_mut()
                .find(|f| matches!(f, Some((name, _)) if *name == named.name))
                .and_then(Option::take);
            match field {
                Some((_, value)) => row.push(value),
                None => {
                    return Err(ConversionError::new(
                        named.column.descriptor(),
                        "missing field",
                        "the record has no field for this column",
                    )
                    .in_column(&named.name))
                }
            }
        }
        let unused = fields.iter().flatten().count();
        if unused > 0 {
            log::debug!("{} record fields match no column of `{}`", unused, self.table);
        }
        Ok(row)
    }

    /// A writer for column `index`, for column-wise appends.
    pub fn column(&mut self, index: usize) -> ColumnWriter<'_, T> {
        ColumnWriter::new(self, index)
    }

    fn append_column(&mut self, index: usize, values: &[Value]) -> Result<(), ChwireError> {
        self.ensure_open()?;
        let columns = self.staging.column_count();
        if index >= columns {
            return Err(self.poison(ChwireError::ColumnIndexOutOfRange { index, columns }));
        }
        let named = &mut self.staging.columns_mut()[index];
        let mark = named.column.rows();
        let failure = values
            .iter()
            .find_map(|value| named.column.append(value).err())
            .map(|e| e.in_column(&named.name));
        if let Some(err) = failure {
            named.column.truncate(mark);
            return Err(self.poison(err.into()));
        }
        Ok(())
    }

    fn flush_if_full(&mut self) -> Result<(), ChwireError> {
        match self.config.batch.flush_threshold_rows {
            Some(threshold) if threshold > 0 && self.staging.rows() >= threshold => self.flush(),
            _ => Ok(()),
        }
    }

    //==================================================================================
    // 4. Flush And Send
    //==================================================================================

    /// Ships the staged rows as one block. A no-op when nothing is staged.
    pub fn flush(&mut self) -> Result<(), ChwireError> {
        self.ensure_open()?;
        match self.flush_staged() {
            Ok(()) => Ok(()),
            Err(err) => Err(self.poison(err)),
        }
    }

    /// Flushes what is left and finalizes the insert, waiting for the server
    /// to acknowledge it.
    pub fn send(&mut self) -> Result<(), ChwireError> {
        self.ensure_open()?;
        self.state = BatchState::Sending;
        let delivered = self.flush_staged().and_then(|()| {
            if self.config.batch.close_on_flush && self.handed_back {
                // Every flush already finalized its own insert.
                Ok(())
            } else {
                self.finish_insert()
            }
        });
        match delivered {
            Ok(()) => {
                self.state = BatchState::Sent;
                log::info!(
                    "batch for `{}` sent {} rows in {} blocks",
                    self.table,
                    self.rows_sent,
                    self.blocks_sent
                );
                log_metric!(
                    "event" = "batch_sent",
                    "table" = &self.table,
                    "rows" = self.rows_sent,
                    "blocks" = self.blocks_sent
                );
                Ok(())
            }
            Err(err) => Err(self.poison(err)),
        }
    }

    fn flush_staged(&mut self) -> Result<(), ChwireError> {
        let rows = self.staging.check_row_counts()?;
        if rows == 0 {
            return Ok(());
        }
        let mut packet = Vec::new();
        write_data_packet(
            &mut packet,
            client::DATA,
            &self.staging,
            self.packets.block.revision,
            self.framer.as_ref(),
        )?;
        self.write_to_transport(&packet)?;
        self.staging.clear();
        self.rows_sent += rows as u64;
        self.blocks_sent += 1;
        log_metric!(
            "event" = "flush",
            "table" = &self.table,
            "rows" = rows,
            "wire_bytes" = packet.len()
        );

        if self.config.batch.close_on_flush {
            self.finish_insert()?;
            if let Some(mut transport) = self.transport.take() {
                transport.close()?;
            }
            self.handed_back = true;
            log::debug!("closed the connection of `{}` after flushing", self.table);
        }
        Ok(())
    }

    /// Writes the empty end-of-insert block and reads until `EndOfStream`.
    fn finish_insert(&mut self) -> Result<(), ChwireError> {
        let mut packet = Vec::new();
        write_data_packet(
            &mut packet,
            client::DATA,
            &Block::new(),
            self.packets.block.revision,
            self.framer.as_ref(),
        )?;
        self.write_to_transport(&packet)?;

        loop {
            self.check_cancelled()?;
            let transport = self.transport.as_mut().ok_or(ChwireError::ConnectionClosed)?;
            match read_packet(transport, &self.packets)? {
                ServerPacket::EndOfStream => return Ok(()),
                ServerPacket::Exception(exception) => {
                    log::warn!("server rejected the insert into `{}`: {}", self.table, exception);
                    return Err(exception.into());
                }
                ServerPacket::Progress(progress) => {
                    self.progress.written_rows += progress.written_rows;
                    self.progress.written_bytes += progress.written_bytes;
                    self.progress.elapsed_ns += progress.elapsed_ns;
                }
                other => log::debug!("ignoring {:?} while finishing an insert", other),
            }
        }
    }

    fn write_to_transport(&mut self, bytes: &[u8]) -> Result<(), ChwireError> {
        self.check_cancelled()?;
        let transport = self.connection()?;
        transport.write_all(bytes)?;
        transport.flush()?;
        Ok(())
    }

    /// The live connection. A fresh one comes from the reconnect hook only
    /// after a close-on-flush flush finalized and closed the previous one;
    /// losing a connection mid-insert loses its unfinished blocks, so that is
    /// always `ConnectionClosed`.
    fn connection(&mut self) -> Result<&mut T, ChwireError> {
        if self.transport.is_none() && self.handed_back {
            let reconnect = self.reconnect.as_mut().ok_or(ChwireError::ConnectionClosed)?;
            self.transport = Some(reconnect()?);
            self.handed_back = false;
            log::debug!("batch for `{}` acquired a fresh connection", self.table);
        }
        match self.transport.as_mut() {
            Some(transport) if transport.is_alive() => Ok(transport),
            _ => Err(ChwireError::ConnectionClosed),
        }
    }

    fn check_cancelled(&self) -> Result<(), ChwireError> {
        match &self.cancel {
            Some(token) => token.check(),
            None => Ok(()),
        }
    }

    //==================================================================================
    // 5. Teardown
    //==================================================================================

    /// Discards the staged rows without contacting the server.
    pub fn abort(&mut self) -> Result<(), ChwireError> {
        match self.state {
            BatchState::Sent => Err(ChwireError::BatchAlreadySent),
            BatchState::Aborted => Ok(()),
            _ => {
                self.staging = Block::new();
                self.state = BatchState::Aborted;
                log::debug!("batch for `{}` aborted", self.table);
                Ok(())
            }
        }
    }

    /// Sends if the batch is still open, then closes the connection. Safe to
    /// call more than once.
    pub fn close(&mut self) -> Result<(), ChwireError> {
        let sent = if self.state == BatchState::Open {
            self.send()
        } else {
            Ok(())
        };
        match self.transport.take() {
            Some(mut transport) => sent.and(transport.close()),
            None => sent,
        }
    }

    //==================================================================================
    // 6. State Guards
    //==================================================================================

    fn ensure_open(&self) -> Result<(), ChwireError> {
        match &self.state {
            BatchState::Open => Ok(()),
            BatchState::Sent => Err(ChwireError::BatchAlreadySent),
            BatchState::Aborted => Err(ChwireError::BatchAborted),
            BatchState::Invalid(message) => Err(ChwireError::BatchInvalid(message.clone())),
            BatchState::Sending => Err(ChwireError::BatchInvalid("a send is in progress".into())),
        }
    }

    /// Marks the batch invalid and hands the error back. Connection-fatal
    /// errors also close the transport.
    fn poison(&mut self, err: ChwireError) -> ChwireError {
        log::warn!("batch for `{}` is now invalid: {}", self.table, err);
        log_metric!("event" = "batch_poisoned", "table" = &self.table, "error" = &err);
        self.state = BatchState::Invalid(err.to_string());
        if err.is_connection_fatal() {
            if let Some(mut transport) = self.transport.take() {
                if let Err(close_err) = transport.close() {
                    log::debug!("closing a failed connection: {}", close_err);
                }
            }
        }
        err
    }
}

impl<T: Transport> fmt::Debug for Batch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Batch")
            .field("table", &self.table)
            .field("state", &self.state)
            .field("staged_rows", &self.staging.rows())
            .field("rows_sent", &self.rows_sent)
            .field("blocks_sent", &self.blocks_sent)
            .field("connected", &self.transport.is_some())
            .finish()
    }
}
