// In: src/error.rs

//! This module defines the single, unified error type for the entire chwire library.
//! It uses the `thiserror` crate to provide ergonomic, context-aware error handling.

use std::fmt;
use thiserror::Error;

//==================================================================================
// 1. Structured Error Payloads
//==================================================================================

/// A type signature could not be parsed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot parse type `{signature}` at `{fragment}`: {reason}")]
pub struct ParseError {
    /// The full signature that was being parsed.
    pub signature: String,
    /// The remaining, unparsable part of the signature.
    pub fragment: String,
    pub reason: String,
}

/// A value did not fit the column it was appended to (or scanned from).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot convert {value_type} for column `{column}` of type {declared_type}: {reason}")]
pub struct ConversionError {
    /// Empty while the codec raises the error; the batch fills it in.
    pub column: String,
    pub declared_type: String,
    /// The dynamic type of the offending value.
    pub value_type: String,
    pub reason: String,
}

impl ConversionError {
    pub fn new(
        declared_type: impl fmt::Display,
        value_type: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            column: String::new(),
            declared_type: declared_type.to_string(),
            value_type: value_type.into(),
            reason: reason.into(),
        }
    }

    /// Attaches the column name, keeping an inner name if one is already set.
    pub fn in_column(mut self, column: &str) -> Self {
        if self.column.is_empty() {
            self.column = column.to_string();
        }
        self
    }
}

/// An exception block sent by the server, propagated verbatim.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("server exception {code} ({name}): {message}")]
pub struct ServerException {
    pub code: i32,
    pub name: String,
    pub message: String,
    pub stack_trace: String,
    pub nested: Option<Box<ServerException>>,
}

/// Carried inside an `io::Error` when a frame fails validation behind an
/// `io::Read` adapter, so the conversion below can restore `CorruptFrame`.
#[derive(Error, Debug, Clone)]
#[error("{0}")]
pub struct FrameCorruption(pub String);

//==================================================================================
// 2. The Unified Error Enum
//==================================================================================

#[derive(Error, Debug)]
pub enum ChwireError {
    // =========================================================================
    // === Codec Errors (caller bugs or data/schema mismatches)
    // =========================================================================
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error("corrupt block in column `{column}`: {reason}")]
    CorruptBlock { column: String, reason: String },

    #[error("unsupported: {0}")]
    Unsupported(String),

    // =========================================================================
    // === Transport / Framing Errors (connection-fatal)
    // =========================================================================
    #[error("corrupt compressed frame: {0}")]
    CorruptFrame(String),

    #[error("compression failed: {0}")]
    Compression(String),

    #[error("protocol violation: {0}")]
    Protocol(String),

    /// An I/O failure or timeout on the underlying transport.
    #[error("transport error: {0}")]
    Transport(std::io::Error),

    #[error("operation cancelled")]
    Cancelled,

    #[error("connection is closed")]
    ConnectionClosed,

    // =========================================================================
    // === Server Errors (connection stays usable)
    // =========================================================================
    #[error(transparent)]
    Server(#[from] ServerException),

    // =========================================================================
    // === Batch State Errors
    // =========================================================================
    #[error("batch has already been sent")]
    BatchAlreadySent,

    /// The batch was poisoned by an earlier error, whose message is kept here.
    #[error("batch is invalid: {0}")]
    BatchInvalid(String),

    #[error("batch has been aborted")]
    BatchAborted,

    #[error("column index {index} out of range for a batch with {columns} columns")]
    ColumnIndexOutOfRange { index: usize, columns: usize },

    // =========================================================================
    // === External Error Wrappers
    // =========================================================================
    /// An error from the Serde JSON library, typically during config loading.
    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),
}

impl ChwireError {
    /// Whether the connection that produced this error must be discarded.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            ChwireError::CorruptFrame(_)
                | ChwireError::CorruptBlock { .. }
                | ChwireError::Protocol(_)
                | ChwireError::Transport(_)
                | ChwireError::Cancelled
                | ChwireError::ConnectionClosed
        )
    }

    pub(crate) fn corrupt_block(column: &str, reason: impl fmt::Display) -> Self {
        ChwireError::CorruptBlock {
            column: column.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Wraps a read-side failure with the column it happened in. Frame errors
    /// and cancellations keep their own identity.
    pub(crate) fn in_column(self, column: &str) -> Self {
        match self {
            ChwireError::CorruptBlock { column: inner, reason } if inner.is_empty() => {
                ChwireError::CorruptBlock {
                    column: column.to_string(),
                    reason,
                }
            }
            ChwireError::Transport(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                ChwireError::corrupt_block(column, "unexpected end of stream")
            }
            other => other,
        }
    }
}

// =============================================================================
// === Manual `From` Implementations ===
// =============================================================================

impl From<std::io::Error> for ChwireError {
    fn from(err: std::io::Error) -> Self {
        let corruption = err
            .get_ref()
            .and_then(|inner| inner.downcast_ref::<FrameCorruption>())
            .map(|c| c.0.clone());
        match corruption {
            Some(reason) => ChwireError::CorruptFrame(reason),
            None => ChwireError::Transport(err),
        }
    }
}

impl From<bytemuck::PodCastError> for ChwireError {
    fn from(err: bytemuck::PodCastError) -> Self {
        ChwireError::Protocol(format!("byte slice cast failed: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_corruption_survives_io_error_roundtrip() {
        let io_err = std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            FrameCorruption("checksum mismatch".into()),
        );
        let err: ChwireError = io_err.into();
        assert!(matches!(err, ChwireError::CorruptFrame(ref m) if m == "checksum mismatch"));
        assert!(err.is_connection_fatal());
    }

    #[test]
    fn test_plain_io_error_is_transport() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        let err: ChwireError = io_err.into();
        assert!(matches!(err, ChwireError::Transport(_)));
    }

    #[test]
    fn test_conversion_error_keeps_first_column_name() {
        let err = ConversionError::new("UInt8", "String", "not a number")
            .in_column("inner")
            .in_column("outer");
        assert_eq!(err.column, "inner");
        assert!(err.to_string().contains("`inner`"));
    }

    #[test]
    fn test_server_exception_is_not_connection_fatal() {
        let err = ChwireError::Server(ServerException {
            code: 60,
            name: "DB::Exception".into(),
            message: "Table default.t does not exist".into(),
            stack_trace: String::new(),
            nested: None,
        });
        assert!(!err.is_connection_fatal());
        assert!(err.to_string().contains("60"));
    }
}
