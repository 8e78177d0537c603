// In: src/config.rs

//! The single source of truth for all chwire client configuration.
//!
//! This module defines the unified `ClientConfig` struct, which is designed to be
//! created once at the application boundary (e.g., from a JSON file) and then
//! passed down to every batch and block reader via a shared, read-only
//! `Arc<ClientConfig>`.

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::bridge::format::CLIENT_PROTOCOL_REVISION;
use crate::error::ChwireError;

//==================================================================================
// I. Core Configuration Enums
//==================================================================================

/// The per-block compression method used on the native transport.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CompressionMethod {
    /// **Default:** blocks travel as plain bytes, without any framing.
    #[default]
    Disabled,
    /// Frames with method byte 0x02: checksummed but not compressed.
    None,
    Lz4,
    Zstd,
}

impl CompressionMethod {
    /// Whether blocks are wrapped in checksummed frames at all.
    pub fn is_framed(&self) -> bool {
        !matches!(self, CompressionMethod::Disabled)
    }
}

/// Whole-body content-encoding used by the HTTP transport variant.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HttpEncoding {
    Gzip,
    Deflate,
    Brotli,
}

impl HttpEncoding {
    /// The value of the `Content-Encoding` header.
    pub fn header_value(&self) -> &'static str {
        match self {
            HttpEncoding::Gzip => "gzip",
            HttpEncoding::Deflate => "deflate",
            HttpEncoding::Brotli => "br",
        }
    }
}

/// How `Batch::append_struct` maps record fields to table columns.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StructMatching {
    /// **Default:** each column takes the field with the same name.
    #[default]
    ByName,
    /// Fields are taken in declaration order; names are ignored.
    Positional,
}

//==================================================================================
// II. Batch Settings
//==================================================================================

/// Settings for the insert-side `Batch` state machine.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchConfig {
    /// If true, every flush finalizes the insert and closes the connection. The
    /// next flush acquires a new connection through the batch's reconnect hook.
    #[serde(default)]
    pub close_on_flush: bool,

    /// When set, `append` flushes automatically once this many rows are staged.
    #[serde(default)]
    pub flush_threshold_rows: Option<usize>,

    #[serde(default)]
    pub struct_matching: StructMatching,
}

//==================================================================================
// III. The Unified ClientConfig
//==================================================================================

/// The single, unified configuration for encoding, framing and batching.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ClientConfig {
    #[serde(default)]
    pub compression: CompressionMethod,

    /// Zstd level used when `compression` is `Zstd`.
    #[serde(default = "default_compression_level")]
    pub compression_level: i32,

    /// Upper bound on the uncompressed payload of one frame; larger blocks are
    /// split across several frames.
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,

    /// The negotiated protocol revision; gates block info, custom
    /// serialization flags and the progress/profile packet layouts.
    #[serde(default = "default_protocol_revision")]
    pub protocol_revision: u64,

    /// Timezone attached to `DateTime` columns that do not declare one.
    #[serde(default = "default_timezone")]
    pub default_timezone: String,

    #[serde(default)]
    pub batch: BatchConfig,

    /// Content-encoding for HTTP bodies produced by `bridge::http`.
    #[serde(default)]
    pub http_encoding: Option<HttpEncoding>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            compression: CompressionMethod::default(),
            compression_level: default_compression_level(),
            max_frame_size: default_max_frame_size(),
            protocol_revision: default_protocol_revision(),
            default_timezone: default_timezone(),
            batch: BatchConfig::default(),
            http_encoding: None,
        }
    }
}

impl ClientConfig {
    /// Loads a config from JSON; absent keys fall back to their defaults.
    pub fn from_json(text: &str) -> Result<Self, ChwireError> {
        let config: ClientConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the settings that cannot be expressed through serde alone.
    pub fn validate(&self) -> Result<(), ChwireError> {
        self.timezone()?;
        if self.max_frame_size == 0 {
            return Err(ChwireError::Unsupported(
                "max_frame_size must be greater than zero".into(),
            ));
        }
        if self.batch.flush_threshold_rows == Some(0) {
            return Err(ChwireError::Unsupported(
                "flush_threshold_rows must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// The parsed `default_timezone`.
    pub fn timezone(&self) -> Result<Tz, ChwireError> {
        self.default_timezone.parse::<Tz>().map_err(|e| {
            ChwireError::Unsupported(format!(
                "unknown default timezone '{}': {}",
                self.default_timezone, e
            ))
        })
    }
}

/// Helper for `serde` to provide a default for `compression_level`.
fn default_compression_level() -> i32 {
    3
}

/// Helper for `serde` to provide a default for `max_frame_size` (1 MiB).
fn default_max_frame_size() -> usize {
    1 << 20
}

fn default_protocol_revision() -> u64 {
    CLIENT_PROTOCOL_REVISION
}

fn default_timezone() -> String {
    "UTC".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_json() {
        let config = ClientConfig::from_json("{}").unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.compression, CompressionMethod::Disabled);
        assert_eq!(config.timezone().unwrap(), Tz::UTC);
    }

    #[test]
    fn test_nested_batch_settings() {
        let config = ClientConfig::from_json(
            r#"{
                "compression": "lz4",
                "default_timezone": "Europe/Berlin",
                "batch": { "close_on_flush": true, "flush_threshold_rows": 500, "struct_matching": "positional" },
                "http_encoding": "brotli"
            }"#,
        )
        .unwrap();
        assert_eq!(config.compression, CompressionMethod::Lz4);
        assert!(config.batch.close_on_flush);
        assert_eq!(config.batch.flush_threshold_rows, Some(500));
        assert_eq!(config.batch.struct_matching, StructMatching::Positional);
        assert_eq!(config.http_encoding, Some(HttpEncoding::Brotli));
        assert_eq!(config.timezone().unwrap(), chrono_tz::Europe::Berlin);
    }

    #[test]
    fn test_unknown_timezone_is_rejected() {
        let result = ClientConfig::from_json(r#"{ "default_timezone": "Mars/Olympus" }"#);
        assert!(matches!(result, Err(ChwireError::Unsupported(_))));
    }

    #[test]
    fn test_zero_flush_threshold_is_rejected() {
        let result = ClientConfig::from_json(r#"{ "batch": { "flush_threshold_rows": 0 } }"#);
        assert!(result.is_err());
    }
}
