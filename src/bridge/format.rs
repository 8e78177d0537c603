//! Constants of the native protocol: packet ids and the revisions that gate
//! optional fields.

/// The protocol revision this client speaks and advertises.
pub const CLIENT_PROTOCOL_REVISION: u64 = 54460;

/// `Progress` carries written rows and bytes.
pub const DBMS_MIN_REVISION_WITH_CLIENT_WRITE_INFO: u64 = 54420;
/// Every column header carries a custom-serialization flag.
pub const DBMS_MIN_REVISION_WITH_CUSTOM_SERIALIZATION: u64 = 54454;
/// `Progress` carries the elapsed time in nanoseconds.
pub const DBMS_MIN_REVISION_WITH_SERVER_QUERY_TIME_IN_PROGRESS: u64 = 54460;
/// `Progress` carries the total bytes to read.
pub const DBMS_MIN_PROTOCOL_VERSION_WITH_TOTAL_BYTES_IN_PROGRESS: u64 = 54463;
/// `ProfileInfo` carries the rows before aggregation.
pub const DBMS_MIN_REVISION_WITH_ROWS_BEFORE_AGGREGATION: u64 = 54469;

/// Packets sent by the client.
pub mod client {
    pub const DATA: u64 = 2;
}

/// Packets sent by the server.
pub mod server {
    pub const HELLO: u64 = 0;
    pub const DATA: u64 = 1;
    pub const EXCEPTION: u64 = 2;
    pub const PROGRESS: u64 = 3;
    pub const PONG: u64 = 4;
    pub const END_OF_STREAM: u64 = 5;
    pub const PROFILE_INFO: u64 = 6;
    pub const TOTALS: u64 = 7;
    pub const EXTREMES: u64 = 8;
    pub const TABLES_STATUS: u64 = 9;
    pub const LOG: u64 = 10;
    pub const TABLE_COLUMNS: u64 = 11;
    pub const PART_UUIDS: u64 = 12;
    pub const READ_TASK_REQUEST: u64 = 13;
    pub const PROFILE_EVENTS: u64 = 14;

    /// A printable packet name for diagnostics.
    pub fn name(id: u64) -> &'static str {
        match id {
            HELLO => "Hello",
            DATA => "Data",
            EXCEPTION => "Exception",
            PROGRESS => "Progress",
            PONG => "Pong",
            END_OF_STREAM => "EndOfStream",
            PROFILE_INFO => "ProfileInfo",
            TOTALS => "Totals",
            EXTREMES => "Extremes",
            TABLES_STATUS => "TablesStatus",
            LOG => "Log",
            TABLE_COLUMNS => "TableColumns",
            PART_UUIDS => "PartUUIDs",
            READ_TASK_REQUEST => "ReadTaskRequest",
            PROFILE_EVENTS => "ProfileEvents",
            _ => "Unknown",
        }
    }
}
