//! Write-Ahead Log (WAL) for Arbor.
//!
//! Index modifications are logged before they become visible on pages.
//! The LSN returned by an append is stamped on the affected pages, which
//! lets concurrent scans detect pages changed after they started.

pub mod reader;
pub mod record;
pub mod writer;

pub use reader::WalReader;
pub use record::{LogRecord, LogRecordType, Lsn, PageDeletePayload, PageUpdatePayload};
pub use writer::{FakeLsnSource, WalWriter, WalWriterConfig};
