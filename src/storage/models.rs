pub mod sync_log;
pub mod upsert;

pub use sync_log::{BatchReportRecord, SyncLogEntry, SyncLogInsert};
pub use upsert::{StorageReport, UpsertOutcome};
