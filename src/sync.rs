// sync.rs - 增量同步
//
// 區間推算、單一標的狀態機、批次協調與報告。

pub mod error;
pub mod orchestrator;
pub mod report;
pub mod resolver;
pub mod state;

pub use error::{ReportError, SyncError};
pub use orchestrator::{BatchOrchestrator, CancelSignal};
pub use report::{
    BatchCounts, BatchRun, InstrumentOutcome, JsonFileReportSink, OutcomeStatus, PgReportSink,
    ReportFormatter, ReportSink,
};
pub use resolver::{IncrementalRangeResolver, Resolution};
pub use state::{InstrumentProgress, SyncPhase};
