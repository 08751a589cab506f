pub mod database;
pub mod error;
pub mod migrations;
pub mod models;
pub mod repository;
pub mod schema;

// 只匯出必要的數據庫功能
pub use database::*;

pub use error::{KeyComponent, StoreError};

// 匯出主要的模型
pub use models::{StorageReport, SyncLogEntry, SyncLogInsert, UpsertOutcome};

// 匯出主要的倉儲接口和實現
pub use repository::{
    DbExecutor, MemoryObservationStore, ObservationStore, PgObservationStore,
    PgSyncLogRepository, SyncLogRepository,
};

pub use schema::{FieldMapping, TableSchema};

// 匯出遷移功能
pub use migrations::*;
