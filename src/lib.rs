// 模組定義
pub mod calendar;
pub mod config;
pub mod data_provider;
pub mod domain_types;
pub mod monitor;
pub mod storage;
pub mod sync;
pub mod utils;
