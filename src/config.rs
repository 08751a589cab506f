/// 配置管理模組
///
/// 本模組負責加載、驗證和管理同步引擎的配置。
/// 依 `MARKET_SYNC_ENV` 選擇開發或生產環境的配置檔，環境變數可覆寫任何欄位。
// 宣告子模組
pub mod loader;
pub mod manager;
pub mod types;
pub mod validation;

// 重新導出常用組件
pub use loader::{ConfigExt, ConfigLoader, Environment};
pub use manager::{get_config, init_config};
pub use types::*;
pub use validation::{validate_config, ValidationError, ValidationUtils, Validator};
