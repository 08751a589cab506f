use crate::config::loader::{ConfigLoader, Environment};
use crate::config::types::ApplicationConfig;
use crate::config::validation::validate_config;
use config::ConfigError;
use once_cell::sync::OnceCell;
use std::path::Path;
use tracing::{debug, warn};

// 全局配置實例
static CONFIG: OnceCell<ApplicationConfig> = OnceCell::new();

/// 獲取應用程序配置實例
///
/// 尚未初始化且載入失敗時使用預設配置。
pub fn get_config() -> &'static ApplicationConfig {
    CONFIG.get_or_init(|| {
        ApplicationConfig::load_from_env().unwrap_or_else(|err| {
            warn!("無法加載應用程序配置，改用預設值: {}", err);
            ApplicationConfig::default()
        })
    })
}

/// 初始化配置（在應用程序啟動時調用）
pub fn init_config() -> Result<(), ConfigError> {
    let app_config = ApplicationConfig::load_from_env()?;

    // 嘗試初始化全局配置
    if CONFIG.set(app_config).is_err() {
        warn!("配置已經被初始化，跳過重複初始化");
    } else {
        debug!("配置初始化成功，環境：{:?}", Environment::from_env());
    }

    Ok(())
}

/// ApplicationConfig 加載方法實現
impl ApplicationConfig {
    /// 從環境變數指定的環境加載配置
    pub fn load_from_env() -> Result<Self, ConfigError> {
        let env = Environment::from_env();
        debug!("從環境加載配置: {:?}", env);
        Self::load(env)
    }

    /// 從指定環境加載配置
    pub fn load(env: Environment) -> Result<Self, ConfigError> {
        Self::finish(ConfigLoader::load(env)?)
    }

    /// 從指定目錄與環境加載配置
    pub fn load_from_dir(dir: &Path, env: Environment) -> Result<Self, ConfigError> {
        Self::finish(ConfigLoader::load_from_dir(dir, env)?)
    }

    fn finish(source: config::Config) -> Result<Self, ConfigError> {
        let app_config: ApplicationConfig = source.try_deserialize()?;

        // 驗證失敗只記錄警告
        if let Err(err) = validate_config(&app_config) {
            warn!("配置驗證失敗: {}", err);
        } else {
            debug!("配置驗證通過");
        }

        Ok(app_config)
    }
}
