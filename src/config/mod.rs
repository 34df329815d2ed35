//! 配置管理模块
//!
//! 提供配置文件解析、命令行覆盖合并与校验功能

pub mod loader;
pub mod types;

// 重新导出主要类型
pub use loader::{get_default_config_path, ConfigLoader, TomlConfigLoader};
pub use types::{parse_positive_duration, validate_url, RawWatchConfig, WatchConfig};
