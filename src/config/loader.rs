//! 配置加载器实现
//!
//! 提供TOML配置文件解析、环境变量替换和错误处理功能

use crate::config::types::RawWatchConfig;
use crate::error::{ConfigError, Result};
use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// 配置加载器trait，定义配置加载接口
///
/// 加载器只负责得到原始配置，类型化校验在与命令行参数合并之后进行。
#[async_trait]
pub trait ConfigLoader: Send + Sync {
    /// 从文件加载配置
    ///
    /// # 参数
    /// * `path` - 配置文件路径
    ///
    /// # 返回
    /// * `Result<RawWatchConfig>` - 加载的配置或错误
    async fn load_from_file<P: AsRef<Path> + Send>(&self, path: P) -> Result<RawWatchConfig>;

    /// 从字符串加载配置
    ///
    /// # 参数
    /// * `content` - 配置文件内容
    ///
    /// # 返回
    /// * `Result<RawWatchConfig>` - 加载的配置或错误
    async fn load_from_string(&self, content: &str) -> Result<RawWatchConfig>;
}

/// TOML配置加载器实现
#[derive(Debug, Clone)]
pub struct TomlConfigLoader {
    /// 是否启用环境变量替换
    enable_env_substitution: bool,
}

impl TomlConfigLoader {
    /// 创建新的TOML配置加载器
    ///
    /// # 参数
    /// * `enable_env_substitution` - 是否启用 `${VAR}` 形式的环境变量替换
    pub fn new(enable_env_substitution: bool) -> Self {
        Self {
            enable_env_substitution,
        }
    }

    /// 替换字符串中的环境变量
    fn substitute_env_vars(&self, content: &str) -> Result<String> {
        if !self.enable_env_substitution {
            return Ok(content.to_string());
        }

        let env_var_regex = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")
            .map_err(|e| ConfigError::Parse(format!("正则表达式错误: {e}")))?;

        let mut result = content.to_string();

        for captures in env_var_regex.captures_iter(content) {
            let full_match = &captures[0];
            let var_name = &captures[1];

            match std::env::var(var_name) {
                Ok(value) => {
                    result = result.replace(full_match, &value);
                }
                Err(_) => {
                    return Err(ConfigError::EnvVarError {
                        var: var_name.to_string(),
                    }
                    .into());
                }
            }
        }

        Ok(result)
    }

    /// 解析TOML内容
    fn parse_toml(&self, content: &str) -> Result<RawWatchConfig> {
        let processed_content = self.substitute_env_vars(content)?;

        let config: RawWatchConfig = toml::from_str(&processed_content)
            .map_err(|e| ConfigError::Parse(format!("TOML解析失败: {e}")))?;

        Ok(config)
    }
}

impl Default for TomlConfigLoader {
    fn default() -> Self {
        Self::new(true)
    }
}

#[async_trait]
impl ConfigLoader for TomlConfigLoader {
    async fn load_from_file<P: AsRef<Path> + Send>(&self, path: P) -> Result<RawWatchConfig> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_string_lossy().to_string(),
            }
            .into());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ConfigError::Parse(format!("读取文件失败: {e}")))?;

        let config = self.parse_toml(&content)?;

        info!("成功加载配置文件: {}", path.display());
        debug!("配置内容: {:?}", config);

        Ok(config)
    }

    async fn load_from_string(&self, content: &str) -> Result<RawWatchConfig> {
        let config = self.parse_toml(content)?;
        debug!("成功解析配置字符串");
        Ok(config)
    }
}

/// 获取默认配置文件路径
///
/// 优先使用当前目录下的 `url-vitals.toml`，其次是用户配置目录。
/// 返回 `None` 表示两处都不存在。
pub fn get_default_config_path() -> Option<PathBuf> {
    let local = PathBuf::from("url-vitals.toml");
    if local.exists() {
        return Some(local);
    }

    dirs::config_dir()
        .map(|config_dir| config_dir.join("url-vitals").join("config.toml"))
        .filter(|path| path.exists())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use std::io::Write;

    const TEST_CONFIG_TOML: &str = r#"
urls = ["https://example.com/health", "http://127.0.0.1:8080"]
interval = "10s"
timeout = "500ms"
port = 9100
"#;

    #[tokio::test]
    async fn test_toml_parsing() {
        let loader = TomlConfigLoader::new(false);
        let config = loader.load_from_string(TEST_CONFIG_TOML).await.unwrap();

        assert_eq!(config.urls.len(), 2);
        assert_eq!(config.interval.as_deref(), Some("10s"));
        assert_eq!(config.timeout.as_deref(), Some("500ms"));
        assert_eq!(config.port, Some(9100));
        assert!(config.bind_address.is_none());

        let validated = config.validate().unwrap();
        assert_eq!(validated.timeout.as_millis(), 500);
    }

    #[tokio::test]
    async fn test_unknown_key_rejected() {
        let loader = TomlConfigLoader::new(false);
        let result = loader.load_from_string("urlz = []").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    #[serial]
    async fn test_env_var_substitution() {
        env::set_var("URL_VITALS_TEST_HOST", "status.example.com");

        let loader = TomlConfigLoader::new(true);
        let config = loader
            .load_from_string(r#"urls = ["https://${URL_VITALS_TEST_HOST}/ping"]"#)
            .await
            .unwrap();

        assert_eq!(config.urls, vec!["https://status.example.com/ping".to_string()]);

        env::remove_var("URL_VITALS_TEST_HOST");
    }

    #[tokio::test]
    #[serial]
    async fn test_env_var_substitution_missing_var() {
        let loader = TomlConfigLoader::new(true);
        let result = loader
            .load_from_string(r#"urls = ["https://${URL_VITALS_MISSING_VAR}"]"#)
            .await;

        assert!(result.is_err());
        if let Err(e) = result {
            assert!(e.to_string().contains("URL_VITALS_MISSING_VAR"));
        }
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(TEST_CONFIG_TOML.as_bytes()).unwrap();

        let loader = TomlConfigLoader::default();
        let config = loader.load_from_file(file.path()).await.unwrap();
        assert_eq!(config.port, Some(9100));
    }

    #[tokio::test]
    async fn test_missing_file() {
        let loader = TomlConfigLoader::default();
        let result = loader.load_from_file("/nonexistent/url-vitals.toml").await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("配置文件不存在"));
    }

    #[test]
    fn test_substitute_env_vars_disabled() {
        let loader = TomlConfigLoader::new(false);
        let content = "test ${VAR} content";
        let result = loader.substitute_env_vars(content).unwrap();
        assert_eq!(result, content);
    }
}
