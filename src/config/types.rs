//! 配置数据结构定义
//!
//! 定义监控配置的原始形式（可序列化）与校验后的类型化形式

use crate::error::ConfigError;
use crate::probe::Endpoint;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tracing::warn;

/// 默认检测间隔
pub const DEFAULT_INTERVAL: &str = "30s";
/// 默认单次探测超时
pub const DEFAULT_TIMEOUT: &str = "2s";
/// 默认指标端口
pub const DEFAULT_PORT: u16 = 80;
/// 默认绑定地址
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0";
/// 默认结果通道容量
pub const DEFAULT_CHANNEL_CAPACITY: usize = 16;
/// 时长上限（100年）
pub const MAX_DURATION: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// 原始配置，来自配置文件或命令行，尚未校验
///
/// 所有字段都是可选的，缺省值在 [`RawWatchConfig::validate`] 中补齐。
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RawWatchConfig {
    /// 要监控的URL列表
    #[serde(default)]
    pub urls: Vec<String>,
    /// 检测间隔，例如 "30s"
    pub interval: Option<String>,
    /// 单次探测超时，例如 "2s"
    pub timeout: Option<String>,
    /// 指标端口
    pub port: Option<u16>,
    /// 指标绑定地址
    pub bind_address: Option<String>,
    /// 结果通道容量
    pub channel_capacity: Option<usize>,
}

impl RawWatchConfig {
    /// 用另一份配置覆盖当前配置
    ///
    /// `overrides` 中有值的字段优先；URL列表非空时整体替换。
    pub fn merge(self, overrides: RawWatchConfig) -> RawWatchConfig {
        RawWatchConfig {
            urls: if overrides.urls.is_empty() {
                self.urls
            } else {
                overrides.urls
            },
            interval: overrides.interval.or(self.interval),
            timeout: overrides.timeout.or(self.timeout),
            port: overrides.port.or(self.port),
            bind_address: overrides.bind_address.or(self.bind_address),
            channel_capacity: overrides.channel_capacity.or(self.channel_capacity),
        }
    }

    /// 校验并转换为类型化配置
    pub fn validate(self) -> Result<WatchConfig, ConfigError> {
        let interval = parse_positive_duration(
            "检测间隔",
            self.interval.as_deref().unwrap_or(DEFAULT_INTERVAL),
        )?;
        let timeout = parse_positive_duration(
            "探测超时",
            self.timeout.as_deref().unwrap_or(DEFAULT_TIMEOUT),
        )?;

        let bind_text = self
            .bind_address
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());
        let bind_address: IpAddr = bind_text
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddress(bind_text.clone()))?;

        let channel_capacity = self.channel_capacity.unwrap_or(DEFAULT_CHANNEL_CAPACITY);
        if channel_capacity == 0 {
            return Err(ConfigError::InvalidChannelCapacity);
        }

        let urls = validate_urls(self.urls)?;

        if timeout > interval {
            warn!(
                "探测超时({:?})大于检测间隔({:?})，慢目标会推迟下一次检测",
                timeout, interval
            );
        }

        Ok(WatchConfig {
            urls,
            interval,
            timeout,
            port: self.port.unwrap_or(DEFAULT_PORT),
            bind_address,
            channel_capacity,
        })
    }
}

/// 校验后的监控配置
#[derive(Debug, Clone, PartialEq)]
pub struct WatchConfig {
    /// 按注册顺序排列的目标URL
    pub urls: Vec<String>,
    /// 检测间隔
    pub interval: Duration,
    /// 单次探测超时
    pub timeout: Duration,
    /// 指标端口
    pub port: u16,
    /// 指标绑定地址
    pub bind_address: IpAddr,
    /// 结果通道容量
    pub channel_capacity: usize,
}

impl WatchConfig {
    /// 从URL列表与时长字符串构建配置
    ///
    /// # 参数
    /// * `urls` - 目标URL列表，不能为空
    /// * `interval` - 检测间隔字符串
    /// * `timeout` - 探测超时字符串
    /// * `port` - 指标端口
    pub fn new(
        urls: Vec<String>,
        interval: &str,
        timeout: &str,
        port: u16,
    ) -> Result<Self, ConfigError> {
        RawWatchConfig {
            urls,
            interval: Some(interval.to_string()),
            timeout: Some(timeout.to_string()),
            port: Some(port),
            ..Default::default()
        }
        .validate()
    }

    /// 设置绑定地址
    pub fn with_bind_address(mut self, bind_address: IpAddr) -> Self {
        self.bind_address = bind_address;
        self
    }

    /// 设置结果通道容量
    pub fn with_channel_capacity(mut self, channel_capacity: usize) -> Self {
        self.channel_capacity = channel_capacity.max(1);
        self
    }

    /// 指标服务的监听地址
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }
}

/// 解析正的时长字符串
///
/// 支持 humantime 语法，例如 `200ms`、`2s`、`1m`、`1h 30m`。
/// 超过 [`MAX_DURATION`] 的取值会被拒绝，保证计时器的截止时间不会溢出。
pub fn parse_positive_duration(field: &'static str, value: &str) -> Result<Duration, ConfigError> {
    let duration =
        humantime::parse_duration(value.trim()).map_err(|_| ConfigError::InvalidDuration {
            field,
            value: value.to_string(),
        })?;

    if duration.is_zero() {
        return Err(ConfigError::NonPositiveDuration {
            field,
            value: value.to_string(),
        });
    }

    if duration > MAX_DURATION {
        return Err(ConfigError::DurationOutOfRange {
            field,
            value: value.to_string(),
        });
    }

    Ok(duration)
}

fn validate_urls(urls: Vec<String>) -> Result<Vec<String>, ConfigError> {
    if urls.is_empty() {
        return Err(ConfigError::NoTargets);
    }

    let mut seen = HashSet::new();
    let mut validated = Vec::with_capacity(urls.len());
    for url in urls {
        let url = url.trim().to_string();
        validate_url(&url)?;
        if !seen.insert(url.clone()) {
            return Err(ConfigError::DuplicateTarget(url));
        }
        validated.push(url);
    }

    Ok(validated)
}

/// 校验单个目标URL是否可以被探测
pub fn validate_url(url: &str) -> Result<(), ConfigError> {
    Endpoint::parse(url)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_watch_config_defaults() {
        let config = RawWatchConfig {
            urls: urls(&["http://example.com"]),
            ..Default::default()
        }
        .validate()
        .unwrap();

        assert_eq!(config.interval, Duration::from_secs(30));
        assert_eq!(config.timeout, Duration::from_secs(2));
        assert_eq!(config.port, 80);
        assert_eq!(config.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
        assert_eq!(config.socket_addr().to_string(), "0.0.0.0:80");
    }

    #[test]
    fn test_invalid_interval_rejected() {
        let result = WatchConfig::new(urls(&["http://example.com"]), "asdf", "1s", 80);
        assert!(matches!(
            result,
            Err(ConfigError::InvalidDuration { field: "检测间隔", .. })
        ));
    }

    #[test]
    fn test_invalid_timeout_rejected() {
        let result = WatchConfig::new(urls(&["http://example.com"]), "4ms", "ss43", 80);
        assert!(matches!(
            result,
            Err(ConfigError::InvalidDuration { field: "探测超时", .. })
        ));
    }

    #[test]
    fn test_zero_duration_rejected() {
        let result = WatchConfig::new(urls(&["http://example.com"]), "0s", "1s", 80);
        assert!(matches!(
            result,
            Err(ConfigError::NonPositiveDuration { .. })
        ));
    }

    #[test]
    fn test_huge_duration_rejected() {
        let result = WatchConfig::new(urls(&["http://example.com"]), "500000000000years", "2s", 80);
        assert!(matches!(result, Err(ConfigError::DurationOutOfRange { .. })));

        let result = WatchConfig::new(urls(&["http://example.com"]), "30s", "101years", 80);
        assert!(matches!(result, Err(ConfigError::DurationOutOfRange { .. })));

        assert!(parse_positive_duration("检测间隔", "99years").is_ok());
    }

    #[test]
    fn test_empty_urls_rejected() {
        let result = WatchConfig::new(Vec::new(), "1s", "1s", 8080);
        assert!(matches!(result, Err(ConfigError::NoTargets)));
    }

    #[test]
    fn test_duplicate_urls_rejected() {
        let result = WatchConfig::new(
            urls(&["http://example.com", "http://example.com"]),
            "1s",
            "1s",
            8080,
        );
        assert!(matches!(result, Err(ConfigError::DuplicateTarget(_))));
    }

    #[test]
    fn test_invalid_url_rejected() {
        let result = WatchConfig::new(urls(&["ftp://example.com"]), "1s", "1s", 8080);
        assert!(matches!(result, Err(ConfigError::InvalidUrl { .. })));

        let result = WatchConfig::new(urls(&["not a url"]), "1s", "1s", 8080);
        assert!(matches!(result, Err(ConfigError::InvalidUrl { .. })));
    }

    #[test]
    fn test_humantime_syntax() {
        assert_eq!(
            parse_positive_duration("检测间隔", "200ms").unwrap(),
            Duration::from_millis(200)
        );
        assert_eq!(
            parse_positive_duration("检测间隔", "1m 30s").unwrap(),
            Duration::from_secs(90)
        );
    }

    #[test]
    fn test_merge_prefers_overrides() {
        let file = RawWatchConfig {
            urls: urls(&["http://a.example"]),
            interval: Some("10s".to_string()),
            port: Some(9100),
            ..Default::default()
        };
        let cli = RawWatchConfig {
            interval: Some("5s".to_string()),
            ..Default::default()
        };

        let merged = file.merge(cli);
        assert_eq!(merged.urls, urls(&["http://a.example"]));
        assert_eq!(merged.interval.as_deref(), Some("5s"));
        assert_eq!(merged.port, Some(9100));
    }

    #[test]
    fn test_zero_channel_capacity_rejected() {
        let result = RawWatchConfig {
            urls: urls(&["http://example.com"]),
            channel_capacity: Some(0),
            ..Default::default()
        }
        .validate();
        assert!(matches!(result, Err(ConfigError::InvalidChannelCapacity)));
    }
}
