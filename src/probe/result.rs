//! 探测结果数据结构
//!
//! 定义单次探测的结果与各阶段耗时

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 表示探测在超时前未完成的状态码
pub const TIMEOUT_STATUS_CODE: u16 = 0;

/// 请求各阶段耗时
///
/// 某阶段未发生时记为零（例如IP字面量无需DNS、明文HTTP无需TLS），
/// 零不代表测量失败。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseTimings {
    /// DNS解析耗时
    #[serde(with = "duration_serde")]
    pub dns: Duration,
    /// TCP连接耗时
    #[serde(with = "duration_serde")]
    pub connect: Duration,
    /// TLS握手耗时
    #[serde(with = "duration_serde")]
    pub tls: Duration,
}

/// 单次探测结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    /// 目标URL
    pub url: String,
    /// HTTP状态码，0表示超时
    pub status_code: u16,
    /// 从请求开始到收到响应头的总耗时
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// 各阶段耗时
    #[serde(flatten)]
    pub phases: PhaseTimings,
    /// 探测开始时间
    pub timestamp: DateTime<Utc>,
}

impl ProbeResult {
    /// 创建新的探测结果
    ///
    /// 初始状态码为0、耗时为零，由构建方法补全。
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status_code: TIMEOUT_STATUS_CODE,
            duration: Duration::ZERO,
            phases: PhaseTimings::default(),
            timestamp: Utc::now(),
        }
    }

    /// 创建超时结果：状态码0，所有耗时为零
    pub fn timed_out(url: impl Into<String>) -> Self {
        Self::new(url)
    }

    /// 设置HTTP状态码
    pub fn with_status_code(mut self, status_code: u16) -> Self {
        self.status_code = status_code;
        self
    }

    /// 设置总耗时
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// 设置阶段耗时
    pub fn with_phases(mut self, phases: PhaseTimings) -> Self {
        self.phases = phases;
        self
    }

    /// 设置探测开始时间
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// 目标是否存活（状态码恰好为200）
    pub fn is_up(&self) -> bool {
        self.status_code == 200
    }

    /// 是否为超时结果
    pub fn is_timeout(&self) -> bool {
        self.status_code == TIMEOUT_STATUS_CODE
    }

    /// 总耗时（毫秒）
    pub fn duration_ms(&self) -> u64 {
        self.duration.as_millis() as u64
    }

    /// 转换为JSON字符串
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Duration序列化模块
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        u64::try_from(duration.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
