//! 错误处理模块
//!
//! 定义应用程序的统一错误类型

use std::net::SocketAddr;
use thiserror::Error;

/// URL Vitals 应用程序的主要错误类型
#[derive(Error, Debug)]
pub enum UrlVitalsError {
    /// 配置相关错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    /// 探测相关错误
    #[error("探测错误: {0}")]
    Probe(#[from] ProbeError),

    /// 指标暴露相关错误
    #[error("指标暴露错误: {0}")]
    Exposition(#[from] ExpositionError),

    /// IO错误
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    /// 后台任务异常退出
    #[error("后台任务异常退出: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

/// 配置错误类型
///
/// 全部在启动阶段产生，任何并发任务启动之前即返回。
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 时长字符串无法解析
    #[error("无法解析{field}: {value}")]
    InvalidDuration { field: &'static str, value: String },

    /// 时长必须为正
    #[error("{field}必须大于0: {value}")]
    NonPositiveDuration { field: &'static str, value: String },

    /// 时长超过上限
    #[error("{field}超出范围（上限100年）: {value}")]
    DurationOutOfRange { field: &'static str, value: String },

    /// 未提供任何目标URL
    #[error("必须提供至少一个要监控的URL")]
    NoTargets,

    /// URL格式无效
    #[error("URL格式无效: {url} ({reason})")]
    InvalidUrl { url: String, reason: String },

    /// 重复的目标URL
    #[error("重复的目标URL: {0}")]
    DuplicateTarget(String),

    /// 结果通道容量无效
    #[error("结果通道容量必须大于0")]
    InvalidChannelCapacity,

    /// 绑定地址无效
    #[error("无效的绑定地址: {0}")]
    InvalidBindAddress(String),

    /// 配置文件解析错误
    #[error("配置文件解析失败: {0}")]
    Parse(String),

    /// 配置文件不存在
    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },

    /// 环境变量替换错误
    #[error("环境变量替换失败: {var}")]
    EnvVarError { var: String },
}

/// 探测错误类型
///
/// 仅表示硬失败。超时不属于错误，而是以状态码0的结果返回。
#[derive(Error, Debug)]
pub enum ProbeError {
    /// URL无法用于探测
    #[error("URL无效: {url} ({reason})")]
    InvalidUrl { url: String, reason: String },

    /// DNS解析失败
    #[error("DNS解析失败: {host}: {source}")]
    Dns {
        host: String,
        #[source]
        source: std::io::Error,
    },

    /// DNS解析没有返回任何地址
    #[error("DNS解析无可用地址: {host}")]
    NoAddress { host: String },

    /// TCP连接失败
    #[error("TCP连接失败: {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// TLS握手失败
    #[error("TLS握手失败: {host}: {source}")]
    Tls {
        host: String,
        #[source]
        source: std::io::Error,
    },

    /// TLS客户端配置无效
    #[error("TLS配置错误: {0}")]
    TlsConfig(#[from] rustls::Error),

    /// HTTP协议错误
    #[error("HTTP请求失败: {0}")]
    Http(#[from] hyper::Error),

    /// 请求无法构建
    #[error("构建请求失败: {0}")]
    InvalidRequest(#[from] http::Error),

    /// 收到响应头之前连接已关闭
    #[error("连接在收到响应前被关闭")]
    ConnectionClosed,
}

/// 指标暴露错误类型
#[derive(Error, Debug)]
pub enum ExpositionError {
    /// 端口绑定失败
    #[error("绑定指标端口失败 {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// HTTP服务运行失败
    #[error("指标服务运行失败: {0}")]
    Serve(#[source] std::io::Error),

    /// 指标注册失败
    #[error("指标注册失败: {0}")]
    Registry(#[from] prometheus::Error),

    /// 指标编码失败
    #[error("指标编码失败: {0}")]
    Encode(String),
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, UrlVitalsError>;
