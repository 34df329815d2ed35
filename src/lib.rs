//! URL Vitals - 外部URL存活与延迟监控工具
//!
//! 这是一个用Rust编写的并发HTTP(S)探测工具，支持：
//! - 按固定间隔并发探测多个URL
//! - DNS、TCP连接、TLS握手分阶段计时
//! - Prometheus指标暴露
//! - 信号触发的有序关闭
//! - 结构化日志记录

pub mod cli;
pub mod config;
pub mod error;
pub mod exposition;
pub mod logging;
pub mod probe;
pub mod shutdown;
pub mod watch;

// 重新导出主要类型
pub use config::{RawWatchConfig, WatchConfig};
pub use error::{ConfigError, ExpositionError, ProbeError, UrlVitalsError};
pub use probe::{HttpProber, ProbeResult, Prober};
pub use watch::{Orchestrator, RunReport, RunningOrchestrator, ShutdownHandle};

/// 应用程序版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 应用程序名称
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

/// 应用程序描述
pub const APP_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
