//! 指标暴露模块
//!
//! 提供按URL的仪表注册表与Prometheus拉取端点

pub mod metrics;
pub mod server;

// 重新导出主要类型
pub use metrics::{GaugeReader, GaugeWriter};
pub use server::ExpositionServer;
