//! 探测模块
//!
//! 提供单次HTTP(S)探测、阶段计时与探测结果类型

pub mod endpoint;
pub mod prober;
pub mod result;

// 重新导出主要类型
pub use endpoint::{Endpoint, Scheme};
pub use prober::{HttpProber, Prober};
pub use result::{PhaseTimings, ProbeResult, TIMEOUT_STATUS_CODE};
