//! 监控引擎模块
//!
//! 包含单目标检测任务、结果汇总任务与编排器

pub mod orchestrator;
pub mod runner;
pub mod sink;

// 重新导出主要类型
pub use orchestrator::{Orchestrator, RunReport, RunningOrchestrator, ShutdownHandle};
pub use runner::{CancelHandle, ExitReason, RunnerExit, RunnerState, Target, TargetRunner};
pub use sink::ResultSink;
