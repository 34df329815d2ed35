//! 单目标检测任务
//!
//! 每个目标一个定时循环：到点探测，转发结果，收到停止信号后退出。

use crate::error::ProbeError;
use crate::probe::{ProbeResult, Prober};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

/// 检测目标
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// 目标URL，唯一标识
    pub url: String,
    /// 检测间隔
    pub interval: Duration,
    /// 单次探测超时
    pub timeout: Duration,
}

/// 检测任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    /// 等待下一次定时
    Running,
    /// 探测进行中
    Probing,
    /// 已停止，终态
    Stopped,
}

/// 检测任务退出原因
#[derive(Debug)]
pub enum ExitReason {
    /// 收到停止信号
    Cancelled,
    /// 探测硬失败
    Failed(ProbeError),
    /// 结果通道已关闭
    SinkClosed,
    /// 检测间隔无法调度（为0或截止时间溢出）
    InvalidSchedule,
    /// 检测任务panic
    Panicked(String),
}

/// 检测任务退出报告
#[derive(Debug)]
pub struct RunnerExit {
    /// 目标URL
    pub url: String,
    /// 完成的探测次数
    pub probes: u64,
    /// 退出原因
    pub reason: ExitReason,
}

impl RunnerExit {
    /// 是否因失败退出
    pub fn is_failure(&self) -> bool {
        matches!(
            self.reason,
            ExitReason::Failed(_) | ExitReason::InvalidSchedule | ExitReason::Panicked(_)
        )
    }
}

/// 检测任务的停止句柄
///
/// 丢弃句柄等同于发送停止信号。
#[derive(Debug)]
pub struct CancelHandle {
    tx: oneshot::Sender<()>,
}

impl CancelHandle {
    /// 发送停止信号
    pub fn cancel(self) {
        // 任务可能已经退出
        let _ = self.tx.send(());
    }
}

/// 单目标检测任务
pub struct TargetRunner {
    target: Target,
    prober: Arc<dyn Prober>,
    results: mpsc::Sender<ProbeResult>,
    cancel: oneshot::Receiver<()>,
    state: watch::Sender<RunnerState>,
}

impl TargetRunner {
    /// 创建检测任务及其停止句柄
    pub fn new(
        target: Target,
        prober: Arc<dyn Prober>,
        results: mpsc::Sender<ProbeResult>,
    ) -> (Self, CancelHandle) {
        let (tx, cancel) = oneshot::channel();
        let (state, _) = watch::channel(RunnerState::Running);

        let runner = Self {
            target,
            prober,
            results,
            cancel,
            state,
        };
        (runner, CancelHandle { tx })
    }

    /// 订阅任务状态变化
    pub fn subscribe(&self) -> watch::Receiver<RunnerState> {
        self.state.subscribe()
    }

    /// 目标
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// 运行检测循环直到停止
    ///
    /// 第一次探测发生在启动后一个完整间隔。错过的定时直接跳过。
    /// 探测进行中收到停止信号时，等待本次探测完成并转发结果后退出；
    /// 发送阻塞时收到停止信号则丢弃该结果。
    pub async fn run(self) -> RunnerExit {
        let TargetRunner {
            target,
            prober,
            results,
            mut cancel,
            state,
        } = self;

        let Some(first_tick) = first_deadline(target.interval) else {
            error!("{} 检测间隔无法调度: {:?}", target.url, target.interval);
            state.send_replace(RunnerState::Stopped);
            return RunnerExit {
                url: target.url,
                probes: 0,
                reason: ExitReason::InvalidSchedule,
            };
        };

        let mut ticker = interval_at(first_tick, target.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut probes: u64 = 0;

        info!(
            "启动检测任务: {} (间隔: {:?}, 超时: {:?})",
            target.url, target.interval, target.timeout
        );

        let reason = loop {
            tokio::select! {
                biased;
                _ = &mut cancel => break ExitReason::Cancelled,
                _ = ticker.tick() => {}
            }

            state.send_replace(RunnerState::Probing);
            let mut probe = prober.probe(&target.url, target.timeout);

            let finished = tokio::select! {
                biased;
                outcome = &mut probe => Some(outcome),
                _ = &mut cancel => None,
            };
            let (outcome, cancelled) = match finished {
                Some(outcome) => (outcome, false),
                None => {
                    debug!("{} 探测进行中收到停止信号，等待本次探测完成", target.url);
                    (probe.await, true)
                }
            };

            probes += 1;
            state.send_replace(RunnerState::Running);

            let result = match outcome {
                Ok(result) => result,
                Err(e) => {
                    error!("{} 探测失败，停止检测: {}", target.url, e);
                    break ExitReason::Failed(e);
                }
            };

            debug!(
                "{} 探测完成: 状态码 {}, 耗时 {}ms",
                target.url,
                result.status_code,
                result.duration_ms()
            );

            if cancelled {
                if results.send(result).await.is_err() {
                    debug!("{} 结果通道已关闭，最后一次结果被丢弃", target.url);
                }
                break ExitReason::Cancelled;
            }

            tokio::select! {
                biased;
                sent = results.send(result) => {
                    if sent.is_err() {
                        break ExitReason::SinkClosed;
                    }
                }
                _ = &mut cancel => {
                    debug!("{} 发送结果时收到停止信号，丢弃结果", target.url);
                    break ExitReason::Cancelled;
                }
            }
        };

        state.send_replace(RunnerState::Stopped);
        info!("检测任务已停止: {} (探测 {} 次)", target.url, probes);

        RunnerExit {
            url: target.url,
            probes,
            reason,
        }
    }
}

/// 第一次定时的截止时间
///
/// 后续定时在截止时间上累加间隔，因此两个间隔之后的时间点也必须可表示。
fn first_deadline(interval: Duration) -> Option<Instant> {
    if interval.is_zero() {
        return None;
    }
    let now = Instant::now();
    now.checked_add(interval.checked_mul(2)?)?;
    now.checked_add(interval)
}
