//! 监控编排器
//!
//! 为每个URL创建一个检测任务，启动结果汇总任务与指标服务，并协调关闭顺序：
//! 停止所有检测任务，等待结果通道清空，最后优雅关闭指标服务。

use crate::config::{validate_url, WatchConfig};
use crate::error::{ConfigError, ExpositionError, UrlVitalsError};
use crate::exposition::{metrics, ExpositionServer};
use crate::probe::{HttpProber, Prober};
use crate::watch::runner::{CancelHandle, ExitReason, RunnerExit, Target, TargetRunner};
use crate::watch::sink::ResultSink;
use futures::FutureExt;
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

/// 监控编排器
pub struct Orchestrator {
    config: WatchConfig,
    targets: Vec<Target>,
    prober: Arc<dyn Prober>,
}

impl Orchestrator {
    /// 使用HTTP探测器创建编排器
    pub fn new(config: WatchConfig) -> Result<Self, UrlVitalsError> {
        let prober = HttpProber::new()?;
        Ok(Self::with_prober(config, Arc::new(prober))?)
    }

    /// 使用自定义探测器创建编排器
    ///
    /// 配置中的URL按顺序注册为目标，URL列表不能为空。
    pub fn with_prober(config: WatchConfig, prober: Arc<dyn Prober>) -> Result<Self, ConfigError> {
        if config.urls.is_empty() {
            return Err(ConfigError::NoTargets);
        }

        let mut orchestrator = Self {
            targets: Vec::with_capacity(config.urls.len()),
            config,
            prober,
        };
        for url in orchestrator.config.urls.clone() {
            orchestrator.add_target(&url)?;
        }
        Ok(orchestrator)
    }

    /// 注册一个目标，使用统一的间隔与超时
    pub fn add_target(&mut self, url: &str) -> Result<(), ConfigError> {
        let url = url.trim();
        validate_url(url)?;

        if self.targets.iter().any(|target| target.url == url) {
            return Err(ConfigError::DuplicateTarget(url.to_string()));
        }

        debug!("注册检测目标: {}", url);
        self.targets.push(Target {
            url: url.to_string(),
            interval: self.config.interval,
            timeout: self.config.timeout,
        });
        Ok(())
    }

    /// 已注册的目标
    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    /// 启动所有任务
    ///
    /// 先绑定指标端口，绑定失败时不会启动任何检测任务。
    pub async fn start(self) -> Result<RunningOrchestrator, ExpositionError> {
        let (writer, reader) = metrics::registry()?;
        let server = ExpositionServer::bind(self.config.socket_addr(), reader).await?;
        let local_addr = server.local_addr()?;

        let (server_stop, server_stop_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(server.serve(async move {
            let _ = server_stop_rx.await;
        }));

        let (tx, rx) = mpsc::channel(self.config.channel_capacity);
        let sink = tokio::spawn(ResultSink::new(rx, writer).run());

        let mut runners = JoinSet::new();
        let mut cancels = HashMap::with_capacity(self.targets.len());
        for target in self.targets {
            let url = target.url.clone();
            let (runner, cancel) = TargetRunner::new(target, Arc::clone(&self.prober), tx.clone());
            runners.spawn(catch_panic(url.clone(), runner.run()));
            cancels.insert(url, cancel);
        }
        // 最后一个检测任务退出时通道随之关闭
        drop(tx);

        info!("已启动 {} 个检测任务", cancels.len());

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let supervisor = Supervisor {
            runners,
            cancels,
            shutdown: shutdown_rx,
            sink,
            server,
            server_stop,
        };

        Ok(RunningOrchestrator {
            local_addr,
            shutdown: ShutdownHandle {
                tx: Arc::new(shutdown_tx),
            },
            supervisor: tokio::spawn(supervisor.run()),
        })
    }
}

/// 关闭句柄，可克隆，是唯一的关闭入口
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// 请求关闭，可重复调用
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }

    /// 是否已请求关闭
    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }
}

/// 运行中的编排器
pub struct RunningOrchestrator {
    local_addr: SocketAddr,
    shutdown: ShutdownHandle,
    supervisor: JoinHandle<Result<RunReport, UrlVitalsError>>,
}

impl RunningOrchestrator {
    /// 指标服务实际监听地址
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 获取关闭句柄
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// 等待编排器结束
    ///
    /// 所有检测任务都停止，或通过关闭句柄请求关闭后返回。
    pub async fn wait(self) -> Result<RunReport, UrlVitalsError> {
        let RunningOrchestrator {
            shutdown,
            supervisor,
            ..
        } = self;

        let report = supervisor.await?;
        drop(shutdown);
        report
    }

    /// 请求关闭并等待结束
    pub async fn stop(self) -> Result<RunReport, UrlVitalsError> {
        self.shutdown.shutdown();
        self.wait().await
    }
}

/// 运行报告
#[derive(Debug, Default)]
pub struct RunReport {
    /// 每个检测任务的退出报告
    pub exits: Vec<RunnerExit>,
    /// 汇总任务应用的结果条数
    pub results_applied: u64,
}

impl RunReport {
    /// 因硬失败退出的检测任务
    pub fn failures(&self) -> impl Iterator<Item = &RunnerExit> {
        self.exits.iter().filter(|exit| exit.is_failure())
    }

    /// 指定URL的退出报告
    pub fn exit_for(&self, url: &str) -> Option<&RunnerExit> {
        self.exits.iter().find(|exit| exit.url == url)
    }

    /// 所有检测任务的探测总次数
    pub fn total_probes(&self) -> u64 {
        self.exits.iter().map(|exit| exit.probes).sum()
    }
}

struct Supervisor {
    runners: JoinSet<RunnerExit>,
    cancels: HashMap<String, CancelHandle>,
    shutdown: watch::Receiver<bool>,
    sink: JoinHandle<u64>,
    server: JoinHandle<Result<(), ExpositionError>>,
    server_stop: oneshot::Sender<()>,
}

impl Supervisor {
    async fn run(mut self) -> Result<RunReport, UrlVitalsError> {
        let mut exits = Vec::new();
        let mut server_failure: Option<UrlVitalsError> = None;

        loop {
            tokio::select! {
                _ = shutdown_requested(&mut self.shutdown) => {
                    info!("收到关闭请求，正在停止所有检测任务");
                    break;
                }
                joined = self.runners.join_next() => match joined {
                    Some(joined) => {
                        if let Some(exit) = on_runner_exit(&mut self.cancels, joined) {
                            exits.push(exit);
                        }
                    }
                    None => {
                        info!("所有检测任务均已停止");
                        break;
                    }
                },
                served = &mut self.server => {
                    let failure = match served {
                        Ok(Ok(())) => UrlVitalsError::from(ExpositionError::Serve(
                            std::io::Error::other("指标服务意外退出"),
                        )),
                        Ok(Err(e)) => UrlVitalsError::from(e),
                        Err(e) => UrlVitalsError::from(e),
                    };
                    error!("指标服务失败，正在停止所有检测任务: {}", failure);
                    server_failure = Some(failure);
                    break;
                }
            }
        }

        for (_, cancel) in self.cancels.drain() {
            cancel.cancel();
        }
        while let Some(joined) = self.runners.join_next().await {
            if let Some(exit) = on_runner_exit(&mut self.cancels, joined) {
                exits.push(exit);
            }
        }

        // 所有发送端已释放，汇总任务清空缓冲区后结束
        let results_applied = self.sink.await?;

        if let Some(failure) = server_failure {
            return Err(failure);
        }

        let _ = self.server_stop.send(());
        self.server.await??;

        info!(
            "监控已停止: {} 个检测任务, 应用 {} 条结果",
            exits.len(),
            results_applied
        );
        Ok(RunReport {
            exits,
            results_applied,
        })
    }
}

/// 等待关闭请求；所有关闭句柄都被丢弃时同样视为关闭
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// 记录检测任务退出，移除其停止句柄
fn on_runner_exit(
    cancels: &mut HashMap<String, CancelHandle>,
    joined: Result<RunnerExit, tokio::task::JoinError>,
) -> Option<RunnerExit> {
    match joined {
        Ok(exit) => {
            cancels.remove(&exit.url);
            match &exit.reason {
                ExitReason::Failed(e) => {
                    warn!("{} 检测任务因错误停止，其余任务继续运行: {}", exit.url, e)
                }
                ExitReason::SinkClosed => warn!("{} 检测任务因结果通道关闭而停止", exit.url),
                ExitReason::InvalidSchedule => warn!("{} 检测间隔无法调度，任务已停止", exit.url),
                ExitReason::Panicked(message) => {
                    error!("{} 检测任务panic，其余任务继续运行: {}", exit.url, message)
                }
                ExitReason::Cancelled => debug!("{} 检测任务已取消", exit.url),
            }
            Some(exit)
        }
        Err(e) => {
            error!("检测任务异常退出: {}", e);
            None
        }
    }
}

/// 运行检测任务，panic时转换为该目标的退出报告
async fn catch_panic<F>(url: String, run: F) -> RunnerExit
where
    F: Future<Output = RunnerExit>,
{
    match AssertUnwindSafe(run).catch_unwind().await {
        Ok(exit) => exit,
        Err(panic) => RunnerExit {
            url,
            probes: 0,
            reason: ExitReason::Panicked(panic_message(panic.as_ref())),
        },
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "未知panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProbeError;
    use crate::probe::ProbeResult;
    use async_trait::async_trait;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// 对包含 "bad" 的URL返回硬失败，包含 "panic" 的URL直接panic，其余返回200
    struct FakeProber {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Prober for FakeProber {
        async fn probe(&self, url: &str, _timeout: Duration) -> Result<ProbeResult, ProbeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if url.contains("bad") {
                return Err(ProbeError::ConnectionClosed);
            }
            if url.contains("panic") {
                panic!("检测 {url} 时崩溃");
            }
            Ok(ProbeResult::new(url)
                .with_status_code(200)
                .with_duration(Duration::from_millis(5)))
        }
    }

    fn config(urls: &[&str], interval: &str) -> WatchConfig {
        WatchConfig::new(
            urls.iter().map(|url| url.to_string()).collect(),
            interval,
            "1s",
            0,
        )
        .unwrap()
        .with_bind_address(IpAddr::V4(Ipv4Addr::LOCALHOST))
    }

    fn fake() -> Arc<FakeProber> {
        Arc::new(FakeProber {
            calls: AtomicUsize::new(0),
        })
    }

    #[test]
    fn test_targets_registered_in_order() {
        let orchestrator = Orchestrator::with_prober(
            config(&["http://a.example", "http://b.example"], "1s"),
            fake(),
        )
        .unwrap();

        let urls: Vec<_> = orchestrator.targets().iter().map(|t| t.url.as_str()).collect();
        assert_eq!(urls, vec!["http://a.example", "http://b.example"]);
        assert_eq!(orchestrator.targets()[0].interval, Duration::from_secs(1));
    }

    #[test]
    fn test_empty_config_rejected() {
        let mut config = config(&["http://a.example"], "1s");
        config.urls.clear();
        assert!(matches!(
            Orchestrator::with_prober(config, fake()),
            Err(ConfigError::NoTargets)
        ));
    }

    #[test]
    fn test_add_duplicate_target_rejected() {
        let mut orchestrator =
            Orchestrator::with_prober(config(&["http://a.example"], "1s"), fake()).unwrap();

        assert!(matches!(
            orchestrator.add_target("http://a.example"),
            Err(ConfigError::DuplicateTarget(_))
        ));
        assert!(matches!(
            orchestrator.add_target("not a url"),
            Err(ConfigError::InvalidUrl { .. })
        ));
        assert!(orchestrator.add_target("http://b.example").is_ok());
        assert_eq!(orchestrator.targets().len(), 2);
    }

    #[tokio::test]
    async fn test_stop_reports_every_runner() {
        let prober = fake();
        let orchestrator = Orchestrator::with_prober(
            config(&["http://a.example", "http://b.example"], "50ms"),
            prober.clone(),
        )
        .unwrap();

        let running = orchestrator.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(180)).await;
        let report = running.stop().await.unwrap();

        assert_eq!(report.exits.len(), 2);
        assert_eq!(report.failures().count(), 0);
        assert!(report.total_probes() >= 2);
        assert_eq!(report.results_applied, report.total_probes());
        assert_eq!(
            report.total_probes(),
            prober.calls.load(Ordering::SeqCst) as u64
        );
    }

    #[tokio::test]
    async fn test_failed_runner_does_not_stop_others() {
        let orchestrator = Orchestrator::with_prober(
            config(&["http://bad.example", "http://good.example"], "50ms"),
            fake(),
        )
        .unwrap();

        let running = orchestrator.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        let report = running.stop().await.unwrap();

        let bad = report.exit_for("http://bad.example").unwrap();
        assert!(bad.is_failure());
        assert_eq!(bad.probes, 1);

        let good = report.exit_for("http://good.example").unwrap();
        assert!(matches!(good.reason, ExitReason::Cancelled));
        assert!(good.probes >= 3);
    }

    #[tokio::test]
    async fn test_panicked_runner_is_reported() {
        let orchestrator = Orchestrator::with_prober(
            config(&["http://panic.example", "http://good.example"], "50ms"),
            fake(),
        )
        .unwrap();

        let running = orchestrator.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        let report = running.stop().await.unwrap();

        assert_eq!(report.exits.len(), 2);
        let panicked = report.exit_for("http://panic.example").unwrap();
        assert!(panicked.is_failure());
        match &panicked.reason {
            ExitReason::Panicked(message) => assert!(message.contains("panic.example")),
            other => panic!("unexpected exit reason: {other:?}"),
        }

        let good = report.exit_for("http://good.example").unwrap();
        assert!(matches!(good.reason, ExitReason::Cancelled));
        assert!(good.probes >= 3);
    }

    #[tokio::test]
    async fn test_finishes_when_all_runners_fail() {
        let orchestrator = Orchestrator::with_prober(
            config(&["http://bad-1.example", "http://bad-2.example"], "50ms"),
            fake(),
        )
        .unwrap();

        let running = orchestrator.start().await.unwrap();
        let report = tokio::time::timeout(Duration::from_secs(5), running.wait())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(report.failures().count(), 2);
        assert_eq!(report.results_applied, 0);
    }

    #[tokio::test]
    async fn test_bind_failure_before_runners_start() {
        let occupied = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = occupied.local_addr().unwrap().port();

        let prober = fake();
        let mut config = config(&["http://a.example"], "10ms");
        config.port = port;
        let orchestrator = Orchestrator::with_prober(config, prober.clone()).unwrap();

        let result = orchestrator.start().await;
        assert!(matches!(result, Err(ExpositionError::Bind { .. })));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(prober.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_shutdown_handle_is_shared() {
        let orchestrator =
            Orchestrator::with_prober(config(&["http://a.example"], "1s"), fake()).unwrap();
        let running = orchestrator.start().await.unwrap();

        let handle = running.shutdown_handle();
        assert!(!handle.is_shutdown());
        handle.clone().shutdown();
        assert!(handle.is_shutdown());

        let report = tokio::time::timeout(Duration::from_secs(5), running.wait())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.exits.len(), 1);
    }
}
