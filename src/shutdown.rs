//! 信号处理模块
//!
//! 将 SIGINT / SIGTERM（非Unix系统为 Ctrl+C）转换为编排器的关闭请求

use crate::watch::ShutdownHandle;
use std::io;
use tokio::task::JoinHandle;
use tracing::{error, info};

#[cfg(unix)]
use signal_hook::consts::{SIGINT, SIGTERM};
#[cfg(unix)]
use signal_hook_tokio::Signals;

/// 等待第一个关闭信号
#[cfg(unix)]
pub async fn wait_for_signal() -> io::Result<()> {
    use futures::stream::StreamExt;

    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    let handle = signals.handle();

    match signals.next().await {
        Some(SIGINT) => info!("接收到 SIGINT 信号，开始优雅关闭..."),
        Some(SIGTERM) => info!("接收到 SIGTERM 信号，开始优雅关闭..."),
        Some(signal) => info!("接收到信号 {signal}，开始优雅关闭..."),
        None => info!("信号流已关闭"),
    }

    handle.close();
    Ok(())
}

/// 等待第一个关闭信号
#[cfg(not(unix))]
pub async fn wait_for_signal() -> io::Result<()> {
    tokio::signal::ctrl_c().await?;
    info!("接收到 Ctrl+C，开始优雅关闭...");
    Ok(())
}

/// 启动信号监听任务，收到信号后调用关闭句柄
pub fn spawn_signal_listener(shutdown: ShutdownHandle) -> JoinHandle<()> {
    tokio::spawn(async move {
        match wait_for_signal().await {
            Ok(()) => shutdown.shutdown(),
            Err(e) => error!("注册信号处理器失败: {e}"),
        }
    })
}
