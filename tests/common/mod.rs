//! 集成测试公共工具
//!
//! 本地axum测试服务：固定状态码、固定延迟，并统计请求次数

#![allow(dead_code)]

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

#[derive(Clone)]
struct ServerState {
    hits: Arc<AtomicUsize>,
    status: StatusCode,
    delay: Duration,
}

/// 本地测试服务
pub struct TestServer {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
}

impl TestServer {
    /// 根路径URL
    pub fn url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    /// 已收到的请求数
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

/// 启动一个延迟 `delay` 后返回 `status` 的测试服务
pub async fn spawn_server(status: StatusCode, delay: Duration) -> TestServer {
    let hits = Arc::new(AtomicUsize::new(0));
    let state = ServerState {
        hits: Arc::clone(&hits),
        status,
        delay,
    };
    let app = Router::new().route("/", get(handler)).with_state(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer { addr, hits }
}

async fn handler(State(state): State<ServerState>) -> StatusCode {
    state.hits.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(state.delay).await;
    state.status
}

/// 返回一个当前无人监听的本地URL
pub async fn refused_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/")
}
