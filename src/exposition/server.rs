//! 指标HTTP服务
//!
//! 基于axum提供 `GET /metrics`，支持优雅关闭

use crate::error::ExpositionError;
use crate::exposition::metrics::GaugeReader;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Prometheus文本格式的内容类型
const METRICS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// 指标服务
///
/// 构造时即绑定端口，绑定失败在任何检测任务启动前暴露。
pub struct ExpositionServer {
    /// 已绑定的监听器
    listener: TcpListener,
    /// 仪表读取端
    reader: GaugeReader,
}

impl ExpositionServer {
    /// 绑定指标端口
    pub async fn bind(addr: SocketAddr, reader: GaugeReader) -> Result<Self, ExpositionError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ExpositionError::Bind { addr, source })?;
        Ok(Self { listener, reader })
    }

    /// 实际监听地址（端口为0时由系统分配）
    pub fn local_addr(&self) -> Result<SocketAddr, ExpositionError> {
        self.listener.local_addr().map_err(ExpositionError::Serve)
    }

    /// 运行服务直到 `shutdown` 完成
    ///
    /// 收到关闭信号后不再接受新连接，进行中的抓取完成后返回。
    pub async fn serve<F>(self, shutdown: F) -> Result<(), ExpositionError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.local_addr()?;
        info!("Prometheus指标: http://{}/metrics", addr);

        axum::serve(self.listener, router(self.reader))
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(ExpositionError::Serve)?;

        info!("指标服务已关闭");
        Ok(())
    }
}

/// 创建路由
pub fn router(reader: GaugeReader) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(reader)
}

async fn index_handler() -> &'static str {
    "url-vitals: metrics at /metrics\n"
}

/// 指标处理器
async fn metrics_handler(State(reader): State<GaugeReader>) -> Response {
    match reader.gather_metrics() {
        Ok(metrics) => ([(CONTENT_TYPE, METRICS_CONTENT_TYPE)], metrics).into_response(),
        Err(e) => {
            error!("收集指标失败: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to gather metrics").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exposition::metrics;
    use crate::probe::ProbeResult;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_metrics_route() {
        let (writer, reader) = metrics::registry().unwrap();
        writer.record(
            &ProbeResult::new("http://a.example")
                .with_status_code(200)
                .with_duration(Duration::from_millis(12)),
        );

        let response = router(reader)
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            METRICS_CONTENT_TYPE
        );

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains(r#"sample_external_url_up{url="http://a.example"} 1"#));
        assert!(text.contains(r#"sample_external_url_response_ms{url="http://a.example"} 12"#));
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let (_writer, reader) = metrics::registry().unwrap();
        let response = router(reader)
            .oneshot(Request::get("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_bind_conflict_is_reported() {
        let (_writer, reader) = metrics::registry().unwrap();
        let first = ExpositionServer::bind("127.0.0.1:0".parse().unwrap(), reader.clone())
            .await
            .unwrap();
        let addr = first.local_addr().unwrap();

        let second = ExpositionServer::bind(addr, reader).await;
        assert!(matches!(second, Err(ExpositionError::Bind { .. })));
    }

    #[tokio::test]
    async fn test_graceful_shutdown() {
        let (_writer, reader) = metrics::registry().unwrap();
        let server = ExpositionServer::bind("127.0.0.1:0".parse().unwrap(), reader)
            .await
            .unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(server.serve(async move {
            let _ = rx.await;
        }));

        tx.send(()).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
