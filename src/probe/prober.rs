//! HTTP探测器实现
//!
//! 每次探测都建立全新的连接，逐阶段计时：DNS解析、TCP连接、TLS握手，
//! 以及从请求开始到收到响应头的总耗时。

use crate::error::ProbeError;
use crate::probe::endpoint::Endpoint;
use crate::probe::result::{PhaseTimings, ProbeResult};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use http::header::{ACCEPT, HOST, USER_AGENT};
use http::{Method, Request};
use http_body_util::Empty;
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{lookup_host, TcpStream};
use tokio::time::{timeout, Instant};
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

/// 探测器trait，定义单次探测接口
#[async_trait]
pub trait Prober: Send + Sync {
    /// 对URL执行一次GET探测
    ///
    /// # 参数
    /// * `url` - 目标URL
    /// * `timeout` - 本次探测的超时时间
    ///
    /// # 返回
    /// * `Ok(ProbeResult)` - 收到响应头，或超时（状态码0）
    /// * `Err(ProbeError)` - DNS、连接、TLS等硬失败
    async fn probe(&self, url: &str, timeout: Duration) -> Result<ProbeResult, ProbeError>;

    /// 并发探测多个URL
    async fn probe_batch(
        &self,
        urls: &[String],
        timeout: Duration,
    ) -> Vec<Result<ProbeResult, ProbeError>> {
        let futures = urls.iter().map(|url| self.probe(url, timeout));
        futures::future::join_all(futures).await
    }
}

/// HTTP(S)探测器实现
#[derive(Clone)]
pub struct HttpProber {
    /// TLS连接器
    tls: TlsConnector,
    /// User-Agent请求头
    user_agent: String,
}

impl HttpProber {
    /// 创建使用Mozilla根证书的探测器
    pub fn new() -> Result<Self, ProbeError> {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let mut config =
            ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
                .with_safe_default_protocol_versions()?
                .with_root_certificates(roots)
                .with_no_client_auth();
        config.alpn_protocols = vec![b"http/1.1".to_vec()];

        Ok(Self::with_tls_config(Arc::new(config)))
    }

    /// 使用自定义TLS配置创建探测器
    pub fn with_tls_config(config: Arc<ClientConfig>) -> Self {
        Self {
            tls: TlsConnector::from(config),
            user_agent: format!("{}/{}", crate::APP_NAME, crate::VERSION),
        }
    }

    /// 构建GET请求
    fn build_request(&self, endpoint: &Endpoint) -> Result<Request<Empty<Bytes>>, ProbeError> {
        let request = Request::builder()
            .method(Method::GET)
            .uri(endpoint.path_and_query.as_str())
            .header(HOST, endpoint.authority.as_str())
            .header(USER_AGENT, self.user_agent.as_str())
            .header(ACCEPT, "*/*")
            .body(Empty::new())?;
        Ok(request)
    }

    /// 执行一次完整的请求交换（不含超时控制）
    async fn exchange(&self, endpoint: &Endpoint) -> Result<ProbeResult, ProbeError> {
        let timestamp = Utc::now();
        let start = Instant::now();
        let mut phases = PhaseTimings::default();

        let addrs = match endpoint.ip_literal() {
            Some(ip) => vec![SocketAddr::new(ip, endpoint.port)],
            None => {
                let dns_start = Instant::now();
                let addrs: Vec<SocketAddr> = lookup_host((endpoint.host.as_str(), endpoint.port))
                    .await
                    .map_err(|source| ProbeError::Dns {
                        host: endpoint.host.clone(),
                        source,
                    })?
                    .collect();
                phases.dns = dns_start.elapsed();
                addrs
            }
        };

        let connect_start = Instant::now();
        let stream = connect_first(&endpoint.host, &addrs).await?;
        phases.connect = connect_start.elapsed();

        let request = self.build_request(endpoint)?;

        let status_code = if endpoint.is_tls() {
            let server_name = ServerName::try_from(endpoint.host.clone()).map_err(|e| {
                ProbeError::Tls {
                    host: endpoint.host.clone(),
                    source: std::io::Error::new(std::io::ErrorKind::InvalidInput, e),
                }
            })?;

            let tls_start = Instant::now();
            let stream = self
                .tls
                .connect(server_name, stream)
                .await
                .map_err(|source| ProbeError::Tls {
                    host: endpoint.host.clone(),
                    source,
                })?;
            phases.tls = tls_start.elapsed();

            send_request(stream, request).await?
        } else {
            send_request(stream, request).await?
        };

        Ok(ProbeResult::new(endpoint.url.as_str())
            .with_status_code(status_code)
            .with_duration(start.elapsed())
            .with_phases(phases)
            .with_timestamp(timestamp))
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, url: &str, probe_timeout: Duration) -> Result<ProbeResult, ProbeError> {
        let endpoint = Endpoint::parse(url)?;

        match timeout(probe_timeout, self.exchange(&endpoint)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("{} 探测超过超时时间 {:?}", url, probe_timeout);
                Ok(ProbeResult::timed_out(url))
            }
        }
    }
}

/// 依次尝试解析出的地址，返回第一个成功的连接
async fn connect_first(host: &str, addrs: &[SocketAddr]) -> Result<TcpStream, ProbeError> {
    let mut last_error = None;

    for addr in addrs {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                if let Err(e) = stream.set_nodelay(true) {
                    debug!("设置TCP_NODELAY失败 {}: {}", addr, e);
                }
                return Ok(stream);
            }
            Err(e) => {
                debug!("连接 {} 失败: {}", addr, e);
                last_error = Some((*addr, e));
            }
        }
    }

    match last_error {
        Some((addr, source)) => Err(ProbeError::Connect {
            addr: addr.to_string(),
            source,
        }),
        None => Err(ProbeError::NoAddress {
            host: host.to_string(),
        }),
    }
}

/// 在已建立的连接上发送请求，返回响应状态码
///
/// 连接的驱动与请求并发进行；收到响应头即返回，不读取响应体。
/// 服务器写完响应后立即关闭连接时，连接可能先于响应future结束，
/// 此时响应已投递，继续等待响应即可。
async fn send_request<S>(io: S, request: Request<Empty<Bytes>>) -> Result<u16, ProbeError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sender, connection) = http1::handshake::<_, Empty<Bytes>>(TokioIo::new(io)).await?;
    tokio::pin!(connection);

    let response = sender.send_request(request);
    tokio::pin!(response);

    let closed = tokio::select! {
        biased;
        response = &mut response => return response.map(|r| r.status().as_u16()).map_err(classify),
        closed = &mut connection => closed,
    };

    match (response.await, closed) {
        (Ok(response), _) => Ok(response.status().as_u16()),
        (Err(_), Err(e)) | (Err(e), Ok(())) => Err(classify(e)),
    }
}

/// 连接提前关闭单独归类，其余保留为HTTP错误
fn classify(e: hyper::Error) -> ProbeError {
    if e.is_incomplete_message() || e.is_canceled() {
        debug!("连接在收到响应前被关闭: {}", e);
        ProbeError::ConnectionClosed
    } else {
        ProbeError::Http(e)
    }
}
