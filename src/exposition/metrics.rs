//! Prometheus指标模块
//!
//! 按URL维护最近一次探测的存活与耗时仪表。注册表是显式创建的实例，
//! 拆分为唯一的写入端（交给结果汇总任务）和可克隆的读取端（交给HTTP服务）。

use crate::error::ExpositionError;
use crate::probe::ProbeResult;
use prometheus::{Encoder, IntGaugeVec, Opts, Registry, TextEncoder};

/// 存活指标名
pub const UP_METRIC: &str = "sample_external_url_up";
/// 总耗时指标名
pub const RESPONSE_MS_METRIC: &str = "sample_external_url_response_ms";
/// DNS耗时指标名
pub const DNS_MS_METRIC: &str = "sample_external_url_dns_ms";
/// TCP连接耗时指标名
pub const CONNECT_MS_METRIC: &str = "sample_external_url_connect_ms";
/// TLS握手耗时指标名
pub const TLS_MS_METRIC: &str = "sample_external_url_tls_ms";

/// 指标标签名
const URL_LABEL: &str = "url";

/// 创建一组新的URL仪表
///
/// # 返回
/// * `(GaugeWriter, GaugeReader)` - 写入端与读取端，共享同一注册表
pub fn registry() -> Result<(GaugeWriter, GaugeReader), ExpositionError> {
    let registry = Registry::new();

    let up = register_gauge(&registry, UP_METRIC, "binary indication of url liveness")?;
    let response_ms = register_gauge(
        &registry,
        RESPONSE_MS_METRIC,
        "response time in ms for last check",
    )?;
    let dns_ms = register_gauge(
        &registry,
        DNS_MS_METRIC,
        "dns resolution time in ms for last check",
    )?;
    let connect_ms = register_gauge(
        &registry,
        CONNECT_MS_METRIC,
        "tcp connect time in ms for last check",
    )?;
    let tls_ms = register_gauge(
        &registry,
        TLS_MS_METRIC,
        "tls handshake time in ms for last check",
    )?;

    let writer = GaugeWriter {
        up,
        response_ms,
        dns_ms,
        connect_ms,
        tls_ms,
    };

    Ok((writer, GaugeReader { registry }))
}

fn register_gauge(
    registry: &Registry,
    name: &str,
    help: &str,
) -> Result<IntGaugeVec, ExpositionError> {
    let gauge = IntGaugeVec::new(Opts::new(name, help), &[URL_LABEL])?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

/// 仪表写入端
///
/// 不实现 `Clone`，保证只有一个写入者。
pub struct GaugeWriter {
    up: IntGaugeVec,
    response_ms: IntGaugeVec,
    dns_ms: IntGaugeVec,
    connect_ms: IntGaugeVec,
    tls_ms: IntGaugeVec,
}

impl GaugeWriter {
    /// 用一次探测结果更新该URL的全部仪表
    pub fn record(&self, result: &ProbeResult) {
        let labels = [result.url.as_str()];

        self.up
            .with_label_values(&labels)
            .set(if result.is_up() { 1 } else { 0 });
        self.response_ms
            .with_label_values(&labels)
            .set(millis(result.duration));
        self.dns_ms
            .with_label_values(&labels)
            .set(millis(result.phases.dns));
        self.connect_ms
            .with_label_values(&labels)
            .set(millis(result.phases.connect));
        self.tls_ms
            .with_label_values(&labels)
            .set(millis(result.phases.tls));
    }
}

fn millis(duration: std::time::Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

/// 仪表读取端
#[derive(Clone)]
pub struct GaugeReader {
    registry: Registry,
}

impl GaugeReader {
    /// 获取Prometheus文本格式的指标
    pub fn gather_metrics(&self) -> Result<String, ExpositionError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| ExpositionError::Encode(e.to_string()))
    }

    /// 读取某个URL某项指标的当前值
    ///
    /// 尚未收到该URL的任何结果时返回 `None`。
    pub fn sample(&self, metric: &str, url: &str) -> Result<Option<i64>, ExpositionError> {
        let text = self.gather_metrics()?;
        Ok(find_sample(&text, metric, url))
    }
}

/// 在文本格式中查找 `metric{url="..."} value` 行
pub fn find_sample(text: &str, metric: &str, url: &str) -> Option<i64> {
    let prefix = format!("{metric}{{{URL_LABEL}=\"{url}\"}} ");
    text.lines()
        .find_map(|line| line.strip_prefix(prefix.as_str()))
        .and_then(|value| value.trim().parse::<f64>().ok())
        .map(|value| value as i64)
}
