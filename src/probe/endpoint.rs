//! 探测目标地址解析

use crate::error::ProbeError;
use http::Uri;
use std::fmt;
use std::net::IpAddr;

/// 目标协议
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// 明文HTTP
    Http,
    /// HTTP over TLS
    Https,
}

impl Scheme {
    /// 协议默认端口
    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::Http => write!(f, "http"),
            Scheme::Https => write!(f, "https"),
        }
    }
}

/// 解析后的探测地址
///
/// 拆分出建立连接所需的各个部分：主机名用于DNS解析与SNI，
/// authority用于Host请求头，path_and_query用于请求行。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// 原始URL
    pub url: String,
    /// 协议
    pub scheme: Scheme,
    /// 主机名（IPv6字面量不带方括号）
    pub host: String,
    /// 端口
    pub port: u16,
    /// Host请求头的值
    pub authority: String,
    /// 请求路径与查询串
    pub path_and_query: String,
}

impl Endpoint {
    /// 解析URL
    ///
    /// 仅接受带主机名的绝对 `http`/`https` URL。
    pub fn parse(url: &str) -> Result<Self, ProbeError> {
        let invalid = |reason: &str| ProbeError::InvalidUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        };

        let uri: Uri = url.parse().map_err(|_| invalid("无法解析"))?;

        let scheme = match uri.scheme_str() {
            Some("http") => Scheme::Http,
            Some("https") => Scheme::Https,
            Some(_) => return Err(invalid("仅支持http和https")),
            None => return Err(invalid("缺少协议")),
        };

        let authority = uri.authority().ok_or_else(|| invalid("缺少主机名"))?;
        let host = authority
            .host()
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        if host.is_empty() {
            return Err(invalid("缺少主机名"));
        }

        let port = authority.port_u16().unwrap_or_else(|| scheme.default_port());

        // Host请求头不携带userinfo
        let host_port = authority
            .as_str()
            .rsplit_once('@')
            .map_or(authority.as_str(), |(_, host_port)| host_port)
            .to_string();

        let path_and_query = uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .filter(|pq| !pq.is_empty())
            .unwrap_or("/")
            .to_string();

        Ok(Self {
            url: url.to_string(),
            scheme,
            host,
            port,
            authority: host_port,
            path_and_query,
        })
    }

    /// 主机是否为IP字面量（无需DNS解析）
    pub fn ip_literal(&self) -> Option<IpAddr> {
        self.host.parse().ok()
    }

    /// 是否需要TLS握手
    pub fn is_tls(&self) -> bool {
        self.scheme == Scheme::Https
    }
}
