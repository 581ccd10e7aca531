//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the bridge.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::net::{SocketAddr, SocketAddrV4, SocketAddrV6};
use std::path::PathBuf;
use thiserror::Error;
use std::time::Duration;

use crate::http::DecodeLimits;

/// Protocol id the bridge registers with the transport.
pub const DEFAULT_PROTOCOL: &str = "/http/proxy/0.0.1";

/// Root configuration for the bridge.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BridgeConfig {
    /// Peer admission and protocol registration.
    pub bridge: BridgeSection,

    /// HTTP backend that requests are forwarded to.
    pub upstream: UpstreamConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Request size limits.
    pub limits: LimitsConfig,

    /// Where the node's secret key lives.
    pub identity: IdentityConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Peer admission settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BridgeSection {
    /// Peer ids allowed to open streams, or `["*"]` for anyone.
    pub allowed_peers: Vec<String>,

    /// Protocol identifier (ALPN) streams are accepted on.
    pub protocol: String,

    /// Listen addresses, at most one per IP family. Empty means the
    /// transport's defaults.
    pub bind_addrs: Vec<String>,
}

impl Default for BridgeSection {
    fn default() -> Self {
        Self {
            allowed_peers: Vec::new(),
            protocol: DEFAULT_PROTOCOL.to_string(),
            bind_addrs: Vec::new(),
        }
    }
}

/// Listen addresses split by IP family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BindAddrs {
    pub v4: Option<SocketAddrV4>,
    pub v6: Option<SocketAddrV6>,
}

/// A listen address that cannot be used.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindAddrError {
    #[error("listen address {0:?} is not a socket address")]
    Invalid(String),
    #[error("more than one {0} listen address")]
    Duplicate(&'static str),
}

impl BridgeSection {
    /// Parses `bind_addrs`. Blank entries are ignored.
    pub fn parse_bind_addrs(&self) -> Result<BindAddrs, BindAddrError> {
        let mut addrs = BindAddrs::default();
        for entry in self.bind_addrs.iter().map(|a| a.trim()).filter(|a| !a.is_empty()) {
            match entry.parse::<SocketAddr>() {
                Ok(SocketAddr::V4(v4)) if addrs.v4.is_none() => addrs.v4 = Some(v4),
                Ok(SocketAddr::V6(v6)) if addrs.v6.is_none() => addrs.v6 = Some(v6),
                Ok(SocketAddr::V4(_)) => return Err(BindAddrError::Duplicate("IPv4")),
                Ok(SocketAddr::V6(_)) => return Err(BindAddrError::Duplicate("IPv6")),
                Err(_) => return Err(BindAddrError::Invalid(entry.to_string())),
            }
        }
        Ok(addrs)
    }
}

/// Forwarding target.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Backend base URL, e.g. "http://127.0.0.1:8080".
    pub target: String,

    /// Deadline for one backend round trip, body included.
    pub timeout_secs: u64,

    /// Largest backend response body that will be buffered.
    pub max_response_bytes: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            target: String::new(),
            timeout_secs: 30,
            max_response_bytes: 64 * 1024 * 1024,
        }
    }
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Timeout configuration for stream operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Deadline for reading a full request off a stream.
    pub read_secs: u64,

    /// Grace period for in-flight sessions at shutdown.
    pub shutdown_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            read_secs: 30,
            shutdown_secs: 5,
        }
    }
}

/// Request size limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_header_bytes: usize,
    pub max_body_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        let defaults = DecodeLimits::default();
        Self {
            max_header_bytes: defaults.max_header_bytes,
            max_body_bytes: defaults.max_body_bytes,
        }
    }
}

impl LimitsConfig {
    pub fn decode_limits(&self) -> DecodeLimits {
        DecodeLimits {
            max_header_bytes: self.max_header_bytes,
            max_body_bytes: self.max_body_bytes,
        }
    }
}

/// Secret key location.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Raw 32-byte secret key; created on first start.
    pub key_path: PathBuf,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            key_path: PathBuf::from("./private.key"),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
