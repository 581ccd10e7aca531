//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, limits > 0)
//! - Check that the proxy target and metrics address parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: BridgeConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::BridgeConfig;
use crate::forward::reverse_proxy::ProxyTarget;
use crate::security::AllowList;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    EmptyAllowList,
    InvalidTarget(String),
    EmptyProtocol,
    InvalidBindAddr(String),
    ZeroValue(&'static str),
    InvalidMetricsAddress(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::EmptyAllowList => {
                write!(f, "bridge.allowed_peers is empty (use \"*\" to allow any peer)")
            }
            ValidationError::InvalidTarget(reason) => write!(f, "upstream.target: {}", reason),
            ValidationError::EmptyProtocol => write!(f, "bridge.protocol must not be empty"),
            ValidationError::InvalidBindAddr(reason) => write!(f, "bridge.bind_addrs: {}", reason),
            ValidationError::ZeroValue(field) => write!(f, "{} must be greater than zero", field),
            ValidationError::InvalidMetricsAddress(addr) => {
                write!(f, "observability.metrics_address {:?} is not a socket address", addr)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

pub fn validate_config(config: &BridgeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if AllowList::new(&config.bridge.allowed_peers).is_err() {
        errors.push(ValidationError::EmptyAllowList);
    }

    if let Err(e) = ProxyTarget::parse(&config.upstream.target) {
        errors.push(ValidationError::InvalidTarget(e.to_string()));
    }

    if config.bridge.protocol.trim().is_empty() {
        errors.push(ValidationError::EmptyProtocol);
    }

    if let Err(e) = config.bridge.parse_bind_addrs() {
        errors.push(ValidationError::InvalidBindAddr(e.to_string()));
    }

    let numeric = [
        ("upstream.timeout_secs", config.upstream.timeout_secs as u128),
        ("upstream.max_response_bytes", config.upstream.max_response_bytes as u128),
        ("timeouts.read_secs", config.timeouts.read_secs as u128),
        ("limits.max_header_bytes", config.limits.max_header_bytes as u128),
        ("limits.max_body_bytes", config.limits.max_body_bytes as u128),
    ];
    for (field, value) in numeric {
        if value == 0 {
            errors.push(ValidationError::ZeroValue(field));
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
