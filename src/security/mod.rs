//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound stream:
//!     → access_control.rs (remote peer id checked against the allow list)
//!     → rejected peers: stream closed, nothing written
//!
//! Forwarded request / response:
//!     → headers.rs (strip hop-by-hop headers)
//! ```
//!
//! # Design Decisions
//! - Fail closed: an empty allow list is a startup error, never "allow all"
//! - The allow list is immutable and shared through `Arc`

pub mod access_control;
pub mod headers;

pub use access_control::{is_allowed, AllowList, AllowListError, WILDCARD};
