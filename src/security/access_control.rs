//! Peer allow-list enforcement.
//! Decides whether a stream's remote identity may use the bridge.

use std::fmt;
use thiserror::Error;

use crate::net::PeerIdentity;

/// Marker that, as the first entry, admits every peer.
pub const WILDCARD: &str = "*";

/// Error building an allow list.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AllowListError {
    #[error("allow list is empty; list peer ids or use \"*\" to allow any peer")]
    Empty,
}

/// Ordered set of permitted peer identities, or the wildcard.
///
/// Built once at startup and shared read-only by every session.
#[derive(Clone, PartialEq, Eq)]
pub struct AllowList {
    entries: Vec<String>,
}

impl AllowList {
    /// Build from configuration entries. Blank entries are ignored.
    pub fn new<I, S>(entries: I) -> Result<Self, AllowListError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entries: Vec<String> = entries
            .into_iter()
            .map(|e| e.as_ref().trim().to_string())
            .filter(|e| !e.is_empty())
            .collect();
        if entries.is_empty() {
            return Err(AllowListError::Empty);
        }
        Ok(Self { entries })
    }

    /// Parse a comma separated flag value.
    pub fn parse(value: &str) -> Result<Self, AllowListError> {
        Self::new(value.split(','))
    }

    /// Allow list admitting every peer.
    pub fn any() -> Self {
        Self {
            entries: vec![WILDCARD.to_string()],
        }
    }

    /// True when the first entry is the wildcard.
    pub fn is_wildcard(&self) -> bool {
        self.entries.first().map(String::as_str) == Some(WILDCARD)
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn allows(&self, identity: &PeerIdentity) -> bool {
        is_allowed(identity, self)
    }
}

impl fmt::Debug for AllowList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_wildcard() {
            write!(f, "AllowList(*)")
        } else {
            write!(f, "AllowList({} peers)", self.entries.len())
        }
    }
}

/// Returns true if `identity` may open a bridged stream.
///
/// A wildcard only counts in first position; elsewhere `*` is a literal entry.
pub fn is_allowed(identity: &PeerIdentity, allow_list: &AllowList) -> bool {
    allow_list.is_wildcard() || allow_list.entries.iter().any(|p| p == identity.as_str())
}
