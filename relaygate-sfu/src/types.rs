//! Common types used throughout the scheduler

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// Identifier of one endpoint; doubles as the TCP port its listener binds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointId(u16);

impl EndpointId {
    #[must_use]
    pub const fn new(port: u16) -> Self {
        Self(port)
    }

    #[must_use]
    pub const fn port(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for EndpointId {
    fn from(port: u16) -> Self {
        Self(port)
    }
}

/// Unique identifier for a session
///
/// Formatted as `{endpoint}-{remote_ip}-{uuid}` so operators can tell at a
/// glance where a session lives and who opened it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mint a fresh identifier for a session opened on `endpoint` by `remote`
    #[must_use]
    pub fn generate(endpoint: EndpointId, remote: IpAddr) -> Self {
        Self(format!("{endpoint}-{remote}-{}", uuid::Uuid::new_v4()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_id_is_inspectable_and_unique() {
        let ip: IpAddr = "10.0.0.7".parse().unwrap();
        let a = SessionId::generate(EndpointId::new(16666), ip);
        let b = SessionId::generate(EndpointId::new(16666), ip);

        assert!(a.as_str().starts_with("16666-10.0.0.7-"));
        assert_ne!(a, b);
    }
}
