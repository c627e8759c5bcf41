//! Endpoint parsing for the dispatcher's ZeroMQ sockets.
//!
//! Configuration carries endpoints as plain URI strings (`tcp://host:port`,
//! `ipc:///path`); this module parses them enough to validate the shape at
//! startup and to prepare an IPC socket path before binding.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::DispatchError;

/// A parsed endpoint, distinguishing TCP from IPC so bind-time housekeeping
/// (directory creation, stale socket removal) only runs where it applies.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "address")]
pub enum Transport {
    /// Inter-process communication via a Unix domain socket file.
    Ipc(String),

    /// TCP transport for distributed deployment.
    Tcp { host: String, port: u16 },
}

impl Transport {
    /// Create an IPC transport from a path (e.g. `/tmp/dispatchd/broker-intake.sock`).
    pub fn ipc(path: impl Into<String>) -> Self {
        Self::Ipc(path.into())
    }

    /// Create a TCP transport with the given host and port.
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Parse an endpoint URI as configured by the user (`tcp://host:port` or `ipc:///path`).
    pub fn parse(endpoint: &str) -> Result<Self, DispatchError> {
        if let Some(rest) = endpoint.strip_prefix("ipc://") {
            return Ok(Self::Ipc(rest.to_string()));
        }
        if let Some(rest) = endpoint.strip_prefix("tcp://") {
            let (host, port) = rest.rsplit_once(':').ok_or_else(|| {
                DispatchError::Config(format!("endpoint '{endpoint}' is missing a port"))
            })?;
            let port: u16 = port.parse().map_err(|_| {
                DispatchError::Config(format!("endpoint '{endpoint}' has an invalid port"))
            })?;
            return Ok(Self::Tcp {
                host: host.to_string(),
                port,
            });
        }
        Err(DispatchError::Config(format!(
            "endpoint '{endpoint}' must start with tcp:// or ipc://"
        )))
    }

    /// Render the ZeroMQ endpoint address string.
    pub fn endpoint(&self) -> String {
        match self {
            Self::Ipc(path) => format!("ipc://{path}"),
            Self::Tcp { host, port } => format!("tcp://{host}:{port}"),
        }
    }

    /// Ensure the parent directory of an IPC socket path exists. No-op for TCP.
    pub fn ensure_ipc_dir(&self) -> Result<(), DispatchError> {
        if let Self::Ipc(path) = self {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
        }
        Ok(())
    }

    /// Remove a leftover socket file from a previous run before binding. No-op for TCP.
    pub fn remove_stale_socket(&self) -> Result<(), DispatchError> {
        if let Self::Ipc(path) = self {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.endpoint())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipc_endpoint() {
        let t = Transport::ipc("/tmp/dispatchd/broker.sock");
        assert_eq!(t.endpoint(), "ipc:///tmp/dispatchd/broker.sock");
    }

    #[test]
    fn tcp_endpoint() {
        let t = Transport::tcp("127.0.0.1", 5555);
        assert_eq!(t.endpoint(), "tcp://127.0.0.1:5555");
    }

    #[test]
    fn display_matches_endpoint() {
        let t = Transport::tcp("localhost", 9090);
        assert_eq!(t.to_string(), t.endpoint());
    }

    #[test]
    fn parse_tcp_roundtrips() {
        let t = Transport::parse("tcp://0.0.0.0:5555").unwrap();
        assert_eq!(t, Transport::tcp("0.0.0.0", 5555));
    }

    #[test]
    fn parse_ipc_roundtrips() {
        let t = Transport::parse("ipc:///tmp/a.sock").unwrap();
        assert_eq!(t, Transport::ipc("/tmp/a.sock"));
    }

    #[test]
    fn parse_rejects_bad_scheme() {
        assert!(Transport::parse("udp://127.0.0.1:1").is_err());
    }

    #[test]
    fn parse_rejects_missing_port() {
        assert!(Transport::parse("tcp://127.0.0.1").is_err());
    }

    #[test]
    fn remove_stale_socket_is_noop_when_absent() {
        let t = Transport::ipc("/tmp/dispatchd-test-nonexistent-xyz.sock");
        assert!(t.remove_stale_socket().is_ok());
    }
}
