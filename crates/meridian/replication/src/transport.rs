//! Peer transport
//!
//! The replicator only needs "send this batch to that peer"; the HTTP
//! implementation posts to the peer's replication endpoint using the same
//! basic credentials as ordinary clients.

use crate::apply::BatchAck;
use crate::error::{ReplicationError, Result};
use async_trait::async_trait;
use meridian_types::DeltaBatch;
use reqwest::Client;
use std::fmt;
use std::time::Duration;

/// Path of the replication endpoint on every registry node
pub const REPLICATION_PATH: &str = "/replication/batch";

/// Base URL of a peer registry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerEndpoint(String);

impl PeerEndpoint {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim().trim_end_matches('/');
        if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
            return Err(ReplicationError::InvalidEndpoint(raw.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn batch_url(&self) -> String {
        format!("{}{}", self.0, REPLICATION_PATH)
    }
}

impl fmt::Display for PeerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sends delta batches to peers
#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn send(&self, peer: &PeerEndpoint, batch: &DeltaBatch) -> Result<BatchAck>;
}

/// Basic-auth credentials presented to peers
#[derive(Clone)]
pub struct PeerCredentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for PeerCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerCredentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// HTTP transport backed by reqwest
pub struct HttpPeerTransport {
    client: Client,
    timeout: Duration,
    credentials: Option<PeerCredentials>,
}

impl HttpPeerTransport {
    pub fn new(timeout: Duration, credentials: Option<PeerCredentials>) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            timeout,
            credentials,
        })
    }
}

#[async_trait]
impl PeerTransport for HttpPeerTransport {
    async fn send(&self, peer: &PeerEndpoint, batch: &DeltaBatch) -> Result<BatchAck> {
        let mut request = self.client.post(peer.batch_url()).json(batch);
        if let Some(credentials) = &self.credentials {
            request = request.basic_auth(&credentials.username, Some(&credentials.password));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ReplicationError::Timeout {
                    peer: peer.to_string(),
                    timeout_ms: self.timeout.as_millis() as u64,
                }
            } else {
                ReplicationError::Unreachable {
                    peer: peer.to_string(),
                    message: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ReplicationError::Rejected {
                peer: peer.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(response.json::<BatchAck>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_parse() {
        let peer = PeerEndpoint::parse("http://registry-2:8761/").unwrap();
        assert_eq!(peer.batch_url(), "http://registry-2:8761/replication/batch");
        assert!(PeerEndpoint::parse("registry-2:8761").is_err());
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let credentials = PeerCredentials {
            username: "peer".into(),
            password: "secret".into(),
        };
        assert!(!format!("{:?}", credentials).contains("secret"));
    }
}
