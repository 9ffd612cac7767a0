//! Peer transport for WIPcoin
//!
//! The node talks to peers only through [`PeerTransport`]: pushing records
//! and blocks it originated, and fetching full chains during conflict
//! resolution. [`HttpTransport`] speaks the routes served by [`crate::api`].

use crate::blockchain::Block;
use crate::error::ChainError;
use crate::transaction::{Endorsement, Transfer};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How a peer answered a broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerResponse {
    Accepted,
    /// The peer's chain disagrees with ours; resolution is needed.
    Conflict,
    Declined,
}

impl PeerResponse {
    pub fn from_status(status: StatusCode) -> Self {
        if status.is_success() {
            PeerResponse::Accepted
        } else if status == StatusCode::CONFLICT {
            PeerResponse::Conflict
        } else {
            PeerResponse::Declined
        }
    }
}

/// Body of `POST /broadcast-block`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockEnvelope<B> {
    pub block: B,
}

#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn send_transfer(&self, peer: &str, transfer: &Transfer) -> Result<PeerResponse, ChainError>;

    async fn send_endorsement(
        &self,
        peer: &str,
        endorsement: &Endorsement,
    ) -> Result<PeerResponse, ChainError>;

    async fn send_block(&self, peer: &str, block: &Block) -> Result<PeerResponse, ChainError>;

    /// The peer's full chain, untyped; the caller reconstructs blocks.
    async fn fetch_chain(&self, peer: &str) -> Result<serde_json::Value, ChainError>;
}

/// JSON-over-HTTP transport. `peer` is a `host:port` address.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, ChainError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChainError::NetworkError(format!("Failed to build HTTP client: {}", e)))?;
        Ok(HttpTransport { client })
    }

    fn url(peer: &str, path: &str) -> String {
        format!("http://{}/{}", peer, path)
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        peer: &str,
        path: &str,
        body: &T,
    ) -> Result<PeerResponse, ChainError> {
        let response = self
            .client
            .post(Self::url(peer, path))
            .json(body)
            .send()
            .await?;
        Ok(PeerResponse::from_status(response.status()))
    }
}

#[async_trait]
impl PeerTransport for HttpTransport {
    async fn send_transfer(&self, peer: &str, transfer: &Transfer) -> Result<PeerResponse, ChainError> {
        self.post(peer, "broadcast-transaction", transfer).await
    }

    async fn send_endorsement(
        &self,
        peer: &str,
        endorsement: &Endorsement,
    ) -> Result<PeerResponse, ChainError> {
        self.post(peer, "broadcast-endorsement", endorsement).await
    }

    async fn send_block(&self, peer: &str, block: &Block) -> Result<PeerResponse, ChainError> {
        self.post(peer, "broadcast-block", &BlockEnvelope { block }).await
    }

    async fn fetch_chain(&self, peer: &str) -> Result<serde_json::Value, ChainError> {
        let response = self.client.get(Self::url(peer, "chain")).send().await?;
        if !response.status().is_success() {
            return Err(ChainError::NetworkError(format!(
                "Peer {} answered {} to chain request",
                peer,
                response.status()
            )));
        }
        Ok(response.json().await?)
    }
}
