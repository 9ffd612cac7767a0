//! The WIPcoin node: the single owner of chain, pending pool and peer set
//!
//! Every mutation runs under one write lock. Mining holds the lock only to
//! capture its job and to commit; the proof search itself runs on a blocking
//! thread. Peer traffic happens after the lock is released and is bounded by
//! a per-peer timeout.

use crate::blockchain::{validate_chain, Block, Blockchain};
use crate::config::Config;
use crate::crypto::{KeyPair, Secp256k1Signer, Signer};
use crate::error::ChainError;
use crate::miner::search_proof;
use crate::network::{HttpTransport, PeerResponse, PeerTransport};
use crate::persistence::{open_store, Persistence, Snapshot};
use crate::transaction::{Endorsement, Transfer};
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

const DEFAULT_PEER_TIMEOUT: Duration = Duration::from_secs(3);

/// Where a record entered this node. Only locally originated records are
/// forwarded to peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Local,
    Peer,
}

/// Outcome of a block pushed to us by a peer.
#[derive(Debug, Clone)]
pub enum BlockReceipt {
    /// The block extended our chain.
    Added,
    /// The block was the next index but failed validation.
    Rejected(ChainError),
    /// The peer is more than one block ahead; resolution is now needed.
    Ahead,
    /// The peer is not ahead of us.
    Behind,
}

#[derive(Debug, Clone, Default)]
pub struct NodeState {
    pub chain: Blockchain,
    pub peers: BTreeSet<String>,
}

pub struct Node {
    state: RwLock<NodeState>,
    resolution_needed: AtomicBool,
    wallet: Option<KeyPair>,
    signer: Arc<dyn Signer>,
    transport: Arc<dyn PeerTransport>,
    persistence: Arc<dyn Persistence>,
    peer_timeout: Duration,
}

impl Node {
    /// Restores the last snapshot from `persistence`, or starts from genesis
    /// when none exists.
    pub fn new(
        wallet: Option<KeyPair>,
        transport: Arc<dyn PeerTransport>,
        persistence: Arc<dyn Persistence>,
    ) -> Result<Self, ChainError> {
        let state = match persistence.load_snapshot()? {
            Some(snapshot) => {
                let (chain, peers) = snapshot.into_parts();
                info!(blocks = chain.len(), pending = chain.mempool.len(), peers = peers.len(), "restored snapshot");
                NodeState { chain, peers }
            }
            None => {
                info!("no snapshot found, starting from genesis");
                NodeState::default()
            }
        };

        Ok(Node {
            state: RwLock::new(state),
            resolution_needed: AtomicBool::new(false),
            wallet,
            signer: Arc::new(Secp256k1Signer),
            transport,
            persistence,
            peer_timeout: DEFAULT_PEER_TIMEOUT,
        })
    }

    /// Wires a node from configuration: HTTP transport, the configured
    /// snapshot backend, the miner key, and the seed peers.
    pub async fn from_config(config: &Config) -> Result<Self, ChainError> {
        let wallet = match &config.miner.secret_key {
            Some(secret) => Some(KeyPair::from_secret_hex(secret)?),
            None => None,
        };
        let transport = Arc::new(HttpTransport::new(config.network.peer_timeout())?);
        let persistence = open_store(&config.database, &config.node.id)?;

        let node = Node::new(wallet, transport, persistence)?.with_peer_timeout(config.network.peer_timeout());
        for peer in &config.network.peers {
            node.add_peer(peer).await;
        }
        Ok(node)
    }

    pub fn with_signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = signer;
        self
    }

    pub fn with_peer_timeout(mut self, timeout: Duration) -> Self {
        self.peer_timeout = timeout;
        self
    }

    pub fn identity(&self) -> Option<String> {
        self.wallet.as_ref().map(KeyPair::identity)
    }

    pub fn needs_resolution(&self) -> bool {
        self.resolution_needed.load(Ordering::SeqCst)
    }

    fn flag_resolution(&self) {
        self.resolution_needed.store(true, Ordering::SeqCst);
    }

    /// Writes the full state on a blocking thread. Callers keep the write
    /// guard across the await so snapshots land in mutation order. Failures
    /// are logged; the in-memory state stays authoritative.
    async fn persist(&self, state: &NodeState) {
        let snapshot = Snapshot::capture(&state.chain, &state.peers);
        let persistence = self.persistence.clone();
        let saved = tokio::task::spawn_blocking(move || persistence.save_snapshot(&snapshot))
            .await
            .map_err(|e| ChainError::DatabaseError(format!("Snapshot task failed: {}", e)))
            .and_then(|result| result);
        if let Err(e) = saved {
            warn!(error = %e, "failed to save snapshot");
        }
    }

    // ------------------------------------------------------------------
    // Record admission
    // ------------------------------------------------------------------

    pub async fn admit_transfer(&self, transfer: Transfer, origin: Origin) -> Result<(), ChainError> {
        let peers = {
            let mut state = self.state.write().await;
            state.chain.admit_transfer(transfer.clone(), self.signer.as_ref())?;
            self.persist(&state).await;
            state.peers.iter().cloned().collect::<Vec<_>>()
        };
        info!(sender = %transfer.sender, recipient = %transfer.recipient, amount = transfer.amount, ?origin, "transfer admitted");

        if origin == Origin::Local {
            self.fan_out(peers, "transfer", move |transport, peer| {
                let transfer = transfer.clone();
                async move { transport.send_transfer(&peer, &transfer).await }
            })
            .await;
        }
        Ok(())
    }

    pub async fn admit_endorsement(&self, endorsement: Endorsement, origin: Origin) -> Result<(), ChainError> {
        let peers = {
            let mut state = self.state.write().await;
            state.chain.admit_endorsement(endorsement.clone(), self.signer.as_ref())?;
            self.persist(&state).await;
            state.peers.iter().cloned().collect::<Vec<_>>()
        };
        info!(sender = %endorsement.sender, place = %endorsement.place_id, amount = endorsement.amount, ?origin, "endorsement admitted");

        if origin == Origin::Local {
            self.fan_out(peers, "endorsement", move |transport, peer| {
                let endorsement = endorsement.clone();
                async move { transport.send_endorsement(&peer, &endorsement).await }
            })
            .await;
        }
        Ok(())
    }

    /// Signs a transfer from this node's identity and admits it locally.
    pub async fn create_transfer(&self, recipient: String, amount: f64) -> Result<Transfer, ChainError> {
        let wallet = self.wallet.as_ref().ok_or(ChainError::MissingIdentity)?;
        let transfer = Transfer::new(wallet.identity(), recipient, String::new(), amount).sign(wallet)?;
        self.admit_transfer(transfer.clone(), Origin::Local).await?;
        Ok(transfer)
    }

    pub async fn create_endorsement(
        &self,
        recipient: String,
        place_id: Uuid,
        message: String,
        amount: f64,
    ) -> Result<Endorsement, ChainError> {
        let wallet = self.wallet.as_ref().ok_or(ChainError::MissingIdentity)?;
        let endorsement =
            Endorsement::new(wallet.identity(), recipient, place_id, message, String::new(), amount).sign(wallet)?;
        self.admit_endorsement(endorsement.clone(), Origin::Local).await?;
        Ok(endorsement)
    }

    // ------------------------------------------------------------------
    // Blocks
    // ------------------------------------------------------------------

    /// Mines the current pending pool into a new block.
    ///
    /// Fails with `StaleBlock` when another block landed during the search;
    /// the pool is then left as it was.
    pub async fn mine_block(&self) -> Result<Block, ChainError> {
        let wallet = self.wallet.as_ref().ok_or(ChainError::MissingIdentity)?;
        let job = self.state.read().await.chain.mining_job();
        debug!(index = job.index, transfers = job.transfers.len(), endorsements = job.endorsements.len(), "proof search started");

        let (job, proof) = tokio::task::spawn_blocking(move || {
            let proof = search_proof(&job.transfers, &job.endorsements, &job.previous_hash);
            (job, proof)
        })
        .await
        .map_err(|e| ChainError::MiningError(format!("Proof search task failed: {}", e)))?;

        let (block, peers) = {
            let mut state = self.state.write().await;
            let block = state
                .chain
                .commit_mined(job, proof, &wallet.identity(), self.signer.as_ref())?;
            self.persist(&state).await;
            (block, state.peers.iter().cloned().collect::<Vec<_>>())
        };
        info!(index = block.index, proof = block.proof, transfers = block.transfers.len(), "block mined");

        let broadcast = block.clone();
        self.fan_out(peers, "block", move |transport, peer| {
            let block = broadcast.clone();
            async move { transport.send_block(&peer, &block).await }
        })
        .await;
        Ok(block)
    }

    /// Validates and appends a block produced elsewhere. Never broadcasts.
    pub async fn accept_block(&self, raw: serde_json::Value) -> Result<(), ChainError> {
        let block = parse_block(raw)?;
        let mut state = self.state.write().await;
        self.apply_block(&mut state, block).await
    }

    /// Dispatches a block a peer pushed to us by its index relative to our tip.
    pub async fn receive_block(&self, raw: serde_json::Value) -> BlockReceipt {
        let block = match parse_block(raw) {
            Ok(block) => block,
            Err(e) => return BlockReceipt::Rejected(e),
        };

        let mut state = self.state.write().await;
        let next_index = state.chain.last_block().index + 1;
        if block.index == next_index {
            match self.apply_block(&mut state, block).await {
                Ok(()) => BlockReceipt::Added,
                Err(e) => BlockReceipt::Rejected(e),
            }
        } else if block.index > next_index {
            info!(index = block.index, expected = next_index, "peer is ahead, resolution needed");
            self.flag_resolution();
            BlockReceipt::Ahead
        } else {
            debug!(index = block.index, expected = next_index, "peer block is behind our tip");
            BlockReceipt::Behind
        }
    }

    async fn apply_block(&self, state: &mut NodeState, block: Block) -> Result<(), ChainError> {
        let index = block.index;
        if let Err(e) = state.chain.accept_block(block) {
            warn!(index, error = %e, "rejected block");
            return Err(e);
        }
        self.persist(state).await;
        info!(index, "accepted block");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Conflict resolution
    // ------------------------------------------------------------------

    /// Adopts the longest valid chain among the local one and every peer's.
    /// Returns whether the local chain was replaced.
    pub async fn resolve_conflicts(&self) -> bool {
        let peers: Vec<String> = self.state.read().await.peers.iter().cloned().collect();
        let fetched = self.fetch_chains(peers).await;

        let mut state = self.state.write().await;
        let mut best_len = state.chain.len();
        let mut winner: Option<(String, Vec<Block>)> = None;
        for (peer, blocks) in fetched {
            if blocks.len() > best_len && validate_chain(&blocks) {
                best_len = blocks.len();
                winner = Some((peer, blocks));
            } else if blocks.len() > best_len {
                warn!(peer = %peer, length = blocks.len(), "ignoring longer but invalid chain");
            }
        }

        let replaced = match winner {
            Some((peer, blocks)) => {
                info!(peer = %peer, length = blocks.len(), "replacing local chain");
                state.chain.replace_blocks(blocks);
                true
            }
            None => false,
        };
        self.resolution_needed.store(false, Ordering::SeqCst);
        self.persist(&state).await;
        replaced
    }

    /// Fetches every peer's chain concurrently, skipping failures. Results
    /// are ordered by peer address.
    async fn fetch_chains(&self, peers: Vec<String>) -> Vec<(String, Vec<Block>)> {
        let mut tasks = JoinSet::new();
        for peer in peers {
            let transport = self.transport.clone();
            let timeout = self.peer_timeout;
            tasks.spawn(async move {
                let result = tokio::time::timeout(timeout, transport.fetch_chain(&peer)).await;
                (peer, result)
            });
        }

        let mut fetched = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((peer, Ok(Ok(raw)))) => match serde_json::from_value::<Vec<Block>>(raw) {
                    Ok(blocks) => fetched.push((peer, blocks)),
                    Err(e) => warn!(peer = %peer, error = %e, "peer sent a malformed chain"),
                },
                Ok((peer, Ok(Err(e)))) => warn!(peer = %peer, error = %e, "chain fetch failed"),
                Ok((peer, Err(_))) => warn!(peer = %peer, "chain fetch timed out"),
                Err(e) => warn!(error = %e, "chain fetch task failed"),
            }
        }
        fetched.sort_by(|a, b| a.0.cmp(&b.0));
        fetched
    }

    // ------------------------------------------------------------------
    // Broadcast
    // ------------------------------------------------------------------

    /// Sends to every peer concurrently. Each peer is bounded by the peer
    /// timeout; failures are logged and skipped, conflicts set the
    /// resolution flag.
    async fn fan_out<F, Fut>(&self, peers: Vec<String>, kind: &'static str, send: F)
    where
        F: Fn(Arc<dyn PeerTransport>, String) -> Fut,
        Fut: Future<Output = Result<PeerResponse, ChainError>> + Send + 'static,
    {
        let mut tasks = JoinSet::new();
        for peer in peers {
            let delivery = send(self.transport.clone(), peer.clone());
            let timeout = self.peer_timeout;
            tasks.spawn(async move { (peer, tokio::time::timeout(timeout, delivery).await) });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((peer, Ok(Ok(PeerResponse::Accepted)))) => debug!(peer = %peer, kind, "peer accepted"),
                Ok((peer, Ok(Ok(PeerResponse::Conflict)))) => {
                    warn!(peer = %peer, kind, "peer reported a conflict, resolution needed");
                    self.flag_resolution();
                }
                Ok((peer, Ok(Ok(PeerResponse::Declined)))) => warn!(peer = %peer, kind, "peer declined"),
                Ok((peer, Ok(Err(e)))) => warn!(peer = %peer, kind, error = %e, "broadcast failed"),
                Ok((peer, Err(_))) => warn!(peer = %peer, kind, "broadcast timed out"),
                Err(e) => warn!(kind, error = %e, "broadcast task failed"),
            }
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub async fn balance(&self, participant: &str) -> f64 {
        self.state.read().await.chain.balance(participant)
    }

    pub async fn own_balance(&self) -> Option<f64> {
        match self.identity() {
            Some(identity) => Some(self.balance(&identity).await),
            None => None,
        }
    }

    pub async fn export_chain(&self) -> Vec<Block> {
        self.state.read().await.chain.blocks.clone()
    }

    pub async fn pending_transfers(&self) -> Vec<Transfer> {
        self.state.read().await.chain.mempool.transfers().to_vec()
    }

    pub async fn pending_endorsements(&self) -> Vec<Endorsement> {
        self.state.read().await.chain.mempool.endorsements().to_vec()
    }

    // ------------------------------------------------------------------
    // Peers
    // ------------------------------------------------------------------

    pub async fn peers(&self) -> Vec<String> {
        self.state.read().await.peers.iter().cloned().collect()
    }

    /// Returns false when the address was already known.
    pub async fn add_peer(&self, address: &str) -> bool {
        let mut state = self.state.write().await;
        let added = state.peers.insert(address.to_string());
        if added {
            self.persist(&state).await;
            info!(peer = %address, "peer added");
        }
        added
    }

    /// Returns false when the address was not known.
    pub async fn remove_peer(&self, address: &str) -> bool {
        let mut state = self.state.write().await;
        let removed = state.peers.remove(address);
        if removed {
            self.persist(&state).await;
            info!(peer = %address, "peer removed");
        }
        removed
    }
}

fn parse_block(raw: serde_json::Value) -> Result<Block, ChainError> {
    serde_json::from_value(raw).map_err(|e| ChainError::InvalidBlock(format!("Malformed block: {}", e)))
}
