//! WIPcoin - A toy peer-to-peer ledger with transfers and paid endorsements
//!
//! # Architecture
//!
//! The crate is organized into logical modules:
//!
//! ## Core Ledger
//! - [`blockchain`] - Blocks, canonical hashing, balances and chain validation
//! - [`transaction`] - Transfer and endorsement records and their admission checks
//! - [`mempool`] - Records waiting to be mined
//!
//! ## Consensus
//! - [`miner`] - Proof-of-work search and verification
//!
//! ## Cryptography
//! - [`crypto`] - Key pairs and signature verification (secp256k1)
//!
//! ## Node
//! - [`node`] - The lock-guarded node that owns chain, pool and peers
//! - [`persistence`] - Snapshot stores (SQLite, JSON lines, in-memory)
//! - [`network`] - Peer transport (HTTP)
//! - [`api`] - REST API used by clients and peers
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Core Ledger
// ============================================================================
pub mod blockchain;
pub mod mempool;
pub mod transaction;

// ============================================================================
// Consensus & Mining
// ============================================================================
pub mod miner;

// ============================================================================
// Cryptography
// ============================================================================
pub mod crypto;

// ============================================================================
// Node
// ============================================================================
pub mod network;
pub mod node;
pub mod persistence;

// ============================================================================
// Integration
// ============================================================================
#[cfg(feature = "api")]
pub mod api;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod config;
pub mod error;
