//! Record types for WIPcoin
use crate::blockchain::core::hash::{put_f64, put_str, Canonical};
use crate::crypto::{Identity, KeyPair};
use crate::error::ChainError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sender used by the reward transfer a miner appends to its own block.
pub const MINING_SENDER: &str = "MINING";

/// Fixed reward credited to the miner of every block.
pub const MINING_REWARD: f64 = 10.0;

/// The view of a record that admission and signature checks need.
pub trait SignedRecord {
    fn sender(&self) -> &str;
    fn amount(&self) -> f64;
    fn signature(&self) -> &str;
    /// Bytes covered by the signature: every field except the signature itself.
    fn signable_message(&self) -> Vec<u8>;
}

/// A plain value transfer between two identities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transfer {
    pub sender: Identity,
    pub recipient: Identity,
    pub signature: String,
    pub amount: f64,
}

impl Transfer {
    pub fn new(sender: Identity, recipient: Identity, signature: String, amount: f64) -> Self {
        Transfer {
            sender,
            recipient,
            signature,
            amount,
        }
    }

    /// The unsigned reward record for `beneficiary`.
    pub fn reward(beneficiary: &str) -> Self {
        Transfer::new(
            MINING_SENDER.to_string(),
            beneficiary.to_string(),
            String::new(),
            MINING_REWARD,
        )
    }

    pub fn is_reward(&self) -> bool {
        self.sender == MINING_SENDER
    }

    /// Replaces the signature with one made by `keypair` over this record.
    pub fn sign(mut self, keypair: &KeyPair) -> Result<Self, ChainError> {
        self.signature = keypair.sign_hex(&self.signable_message())?;
        Ok(self)
    }
}

impl SignedRecord for Transfer {
    fn sender(&self) -> &str {
        &self.sender
    }

    fn amount(&self) -> f64 {
        self.amount
    }

    fn signature(&self) -> &str {
        &self.signature
    }

    fn signable_message(&self) -> Vec<u8> {
        let mut message = Vec::new();
        message.extend_from_slice("TRANSFER:".as_bytes());
        put_str(&mut message, &self.sender);
        put_str(&mut message, &self.recipient);
        put_f64(&mut message, self.amount);
        message
    }
}

impl Canonical for Transfer {
    fn write_canonical(&self, out: &mut Vec<u8>) {
        put_str(out, "transfer");
        put_str(out, &self.sender);
        put_str(out, &self.recipient);
        put_f64(out, self.amount);
        put_str(out, &self.signature);
    }
}

/// A paid message attached to a place (beacon), credited to its author.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endorsement {
    pub sender: Identity,
    pub recipient: Identity,
    pub place_id: Uuid,
    pub message: String,
    pub signature: String,
    pub amount: f64,
}

impl Endorsement {
    pub fn new(
        sender: Identity,
        recipient: Identity,
        place_id: Uuid,
        message: String,
        signature: String,
        amount: f64,
    ) -> Self {
        Endorsement {
            sender,
            recipient,
            place_id,
            message,
            signature,
            amount,
        }
    }

    pub fn sign(mut self, keypair: &KeyPair) -> Result<Self, ChainError> {
        self.signature = keypair.sign_hex(&self.signable_message())?;
        Ok(self)
    }
}

impl SignedRecord for Endorsement {
    fn sender(&self) -> &str {
        &self.sender
    }

    fn amount(&self) -> f64 {
        self.amount
    }

    fn signature(&self) -> &str {
        &self.signature
    }

    fn signable_message(&self) -> Vec<u8> {
        let mut message = Vec::new();
        message.extend_from_slice("ENDORSEMENT:".as_bytes());
        put_str(&mut message, &self.sender);
        put_str(&mut message, &self.recipient);
        put_str(&mut message, &self.place_id.hyphenated().to_string());
        put_str(&mut message, &self.message);
        put_f64(&mut message, self.amount);
        message
    }
}

impl Canonical for Endorsement {
    fn write_canonical(&self, out: &mut Vec<u8>) {
        put_str(out, "endorsement");
        put_str(out, &self.sender);
        put_str(out, &self.recipient);
        put_str(out, &self.place_id.hyphenated().to_string());
        put_str(out, &self.message);
        put_f64(out, self.amount);
        put_str(out, &self.signature);
    }
}
