use crate::blockchain::core::hash::{digest, put_list, put_str, put_u64, Canonical};
use crate::blockchain::core::state::balance_of;
use crate::blockchain::core::validation::{check_candidate, validate_chain};
use crate::crypto::Signer;
use crate::error::ChainError;
use crate::mempool::Mempool;
use crate::transaction::{check_admission, verify_signature, Endorsement, Transfer};
use serde::{Deserialize, Serialize};

/// Timestamp of the genesis block, shared by every node.
pub const GENESIS_TIMESTAMP: u64 = 0;
/// Proof recorded in the genesis block.
pub const GENESIS_PROOF: u64 = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub index: u64,
    pub previous_hash: String,
    pub transfers: Vec<Transfer>,
    pub endorsements: Vec<Endorsement>,
    pub proof: u64,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
}

impl Block {
    /// Builds a block stamped with the current time.
    pub fn new(
        index: u64,
        previous_hash: String,
        transfers: Vec<Transfer>,
        endorsements: Vec<Endorsement>,
        proof: u64,
    ) -> Self {
        let timestamp = chrono::Utc::now().timestamp_millis() as u64;
        Block {
            index,
            previous_hash,
            transfers,
            endorsements,
            proof,
            timestamp,
        }
    }

    pub fn genesis() -> Self {
        Block {
            index: 0,
            previous_hash: String::new(),
            transfers: Vec::new(),
            endorsements: Vec::new(),
            proof: GENESIS_PROOF,
            timestamp: GENESIS_TIMESTAMP,
        }
    }

    /// Hex digest of the canonical encoding; the next block's `previous_hash`.
    pub fn hash(&self) -> String {
        digest(&self.to_canonical_bytes())
    }

    /// Transfers that took part in the proof search: all but the trailing reward.
    pub fn proof_transfers(&self) -> &[Transfer] {
        match self.transfers.split_last() {
            Some((_, rest)) => rest,
            None => &[],
        }
    }
}

impl Canonical for Block {
    fn write_canonical(&self, out: &mut Vec<u8>) {
        put_u64(out, self.index);
        put_str(out, &self.previous_hash);
        put_list(out, &self.transfers);
        put_list(out, &self.endorsements);
        put_u64(out, self.proof);
        put_u64(out, self.timestamp);
    }
}

/// Inputs to one proof search, captured from the chain tip and pending pool.
#[derive(Debug, Clone)]
pub struct MiningJob {
    pub index: u64,
    pub previous_hash: String,
    pub transfers: Vec<Transfer>,
    pub endorsements: Vec<Endorsement>,
}

/// The confirmed chain together with the records waiting to be mined.
#[derive(Debug, Clone)]
pub struct Blockchain {
    pub blocks: Vec<Block>,
    pub mempool: Mempool,
}

impl Default for Blockchain {
    fn default() -> Self {
        Self::new()
    }
}

impl Blockchain {
    /// A chain holding only the genesis block and an empty pool.
    pub fn new() -> Self {
        Blockchain {
            blocks: vec![Block::genesis()],
            mempool: Mempool::new(),
        }
    }

    /// Rebuilds a chain from persisted parts. An empty block list means no
    /// chain was ever saved, so the chain restarts from genesis.
    pub fn from_parts(blocks: Vec<Block>, mempool: Mempool) -> Self {
        if blocks.is_empty() {
            return Blockchain {
                blocks: vec![Block::genesis()],
                mempool,
            };
        }
        Blockchain { blocks, mempool }
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn last_block(&self) -> &Block {
        // Non-empty: constructors seed genesis and `replace_blocks` ignores empty input.
        &self.blocks[self.blocks.len() - 1]
    }

    pub fn last_hash(&self) -> String {
        self.last_block().hash()
    }

    pub fn is_valid(&self) -> bool {
        validate_chain(&self.blocks)
    }

    pub fn balance(&self, participant: &str) -> f64 {
        balance_of(&self.blocks, &self.mempool, participant)
    }

    /// Queues a transfer after the balance and signature checks.
    pub fn admit_transfer(&mut self, transfer: Transfer, signer: &dyn Signer) -> Result<(), ChainError> {
        check_admission(&transfer, self.balance(&transfer.sender), signer)?;
        self.mempool.add_transfer(transfer);
        Ok(())
    }

    pub fn admit_endorsement(
        &mut self,
        endorsement: Endorsement,
        signer: &dyn Signer,
    ) -> Result<(), ChainError> {
        check_admission(&endorsement, self.balance(&endorsement.sender), signer)?;
        self.mempool.add_endorsement(endorsement);
        Ok(())
    }

    pub fn mining_job(&self) -> MiningJob {
        MiningJob {
            index: self.blocks.len() as u64,
            previous_hash: self.last_hash(),
            transfers: self.mempool.transfers().to_vec(),
            endorsements: self.mempool.endorsements().to_vec(),
        }
    }

    /// Seals a block from a finished proof search.
    ///
    /// Fails without touching the chain or pool when the tip moved since the
    /// job was captured, or when any pending record no longer verifies. On
    /// success exactly the sealed records leave the pool.
    pub fn commit_mined(
        &mut self,
        job: MiningJob,
        proof: u64,
        beneficiary: &str,
        signer: &dyn Signer,
    ) -> Result<Block, ChainError> {
        if job.index != self.blocks.len() as u64 || job.previous_hash != self.last_hash() {
            return Err(ChainError::StaleBlock);
        }

        for tx in &job.transfers {
            verify_signature(tx, signer)?;
        }
        for endorsement in &job.endorsements {
            verify_signature(endorsement, signer)?;
        }

        let mut transfers = job.transfers;
        transfers.push(Transfer::reward(beneficiary));

        let block = Block::new(job.index, job.previous_hash, transfers, job.endorsements, proof);
        self.blocks.push(block.clone());
        self.mempool.remove_confirmed(&block);
        Ok(block)
    }

    /// Appends a block produced elsewhere once its proof and linkage check out.
    pub fn accept_block(&mut self, block: Block) -> Result<(), ChainError> {
        check_candidate(self.last_block(), &block)?;
        self.mempool.remove_confirmed(&block);
        self.blocks.push(block);
        Ok(())
    }

    /// Installs a chain that won conflict resolution; the pending pool is
    /// dropped along with the old chain.
    pub fn replace_blocks(&mut self, blocks: Vec<Block>) {
        if blocks.is_empty() {
            return;
        }
        self.blocks = blocks;
        self.mempool.clear();
    }
}
