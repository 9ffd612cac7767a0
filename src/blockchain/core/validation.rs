use crate::blockchain::core::chain::Block;
use crate::error::ChainError;
use crate::miner::valid_proof;

/// Checks a candidate block against the block it claims to extend.
///
/// The trailing reward transfer is left out of the proof check because the
/// miner appended it after the search.
pub fn check_candidate(previous: &Block, candidate: &Block) -> Result<(), ChainError> {
    if !valid_proof(
        candidate.proof_transfers(),
        &candidate.endorsements,
        &candidate.previous_hash,
        candidate.proof,
    ) {
        return Err(ChainError::InvalidProofOfWork);
    }

    if candidate.previous_hash != previous.hash() {
        return Err(ChainError::InvalidBlockLinkage);
    }

    Ok(())
}

/// Full-chain validation. The first block has no predecessor and is not
/// checked; any later failure invalidates the whole chain.
pub fn validate_chain(blocks: &[Block]) -> bool {
    if blocks.is_empty() {
        return false;
    }

    blocks.windows(2).all(|pair| {
        let result = check_candidate(&pair[0], &pair[1]);
        if let Err(e) = &result {
            tracing::debug!(index = pair[1].index, error = %e, "chain validation failed");
        }
        result.is_ok()
    })
}
