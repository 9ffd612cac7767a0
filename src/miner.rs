//! Proof-of-work search and verification
//!
//! A candidate nonce is valid when the hex SHA-256 of the canonical encoding
//! of (transfers, endorsements, previous hash, nonce) starts with
//! [`PROOF_PREFIX`]. The difficulty is fixed.

use crate::blockchain::core::hash::{digest, put_list, put_str, put_u64};
use crate::transaction::{Endorsement, Transfer};
use rayon::prelude::*;

pub const PROOF_PREFIX: &str = "00";

/// Candidates tested per parallel round.
const SEARCH_BATCH: u64 = 4096;

/// Pre-encoded proof input; only the nonce varies between guesses.
struct ProofInput {
    prefix: Vec<u8>,
}

impl ProofInput {
    fn new(transfers: &[Transfer], endorsements: &[Endorsement], previous_hash: &str) -> Self {
        let mut prefix = Vec::new();
        put_list(&mut prefix, transfers);
        put_list(&mut prefix, endorsements);
        put_str(&mut prefix, previous_hash);
        ProofInput { prefix }
    }

    fn check(&self, candidate: u64) -> bool {
        let mut guess = Vec::with_capacity(self.prefix.len() + 8);
        guess.extend_from_slice(&self.prefix);
        put_u64(&mut guess, candidate);
        digest(&guess).starts_with(PROOF_PREFIX)
    }
}

pub fn valid_proof(
    transfers: &[Transfer],
    endorsements: &[Endorsement],
    previous_hash: &str,
    candidate: u64,
) -> bool {
    ProofInput::new(transfers, endorsements, previous_hash).check(candidate)
}

/// Returns the smallest nonce, counting up from 0, that satisfies
/// [`valid_proof`]. Unbounded: it runs until a nonce is found.
pub fn search_proof(transfers: &[Transfer], endorsements: &[Endorsement], previous_hash: &str) -> u64 {
    let input = ProofInput::new(transfers, endorsements, previous_hash);
    let mut start = 0u64;
    loop {
        let end = start.saturating_add(SEARCH_BATCH);
        if let Some(proof) = (start..end).into_par_iter().find_first(|c| input.check(*c)) {
            return proof;
        }
        start = end;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn sample_transfers() -> Vec<Transfer> {
        vec![Transfer::new("alice".to_string(), "bob".to_string(), "sig".to_string(), 3.0)]
    }

    #[test]
    fn test_search_finds_first_valid_nonce() {
        let transfers = sample_transfers();
        let proof = search_proof(&transfers, &[], "abc");

        assert!(valid_proof(&transfers, &[], "abc", proof));
        for earlier in 0..proof {
            assert!(!valid_proof(&transfers, &[], "abc", earlier));
        }
    }

    #[test]
    fn test_valid_proof_is_deterministic() {
        let transfers = sample_transfers();
        for candidate in 0..64 {
            assert_eq!(
                valid_proof(&transfers, &[], "abc", candidate),
                valid_proof(&transfers, &[], "abc", candidate)
            );
        }
    }

    #[test]
    fn test_proof_is_bound_to_previous_hash() {
        let transfers = sample_transfers();
        let differs = (0..1024)
            .any(|c| valid_proof(&transfers, &[], "abc", c) != valid_proof(&transfers, &[], "abd", c));
        assert!(differs);
    }

    #[test]
    fn test_endorsements_take_part_in_proof() {
        let endorsements = vec![Endorsement::new(
            "alice".to_string(),
            "author".to_string(),
            Uuid::nil(),
            "hi".to_string(),
            "sig".to_string(),
            1.0,
        )];
        let proof = search_proof(&[], &endorsements, "abc");
        assert!(valid_proof(&[], &endorsements, "abc", proof));

        let differs = (0..1024)
            .any(|c| valid_proof(&[], &endorsements, "abc", c) != valid_proof(&[], &[], "abc", c));
        assert!(differs);
    }
}
