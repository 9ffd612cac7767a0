//! Admission checks for records entering the pending pool
use crate::crypto::Signer;
use crate::error::ChainError;
use crate::transaction::types::{SignedRecord, MINING_SENDER};

/// Checks a record against the sender's current balance and the signer.
///
/// Balance and signature are the only rules; a non-positive amount is not
/// rejected here. Reward records are minted by the block producer only.
pub fn check_admission(
    record: &dyn SignedRecord,
    sender_balance: f64,
    signer: &dyn Signer,
) -> Result<(), ChainError> {
    if record.sender() == MINING_SENDER {
        return Err(ChainError::RejectedRecord(
            "Reward records cannot be submitted".to_string(),
        ));
    }

    if sender_balance < record.amount() {
        return Err(ChainError::RejectedRecord(format!(
            "Insufficient balance: sender has {} but the record moves {}",
            sender_balance,
            record.amount()
        )));
    }

    verify_signature(record, signer)
}

/// Signature-only check, used again by the block producer before sealing.
pub fn verify_signature(record: &dyn SignedRecord, signer: &dyn Signer) -> Result<(), ChainError> {
    if !signer.verify(record) {
        return Err(ChainError::RejectedRecord(format!(
            "Signature verification failed for record from {}",
            record.sender()
        )));
    }
    Ok(())
}
