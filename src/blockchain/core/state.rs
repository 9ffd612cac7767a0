use crate::blockchain::core::chain::Block;
use crate::mempool::Mempool;
use crate::transaction::SignedRecord;

/// Net balance of `participant`: everything received in confirmed blocks,
/// minus everything sent in confirmed blocks and in the pending pool.
///
/// Rescans the whole chain on every call; no running total is cached.
pub fn balance_of(blocks: &[Block], mempool: &Mempool, participant: &str) -> f64 {
    let mut received = 0.0;
    let mut sent = 0.0;

    for block in blocks {
        for tx in &block.transfers {
            if tx.recipient == participant {
                received += tx.amount;
            }
            if tx.sender == participant {
                sent += tx.amount;
            }
        }
        for endorsement in &block.endorsements {
            if endorsement.recipient == participant {
                received += endorsement.amount;
            }
            if endorsement.sender == participant {
                sent += endorsement.amount;
            }
        }
    }

    sent += pending_sent(mempool.transfers(), participant);
    sent += pending_sent(mempool.endorsements(), participant);

    received - sent
}

fn pending_sent<R: SignedRecord>(records: &[R], participant: &str) -> f64 {
    records
        .iter()
        .filter(|r| r.sender() == participant)
        .map(|r| r.amount())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{Endorsement, Transfer};
    use uuid::Uuid;

    fn transfer(sender: &str, recipient: &str, amount: f64) -> Transfer {
        Transfer::new(sender.to_string(), recipient.to_string(), String::new(), amount)
    }

    fn endorsement(sender: &str, recipient: &str, amount: f64) -> Endorsement {
        Endorsement::new(
            sender.to_string(),
            recipient.to_string(),
            Uuid::nil(),
            "msg".to_string(),
            String::new(),
            amount,
        )
    }

    fn block_with(transfers: Vec<Transfer>, endorsements: Vec<Endorsement>) -> Block {
        let mut block = Block::genesis();
        block.transfers = transfers;
        block.endorsements = endorsements;
        block
    }

    #[test]
    fn test_unknown_participant_has_zero() {
        assert_eq!(balance_of(&[Block::genesis()], &Mempool::new(), "nobody"), 0.0);
    }

    #[test]
    fn test_confirmed_received_minus_sent() {
        let blocks = vec![
            block_with(vec![transfer("MINING", "alice", 10.0)], vec![]),
            block_with(
                vec![transfer("alice", "bob", 3.0), transfer("MINING", "alice", 10.0)],
                vec![endorsement("alice", "carol", 2.0)],
            ),
        ];
        let pool = Mempool::new();
        assert_eq!(balance_of(&blocks, &pool, "alice"), 15.0);
        assert_eq!(balance_of(&blocks, &pool, "bob"), 3.0);
        assert_eq!(balance_of(&blocks, &pool, "carol"), 2.0);
    }

    #[test]
    fn test_pending_sends_count_but_pending_receipts_do_not() {
        let blocks = vec![block_with(vec![transfer("MINING", "alice", 10.0)], vec![])];
        let mut pool = Mempool::new();
        pool.add_transfer(transfer("alice", "bob", 4.0));
        pool.add_endorsement(endorsement("alice", "carol", 1.0));

        assert_eq!(balance_of(&blocks, &pool, "alice"), 5.0);
        assert_eq!(balance_of(&blocks, &pool, "bob"), 0.0);
        assert_eq!(balance_of(&blocks, &pool, "carol"), 0.0);
    }

    #[test]
    fn test_unrelated_records_do_not_affect_balance() {
        let blocks = vec![block_with(
            vec![transfer("MINING", "alice", 10.0), transfer("dave", "erin", 7.0)],
            vec![endorsement("erin", "dave", 1.0)],
        )];
        let mut pool = Mempool::new();
        pool.add_transfer(transfer("dave", "erin", 2.0));

        assert_eq!(balance_of(&blocks, &pool, "alice"), 10.0);
    }
}
