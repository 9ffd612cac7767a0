//! Pending pool of records admitted but not yet confirmed in a block

use crate::blockchain::Block;
use crate::transaction::{Endorsement, Transfer};

/// Records in admission order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mempool {
    transfers: Vec<Transfer>,
    endorsements: Vec<Endorsement>,
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(transfers: Vec<Transfer>, endorsements: Vec<Endorsement>) -> Self {
        Mempool {
            transfers,
            endorsements,
        }
    }

    pub fn add_transfer(&mut self, transfer: Transfer) {
        self.transfers.push(transfer);
    }

    pub fn add_endorsement(&mut self, endorsement: Endorsement) {
        self.endorsements.push(endorsement);
    }

    pub fn transfers(&self) -> &[Transfer] {
        &self.transfers
    }

    pub fn endorsements(&self) -> &[Endorsement] {
        &self.endorsements
    }

    pub fn len(&self) -> usize {
        self.transfers.len() + self.endorsements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transfers.is_empty() && self.endorsements.is_empty()
    }

    pub fn clear(&mut self) {
        self.transfers.clear();
        self.endorsements.clear();
    }

    /// Drops one pending entry per record confirmed in `block`, matched on
    /// every field. Confirmed records with no pending match are ignored.
    /// Returns how many entries were removed.
    pub fn remove_confirmed(&mut self, block: &Block) -> usize {
        let mut removed = 0;
        for tx in &block.transfers {
            if remove_first(&mut self.transfers, tx) {
                removed += 1;
            }
        }
        for endorsement in &block.endorsements {
            if remove_first(&mut self.endorsements, endorsement) {
                removed += 1;
            }
        }
        removed
    }
}

fn remove_first<T: PartialEq>(pending: &mut Vec<T>, confirmed: &T) -> bool {
    match pending.iter().position(|p| p == confirmed) {
        Some(pos) => {
            pending.remove(pos);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn transfer(sender: &str, amount: f64) -> Transfer {
        Transfer::new(sender.to_string(), "bob".to_string(), "sig".to_string(), amount)
    }

    fn endorsement(place_id: Uuid, message: &str) -> Endorsement {
        Endorsement::new(
            "alice".to_string(),
            "author".to_string(),
            place_id,
            message.to_string(),
            "sig".to_string(),
            1.0,
        )
    }

    #[test]
    fn test_keeps_admission_order() {
        let mut pool = Mempool::new();
        pool.add_transfer(transfer("a", 1.0));
        pool.add_transfer(transfer("b", 2.0));
        assert_eq!(pool.transfers()[0].sender, "a");
        assert_eq!(pool.transfers()[1].sender, "b");
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_remove_confirmed_matches_all_fields() {
        let mut pool = Mempool::new();
        pool.add_transfer(transfer("alice", 1.0));
        pool.add_transfer(transfer("alice", 2.0));

        let mut block = Block::genesis();
        block.transfers = vec![transfer("alice", 2.0), transfer("MINING", 10.0)];

        assert_eq!(pool.remove_confirmed(&block), 1);
        assert_eq!(pool.transfers(), &[transfer("alice", 1.0)]);
    }

    #[test]
    fn test_remove_confirmed_takes_one_entry_per_record() {
        let mut pool = Mempool::new();
        pool.add_transfer(transfer("alice", 1.0));
        pool.add_transfer(transfer("alice", 1.0));

        let mut block = Block::genesis();
        block.transfers = vec![transfer("alice", 1.0)];

        assert_eq!(pool.remove_confirmed(&block), 1);
        assert_eq!(pool.transfers().len(), 1);
    }

    #[test]
    fn test_endorsement_match_uses_place_and_message() {
        let place = Uuid::new_v4();
        let mut pool = Mempool::new();
        pool.add_endorsement(endorsement(place, "hello"));

        let mut block = Block::genesis();
        block.endorsements = vec![endorsement(place, "different")];
        assert_eq!(pool.remove_confirmed(&block), 0);

        block.endorsements = vec![endorsement(Uuid::new_v4(), "hello")];
        assert_eq!(pool.remove_confirmed(&block), 0);

        block.endorsements = vec![endorsement(place, "hello")];
        assert_eq!(pool.remove_confirmed(&block), 1);
        assert!(pool.is_empty());
    }

    #[test]
    fn test_clear() {
        let mut pool = Mempool::new();
        pool.add_transfer(transfer("a", 1.0));
        pool.add_endorsement(endorsement(Uuid::nil(), "m"));
        pool.clear();
        assert!(pool.is_empty());
    }
}
