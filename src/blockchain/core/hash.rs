//! Canonical encoding and digests.
//!
//! Every value that takes part in a hash is written field by field in a fixed
//! order. Strings are length-prefixed so that adjacent fields can never be
//! confused (`"ab" + "c"` and `"a" + "bc"` encode differently).

use sha2::{Digest, Sha256};

/// Fixed-order binary encoding used for block linking and proof of work.
pub trait Canonical {
    fn write_canonical(&self, out: &mut Vec<u8>);

    fn to_canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_canonical(&mut out);
        out
    }
}

pub fn put_str(out: &mut Vec<u8>, value: &str) {
    out.extend_from_slice(&(value.len() as u64).to_le_bytes());
    out.extend_from_slice(value.as_bytes());
}

pub fn put_u64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub fn put_f64(out: &mut Vec<u8>, value: f64) {
    out.extend_from_slice(&value.to_bits().to_le_bytes());
}

/// Writes the element count followed by each element.
pub fn put_list<T: Canonical>(out: &mut Vec<u8>, items: &[T]) {
    put_u64(out, items.len() as u64);
    for item in items {
        item.write_canonical(out);
    }
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
