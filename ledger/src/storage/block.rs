//! # Chained Blocks
//!
//! The persistent ledger wraps every payload in a small record that links
//! it to its predecessor:
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  index: u64        (0 for the first block)   │
//! │  timestamp: i64    (Unix milliseconds)       │
//! │  prev_hash: hex    (zeros for the first)     │
//! │  hash: hex         (BLAKE3, see below)       │
//! │  data: Payload                               │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Hash Computation
//!
//! `hash = BLAKE3(index_be || timestamp_be || prev_hash || canonical(data))`.
//! The hash never covers itself, so recomputing it over a stored block is
//! enough to detect tampering with any other field.

use serde::{Deserialize, Serialize};

use crate::config::ZERO_HASH_HEX;
use crate::error::{LedgerError, LedgerResult};
use crate::payload::Payload;

/// A payload plus the fields that chain it into the ledger.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChainedBlock {
    /// Position in the chain, starting at 0.
    pub index: u64,
    /// Unix timestamp (milliseconds) at which the block was appended.
    pub timestamp: i64,
    /// Hex hash of the previous block.
    pub prev_hash: String,
    /// Hex BLAKE3 hash of this block's other fields.
    pub hash: String,
    /// The client's payload, untouched.
    pub data: Payload,
}

impl ChainedBlock {
    /// The first block of a chain.
    pub fn first(data: Payload, timestamp: i64) -> Self {
        Self::build(0, timestamp, ZERO_HASH_HEX.to_string(), data)
    }

    /// A block extending `parent`.
    pub fn next(parent: &ChainedBlock, data: Payload, timestamp: i64) -> Self {
        Self::build(parent.index + 1, timestamp, parent.hash.clone(), data)
    }

    fn build(index: u64, timestamp: i64, prev_hash: String, data: Payload) -> Self {
        let hash = compute_block_hash(index, timestamp, &prev_hash, &data);
        Self {
            index,
            timestamp,
            prev_hash,
            hash,
            data,
        }
    }

    pub fn compute_hash(&self) -> String {
        compute_block_hash(self.index, self.timestamp, &self.prev_hash, &self.data)
    }

    /// Check this block against the one before it (`None` for the first).
    ///
    /// Verifies the stored hash, the index sequence, and the `prev_hash`
    /// link. Timestamps are not checked: clocks move backwards sometimes.
    pub fn verify(&self, parent: Option<&ChainedBlock>) -> LedgerResult<()> {
        let computed = self.compute_hash();
        if self.hash != computed {
            return Err(self.corrupted(format!(
                "hash mismatch: stored={}, computed={}",
                self.hash, computed
            )));
        }

        match parent {
            None => {
                if self.index != 0 {
                    return Err(self.corrupted("first block must have index 0".to_string()));
                }
                if self.prev_hash != ZERO_HASH_HEX {
                    return Err(self.corrupted("first block must have a zeroed prev_hash".to_string()));
                }
            }
            Some(parent) => {
                if self.index != parent.index + 1 {
                    return Err(self.corrupted(format!(
                        "index does not follow parent {}",
                        parent.index
                    )));
                }
                if self.prev_hash != parent.hash {
                    return Err(self.corrupted(format!(
                        "prev_hash does not match parent {}",
                        parent.index
                    )));
                }
            }
        }

        Ok(())
    }

    fn corrupted(&self, reason: String) -> LedgerError {
        LedgerError::Corrupted {
            index: self.index,
            reason,
        }
    }
}

/// Hex BLAKE3 over the block's linked fields.
pub fn compute_block_hash(index: u64, timestamp: i64, prev_hash: &str, data: &Payload) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&index.to_be_bytes());
    hasher.update(&timestamp.to_be_bytes());
    hasher.update(prev_hash.as_bytes());
    hasher.update(&data.canonical_bytes());
    hex::encode(hasher.finalize().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(amount: i64) -> Payload {
        json!({ "amount": amount }).into()
    }

    #[test]
    fn first_block_properties() {
        let block = ChainedBlock::first(payload(10), 1_000);
        assert_eq!(block.index, 0);
        assert_eq!(block.prev_hash, ZERO_HASH_HEX);
        assert_eq!(block.hash.len(), 64);
        assert!(block.verify(None).is_ok());
    }

    #[test]
    fn hash_is_deterministic() {
        let a = ChainedBlock::first(payload(10), 1_000);
        let b = ChainedBlock::first(payload(10), 1_000);
        assert_eq!(a.hash, b.hash);

        let c = ChainedBlock::first(payload(11), 1_000);
        assert_ne!(a.hash, c.hash);
    }

    #[test]
    fn next_block_links_to_parent() {
        let first = ChainedBlock::first(payload(10), 1_000);
        let second = ChainedBlock::next(&first, payload(-3), 2_000);

        assert_eq!(second.index, 1);
        assert_eq!(second.prev_hash, first.hash);
        assert!(second.verify(Some(&first)).is_ok());
    }

    #[test]
    fn tampered_payload_fails_verification() {
        let mut block = ChainedBlock::first(payload(10), 1_000);
        block.data = payload(1_000_000);

        match block.verify(None) {
            Err(LedgerError::Corrupted { index, reason }) => {
                assert_eq!(index, 0);
                assert!(reason.contains("hash mismatch"));
            }
            other => panic!("expected corruption, got {other:?}"),
        }
    }

    #[test]
    fn broken_link_fails_verification() {
        let first = ChainedBlock::first(payload(10), 1_000);
        let stranger = ChainedBlock::first(payload(99), 1_500);
        let orphan = ChainedBlock::next(&stranger, payload(-3), 2_000);

        let err = orphan.verify(Some(&first)).unwrap_err();
        assert!(err.to_string().contains("prev_hash"));
    }

    #[test]
    fn serializes_payload_under_data() {
        let block = ChainedBlock::first(payload(10), 1_000);
        let value = serde_json::to_value(&block).unwrap();
        assert_eq!(value["data"], json!({"amount": 10}));
        assert_eq!(value["index"], json!(0));
    }
}
