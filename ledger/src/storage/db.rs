//! # SledLedger, the Persistent Ledger
//!
//! Hash-chained blocks on top of sled's embedded key-value store.
//!
//! ## Tree Layout
//!
//! | Tree     | Key               | Value                  |
//! |----------|-------------------|------------------------|
//! | `blocks` | `index` (8B BE)   | `json(ChainedBlock)`   |
//!
//! Indices are stored big-endian so sled's lexicographic ordering matches
//! append order. That gives us the tip for free (`Tree::last`) and makes a
//! full scan come back oldest first.
//!
//! Blocks are stored as JSON rather than bincode: the payload is an
//! arbitrary `serde_json::Value`, which only self-describing formats can
//! read back.
//!
//! ## Concurrency
//!
//! sled handles concurrent readers on its own. Appends take an internal
//! mutex so that reading the tip and writing its successor happen as one
//! step; two writers can never both extend the same parent.

use parking_lot::Mutex;
use sled::{Db, IVec, Tree};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use super::block::ChainedBlock;
use crate::config::BLOCKS_TREE;
use crate::error::{LedgerError, LedgerResult};
use crate::payload::Payload;
use crate::Ledger;

/// Persistent [`Ledger`] stored in a sled database.
#[derive(Debug)]
pub struct SledLedger {
    /// The underlying sled database handle.
    db: Db,
    /// Blocks indexed by position (big-endian u64 keys).
    blocks: Tree,
    /// Serializes appends.
    append_lock: Mutex<()>,
    closed: AtomicBool,
}

impl SledLedger {
    /// Open or create a ledger at the given filesystem path.
    pub fn open_path<P: AsRef<Path>>(path: P) -> LedgerResult<Self> {
        let db = sled::open(path).map_err(|e| LedgerError::Open(e.to_string()))?;
        Self::from_db(db)
    }

    /// A ledger that lives in a temporary location and disappears when
    /// dropped. For tests.
    pub fn open_temporary() -> LedgerResult<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| LedgerError::Open(e.to_string()))?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> LedgerResult<Self> {
        let blocks = db
            .open_tree(BLOCKS_TREE)
            .map_err(|e| LedgerError::Open(e.to_string()))?;

        Ok(Self {
            db,
            blocks,
            append_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
        })
    }

    /// Number of stored blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Walk the whole chain and check every hash and link.
    ///
    /// Returns the number of blocks verified.
    pub fn verify(&self) -> LedgerResult<u64> {
        self.ensure_open()?;

        let mut parent: Option<ChainedBlock> = None;
        let mut count = 0u64;
        for entry in self.blocks.iter() {
            let (key, value) = entry.map_err(|e| LedgerError::Read(e.to_string()))?;
            let block = decode_block(&value)?;
            if key.as_ref() != &block.index.to_be_bytes()[..] {
                return Err(LedgerError::Corrupted {
                    index: block.index,
                    reason: "stored under the wrong key".to_string(),
                });
            }
            block.verify(parent.as_ref())?;
            parent = Some(block);
            count += 1;
        }

        tracing::debug!(blocks = count, "ledger verified");
        Ok(count)
    }

    fn ensure_open(&self) -> LedgerResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(LedgerError::Closed);
        }
        Ok(())
    }

    fn tip(&self) -> LedgerResult<Option<ChainedBlock>> {
        match self.blocks.last().map_err(|e| LedgerError::Read(e.to_string()))? {
            Some((_key, value)) => decode_block(&value).map(Some),
            None => Ok(None),
        }
    }
}

impl Ledger for SledLedger {
    type Block = ChainedBlock;

    fn open(name: &str) -> LedgerResult<Self> {
        let ledger = Self::open_path(name)?;
        tracing::info!(path = name, blocks = ledger.len(), "ledger opened");
        Ok(ledger)
    }

    fn append(&self, payload: Payload) -> LedgerResult<()> {
        self.ensure_open()?;
        let _guard = self.append_lock.lock();
        // `close` may have won the lock while we waited.
        self.ensure_open()?;

        let timestamp = chrono::Utc::now().timestamp_millis();
        let block = match self.tip()? {
            Some(parent) => ChainedBlock::next(&parent, payload, timestamp),
            None => ChainedBlock::first(payload, timestamp),
        };

        let bytes = serde_json::to_vec(&block).map_err(|e| LedgerError::Append(e.to_string()))?;
        self.blocks
            .insert(block.index.to_be_bytes(), bytes)
            .map_err(|e| LedgerError::Append(e.to_string()))?;
        self.db
            .flush()
            .map_err(|e| LedgerError::Append(e.to_string()))?;

        tracing::debug!(index = block.index, hash = %block.hash, "block appended");
        Ok(())
    }

    fn latest(&self) -> LedgerResult<Option<ChainedBlock>> {
        self.ensure_open()?;
        self.tip()
    }

    fn history(&self) -> LedgerResult<Vec<ChainedBlock>> {
        self.ensure_open()?;

        let mut blocks = Vec::with_capacity(self.blocks.len());
        for entry in self.blocks.iter() {
            let (_key, value) = entry.map_err(|e| LedgerError::Read(e.to_string()))?;
            blocks.push(decode_block(&value)?);
        }
        Ok(blocks)
    }

    fn close(&self) -> LedgerResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        // Wait out an append that is already past its open check.
        let _guard = self.append_lock.lock();
        self.db
            .flush()
            .map_err(|e| LedgerError::Append(e.to_string()))?;
        tracing::info!(blocks = self.len(), "ledger closed");
        Ok(())
    }
}

fn decode_block(bytes: &IVec) -> LedgerResult<ChainedBlock> {
    serde_json::from_slice(bytes).map_err(|e| LedgerError::Read(format!("invalid block encoding: {e}")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(amount: i64) -> Payload {
        json!({ "amount": amount }).into()
    }

    #[test]
    fn empty_ledger_has_no_tip() {
        let ledger = SledLedger::open_temporary().unwrap();
        assert!(ledger.is_empty());
        assert!(ledger.latest().unwrap().is_none());
        assert!(ledger.history().unwrap().is_empty());
        assert_eq!(ledger.verify().unwrap(), 0);
    }

    #[test]
    fn append_builds_a_linked_chain() {
        let ledger = SledLedger::open_temporary().unwrap();
        ledger.append(payload(10)).unwrap();
        ledger.append(payload(-3)).unwrap();
        ledger.append(json!("free-form").into()).unwrap();

        let history = ledger.history().unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].data, payload(10));
        assert_eq!(history[1].data, payload(-3));
        assert_eq!(history[1].prev_hash, history[0].hash);
        assert_eq!(history[2].prev_hash, history[1].hash);

        let latest = ledger.latest().unwrap().expect("tip exists");
        assert_eq!(latest, history[2]);
        assert_eq!(ledger.verify().unwrap(), 3);
    }

    #[test]
    fn history_is_ordered_past_one_byte_of_index() {
        let ledger = SledLedger::open_temporary().unwrap();
        for i in 0..260 {
            ledger.append(payload(i)).unwrap();
        }

        let history = ledger.history().unwrap();
        assert_eq!(history.len(), 260);
        for (i, block) in history.iter().enumerate() {
            assert_eq!(block.index, i as u64);
        }
        assert_eq!(ledger.latest().unwrap().unwrap().index, 259);
    }

    #[test]
    fn verify_detects_tampering() {
        let ledger = SledLedger::open_temporary().unwrap();
        ledger.append(payload(10)).unwrap();
        ledger.append(payload(-3)).unwrap();

        let mut forged = ledger.history().unwrap()[0].clone();
        forged.data = payload(10_000);
        ledger
            .blocks
            .insert(0u64.to_be_bytes(), serde_json::to_vec(&forged).unwrap())
            .unwrap();

        match ledger.verify() {
            Err(LedgerError::Corrupted { index, .. }) => assert_eq!(index, 0),
            other => panic!("expected corruption, got {other:?}"),
        }
    }

    #[test]
    fn undecodable_block_is_a_read_error() {
        let ledger = SledLedger::open_temporary().unwrap();
        ledger
            .blocks
            .insert(0u64.to_be_bytes(), &b"not a block"[..])
            .unwrap();

        let err = ledger.latest().unwrap_err();
        assert!(matches!(err, LedgerError::Read(_)));
        assert!(ledger.history().is_err());
    }

    #[test]
    fn append_on_an_unreadable_tip_keeps_the_read_error() {
        let ledger = SledLedger::open_temporary().unwrap();
        ledger
            .blocks
            .insert(0u64.to_be_bytes(), &b"not a block"[..])
            .unwrap();

        let err = ledger.append(payload(1)).unwrap_err();
        assert!(matches!(err, LedgerError::Read(_)));
        assert!(err.to_string().starts_with("failed to read ledger: invalid block encoding"));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn operations_fail_after_close() {
        let ledger = SledLedger::open_temporary().unwrap();
        ledger.append(payload(1)).unwrap();
        ledger.close().unwrap();
        ledger.close().unwrap();

        assert!(ledger.append(payload(2)).unwrap_err().is_closed());
        assert!(ledger.latest().unwrap_err().is_closed());
        assert!(ledger.history().unwrap_err().is_closed());
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn append_waiting_on_the_lock_sees_a_close() {
        let ledger = std::sync::Arc::new(SledLedger::open_temporary().unwrap());
        let guard = ledger.append_lock.lock();

        let writer = {
            let ledger = std::sync::Arc::clone(&ledger);
            std::thread::spawn(move || ledger.append(payload(1)))
        };
        // Let the writer get past its first open check and park on the lock.
        std::thread::sleep(std::time::Duration::from_millis(100));
        ledger.closed.store(true, Ordering::Release);
        drop(guard);

        let result = writer.join().unwrap();
        assert!(result.unwrap_err().is_closed());
        assert!(ledger.is_empty());
    }

    #[test]
    fn concurrent_appends_keep_the_chain_linked() {
        let ledger = std::sync::Arc::new(SledLedger::open_temporary().unwrap());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let ledger = std::sync::Arc::clone(&ledger);
                std::thread::spawn(move || {
                    for i in 0..10 {
                        ledger.append(json!({ "thread": t, "seq": i }).into()).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(ledger.verify().unwrap(), 40);
    }
}
