//! In-process ledger. Blocks live in a `Vec` and vanish with the process.
//!
//! The block type is the payload itself: there is no chaining, no hashing,
//! no timestamps. What goes in is exactly what comes out.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::{Ledger, LedgerError, LedgerResult, Payload};

/// Volatile [`Ledger`] backed by a lock-protected vector.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    name: String,
    blocks: RwLock<Vec<Payload>>,
    closed: AtomicBool,
}

impl MemoryLedger {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of blocks appended so far.
    pub fn len(&self) -> usize {
        self.blocks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> LedgerResult<()> {
        if self.is_closed() {
            return Err(LedgerError::Closed);
        }
        Ok(())
    }
}

impl Ledger for MemoryLedger {
    type Block = Payload;

    fn open(name: &str) -> LedgerResult<Self> {
        tracing::debug!(name, "opening in-memory ledger");
        Ok(Self::new(name))
    }

    fn append(&self, payload: Payload) -> LedgerResult<()> {
        self.ensure_open()?;
        self.blocks.write().push(payload);
        Ok(())
    }

    fn latest(&self) -> LedgerResult<Option<Payload>> {
        self.ensure_open()?;
        Ok(self.blocks.read().last().cloned())
    }

    fn history(&self) -> LedgerResult<Vec<Payload>> {
        self.ensure_open()?;
        Ok(self.blocks.read().clone())
    }

    fn close(&self) -> LedgerResult<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!(name = %self.name, blocks = self.len(), "in-memory ledger closed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_ledger_has_no_latest_block() {
        let ledger = MemoryLedger::open("test").unwrap();
        assert_eq!(ledger.name(), "test");
        assert!(ledger.latest().unwrap().is_none());
        assert!(ledger.history().unwrap().is_empty());
    }

    #[test]
    fn history_preserves_append_order() {
        let ledger = MemoryLedger::new("test");
        ledger.append(json!({"amount": 10}).into()).unwrap();
        ledger.append(json!({"amount": -3}).into()).unwrap();

        let history = ledger.history().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].as_value(), &json!({"amount": 10}));
        assert_eq!(history[1].as_value(), &json!({"amount": -3}));
        assert_eq!(ledger.latest().unwrap().unwrap().as_value(), &json!({"amount": -3}));
    }

    #[test]
    fn operations_fail_after_close() {
        let ledger = MemoryLedger::new("test");
        ledger.append(json!(1).into()).unwrap();
        ledger.close().unwrap();
        ledger.close().unwrap();

        assert!(ledger.is_closed());
        assert!(ledger.append(json!(2).into()).unwrap_err().is_closed());
        assert!(ledger.latest().unwrap_err().is_closed());
        assert!(ledger.history().unwrap_err().is_closed());
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn concurrent_appends_are_all_kept() {
        let ledger = std::sync::Arc::new(MemoryLedger::new("test"));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let ledger = std::sync::Arc::clone(&ledger);
                std::thread::spawn(move || {
                    for j in 0..25 {
                        ledger.append(json!({"thread": i, "seq": j}).into()).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(ledger.len(), 200);
    }
}
