//! Integration tests for the persistent ledger.
//!
//! Each test opens its own sled directory under a fresh tempdir and talks to
//! the ledger only through the public [`Ledger`] trait, the same way the
//! node does.

use serde_json::json;

use chainlite_ledger::config::ZERO_HASH_HEX;
use chainlite_ledger::{Ledger, LedgerError, MemoryLedger, Payload, SledLedger};

fn open_at(dir: &tempfile::TempDir) -> SledLedger {
    let path = dir.path().join("chain");
    SledLedger::open(path.to_str().expect("utf-8 tempdir")).expect("open ledger")
}

#[test]
fn blocks_survive_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");

    {
        let ledger = open_at(&dir);
        ledger.append(json!({"amount": 10}).into()).unwrap();
        ledger.append(json!({"amount": -3}).into()).unwrap();
        ledger.close().unwrap();
    }

    let ledger = open_at(&dir);
    let history = ledger.history().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].prev_hash, ZERO_HASH_HEX);
    assert_eq!(history[0].data.as_value(), &json!({"amount": 10}));
    assert_eq!(history[1].data.as_value(), &json!({"amount": -3}));
    assert_eq!(ledger.verify().unwrap(), 2);
}

#[test]
fn appends_after_reopen_extend_the_existing_chain() {
    let dir = tempfile::tempdir().expect("tempdir");

    let first_hash = {
        let ledger = open_at(&dir);
        ledger.append(json!("genesis-ish").into()).unwrap();
        let hash = ledger.latest().unwrap().unwrap().hash;
        ledger.close().unwrap();
        hash
    };

    let ledger = open_at(&dir);
    ledger.append(json!({"next": true}).into()).unwrap();

    let latest = ledger.latest().unwrap().expect("tip");
    assert_eq!(latest.index, 1);
    assert_eq!(latest.prev_hash, first_hash);
    assert_eq!(ledger.verify().unwrap(), 2);
}

#[test]
fn open_fails_when_path_is_a_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let file = dir.path().join("not-a-dir");
    std::fs::write(&file, b"occupied").unwrap();

    let err = SledLedger::open(file.to_str().unwrap()).unwrap_err();
    assert!(matches!(err, LedgerError::Open(_)));
}

/// Both implementations agree on the empty-ledger contract.
#[test]
fn empty_ledgers_report_none_not_errors() {
    fn check<L: Ledger>(ledger: L) {
        assert!(ledger.latest().unwrap().is_none());
        assert!(ledger.history().unwrap().is_empty());
        ledger.close().unwrap();
    }

    check(MemoryLedger::open("empty").unwrap());
    check(SledLedger::open_temporary().unwrap());
}

#[test]
fn memory_ledger_returns_payloads_verbatim() {
    let ledger = MemoryLedger::open("verbatim").unwrap();
    let payload = Payload::from_slice(br#"{"nested":{"list":[1,2,3]},"ok":true}"#).unwrap();
    ledger.append(payload.clone()).unwrap();

    assert_eq!(ledger.latest().unwrap(), Some(payload));
}
