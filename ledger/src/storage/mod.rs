//! # Storage Module
//!
//! The persistent side of the ledger.
//!
//! ```text
//! block.rs  ChainedBlock: payload + index, timestamp, hash linkage
//! db.rs     SledLedger: sled persistence and chain verification
//! ```
//!
//! Every append reads the current tip, builds its successor, and writes it
//! under the next big-endian index. Nothing is ever rewritten in place.

pub mod block;
pub mod db;

pub use block::{compute_block_hash, ChainedBlock};
pub use db::SledLedger;
