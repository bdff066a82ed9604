// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # chainlite Ledger
//!
//! The append-only store that sits behind the chainlite HTTP facade. The
//! facade only ever talks to a ledger through the [`Ledger`] trait, so the
//! storage engine can be swapped without touching a single route.
//!
//! ## Modules
//!
//! - **config**: Constants shared by every ledger implementation.
//! - **error**: The [`LedgerError`] taxonomy surfaced to HTTP clients.
//! - **payload**: The opaque JSON [`Payload`] carried by every block.
//! - **memory**: A process-local ledger for tests and throwaway nodes.
//! - **storage**: The persistent, hash-chained ledger on top of sled.
//!
//! ## Contract
//!
//! An empty ledger is not an error: [`Ledger::latest`] returns `Ok(None)`
//! and [`Ledger::history`] returns an empty vector. Errors are reserved for
//! storage failures and for calls made after [`Ledger::close`].

use serde::Serialize;

pub mod config;
pub mod error;
pub mod memory;
pub mod payload;
pub mod storage;

pub use error::{LedgerError, LedgerResult};
pub use memory::MemoryLedger;
pub use payload::Payload;
pub use storage::{ChainedBlock, SledLedger};

/// Capability interface for an append-only block store.
///
/// Implementations own their own synchronization: the HTTP layer shares a
/// single handle across every request task and never locks around it.
pub trait Ledger: Send + Sync + 'static {
    /// What a stored block looks like on the way out.
    type Block: Serialize + Send + Sync + 'static;

    /// Create the ledger identified by `name`, or open it if it exists.
    fn open(name: &str) -> LedgerResult<Self>
    where
        Self: Sized;

    /// Append a new block carrying `payload` at the tip of the chain.
    fn append(&self, payload: Payload) -> LedgerResult<()>;

    /// The most recently appended block, or `None` if the ledger is empty.
    fn latest(&self) -> LedgerResult<Option<Self::Block>>;

    /// Every block in append order, oldest first.
    fn history(&self) -> LedgerResult<Vec<Self::Block>>;

    /// Release the underlying resources.
    ///
    /// Idempotent. Every other operation fails with [`LedgerError::Closed`]
    /// once this has been called.
    fn close(&self) -> LedgerResult<()>;
}
