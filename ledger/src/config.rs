//! # Ledger Constants
//!
//! Every fixed value the ledger implementations agree on lives here.

/// Name used when the operator does not pick one. For the sled ledger this
/// is the on-disk directory.
pub const DEFAULT_LEDGER_NAME: &str = "chainlite-data";

/// `prev_hash` of the first block in a chain: 32 zero bytes, hex-encoded.
pub const ZERO_HASH_HEX: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// sled tree holding serialized blocks, keyed by big-endian index.
pub const BLOCKS_TREE: &str = "blocks";

/// Crate version, reported by the node's `version` subcommand.
pub const LEDGER_VERSION: &str = env!("CARGO_PKG_VERSION");
