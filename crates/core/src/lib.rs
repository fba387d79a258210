//! Core domain types for the memo build cache metadata layer.
//!
//! This crate defines the data model shared by every other crate:
//! - Content hashes and weak/strong fingerprints
//! - Records, content hash lists and the determinism replacement policy
//! - Shard topology and jump-hash routing
//! - Clock abstraction and configuration types

pub mod clock;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod hash;
pub mod record;
pub mod topology;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result};
pub use fingerprint::{Selector, StrongFingerprint, WeakFingerprint};
pub use hash::{ContentHash, HASH_LENGTH};
pub use record::{
    ContentHashList, ContentHashListWithDeterminism, Determinism, Record, RecordBody,
    VersionToken,
};
pub use topology::{
    ShardAccount, ShardedTopology, ShardingAlgorithm, jump_consistent_hash, validate_name,
};
