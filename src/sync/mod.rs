//! Synchronization engine.
//!
//! Diffs two object collections, decides per pair whether a transfer is
//! needed, and executes the resulting plan under a bounded worker pool.

pub mod diff;
pub mod engine;
pub mod strategy;
pub mod task;

pub use diff::{DiffStreams, ObjectPair};
pub use engine::Sync;
pub use strategy::{decide, SkipReason, SyncDecision};

use crate::message::LogFormat;
use crate::storage::StorageOptions;

/// Concurrent part transfers per object by default.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Default transfer part size in MiB.
pub const DEFAULT_PART_SIZE_MIB: u64 = 50;

pub const MIB: u64 = 1024 * 1024;

/// Immutable configuration for one sync run.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Remove destination objects absent from the source.
    pub delete: bool,
    /// Compare by size alone, ignoring modification times.
    pub size_only: bool,
    /// Compare by content hash instead of size/time metadata.
    pub checksum: bool,
    /// Maximum simultaneously executing transfer tasks.
    pub concurrency: usize,
    /// Transfer part size in bytes.
    pub part_size: u64,
    pub storage: StorageOptions,
    pub log_format: LogFormat,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            delete: false,
            size_only: false,
            checksum: false,
            concurrency: DEFAULT_CONCURRENCY,
            part_size: DEFAULT_PART_SIZE_MIB * MIB,
            storage: StorageOptions::default(),
            log_format: LogFormat::default(),
        }
    }
}
