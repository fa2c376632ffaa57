//! Object model produced by listings.

use chrono::{DateTime, Utc};

use crate::storage::url::ObjectUrl;

/// What kind of entry a listing produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    File,
    Dir,
}

/// Storage tier of a remote object.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StorageClass {
    #[default]
    Standard,
    Glacier,
    Other(String),
}

impl StorageClass {
    pub fn from_header(value: &str) -> Self {
        match value {
            "" | "STANDARD" => StorageClass::Standard,
            "GLACIER" | "DEEP_ARCHIVE" => StorageClass::Glacier,
            other => StorageClass::Other(other.to_string()),
        }
    }

    /// Archival tiers need a restore step before bytes are retrievable, so
    /// objects on them are excluded from transfers.
    pub fn is_archival(&self) -> bool {
        matches!(self, StorageClass::Glacier)
    }
}

/// A single listed storage entry. Immutable once produced.
#[derive(Debug, Clone)]
pub struct Object {
    pub url: ObjectUrl,
    pub size: u64,
    pub mod_time: Option<DateTime<Utc>>,
    /// Opaque content fingerprint reported by the store; empty for local
    /// files (their hash is computed on demand).
    pub etag: String,
    pub storage_class: StorageClass,
    pub kind: ObjectKind,
}

impl Object {
    pub fn is_dir(&self) -> bool {
        self.kind == ObjectKind::Dir
    }
}
