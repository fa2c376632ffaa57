//! Command-line interface and pre-run validation.

use anyhow::{bail, Result};
use clap::Parser;

use crate::message::LogFormat;
use crate::storage::url::ObjectUrl;
use crate::storage::StorageOptions;
use crate::sync::{SyncOptions, DEFAULT_CONCURRENCY, DEFAULT_PART_SIZE_MIB, MIB};

/// Sync objects between the local filesystem and object storage.
#[derive(Debug, Parser)]
#[command(name = "osync", version, about)]
pub struct Cli {
    /// Source of the sync: a local path/pattern or a remote url
    pub source: String,

    /// Destination of the sync: a local path or a remote url
    pub destination: String,

    /// Number of concurrent transfers between host and storage
    #[arg(short = 'c', long, default_value_t = DEFAULT_CONCURRENCY)]
    pub concurrency: usize,

    /// Size of each transferred part, in MiB
    #[arg(short = 'p', long = "part-size", value_name = "MiB", default_value_t = DEFAULT_PART_SIZE_MIB)]
    pub part_size: u64,

    /// Delete objects present in the destination but not in the source
    #[arg(long)]
    pub delete: bool,

    /// Compare objects by size alone when deciding what to sync
    #[arg(long = "size-only")]
    pub size_only: bool,

    /// Compare objects by content hash instead of size and mtime
    #[arg(long)]
    pub checksum: bool,

    /// Override the storage service endpoint
    #[arg(long = "endpoint-url", value_name = "URL")]
    pub endpoint_url: Option<String>,

    /// Storage region
    #[arg(long)]
    pub region: Option<String>,

    /// Send requests without signing them (public buckets)
    #[arg(long = "no-sign-request")]
    pub no_sign_request: bool,

    /// Emit machine-readable JSON lines instead of text
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    /// Check the source/destination pairing before any work starts.
    pub fn validate(&self) -> Result<(ObjectUrl, ObjectUrl)> {
        validate_pair(&self.source, &self.destination)
    }

    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            delete: self.delete,
            size_only: self.size_only,
            checksum: self.checksum,
            concurrency: self.concurrency.max(1),
            part_size: self.part_size.max(1) * MIB,
            storage: StorageOptions {
                endpoint_url: self.endpoint_url.clone(),
                region: self.region.clone(),
                no_sign_request: self.no_sign_request,
            },
            log_format: if self.json {
                LogFormat::Json
            } else {
                LogFormat::Text
            },
        }
    }
}

/// Validation rules shared by the binary and the tests.
pub fn validate_pair(source: &str, destination: &str) -> Result<(ObjectUrl, ObjectUrl)> {
    let srcurl = ObjectUrl::parse(source)?;
    let dsturl = ObjectUrl::parse(destination)?;

    // A wildcard destination doesn't mean anything.
    if dsturl.is_wildcard() {
        bail!("target {destination:?} can not contain glob characters");
    }

    // A bare remote bucket or prefix denotes nothing concrete to read.
    if srcurl.is_bucket() || srcurl.is_prefix() {
        bail!("source argument must contain wildcard character");
    }

    // Expanding a wildcard into a single remote object would be a surprise.
    if srcurl.is_wildcard() && dsturl.is_remote() && !dsturl.is_prefix() && !dsturl.is_bucket() {
        bail!("target {dsturl} must be a bucket or a prefix");
    }

    if !srcurl.is_remote() && !dsturl.is_remote() {
        bail!("local->local sync operations are not permitted");
    }

    Ok((srcurl, dsturl))
}
