//! Storage clients for local filesystem and remote object stores.

pub mod local;
pub mod object;
pub mod remote;
pub mod url;

pub use local::LocalClient;
pub use object::{Object, ObjectKind, StorageClass};
pub use remote::RemoteClient;
pub use url::ObjectUrl;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::SyncError;

/// One listed entry; listings report per-item failures without aborting.
pub type ListEntry = std::result::Result<Object, SyncError>;

/// Metadata attached to uploaded/copied objects.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    pub content_type: Option<String>,
}

/// Connection settings shared by every remote client of one run.
#[derive(Debug, Clone, Default)]
pub struct StorageOptions {
    pub endpoint_url: Option<String>,
    pub region: Option<String>,
    pub no_sign_request: bool,
}

/// The seam between the sync engine and a concrete store.
///
/// Implementations exist for the local filesystem and opendal-backed remote
/// stores; tests inject in-memory fakes through the same trait object.
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// List every object the url denotes. Broken entries are reported
    /// in-band; the listing itself never aborts.
    async fn list(&self, url: &ObjectUrl) -> Vec<ListEntry>;

    async fn stat(&self, url: &ObjectUrl) -> std::result::Result<Object, SyncError>;

    /// Stream an object's bytes into `writer`, returning the byte count.
    async fn get(
        &self,
        url: &ObjectUrl,
        writer: &mut (dyn AsyncWrite + Send + Unpin),
        concurrency: usize,
        part_size: u64,
    ) -> std::result::Result<u64, SyncError>;

    /// Store the bytes read from `reader` at `url`.
    async fn put(
        &self,
        reader: &mut (dyn AsyncRead + Send + Unpin),
        url: &ObjectUrl,
        metadata: &Metadata,
        concurrency: usize,
        part_size: u64,
    ) -> std::result::Result<(), SyncError>;

    /// Server-side copy between two urls of the same store.
    async fn copy(
        &self,
        src: &ObjectUrl,
        dst: &ObjectUrl,
        metadata: &Metadata,
    ) -> std::result::Result<(), SyncError>;

    async fn delete(&self, url: &ObjectUrl) -> std::result::Result<(), SyncError>;

    /// Delete many objects, reporting the outcome per url.
    async fn multi_delete(
        &self,
        urls: Vec<ObjectUrl>,
    ) -> Vec<(ObjectUrl, std::result::Result<(), SyncError>)>;
}

/// Build the right client for a url's locality.
pub fn client_for(url: &ObjectUrl, options: &StorageOptions) -> Result<Arc<dyn StorageClient>> {
    if url.is_remote() {
        Ok(Arc::new(RemoteClient::new(url, options)?))
    } else {
        Ok(Arc::new(LocalClient::new()))
    }
}
