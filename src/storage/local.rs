//! Local filesystem client.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fs;
use std::path::Path;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::SyncError;
use crate::storage::object::{Object, ObjectKind, StorageClass};
use crate::storage::url::ObjectUrl;
use crate::storage::{ListEntry, Metadata, StorageClient};

pub struct LocalClient;

impl LocalClient {
    pub fn new() -> Self {
        LocalClient
    }
}

impl Default for LocalClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageClient for LocalClient {
    async fn list(&self, url: &ObjectUrl) -> Vec<ListEntry> {
        let url = url.clone();
        match tokio::task::spawn_blocking(move || list_blocking(&url)).await {
            Ok(entries) => entries,
            Err(err) => vec![Err(SyncError::storage("local listing task failed", err))],
        }
    }

    async fn stat(&self, url: &ObjectUrl) -> Result<Object, SyncError> {
        let metadata = tokio::fs::metadata(url.path())
            .await
            .map_err(|e| SyncError::io(format!("stat {url}"), e))?;
        Ok(object_from_metadata(url.clone(), &metadata))
    }

    async fn get(
        &self,
        url: &ObjectUrl,
        writer: &mut (dyn AsyncWrite + Send + Unpin),
        _concurrency: usize,
        _part_size: u64,
    ) -> Result<u64, SyncError> {
        let mut file = tokio::fs::File::open(url.path())
            .await
            .map_err(|e| SyncError::io(format!("open {url}"), e))?;
        tokio::io::copy(&mut file, writer)
            .await
            .map_err(|e| SyncError::io(format!("read {url}"), e))
    }

    async fn put(
        &self,
        reader: &mut (dyn AsyncRead + Send + Unpin),
        url: &ObjectUrl,
        _metadata: &Metadata,
        _concurrency: usize,
        _part_size: u64,
    ) -> Result<(), SyncError> {
        let path = Path::new(url.path());
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SyncError::io(format!("create directory {}", parent.display()), e))?;
        }
        let mut file = tokio::fs::File::create(path)
            .await
            .map_err(|e| SyncError::io(format!("create {url}"), e))?;
        tokio::io::copy(reader, &mut file)
            .await
            .map_err(|e| SyncError::io(format!("write {url}"), e))?;
        Ok(())
    }

    async fn copy(
        &self,
        src: &ObjectUrl,
        dst: &ObjectUrl,
        _metadata: &Metadata,
    ) -> Result<(), SyncError> {
        let dst_path = Path::new(dst.path());
        if let Some(parent) = dst_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SyncError::io(format!("create directory {}", parent.display()), e))?;
        }
        tokio::fs::copy(src.path(), dst_path)
            .await
            .map_err(|e| SyncError::io(format!("copy {src} to {dst}"), e))?;
        Ok(())
    }

    async fn delete(&self, url: &ObjectUrl) -> Result<(), SyncError> {
        tokio::fs::remove_file(url.path())
            .await
            .map_err(|e| SyncError::io(format!("delete {url}"), e))
    }

    async fn multi_delete(
        &self,
        urls: Vec<ObjectUrl>,
    ) -> Vec<(ObjectUrl, Result<(), SyncError>)> {
        let mut results = Vec::with_capacity(urls.len());
        for url in urls {
            let outcome = self.delete(&url).await;
            results.push((url, outcome));
        }
        results
    }
}

fn list_blocking(url: &ObjectUrl) -> Vec<ListEntry> {
    let mut out = Vec::new();

    if url.is_wildcard() {
        let paths = match glob::glob(url.path()) {
            Ok(paths) => paths,
            Err(err) => {
                return vec![Err(SyncError::storage(
                    format!("invalid wildcard {url}"),
                    err,
                ))]
            }
        };
        for matched in paths {
            match matched {
                Ok(path) if path.is_dir() => walk_tree(&path, url, &mut out),
                Ok(path) => out.push(stat_entry(&path, url)),
                Err(err) => out.push(Err(SyncError::Listing {
                    message: format!("listing {url}: {err}"),
                })),
            }
        }
        return out;
    }

    let path = Path::new(url.path());
    match fs::metadata(path) {
        Ok(metadata) if metadata.is_dir() => {
            let root = url.to_listing_root();
            walk_tree(path, &root, &mut out);
        }
        Ok(metadata) => out.push(Ok(object_from_metadata(url.clone(), &metadata))),
        Err(err) => out.push(Err(SyncError::io(format!("stat {url}"), err))),
    }
    out
}

/// Collect every file under `root`, keyed relative to `base`'s prefix.
fn walk_tree(root: &Path, base: &ObjectUrl, out: &mut Vec<ListEntry>) {
    for entry in jwalk::WalkDir::new(root)
        .skip_hidden(false)
        .follow_links(false)
    {
        match entry {
            Ok(entry) => {
                if !entry.file_type().is_file() {
                    continue;
                }
                out.push(stat_entry(&entry.path(), base));
            }
            Err(err) => out.push(Err(SyncError::Listing {
                message: format!("walking {}: {err}", root.display()),
            })),
        }
    }
}

fn stat_entry(path: &Path, base: &ObjectUrl) -> ListEntry {
    match fs::metadata(path) {
        Ok(metadata) => {
            let url = base.child(&path.to_string_lossy());
            Ok(object_from_metadata(url, &metadata))
        }
        Err(err) => Err(SyncError::io(format!("stat {}", path.display()), err)),
    }
}

fn object_from_metadata(url: ObjectUrl, metadata: &fs::Metadata) -> Object {
    Object {
        url,
        size: metadata.len(),
        mod_time: modified_time(metadata),
        etag: String::new(),
        storage_class: StorageClass::Standard,
        kind: if metadata.is_dir() {
            ObjectKind::Dir
        } else {
            ObjectKind::File
        },
    }
}

fn modified_time(metadata: &fs::Metadata) -> Option<DateTime<Utc>> {
    metadata.modified().ok().and_then(|t| {
        DateTime::from_timestamp(
            t.duration_since(std::time::UNIX_EPOCH).ok()?.as_secs() as i64,
            0,
        )
    })
}
