//! Remote object-store client built on OpenDAL.
//!
//! Supports S3-compatible services and Google Cloud Storage. Credentials
//! come from the standard provider chains (environment, shared config,
//! instance metadata) unless `--no-sign-request` asks for anonymous access.

use anyhow::{bail, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use opendal::services::{Gcs, S3};
use opendal::Operator;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::SyncError;
use crate::storage::object::{Object, ObjectKind, StorageClass};
use crate::storage::url::{ObjectUrl, Scheme};
use crate::storage::{ListEntry, Metadata, StorageClient, StorageOptions};

const DEFAULT_REGION: &str = "us-east-1";

/// In-flight request cap for multi-object deletes.
const DELETE_CONCURRENCY: usize = 16;

pub struct RemoteClient {
    operator: Operator,
    bucket: String,
}

impl RemoteClient {
    pub fn new(url: &ObjectUrl, options: &StorageOptions) -> Result<Self> {
        let operator = match url.scheme() {
            Scheme::S3 => {
                let mut builder = S3::default()
                    .bucket(url.bucket())
                    .region(options.region.as_deref().unwrap_or(DEFAULT_REGION));
                if let Some(endpoint) = &options.endpoint_url {
                    builder = builder.endpoint(endpoint);
                }
                if options.no_sign_request {
                    builder = builder.allow_anonymous();
                }
                Operator::new(builder)?.finish()
            }
            Scheme::Gcs => {
                let builder = Gcs::default().bucket(url.bucket());
                Operator::new(builder)?.finish()
            }
            Scheme::Local => bail!("not a remote url: {url}"),
        };

        Ok(Self {
            operator,
            bucket: url.bucket().to_string(),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn object_from_meta(&self, url: ObjectUrl, meta: &opendal::Metadata) -> Object {
        Object {
            url,
            size: meta.content_length(),
            mod_time: meta
                .last_modified()
                .map(|t| std::time::SystemTime::from(t).into()),
            etag: meta
                .etag()
                .map(|e| e.trim_matches('"').to_string())
                .unwrap_or_default(),
            storage_class: StorageClass::Standard,
            kind: if meta.mode().is_dir() {
                ObjectKind::Dir
            } else {
                ObjectKind::File
            },
        }
    }
}

#[async_trait]
impl StorageClient for RemoteClient {
    async fn list(&self, url: &ObjectUrl) -> Vec<ListEntry> {
        // A fully-specified key denotes exactly one object.
        if !url.is_wildcard() && !url.is_prefix() && !url.is_bucket() {
            return vec![self.stat(url).await];
        }

        let matcher = match url.glob_matcher() {
            Ok(matcher) => matcher,
            Err(err) => return vec![Err(SyncError::storage(format!("list {url}"), err))],
        };

        let entries = match self
            .operator
            .list_with(url.listing_prefix())
            .recursive(true)
            .await
        {
            Ok(entries) => entries,
            Err(err) => return vec![Err(SyncError::storage(format!("list {url}"), err))],
        };

        let mut out = Vec::new();
        for entry in entries {
            if let Some(matcher) = &matcher {
                if !matcher.is_match(entry.path()) {
                    continue;
                }
            }
            let child = url.child(entry.path());
            out.push(Ok(self.object_from_meta(child, entry.metadata())));
        }
        out
    }

    async fn stat(&self, url: &ObjectUrl) -> Result<Object, SyncError> {
        let meta = self
            .operator
            .stat(url.path())
            .await
            .map_err(|e| SyncError::storage(format!("stat {url}"), e))?;
        Ok(self.object_from_meta(url.clone(), &meta))
    }

    async fn get(
        &self,
        url: &ObjectUrl,
        writer: &mut (dyn AsyncWrite + Send + Unpin),
        concurrency: usize,
        part_size: u64,
    ) -> Result<u64, SyncError> {
        let meta = self
            .operator
            .stat(url.path())
            .await
            .map_err(|e| SyncError::storage(format!("stat {url}"), e))?;
        let length = meta.content_length();
        let part = part_size.max(1);

        let mut ranges = Vec::new();
        let mut offset = 0u64;
        while offset < length {
            let end = (offset + part).min(length);
            ranges.push(offset..end);
            offset = end;
        }

        // Parts are fetched concurrently but written back in order.
        let mut parts = stream::iter(ranges.into_iter().map(|range| {
            let operator = self.operator.clone();
            let key = url.path().to_string();
            async move { operator.read_with(&key).range(range).await }
        }))
        .buffered(concurrency.max(1));

        let mut written = 0u64;
        while let Some(part) = parts.next().await {
            let buf = part.map_err(|e| SyncError::storage(format!("get {url}"), e))?;
            let bytes = buf.to_vec();
            writer
                .write_all(&bytes)
                .await
                .map_err(|e| SyncError::io(format!("write bytes of {url}"), e))?;
            written += bytes.len() as u64;
        }
        writer
            .flush()
            .await
            .map_err(|e| SyncError::io(format!("flush bytes of {url}"), e))?;
        Ok(written)
    }

    async fn put(
        &self,
        reader: &mut (dyn AsyncRead + Send + Unpin),
        url: &ObjectUrl,
        metadata: &Metadata,
        concurrency: usize,
        part_size: u64,
    ) -> Result<(), SyncError> {
        let mut pending = self
            .operator
            .writer_with(url.path())
            .concurrent(concurrency.max(1))
            .chunk(part_size.max(1) as usize);
        if let Some(content_type) = &metadata.content_type {
            pending = pending.content_type(content_type);
        }
        let mut writer = pending
            .await
            .map_err(|e| SyncError::storage(format!("put {url}"), e))?;

        let mut buf = vec![0u8; 256 * 1024];
        loop {
            let n = reader
                .read(&mut buf)
                .await
                .map_err(|e| SyncError::io(format!("read bytes for {url}"), e))?;
            if n == 0 {
                break;
            }
            writer
                .write(buf[..n].to_vec())
                .await
                .map_err(|e| SyncError::storage(format!("put {url}"), e))?;
        }
        writer
            .close()
            .await
            .map_err(|e| SyncError::storage(format!("put {url}"), e))?;
        Ok(())
    }

    async fn copy(
        &self,
        src: &ObjectUrl,
        dst: &ObjectUrl,
        _metadata: &Metadata,
    ) -> Result<(), SyncError> {
        self.operator
            .copy(src.path(), dst.path())
            .await
            .map_err(|e| SyncError::storage(format!("copy {src} to {dst}"), e))
    }

    async fn delete(&self, url: &ObjectUrl) -> Result<(), SyncError> {
        self.operator
            .delete(url.path())
            .await
            .map_err(|e| SyncError::storage(format!("delete {url}"), e))
    }

    async fn multi_delete(
        &self,
        urls: Vec<ObjectUrl>,
    ) -> Vec<(ObjectUrl, Result<(), SyncError>)> {
        stream::iter(urls.into_iter().map(|url| {
            let operator = self.operator.clone();
            async move {
                let outcome = operator
                    .delete(url.path())
                    .await
                    .map_err(|e| SyncError::storage(format!("delete {url}"), e));
                (url, outcome)
            }
        }))
        .buffer_unordered(DELETE_CONCURRENCY)
        .collect()
        .await
    }
}
