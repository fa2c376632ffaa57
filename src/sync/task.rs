//! Deferred work items executed by the worker pool.
//!
//! A [`TransferTask`] carries one object's transfer: the strategy is picked
//! from the localities of its endpoints, common pairs consult the decision
//! policy before moving bytes, and failures are wrapped with operation and
//! endpoint context. A [`DeleteTask`] removes destination-only objects once
//! the diff's destination pass has finished.

use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::SyncError;
use crate::hash::{HashComparison, ObjectHash};
use crate::message::{InfoMessage, LogFormat};
use crate::storage::object::Object;
use crate::storage::url::{resolve_local_destination, resolve_remote_destination, ObjectUrl};
use crate::storage::{Metadata, StorageClient};
use crate::sync::diff::ObjectPair;
use crate::sync::strategy::{decide, SyncDecision};
use crate::sync::SyncOptions;

/// Buffer between the two halves of a streamed remote-to-remote copy.
const STREAM_BUFFER: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransferKind {
    Upload,
    Download,
    Copy,
}

impl TransferKind {
    /// Strategy by endpoint locality. Local-to-local pairs are rejected at
    /// validation and never reach dispatch.
    fn for_pair(src: &ObjectUrl, dst: &ObjectUrl) -> TransferKind {
        match (src.is_remote(), dst.is_remote()) {
            (false, true) => TransferKind::Upload,
            (true, false) => TransferKind::Download,
            (true, true) => TransferKind::Copy,
            (false, false) => unreachable!("local->local pairs are rejected at validation"),
        }
    }

    fn op_name(&self) -> &'static str {
        match self {
            TransferKind::Upload => "upload",
            TransferKind::Download => "download",
            TransferKind::Copy => "copy",
        }
    }
}

enum TransferItem {
    /// Object with no destination counterpart; its final destination key is
    /// resolved when the task runs.
    SourceOnly {
        src: ObjectUrl,
        dst_root: ObjectUrl,
        is_batch: bool,
    },
    /// Key-matched pair; the decision policy runs before any data moves.
    Pair { src: Object, dst: Object },
}

/// One object's transfer, ready to be submitted to the pool.
pub struct TransferTask {
    kind: TransferKind,
    item: TransferItem,
    src_client: Arc<dyn StorageClient>,
    dst_client: Arc<dyn StorageClient>,
    options: SyncOptions,
    cancel: CancellationToken,
}

impl TransferTask {
    pub fn source_only(
        src: Object,
        dst_root: ObjectUrl,
        is_batch: bool,
        src_client: Arc<dyn StorageClient>,
        dst_client: Arc<dyn StorageClient>,
        options: SyncOptions,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            kind: TransferKind::for_pair(&src.url, &dst_root),
            item: TransferItem::SourceOnly {
                src: src.url,
                dst_root,
                is_batch,
            },
            src_client,
            dst_client,
            options,
            cancel,
        }
    }

    pub fn pair(
        pair: ObjectPair,
        src_client: Arc<dyn StorageClient>,
        dst_client: Arc<dyn StorageClient>,
        options: SyncOptions,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            kind: TransferKind::for_pair(&pair.src.url, &pair.dst.url),
            item: TransferItem::Pair {
                src: pair.src,
                dst: pair.dst,
            },
            src_client,
            dst_client,
            options,
            cancel,
        }
    }

    pub async fn run(self) -> Result<(), SyncError> {
        if self.cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        let (src, dst) = match &self.item {
            TransferItem::Pair { src, dst } => match self.decide_pair(src, dst).await? {
                SyncDecision::Skip(reason) => {
                    tracing::debug!(
                        source = %src.url,
                        destination = %dst.url,
                        reason = reason.as_str(),
                        "skipping object"
                    );
                    return Ok(());
                }
                SyncDecision::Proceed => (src.url.clone(), dst.url.clone()),
            },
            TransferItem::SourceOnly {
                src,
                dst_root,
                is_batch,
            } => {
                let dst = match self.kind {
                    TransferKind::Download => resolve_local_destination(src, dst_root, *is_batch),
                    _ => resolve_remote_destination(src, dst_root, *is_batch),
                };
                (src.clone(), dst)
            }
        };

        let outcome = match self.kind {
            TransferKind::Upload => self.upload(&src, &dst).await,
            TransferKind::Download => self.download(&src, &dst).await,
            TransferKind::Copy => self.copy(&src, &dst).await,
        };
        outcome.map_err(|err| SyncError::transfer(self.kind.op_name(), &src, &dst, err))
    }

    /// Decision step for a common pair; always happens before the data
    /// movement step.
    async fn decide_pair(&self, src: &Object, dst: &Object) -> Result<SyncDecision, SyncError> {
        if !self.options.checksum {
            return Ok(decide(src, dst, self.options.size_only));
        }

        let verdict = ObjectHash::new(src).compare(&ObjectHash::new(dst)).await?;
        match verdict {
            HashComparison::Same => Ok(SyncDecision::Skip(
                crate::sync::strategy::SkipReason::SameContent,
            )),
            HashComparison::Different => Ok(SyncDecision::Proceed),
            HashComparison::Incomparable => Err(SyncError::MultipartHash {
                url: src.url.to_string(),
            }),
        }
    }

    async fn upload(&self, src: &ObjectUrl, dst: &ObjectUrl) -> Result<(), SyncError> {
        let path = Path::new(src.path());
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| SyncError::io(format!("stat {src}"), e))?;
        let mut file = tokio::fs::File::open(path)
            .await
            .map_err(|e| SyncError::io(format!("open {src}"), e))?;

        self.dst_client
            .put(
                &mut file,
                dst,
                &Metadata::default(),
                self.options.concurrency,
                self.options.part_size,
            )
            .await?;

        InfoMessage {
            operation: "upload",
            source: src.to_string(),
            destination: Some(dst.to_string()),
            size: Some(metadata.len()),
        }
        .print(self.options.log_format);
        Ok(())
    }

    async fn download(&self, src: &ObjectUrl, dst: &ObjectUrl) -> Result<(), SyncError> {
        let dst_path = Path::new(dst.path());
        if let Some(parent) = dst_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    SyncError::io(format!("create directory {}", parent.display()), e)
                })?;
            }
        }
        let mut file = tokio::fs::File::create(dst_path)
            .await
            .map_err(|e| SyncError::io(format!("create {dst}"), e))?;

        match self
            .src_client
            .get(
                src,
                &mut file,
                self.options.concurrency,
                self.options.part_size,
            )
            .await
        {
            Ok(size) => {
                drop(file);
                InfoMessage {
                    operation: "download",
                    source: src.to_string(),
                    destination: Some(dst.to_string()),
                    size: Some(size),
                }
                .print(self.options.log_format);
                Ok(())
            }
            Err(err) => {
                // Never leave a truncated file where the caller expects a
                // synced object.
                drop(file);
                let _ = tokio::fs::remove_file(dst_path).await;
                Err(err)
            }
        }
    }

    async fn copy(&self, src: &ObjectUrl, dst: &ObjectUrl) -> Result<(), SyncError> {
        if src.bucket() == dst.bucket() {
            self.dst_client
                .copy(src, dst, &Metadata::default())
                .await?;
        } else {
            // The destination's operator cannot address the source bucket
            // server-side; stream the bytes through a bounded pipe instead.
            let (mut writer, mut reader) = tokio::io::duplex(STREAM_BUFFER);
            let concurrency = self.options.concurrency;
            let part_size = self.options.part_size;

            let src_client = self.src_client.clone();
            let src_url = src.clone();
            let read_side = async move {
                let outcome = src_client
                    .get(&src_url, &mut writer, concurrency, part_size)
                    .await;
                let _ = writer.shutdown().await;
                outcome
            };

            let dst_client = self.dst_client.clone();
            let dst_url = dst.clone();
            let write_side = async move {
                dst_client
                    .put(
                        &mut reader,
                        &dst_url,
                        &Metadata::default(),
                        concurrency,
                        part_size,
                    )
                    .await
            };

            tokio::try_join!(read_side, write_side)?;
        }

        InfoMessage {
            operation: "copy",
            source: src.to_string(),
            destination: Some(dst.to_string()),
            size: None,
        }
        .print(self.options.log_format);
        Ok(())
    }
}

/// Removes destination-only objects once classification of the destination
/// side has completed.
pub struct DeleteTask {
    client: Arc<dyn StorageClient>,
    only_dest: mpsc::Receiver<ObjectUrl>,
    enabled: bool,
    log_format: LogFormat,
    error_tx: mpsc::UnboundedSender<SyncError>,
    cancel: CancellationToken,
}

impl DeleteTask {
    pub fn new(
        client: Arc<dyn StorageClient>,
        only_dest: mpsc::Receiver<ObjectUrl>,
        enabled: bool,
        log_format: LogFormat,
        error_tx: mpsc::UnboundedSender<SyncError>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            only_dest,
            enabled,
            log_format,
            error_tx,
            cancel,
        }
    }

    pub async fn run(mut self) -> Result<(), SyncError> {
        if !self.enabled {
            return Ok(());
        }

        // The stream closes once the destination pass completes, so this
        // cannot observe a partial classification.
        let mut urls = Vec::new();
        while let Some(url) = self.only_dest.recv().await {
            urls.push(url);
        }
        if urls.is_empty() {
            return Ok(());
        }
        if self.cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        for (url, outcome) in self.client.multi_delete(urls).await {
            match outcome {
                Ok(()) => InfoMessage {
                    operation: "delete",
                    source: url.to_string(),
                    destination: None,
                    size: None,
                }
                .print(self.log_format),
                Err(err) if err.is_cancellation() => continue,
                Err(err) => {
                    let _ = self.error_tx.send(err);
                }
            }
        }
        Ok(())
    }
}
