//! Sync run orchestration.
//!
//! One run flows through five states: list both sides concurrently, diff
//! them, dispatch one task per item, drain the pool and the error sink,
//! then report the combined outcome. Per-item failures never abort sibling
//! items; only resource exhaustion ends the run early.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{RunError, SyncError};
use crate::exec::{self, WorkerPool};
use crate::storage::url::ObjectUrl;
use crate::storage::StorageClient;
use crate::sync::diff;
use crate::sync::task::{DeleteTask, TransferTask};
use crate::sync::SyncOptions;

const OPERATION: &str = "sync";

/// A configured sync run.
pub struct Sync {
    srcurl: ObjectUrl,
    dsturl: ObjectUrl,
    src_client: Arc<dyn StorageClient>,
    dst_client: Arc<dyn StorageClient>,
    options: SyncOptions,
    cancel: CancellationToken,
    /// The command line as given, echoed in error lines.
    full_command: String,
}

impl Sync {
    pub fn new(
        src_client: Arc<dyn StorageClient>,
        dst_client: Arc<dyn StorageClient>,
        srcurl: ObjectUrl,
        dsturl: ObjectUrl,
        options: SyncOptions,
        cancel: CancellationToken,
        full_command: String,
    ) -> Self {
        Self {
            srcurl,
            dsturl,
            src_client,
            dst_client,
            options,
            cancel,
            full_command,
        }
    }

    /// Reconcile the destination against the source.
    pub async fn run(self) -> Result<(), RunError> {
        // Listing: both sides concurrently. The destination is listed as a
        // recursive prefix so nested objects participate in the diff.
        let dest_listing_url = self.dsturl.to_listing_root();
        let (source_entries, dest_entries) = tokio::join!(
            self.src_client.list(&self.srcurl),
            self.dst_client.list(&dest_listing_url),
        );
        // A destination that does not exist yet is simply an empty side.
        let dest_entries: Vec<_> = dest_entries
            .into_iter()
            .filter(|entry| !matches!(entry, Err(err) if err.is_not_found()))
            .collect();

        // Batch mode: many-object source (wildcard, or a local directory).
        let mut is_batch = self.srcurl.is_wildcard();
        if !is_batch && !self.srcurl.is_remote() {
            if let Ok(obj) = self.src_client.stat(&self.srcurl).await {
                is_batch = obj.is_dir();
            }
        }

        tracing::debug!(
            source_objects = source_entries.len(),
            dest_objects = dest_entries.len(),
            is_batch,
            "listed both sides"
        );

        let (error_tx, error_rx) = mpsc::unbounded_channel::<SyncError>();
        let mut sink = tokio::spawn(exec::drain_errors(
            error_rx,
            self.full_command.clone(),
            OPERATION,
            self.options.log_format,
        ));

        // Diffing: both classification passes run concurrently.
        let streams = diff::spawn_classifiers(
            Arc::new(source_entries),
            Arc::new(dest_entries),
            error_tx.clone(),
        );
        let diff::DiffStreams {
            mut only_source,
            only_dest,
            mut common,
        } = streams;

        // Dispatching: one task per classified item, then the delete task.
        let mut pool = WorkerPool::new(self.options.concurrency, error_tx.clone());

        while let Some(src_obj) = only_source.recv().await {
            let task = TransferTask::source_only(
                src_obj,
                self.dsturl.clone(),
                is_batch,
                self.src_client.clone(),
                self.dst_client.clone(),
                self.options.clone(),
                self.cancel.clone(),
            );
            pool.submit(task.run());
        }

        while let Some(pair) = common.recv().await {
            let task = TransferTask::pair(
                pair,
                self.src_client.clone(),
                self.dst_client.clone(),
                self.options.clone(),
                self.cancel.clone(),
            );
            pool.submit(task.run());
        }

        let delete_task = DeleteTask::new(
            self.dst_client.clone(),
            only_dest,
            self.options.delete,
            self.options.log_format,
            error_tx.clone(),
            self.cancel.clone(),
        );
        pool.submit(delete_task.run());

        drop(error_tx);

        // Draining: a fatal error ends the sink early; cancel in-flight
        // work and abort without waiting for stragglers.
        tokio::select! {
            drained = &mut sink => {
                self.cancel.cancel();
                let mut summary = drained.unwrap_or_default();
                if let Some(fatal) = summary.fatal() {
                    return Err(RunError::Fatal(fatal));
                }
                return summary.into_result().map_err(RunError::Aggregate);
            }
            () = pool.join() => {}
        }

        let mut summary = sink.await.unwrap_or_default();
        if let Some(fatal) = summary.fatal() {
            self.cancel.cancel();
            return Err(RunError::Fatal(fatal));
        }
        summary.into_result().map_err(RunError::Aggregate)
    }
}
