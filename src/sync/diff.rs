//! Object-set diff engine.
//!
//! Classifies two listed collections into three disjoint streams:
//! objects only on the source side, objects only on the destination side
//! (represented by url alone) and key-matched pairs. The two classification
//! passes run concurrently over the same immutable collections; each output
//! channel is sized to the listed-object count so producers never block,
//! and closes when its owning pass completes.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::SyncError;
use crate::storage::object::Object;
use crate::storage::url::ObjectUrl;
use crate::storage::ListEntry;

/// Two objects whose comparison keys match.
#[derive(Debug, Clone)]
pub struct ObjectPair {
    pub src: Object,
    pub dst: Object,
}

/// Receiving ends of the three classification streams.
pub struct DiffStreams {
    pub only_source: mpsc::Receiver<Object>,
    pub only_dest: mpsc::Receiver<ObjectUrl>,
    pub common: mpsc::Receiver<ObjectPair>,
}

enum Exclusion {
    /// Invisible to the diff: directories and cancelled entries.
    Silent,
    /// Excluded, and worth telling the user about.
    Recorded(SyncError),
}

/// Why (and whether) a listed entry stays out of the diff.
fn exclusion(entry: &ListEntry) -> Option<Exclusion> {
    match entry {
        Err(err) if err.is_cancellation() => Some(Exclusion::Silent),
        Err(err) => Some(Exclusion::Recorded(SyncError::Listing {
            message: err.to_string(),
        })),
        Ok(obj) if obj.is_dir() => Some(Exclusion::Silent),
        Ok(obj) if obj.storage_class.is_archival() => {
            Some(Exclusion::Recorded(SyncError::GlacierObject {
                url: obj.url.to_string(),
            }))
        }
        Ok(_) => None,
    }
}

/// Key-indexed view of a side's transferable objects. The first
/// transferable occurrence of a key wins; duplicate keys within one listing
/// are a listing-collaborator bug and deliberately not resolved here.
fn key_index(entries: &[ListEntry]) -> HashMap<&str, &Object> {
    let mut index = HashMap::new();
    for entry in entries {
        if exclusion(entry).is_some() {
            continue;
        }
        if let Ok(obj) = entry {
            index.entry(obj.url.object_path()).or_insert(obj);
        }
    }
    index
}

/// Spawn the two classification passes.
///
/// The destination pass emits `only_dest` and `common`; the source pass
/// emits `only_source`. A key matched by the destination pass is not
/// re-emitted by the source pass. Each side's exclusions are reported
/// exactly once, by the pass iterating that side.
pub fn spawn_classifiers(
    source: Arc<Vec<ListEntry>>,
    dest: Arc<Vec<ListEntry>>,
    error_tx: mpsc::UnboundedSender<SyncError>,
) -> DiffStreams {
    let source_capacity = source.len().max(1);
    let dest_capacity = dest.len().max(1);

    let (only_source_tx, only_source) = mpsc::channel(source_capacity);
    let (common_tx, common) = mpsc::channel(source_capacity);
    let (only_dest_tx, only_dest) = mpsc::channel(dest_capacity);

    // Destination pass: everything on the destination side is either
    // matched into a pair or destination-only.
    {
        let source = source.clone();
        let dest = dest.clone();
        let error_tx = error_tx.clone();
        tokio::spawn(async move {
            let source_index = key_index(&source);
            for entry in dest.iter() {
                match exclusion(entry) {
                    Some(Exclusion::Silent) => continue,
                    Some(Exclusion::Recorded(err)) => {
                        let _ = error_tx.send(err);
                        continue;
                    }
                    None => {}
                }
                let Ok(dst_obj) = entry else { continue };
                match source_index.get(dst_obj.url.object_path()) {
                    Some(src_obj) => {
                        let pair = ObjectPair {
                            src: (*src_obj).clone(),
                            dst: dst_obj.clone(),
                        };
                        let _ = common_tx.send(pair).await;
                    }
                    None => {
                        let _ = only_dest_tx.send(dst_obj.url.clone()).await;
                    }
                }
            }
        });
    }

    // Source pass: emit objects with no destination counterpart.
    tokio::spawn(async move {
        let dest_index = key_index(&dest);
        for entry in source.iter() {
            match exclusion(entry) {
                Some(Exclusion::Silent) => continue,
                Some(Exclusion::Recorded(err)) => {
                    let _ = error_tx.send(err);
                    continue;
                }
                None => {}
            }
            let Ok(src_obj) = entry else { continue };
            if !dest_index.contains_key(src_obj.url.object_path()) {
                let _ = only_source_tx.send(src_obj.clone()).await;
            }
        }
    });

    DiffStreams {
        only_source,
        only_dest,
        common,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::object::{ObjectKind, StorageClass};

    fn listed(key: &str, size: u64) -> ListEntry {
        Ok(object(key, size))
    }

    fn object(key: &str, size: u64) -> Object {
        Object {
            url: ObjectUrl::parse("s3://bucket/data/*")
                .unwrap()
                .child(&format!("data/{key}")),
            size,
            mod_time: None,
            etag: String::new(),
            storage_class: StorageClass::Standard,
            kind: ObjectKind::File,
        }
    }

    fn dir_entry(key: &str) -> ListEntry {
        let mut obj = object(key, 0);
        obj.kind = ObjectKind::Dir;
        Ok(obj)
    }

    fn glacier_entry(key: &str) -> ListEntry {
        let mut obj = object(key, 1);
        obj.storage_class = StorageClass::Glacier;
        Ok(obj)
    }

    async fn classify(
        source: Vec<ListEntry>,
        dest: Vec<ListEntry>,
    ) -> (Vec<String>, Vec<String>, Vec<(String, String)>, Vec<SyncError>) {
        let (error_tx, mut error_rx) = mpsc::unbounded_channel();
        let mut streams = spawn_classifiers(Arc::new(source), Arc::new(dest), error_tx);

        let mut only_source = Vec::new();
        while let Some(obj) = streams.only_source.recv().await {
            only_source.push(obj.url.object_path().to_string());
        }
        let mut only_dest = Vec::new();
        while let Some(url) = streams.only_dest.recv().await {
            only_dest.push(url.object_path().to_string());
        }
        let mut common = Vec::new();
        while let Some(pair) = streams.common.recv().await {
            common.push((
                pair.src.url.object_path().to_string(),
                pair.dst.url.object_path().to_string(),
            ));
        }
        let mut errors = Vec::new();
        while let Some(err) = error_rx.recv().await {
            errors.push(err);
        }

        only_source.sort();
        only_dest.sort();
        common.sort();
        (only_source, only_dest, common, errors)
    }

    #[tokio::test]
    async fn test_keys_partition_into_three_streams() {
        // source {a, b}, dest {b, c}: a is source-only, c is dest-only,
        // b pairs up.
        let (only_source, only_dest, common, errors) = classify(
            vec![listed("a", 10), listed("b", 20)],
            vec![listed("b", 20), listed("c", 5)],
        )
        .await;

        assert_eq!(only_source, vec!["a"]);
        assert_eq!(only_dest, vec!["c"]);
        assert_eq!(common, vec![("b".to_string(), "b".to_string())]);
        assert!(errors.is_empty());
    }

    #[tokio::test]
    async fn test_directories_are_invisible() {
        let (only_source, only_dest, common, errors) = classify(
            vec![listed("a", 10), dir_entry("sub")],
            vec![dir_entry("sub"), listed("b", 1)],
        )
        .await;

        assert_eq!(only_source, vec!["a"]);
        assert_eq!(only_dest, vec!["b"]);
        assert!(common.is_empty());
        assert!(errors.is_empty());
    }

    #[tokio::test]
    async fn test_archival_objects_are_skipped_with_a_warning() {
        let (only_source, only_dest, common, errors) = classify(
            vec![glacier_entry("cold"), listed("warm", 3)],
            vec![listed("warm", 3)],
        )
        .await;

        assert!(only_source.is_empty());
        assert!(only_dest.is_empty());
        assert_eq!(common.len(), 1);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].is_warning());
    }

    #[tokio::test]
    async fn test_broken_entries_are_recorded_and_excluded() {
        let broken: ListEntry = Err(SyncError::Listing {
            message: "listing s3://bucket/data/x: access denied".to_string(),
        });
        let cancelled: ListEntry = Err(SyncError::Cancelled);

        let (only_source, only_dest, common, errors) =
            classify(vec![broken, cancelled], vec![listed("y", 1)]).await;

        assert!(only_source.is_empty());
        assert_eq!(only_dest, vec!["y"]);
        assert!(common.is_empty());
        // The cancelled entry vanished silently; the broken one was
        // recorded once.
        assert_eq!(errors.len(), 1);
        assert!(!errors[0].is_warning());
    }

    #[tokio::test]
    async fn test_excluded_entry_never_pairs() {
        // "sub" exists on the source side only as a directory placeholder:
        // it neither pairs with the destination file of the same key nor
        // shows up as source-only.
        let (only_source, only_dest, common, _) =
            classify(vec![dir_entry("sub")], vec![listed("sub", 4)]).await;

        assert!(only_source.is_empty());
        assert_eq!(only_dest, vec!["sub"]);
        assert!(common.is_empty());
    }
}
