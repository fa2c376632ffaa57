//! Content hash comparison for sync candidates.
//!
//! Remote stores report an opaque content fingerprint per object; for a
//! multipart-assembled object that fingerprint encodes a part count instead
//! of a whole-content digest, so equality cannot be judged without
//! recomputing with identical part boundaries. Local files have no stored
//! fingerprint and are hashed on demand with a streaming MD5.

use md5::{Digest, Md5};
use std::path::Path;
use tokio::io::AsyncReadExt;

use crate::error::SyncError;
use crate::storage::object::Object;

const HASH_BUFFER_SIZE: usize = 64 * 1024;

/// Outcome of comparing two objects' content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashComparison {
    /// Contents are identical; transferring would be a no-op.
    Same,
    /// Contents differ; the transfer should proceed.
    Different,
    /// At least one side was assembled from parts; no verdict possible.
    Incomparable,
}

/// Hash-relevant view of an [`Object`], built per comparison.
pub struct ObjectHash<'a> {
    object: &'a Object,
    multipart_parts: u32,
    is_local: bool,
}

impl<'a> ObjectHash<'a> {
    pub fn new(object: &'a Object) -> Self {
        Self {
            object,
            multipart_parts: multipart_part_count(&object.etag),
            is_local: !object.url.is_remote(),
        }
    }

    pub fn is_multipart(&self) -> bool {
        self.multipart_parts > 0
    }

    /// Judge whether this object's content differs from `other`'s.
    ///
    /// A read failure while hashing a local file is a hard error for the
    /// comparison.
    pub async fn compare(&self, other: &ObjectHash<'_>) -> Result<HashComparison, SyncError> {
        if self.is_multipart() || other.is_multipart() {
            return Ok(HashComparison::Incomparable);
        }

        let (ours, theirs) = if self.is_local {
            let local = file_md5(Path::new(self.object.url.path())).await?;
            (local, other.object.etag.clone())
        } else if other.is_local {
            let local = file_md5(Path::new(other.object.url.path())).await?;
            (self.object.etag.clone(), local)
        } else {
            (self.object.etag.clone(), other.object.etag.clone())
        };

        if ours == theirs {
            Ok(HashComparison::Same)
        } else {
            Ok(HashComparison::Different)
        }
    }
}

/// Part count encoded in a fingerprint of the form `<hash>-<count>`, or 0
/// when the fingerprint is a plain whole-content digest.
pub fn multipart_part_count(etag: &str) -> u32 {
    let parts: Vec<&str> = etag.split('-').collect();
    if parts.len() != 2 {
        return 0;
    }
    parts[1].parse::<u32>().unwrap_or(0)
}

/// Streaming MD5 of a local file, rendered as lowercase hex.
pub async fn file_md5(path: &Path) -> Result<String, SyncError> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| SyncError::io(format!("open {} for hashing", path.display()), e))?;

    let mut hasher = Md5::new();
    let mut buf = vec![0u8; HASH_BUFFER_SIZE];
    loop {
        let n = file
            .read(&mut buf)
            .await
            .map_err(|e| SyncError::io(format!("read {} for hashing", path.display()), e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(bytes_to_hex(&hasher.finalize()))
}

fn bytes_to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::object::{ObjectKind, StorageClass};
    use crate::storage::url::ObjectUrl;
    use std::io::Write;

    fn remote_object(key: &str, etag: &str) -> Object {
        Object {
            url: ObjectUrl::parse(&format!("s3://bucket/{key}")).unwrap(),
            size: 0,
            mod_time: None,
            etag: etag.to_string(),
            storage_class: StorageClass::Standard,
            kind: ObjectKind::File,
        }
    }

    fn local_object(path: &Path) -> Object {
        Object {
            url: ObjectUrl::parse(&path.to_string_lossy()).unwrap(),
            size: 0,
            mod_time: None,
            etag: String::new(),
            storage_class: StorageClass::Standard,
            kind: ObjectKind::File,
        }
    }

    #[test]
    fn test_multipart_part_count() {
        assert_eq!(multipart_part_count("d41d8cd98f00b204e9800998ecf8427e"), 0);
        assert_eq!(multipart_part_count("d41d8cd98f00b204e9800998ecf8427e-4"), 4);
        assert_eq!(multipart_part_count("abc-def"), 0);
        assert_eq!(multipart_part_count("a-b-c"), 0);
        assert_eq!(multipart_part_count(""), 0);
    }

    #[tokio::test]
    async fn test_multipart_is_always_incomparable() {
        let multipart = remote_object("big", "aabbcc-12");
        let plain = remote_object("small", "aabbcc");

        let verdict = ObjectHash::new(&multipart)
            .compare(&ObjectHash::new(&plain))
            .await
            .unwrap();
        assert_eq!(verdict, HashComparison::Incomparable);

        // Either side being multipart refuses the comparison.
        let verdict = ObjectHash::new(&plain)
            .compare(&ObjectHash::new(&multipart))
            .await
            .unwrap();
        assert_eq!(verdict, HashComparison::Incomparable);
    }

    #[tokio::test]
    async fn test_remote_pair_compares_stored_hashes() {
        let a = remote_object("a", "aabbcc");
        let b = remote_object("b", "aabbcc");
        let c = remote_object("c", "ddeeff");

        let same = ObjectHash::new(&a).compare(&ObjectHash::new(&b)).await;
        assert_eq!(same.unwrap(), HashComparison::Same);

        let different = ObjectHash::new(&a).compare(&ObjectHash::new(&c)).await;
        assert_eq!(different.unwrap(), HashComparison::Different);
    }

    #[tokio::test]
    async fn test_local_file_hashed_and_compared() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"hello world").unwrap();

        // Known MD5 of "hello world".
        let expected = "5eb63bbbe01eeed093cb22bb8f5acdc3";
        assert_eq!(file_md5(file.path()).await.unwrap(), expected);

        let local = local_object(file.path());
        let matching = remote_object("same", expected);
        let differing = remote_object("other", "00000000000000000000000000000000");

        let verdict = ObjectHash::new(&local)
            .compare(&ObjectHash::new(&matching))
            .await
            .unwrap();
        assert_eq!(verdict, HashComparison::Same);

        let verdict = ObjectHash::new(&local)
            .compare(&ObjectHash::new(&differing))
            .await
            .unwrap();
        assert_eq!(verdict, HashComparison::Different);
    }

    #[tokio::test]
    async fn test_unreadable_local_file_is_a_hard_error() {
        let local = local_object(Path::new("/nonexistent/osync-hash-test"));
        let remote = remote_object("x", "aabbcc");

        let result = ObjectHash::new(&local).compare(&ObjectHash::new(&remote)).await;
        assert!(result.is_err());
    }
}
