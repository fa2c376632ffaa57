// In-memory storage client used by the integration tests.
// Injected through the same trait object seam the real clients use.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::BTreeMap;
use std::sync::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use osync::error::SyncError;
use osync::storage::{
    ListEntry, Metadata, Object, ObjectKind, ObjectUrl, StorageClass, StorageClient,
};

#[derive(Debug, Clone)]
pub struct FakeObject {
    pub data: Vec<u8>,
    pub etag: String,
    pub mod_time: DateTime<Utc>,
}

/// A bucket's worth of objects behind the `StorageClient` trait.
pub struct FakeStore {
    bucket: String,
    objects: Mutex<BTreeMap<String, FakeObject>>,
    /// When set, `get` writes half the object then fails.
    fail_get: bool,
}

impl FakeStore {
    pub fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            objects: Mutex::new(BTreeMap::new()),
            fail_get: false,
        }
    }

    pub fn failing(bucket: &str) -> Self {
        Self {
            fail_get: true,
            ..Self::new(bucket)
        }
    }

    pub fn insert(&self, key: &str, data: &[u8]) {
        self.insert_with_etag(key, data, &format!("etag{}", data.len()));
    }

    pub fn insert_with_etag(&self, key: &str, data: &[u8], etag: &str) {
        self.objects.lock().unwrap().insert(
            key.to_string(),
            FakeObject {
                data: data.to_vec(),
                etag: etag.to_string(),
                mod_time: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            },
        );
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    pub fn data(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).map(|o| o.data.clone())
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    fn lookup(&self, key: &str) -> Option<FakeObject> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    fn missing(&self, key: &str) -> SyncError {
        SyncError::storage(
            format!("s3://{}/{key}", self.bucket),
            std::io::Error::new(std::io::ErrorKind::NotFound, "no such object"),
        )
    }
}

#[async_trait]
impl StorageClient for FakeStore {
    async fn list(&self, url: &ObjectUrl) -> Vec<ListEntry> {
        let matcher = url.glob_matcher().ok().flatten();
        let objects = self.objects.lock().unwrap();
        objects
            .iter()
            .filter(|(key, _)| key.starts_with(url.listing_prefix()))
            .filter(|(key, _)| matcher.as_ref().map_or(true, |m| m.is_match(key)))
            .map(|(key, obj)| {
                Ok(Object {
                    url: url.child(key),
                    size: obj.data.len() as u64,
                    mod_time: Some(obj.mod_time),
                    etag: obj.etag.clone(),
                    storage_class: StorageClass::Standard,
                    kind: ObjectKind::File,
                })
            })
            .collect()
    }

    async fn stat(&self, url: &ObjectUrl) -> Result<Object, SyncError> {
        let obj = self.lookup(url.path()).ok_or_else(|| self.missing(url.path()))?;
        Ok(Object {
            url: url.clone(),
            size: obj.data.len() as u64,
            mod_time: Some(obj.mod_time),
            etag: obj.etag,
            storage_class: StorageClass::Standard,
            kind: ObjectKind::File,
        })
    }

    async fn get(
        &self,
        url: &ObjectUrl,
        writer: &mut (dyn AsyncWrite + Send + Unpin),
        _concurrency: usize,
        _part_size: u64,
    ) -> Result<u64, SyncError> {
        let obj = self.lookup(url.path()).ok_or_else(|| self.missing(url.path()))?;
        if self.fail_get {
            let _ = writer.write_all(&obj.data[..obj.data.len() / 2]).await;
            return Err(SyncError::storage(
                format!("get {url}"),
                std::io::Error::other("connection reset by peer"),
            ));
        }
        writer
            .write_all(&obj.data)
            .await
            .map_err(|e| SyncError::io(format!("write {url}"), e))?;
        Ok(obj.data.len() as u64)
    }

    async fn put(
        &self,
        reader: &mut (dyn AsyncRead + Send + Unpin),
        url: &ObjectUrl,
        _metadata: &Metadata,
        _concurrency: usize,
        _part_size: u64,
    ) -> Result<(), SyncError> {
        let mut data = Vec::new();
        reader
            .read_to_end(&mut data)
            .await
            .map_err(|e| SyncError::io(format!("read body for {url}"), e))?;
        let etag = format!("etag{}", data.len());
        self.objects.lock().unwrap().insert(
            url.path().to_string(),
            FakeObject {
                data,
                etag,
                mod_time: Utc::now(),
            },
        );
        Ok(())
    }

    async fn copy(
        &self,
        src: &ObjectUrl,
        dst: &ObjectUrl,
        _metadata: &Metadata,
    ) -> Result<(), SyncError> {
        let obj = self.lookup(src.path()).ok_or_else(|| self.missing(src.path()))?;
        self.objects
            .lock()
            .unwrap()
            .insert(dst.path().to_string(), obj);
        Ok(())
    }

    async fn delete(&self, url: &ObjectUrl) -> Result<(), SyncError> {
        self.objects
            .lock()
            .unwrap()
            .remove(url.path())
            .map(|_| ())
            .ok_or_else(|| self.missing(url.path()))
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
