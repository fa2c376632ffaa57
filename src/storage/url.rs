//! URL model for storage endpoints.
//!
//! An [`ObjectUrl`] identifies either a local filesystem path or an object
//! on a remote bucket, carries the wildcard/bucket/prefix classification
//! used by validation, and knows how to produce the comparison key that
//! matches "the same relative item" across two sides of a sync.

use anyhow::{bail, Context, Result};
use globset::{GlobBuilder, GlobMatcher};
use std::fmt;

const S3_SCHEME: &str = "s3://";
const GCS_SCHEME: &str = "gs://";

const GLOB_CHARACTERS: &[char] = &['*', '?', '[', ']'];

/// Where an endpoint lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Local,
    S3,
    Gcs,
}

impl Scheme {
    fn tag(&self) -> &'static str {
        match self {
            Scheme::Local => "",
            Scheme::S3 => S3_SCHEME,
            Scheme::Gcs => GCS_SCHEME,
        }
    }
}

/// A parsed storage location.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectUrl {
    raw: String,
    scheme: Scheme,
    bucket: String,
    /// Object key (remote) or filesystem path (local).
    path: String,
    /// Leading portion stripped off by [`ObjectUrl::object_path`]; set from
    /// the pattern at parse time and adjusted when listing a directory.
    prefix: String,
}

impl ObjectUrl {
    /// Parse a source/destination argument.
    ///
    /// `s3://bucket/key` and `gs://bucket/key` are remote; everything else
    /// is a local filesystem path.
    pub fn parse(s: &str) -> Result<Self> {
        if s.is_empty() {
            bail!("empty object path");
        }

        for scheme in [Scheme::S3, Scheme::Gcs] {
            if let Some(rest) = s.strip_prefix(scheme.tag()) {
                let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
                if bucket.is_empty() {
                    bail!("invalid remote url {s:?}: missing bucket name");
                }
                if bucket.contains(GLOB_CHARACTERS) {
                    bail!("invalid remote url {s:?}: bucket name cannot contain wildcards");
                }
                return Ok(Self {
                    raw: s.to_string(),
                    scheme,
                    bucket: bucket.to_string(),
                    path: key.to_string(),
                    prefix: default_prefix(key),
                });
            }
        }

        Ok(Self {
            raw: s.to_string(),
            scheme: Scheme::Local,
            bucket: String::new(),
            path: s.to_string(),
            prefix: default_prefix(s),
        })
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Object key for remote urls, filesystem path for local ones.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The non-wildcard leading portion used as the listing root.
    pub fn listing_prefix(&self) -> &str {
        &self.prefix
    }

    pub fn is_remote(&self) -> bool {
        self.scheme != Scheme::Local
    }

    pub fn is_wildcard(&self) -> bool {
        self.path.contains(GLOB_CHARACTERS)
    }

    /// A remote url naming a bucket with no key.
    pub fn is_bucket(&self) -> bool {
        self.is_remote() && self.path.is_empty()
    }

    /// A remote url naming a key namespace rather than a single object.
    pub fn is_prefix(&self) -> bool {
        self.is_remote() && !self.is_wildcard() && self.path.ends_with('/')
    }

    /// Comparison key: the path relative to the listing root, so that a
    /// source item and a destination item denoting the same relative object
    /// compare equal.
    pub fn object_path(&self) -> &str {
        self.path.strip_prefix(&self.prefix).unwrap_or(&self.path)
    }

    /// Url of an entry found while listing under this url. The child keeps
    /// this url's listing prefix so its `object_path` stays relative.
    pub fn child(&self, path: &str) -> ObjectUrl {
        ObjectUrl {
            raw: rebuild(self.scheme, &self.bucket, path),
            scheme: self.scheme,
            bucket: self.bucket.clone(),
            path: path.to_string(),
            prefix: self.prefix.clone(),
        }
    }

    /// This url reinterpreted as a directory/prefix listing root: the path
    /// gains a trailing slash and becomes its own listing prefix, so every
    /// listed child is named relative to it.
    pub fn to_listing_root(&self) -> ObjectUrl {
        let mut path = self.path.clone();
        if !path.is_empty() && !path.ends_with('/') {
            path.push('/');
        }
        ObjectUrl {
            raw: rebuild(self.scheme, &self.bucket, &path),
            scheme: self.scheme,
            bucket: self.bucket.clone(),
            prefix: path.clone(),
            path,
        }
    }

    /// Compiled matcher for wildcard urls; `*` does not cross `/`.
    pub fn glob_matcher(&self) -> Result<Option<GlobMatcher>> {
        if !self.is_wildcard() {
            return Ok(None);
        }
        let glob = GlobBuilder::new(&self.path)
            .literal_separator(true)
            .build()
            .with_context(|| format!("invalid wildcard pattern {:?}", self.raw))?;
        Ok(Some(glob.compile_matcher()))
    }

    fn with_path(&self, path: String) -> ObjectUrl {
        ObjectUrl {
            raw: rebuild(self.scheme, &self.bucket, &path),
            scheme: self.scheme,
            bucket: self.bucket.clone(),
            prefix: default_prefix(&path),
            path,
        }
    }

    fn basename(&self) -> &str {
        self.path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(&self.path)
    }
}

impl fmt::Display for ObjectUrl {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// Final key for a transfer into a remote destination.
///
/// Batch transfers preserve the source's relative path under the
/// destination prefix; single-object transfers into a bucket or prefix take
/// the source's base name, and a fully-specified destination key is used
/// as-is.
pub fn resolve_remote_destination(src: &ObjectUrl, dst: &ObjectUrl, is_batch: bool) -> ObjectUrl {
    if is_batch {
        let mut key = dst.path.clone();
        if !key.is_empty() && !key.ends_with('/') {
            key.push('/');
        }
        key.push_str(src.object_path());
        dst.with_path(key)
    } else if dst.is_bucket() || dst.is_prefix() {
        let mut key = dst.path.clone();
        key.push_str(src.basename());
        dst.with_path(key)
    } else {
        dst.clone()
    }
}

/// Final path for a transfer into a local destination.
pub fn resolve_local_destination(src: &ObjectUrl, dst: &ObjectUrl, is_batch: bool) -> ObjectUrl {
    if is_batch {
        let mut path = dst.path.trim_end_matches('/').to_string();
        if !path.is_empty() {
            path.push('/');
        }
        path.push_str(src.object_path());
        dst.with_path(path)
    } else if dst.path.ends_with('/') {
        let mut path = dst.path.clone();
        path.push_str(src.basename());
        dst.with_path(path)
    } else {
        dst.clone()
    }
}

fn rebuild(scheme: Scheme, bucket: &str, path: &str) -> String {
    match scheme {
        Scheme::Local => path.to_string(),
        _ => format!("{}{}/{}", scheme.tag(), bucket, path),
    }
}

/// Pattern portion up to the first wildcard, truncated at the last `/`.
fn default_prefix(path: &str) -> String {
    let cut = match path.find(GLOB_CHARACTERS) {
        Some(idx) => &path[..idx],
        None => path,
    };
    match cut.rfind('/') {
        Some(idx) => cut[..=idx].to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_remote() {
        let url = ObjectUrl::parse("s3://bucket/data/file.txt").unwrap();
        assert!(url.is_remote());
        assert_eq!(url.scheme(), Scheme::S3);
        assert_eq!(url.bucket(), "bucket");
        assert_eq!(url.path(), "data/file.txt");
        assert!(!url.is_wildcard());
        assert!(!url.is_bucket());
        assert!(!url.is_prefix());
        assert_eq!(url.object_path(), "file.txt");

        let gcs = ObjectUrl::parse("gs://bucket/x").unwrap();
        assert_eq!(gcs.scheme(), Scheme::Gcs);
    }

    #[test]
    fn test_parse_local() {
        let url = ObjectUrl::parse("data/file.txt").unwrap();
        assert!(!url.is_remote());
        assert!(!url.is_bucket());
        assert!(!url.is_prefix());
        assert_eq!(url.object_path(), "file.txt");
    }

    #[test]
    fn test_parse_rejects_bad_urls() {
        assert!(ObjectUrl::parse("").is_err());
        assert!(ObjectUrl::parse("s3://").is_err());
        assert!(ObjectUrl::parse("s3://buck*t/key").is_err());
    }

    #[test]
    fn test_wildcard_bucket_prefix_flags() {
        let wild = ObjectUrl::parse("s3://bucket/logs/*.gz").unwrap();
        assert!(wild.is_wildcard());
        assert!(!wild.is_prefix());
        assert_eq!(wild.listing_prefix(), "logs/");

        let bucket = ObjectUrl::parse("s3://bucket").unwrap();
        assert!(bucket.is_bucket());
        assert!(!bucket.is_wildcard());

        let prefix = ObjectUrl::parse("s3://bucket/logs/").unwrap();
        assert!(prefix.is_prefix());
        assert!(!prefix.is_bucket());
    }

    #[test]
    fn test_child_keeps_relative_object_path() {
        let root = ObjectUrl::parse("s3://bucket/data/*").unwrap();
        let child = root.child("data/sub/file.txt");
        assert_eq!(child.object_path(), "sub/file.txt");
        assert_eq!(child.to_string(), "s3://bucket/data/sub/file.txt");
    }

    #[test]
    fn test_listing_root() {
        let url = ObjectUrl::parse("s3://bucket/backup").unwrap();
        let root = url.to_listing_root();
        assert_eq!(root.path(), "backup/");
        assert_eq!(root.listing_prefix(), "backup/");
        assert_eq!(root.child("backup/a/b").object_path(), "a/b");

        let local = ObjectUrl::parse("dir").unwrap().to_listing_root();
        assert_eq!(local.child("dir/f").object_path(), "f");
    }

    #[test]
    fn test_glob_matcher_does_not_cross_separator() {
        let url = ObjectUrl::parse("s3://bucket/data/*.txt").unwrap();
        let matcher = url.glob_matcher().unwrap().unwrap();
        assert!(matcher.is_match("data/a.txt"));
        assert!(!matcher.is_match("data/sub/a.txt"));
        assert!(!matcher.is_match("data/a.gz"));
    }

    #[test]
    fn test_resolve_remote_destination_batch() {
        let src = ObjectUrl::parse("docs/*").unwrap().child("docs/a/b.txt");
        let dst = ObjectUrl::parse("s3://bucket/backup/").unwrap();
        let resolved = resolve_remote_destination(&src, &dst, true);
        assert_eq!(resolved.path(), "backup/a/b.txt");
        assert_eq!(resolved.to_string(), "s3://bucket/backup/a/b.txt");
    }

    #[test]
    fn test_resolve_remote_destination_single() {
        let src = ObjectUrl::parse("docs/report.pdf").unwrap();

        let into_prefix = ObjectUrl::parse("s3://bucket/backup/").unwrap();
        assert_eq!(
            resolve_remote_destination(&src, &into_prefix, false).path(),
            "backup/report.pdf"
        );

        let into_bucket = ObjectUrl::parse("s3://bucket").unwrap();
        assert_eq!(
            resolve_remote_destination(&src, &into_bucket, false).path(),
            "report.pdf"
        );

        let exact = ObjectUrl::parse("s3://bucket/renamed.pdf").unwrap();
        assert_eq!(
            resolve_remote_destination(&src, &exact, false).path(),
            "renamed.pdf"
        );
    }

    #[test]
    fn test_resolve_local_destination() {
        let src = ObjectUrl::parse("s3://bucket/data/*")
            .unwrap()
            .child("data/sub/f.bin");
        let dst = ObjectUrl::parse("downloads").unwrap();
        assert_eq!(
            resolve_local_destination(&src, &dst, true).path(),
            "downloads/sub/f.bin"
        );

        let single = ObjectUrl::parse("s3://bucket/data/f.bin").unwrap();
        let dir_dst = ObjectUrl::parse("downloads/").unwrap();
        assert_eq!(
            resolve_local_destination(&single, &dir_dst, false).path(),
            "downloads/f.bin"
        );
    }
}
