// Error types for the sync engine.
// Distinguishes warnings (recorded, never fail the run), cancellation
// (never printed), per-item transfer failures (aggregated) and fatal
// resource exhaustion (aborts the run).

use std::error::Error as StdError;
use std::fmt;

/// Printed once when the transport reports file-descriptor exhaustion.
pub const FD_LIMIT_GUIDANCE: &str = "\
The operating system refused to open more files. Raise the open file limit \
(e.g. `ulimit -n 4096`) or lower --concurrency, then retry.";

const FD_LIMIT_SIGNATURE: &str = "too many open files";

#[derive(Debug)]
pub enum SyncError {
    /// Object lives on an archival storage tier and cannot be transferred
    /// without a restore step.
    GlacierObject { url: String },
    /// Stored fingerprint encodes a multipart part count, so content
    /// equality cannot be determined.
    MultipartHash { url: String },
    /// The run was cancelled. Never printed, never aggregated.
    Cancelled,
    /// A listing produced a broken entry for one object.
    Listing { message: String },
    /// A transfer operation failed mid-flight.
    Transfer {
        op: &'static str,
        src: String,
        dst: Option<String>,
        source: Box<dyn StdError + Send + Sync>,
    },
    /// A storage client call failed.
    Storage {
        context: String,
        source: Box<dyn StdError + Send + Sync>,
    },
    /// Local filesystem I/O failed.
    Io {
        context: String,
        source: std::io::Error,
    },
}

impl SyncError {
    pub fn storage(
        context: impl Into<String>,
        source: impl Into<Box<dyn StdError + Send + Sync>>,
    ) -> Self {
        SyncError::Storage {
            context: context.into(),
            source: source.into(),
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        SyncError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn transfer(
        op: &'static str,
        src: impl ToString,
        dst: impl ToString,
        source: impl Into<Box<dyn StdError + Send + Sync>>,
    ) -> Self {
        SyncError::Transfer {
            op,
            src: src.to_string(),
            dst: Some(dst.to_string()),
            source: source.into(),
        }
    }

    /// Cancellation-class errors are skipped silently everywhere.
    pub fn is_cancellation(&self) -> bool {
        if matches!(self, SyncError::Cancelled) {
            return true;
        }
        let mut cur = self.source();
        while let Some(err) = cur {
            if let Some(sync_err) = err.downcast_ref::<SyncError>() {
                if matches!(sync_err, SyncError::Cancelled) {
                    return true;
                }
            }
            cur = err.source();
        }
        false
    }

    /// Warning-class errors are printed but never fail the run.
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            SyncError::GlacierObject { .. } | SyncError::MultipartHash { .. }
        )
    }

    /// The underlying path or object does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            SyncError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound
        )
    }

    /// True when any error in the chain carries the file-descriptor
    /// exhaustion signature (EMFILE/ENFILE surface with this text).
    pub fn is_resource_exhaustion(&self) -> bool {
        let mut cur: Option<&(dyn StdError + 'static)> = Some(self);
        while let Some(err) = cur {
            if err.to_string().contains(FD_LIMIT_SIGNATURE) {
                return true;
            }
            cur = err.source();
        }
        false
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SyncError::GlacierObject { url } => {
                write!(f, "object {url} is on archival storage, skipping")
            }
            SyncError::MultipartHash { url } => {
                write!(
                    f,
                    "object {url} was uploaded in parts, content comparison is not possible"
                )
            }
            SyncError::Cancelled => write!(f, "operation cancelled"),
            SyncError::Listing { message } => write!(f, "{message}"),
            SyncError::Transfer {
                op,
                src,
                dst: Some(dst),
                source,
            } => write!(f, "{op} {src} to {dst}: {source}"),
            SyncError::Transfer {
                op, src, source, ..
            } => write!(f, "{op} {src}: {source}"),
            SyncError::Storage { context, source } => write!(f, "{context}: {source}"),
            SyncError::Io { context, source } => write!(f, "{context}: {source}"),
        }
    }
}

impl StdError for SyncError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            SyncError::Transfer { source, .. } | SyncError::Storage { source, .. } => {
                Some(source.as_ref())
            }
            SyncError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Collection of per-item failures from one run.
#[derive(Debug, Default)]
pub struct MultiError {
    errors: Vec<SyncError>,
}

impl MultiError {
    pub fn push(&mut self, err: SyncError) {
        self.errors.push(err);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[SyncError] {
        &self.errors
    }
}

impl From<Vec<SyncError>> for MultiError {
    fn from(errors: Vec<SyncError>) -> Self {
        Self { errors }
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.errors.len() {
            0 => write!(f, "no errors"),
            1 => write!(f, "{}", self.errors[0]),
            n => {
                writeln!(f, "{n} errors occurred during sync:")?;
                for err in &self.errors {
                    writeln!(f, "  * {err}")?;
                }
                Ok(())
            }
        }
    }
}

impl StdError for MultiError {}

/// Outcome of a failed run, checked by the caller to pick an exit status.
#[derive(Debug)]
pub enum RunError {
    /// One or more per-item failures; siblings were not aborted.
    Aggregate(MultiError),
    /// Resource exhaustion; the run was aborted early.
    Fatal(SyncError),
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RunError::Aggregate(multi) => write!(f, "{multi}"),
            RunError::Fatal(err) => write!(f, "fatal: {err}"),
        }
    }
}

impl StdError for RunError {}
