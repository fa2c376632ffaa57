//! Transfer decision policy for objects present on both sides.

use crate::storage::object::Object;

/// Verdict for one common (source, destination) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDecision {
    Proceed,
    Skip(SkipReason),
}

/// Why a common pair needs no transfer. All of these are benign and
/// expected; none is surfaced as a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    SizesMatch,
    DestinationNewer,
    SameContent,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::SizesMatch => "object sizes match",
            SkipReason::DestinationNewer => "destination is newer or same age",
            SkipReason::SameContent => "contents match",
        }
    }
}

/// Decide whether `src` should overwrite `dst`.
///
/// Equal sizes always skip. Otherwise, unless `size_only` is set, the
/// source must be strictly newer than the destination; when either side
/// lacks a timestamp the transfer proceeds, since the destination cannot
/// be shown to be newer.
pub fn decide(src: &Object, dst: &Object, size_only: bool) -> SyncDecision {
    if src.size == dst.size {
        return SyncDecision::Skip(SkipReason::SizesMatch);
    }

    if !size_only {
        if let (Some(src_mod), Some(dst_mod)) = (src.mod_time, dst.mod_time) {
            if src_mod <= dst_mod {
                return SyncDecision::Skip(SkipReason::DestinationNewer);
            }
        }
    }

    SyncDecision::Proceed
}
