//! Version comparison
//!
//! Two flavours live here. [`compare`] is the lenient comparator used when a
//! client reports its version at login: dot-separated numeric segments,
//! missing segments count as zero, malformed input sorts lowest.
//! [`SemanticVersion`] is the strict form the registry stores.

use std::cmp::Ordering;
use std::fmt;

use super::error::{Result, UpdateError};

/// Splits a version into its numeric segments.
///
/// Surrounding whitespace and a single leading `v` are ignored. Any empty or
/// non-numeric segment makes the whole version malformed.
pub fn segments(version: &str) -> Result<Vec<u64>> {
    let trimmed = version.trim();
    let trimmed = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);

    if trimmed.is_empty() {
        return Err(UpdateError::MalformedVersionString(version.to_string()));
    }

    trimmed
        .split('.')
        .map(|segment| {
            if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
                return Err(UpdateError::MalformedVersionString(version.to_string()));
            }
            segment
                .parse::<u64>()
                .map_err(|_| UpdateError::MalformedVersionString(version.to_string()))
        })
        .collect()
}

/// Whether [`compare`] treats `version` as well formed
pub fn is_well_formed(version: &str) -> bool {
    segments(version).is_ok()
}

/// Compares two reported versions segment by segment.
///
/// `1.2` and `1.2.0` are equal. A malformed version is lower than every
/// well-formed one, and two malformed versions are equal, which keeps the
/// ordering antisymmetric.
pub fn compare(a: &str, b: &str) -> Ordering {
    match (segments(a), segments(b)) {
        (Ok(a), Ok(b)) => compare_segments(&a, &b),
        (Err(_), Ok(_)) => Ordering::Less,
        (Ok(_), Err(_)) => Ordering::Greater,
        (Err(_), Err(_)) => Ordering::Equal,
    }
}

fn compare_segments(a: &[u64], b: &[u64]) -> Ordering {
    let len = a.len().max(b.len());
    (0..len)
        .map(|i| {
            let left = a.get(i).copied().unwrap_or(0);
            let right = b.get(i).copied().unwrap_or(0);
            left.cmp(&right)
        })
        .find(|ord| *ord != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

/// Largest major, minor or patch component the registry accepts
pub const MAX_COMPONENT: u64 = 9_999;

/// Strict `major.minor.patch[-prerelease]` version kept in the registry
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SemanticVersion(semver::Version);

impl SemanticVersion {
    /// Parses a registry version, accepting an optional leading `v`.
    /// Each numeric component must be at most [`MAX_COMPONENT`] so the
    /// order index stays well defined.
    pub fn parse(version: &str) -> Result<Self> {
        let trimmed = version.trim();
        let trimmed = trimmed
            .strip_prefix('v')
            .or_else(|| trimmed.strip_prefix('V'))
            .unwrap_or(trimmed);

        let parsed = semver::Version::parse(trimmed)
            .map_err(|_| UpdateError::MalformedVersionString(version.to_string()))?;
        if [parsed.major, parsed.minor, parsed.patch]
            .iter()
            .any(|component| *component > MAX_COMPONENT)
        {
            return Err(UpdateError::MalformedVersionString(version.to_string()));
        }
        Ok(Self(parsed))
    }

    /// Integer ordering key: `MMMM_NNNN_PPPP_R`, where `R` is 1 for releases
    /// and 0 for pre-releases.
    pub fn order_index(&self) -> u64 {
        let release_flag = if self.0.pre.is_empty() { 1 } else { 0 };
        self.0.major * 100_000_000 + self.0.minor * 10_000 + self.0.patch * 10 + release_flag
    }

    pub fn is_prerelease(&self) -> bool {
        !self.0.pre.is_empty()
    }
}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
