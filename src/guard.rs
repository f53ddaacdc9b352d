//! Sandbox containment checks.
//!
//! Every listing and file request passes through [`PathGuard::check`] before
//! the filesystem is touched. Containment is decided lexically on normalized
//! paths: a candidate is allowed when it equals a shared root or lies below one
//! on a whole path-segment boundary.

use std::path::{Component, Path, PathBuf};

use tracing::warn;

use crate::error::ApiError;

/// How a request treats an empty shared-root set.
///
/// With at least one root registered every mode is strict. The modes only
/// differ when nothing is shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Host browsing (`/directory`). Everything is reachable while nothing is shared.
    Browse,
    /// Listing under `/api/shared`. Nothing is reachable while nothing is shared.
    Shared,
    /// File transfer (`/file`). Closed while nothing is shared, unless
    /// `open_when_empty` was configured by the operator.
    Download { open_when_empty: bool },
}

impl Access {
    fn permits_empty_registry(self) -> bool {
        match self {
            Access::Browse => true,
            Access::Shared => false,
            Access::Download { open_when_empty } => open_when_empty,
        }
    }
}

/// Lexically normalizes a path: drops `.` segments, resolves `..` against the
/// preceding segment, and removes repeated and trailing separators.
///
/// `..` never climbs above the root of an absolute path. No filesystem access
/// happens here, so symlinks are left as they are.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => out.push(prefix.as_os_str()),
            Component::RootDir => out.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                let at_root = matches!(
                    out.components().next_back(),
                    None | Some(Component::RootDir) | Some(Component::Prefix(_))
                );
                let after_parent = matches!(out.components().next_back(), Some(Component::ParentDir));
                if at_root && out.has_root() {
                    // "/.." is "/"
                } else if at_root || after_parent {
                    out.push("..");
                } else {
                    out.pop();
                }
            }
            Component::Normal(part) => out.push(part),
        }
    }
    if out.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        out
    }
}

/// True iff `candidate` equals `root` or descends from it. Both must already be
/// normalized. `Path::starts_with` compares whole components, so `/a/b` does
/// not contain `/a/bc`.
pub fn is_within(candidate: &Path, root: &Path) -> bool {
    candidate.starts_with(root)
}

/// Containment check against a set of shared roots.
pub struct PathGuard;

impl PathGuard {
    /// Parses and normalizes a requested path, then checks it against `roots`.
    ///
    /// Returns the normalized path on success. A path that is not absolute is
    /// an `InvalidRequest`; an absolute path outside every root is
    /// `AccessDenied`.
    pub fn check(candidate: &str, roots: &[PathBuf], access: Access) -> Result<PathBuf, ApiError> {
        let normalized = Self::absolute(candidate)?;

        if roots.is_empty() && access.permits_empty_registry() {
            return Ok(normalized);
        }

        if roots.iter().any(|root| is_within(&normalized, root)) {
            Ok(normalized)
        } else {
            warn!(
                "Access denied for {} ({:?}, {} shared roots)",
                normalized.display(),
                access,
                roots.len()
            );
            Err(ApiError::AccessDenied(normalized))
        }
    }

    /// Boolean form of [`PathGuard::check`].
    pub fn is_allowed(candidate: &str, roots: &[PathBuf], access: Access) -> bool {
        Self::check(candidate, roots, access).is_ok()
    }

    /// Normalizes `candidate` and rejects anything that is not absolute.
    pub fn absolute(candidate: &str) -> Result<PathBuf, ApiError> {
        if candidate.is_empty() {
            return Err(ApiError::InvalidRequest("Path is required".to_string()));
        }
        let normalized = normalize(Path::new(candidate));
        if !normalized.is_absolute() {
            return Err(ApiError::InvalidRequest(
                "Invalid path: must be absolute".to_string(),
            ));
        }
        Ok(normalized)
    }
}
