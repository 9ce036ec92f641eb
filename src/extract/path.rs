//! Safe Path Joining
//!
//! This module provides the single primitive that keeps archive extraction
//! inside its destination directory. Every entry name read from an archive
//! must pass through [`safe_join`] before any filesystem operation touches it;
//! no entry type is exempt.

use super::ExtractError;
use std::path::{Component, Path, PathBuf};

/// Join a trusted base directory with an untrusted relative path.
///
/// The untrusted path is normalized lexically: `.` components are dropped,
/// `..` components pop previously pushed components, and absolute or
/// prefix components are rejected outright. The join succeeds only if the
/// result equals `base` or is a strict descendant of it.
///
/// The check is pure path arithmetic with no filesystem access, so it is
/// correct even while the destination tree is still
/// being created.
///
/// # Errors
///
/// Returns [`ExtractError::PathEscape`] for any name that would land outside
/// `base`, including absolute names and names whose `..` segments climb past
/// the base.
pub fn safe_join(base: &Path, untrusted: &str) -> Result<PathBuf, ExtractError> {
    let mut joined = base.to_path_buf();
    let mut depth: usize = 0;

    for component in Path::new(untrusted).components() {
        match component {
            Component::Normal(part) => {
                joined.push(part);
                depth += 1;
            }
            Component::CurDir => {}
            Component::ParentDir => {
                // A `..` may only unwind components pushed by this join.
                if depth == 0 {
                    return Err(ExtractError::PathEscape(untrusted.to_string()));
                }
                joined.pop();
                depth -= 1;
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(ExtractError::PathEscape(untrusted.to_string()));
            }
        }
    }

    Ok(joined)
}
