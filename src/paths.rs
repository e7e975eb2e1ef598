//! Path mapper: remote artifact layout to local file paths.
//!
//! Remote names come from the server and are treated as untrusted. Every
//! relative segment is checked before it is joined onto a local path, so a
//! listing can never place a file outside the artifact's local root.

use crate::error::{Error, Result};
use crate::types::{REMOTE_SEPARATOR, RemotePath};
use std::path::{Path, PathBuf};

/// Why `segment` cannot be used as one local path component, if it can't
fn segment_problem(segment: &str) -> Option<&'static str> {
    match segment {
        "" => Some("empty path segment"),
        "." | ".." => Some("relative path segment"),
        s if s.contains('\0') => Some("path segment contains a NUL byte"),
        s if s.contains('\\') => Some("path segment contains a backslash"),
        s if s.contains(REMOTE_SEPARATOR) => Some("path segment contains a separator"),
        s if cfg!(windows) && s.contains(':') => Some("path segment contains a drive separator"),
        _ => None,
    }
}

async fn ensure_dir(path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(path).await.map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("failed to create directory {}: {}", path.display(), e),
        ))
    })
}

/// Artifact names become one remote and one local directory name
pub(crate) fn check_artifact_name(name: &str) -> Result<()> {
    match segment_problem(name) {
        Some(reason) => Err(Error::InvalidPath {
            path: name.to_string(),
            reason: format!("artifact name is not a single path segment: {reason}"),
        }),
        None => Ok(()),
    }
}

/// Resolve the local directory an artifact is written into
///
/// Returns `destination` unchanged when `create_subfolder` is false. Otherwise
/// returns `destination/artifact_name`, creating it (and any missing parents).
pub async fn map_local_root(
    destination: &Path,
    artifact_name: &str,
    create_subfolder: bool,
) -> Result<PathBuf> {
    if !create_subfolder {
        return Ok(destination.to_path_buf());
    }

    check_artifact_name(artifact_name)?;
    let local_root = destination.join(artifact_name);
    ensure_dir(&local_root).await?;
    Ok(local_root)
}

/// Local path for `remote_file`, which must live below `remote_root`
///
/// The nested directory structure below `remote_root` is kept and every
/// intermediate local directory is created. Creating a directory that already
/// exists is not an error, so sibling files can share a parent.
pub async fn map_file_target(
    local_root: &Path,
    remote_root: &RemotePath,
    remote_file: &RemotePath,
) -> Result<PathBuf> {
    let invalid = |reason: &str| Error::InvalidPath {
        path: remote_file.to_string(),
        reason: reason.to_string(),
    };

    let Some(rest) = remote_file.relative_to(remote_root) else {
        return Err(invalid(&format!("not inside artifact root {remote_root}")));
    };
    if rest.is_empty() {
        return Err(invalid("names the artifact root, not a file inside it"));
    }

    let mut target = local_root.to_path_buf();
    for segment in rest.split(REMOTE_SEPARATOR) {
        if let Some(reason) = segment_problem(segment) {
            return Err(invalid(reason));
        }
        target.push(segment);
    }

    if let Some(parent) = target.parent() {
        ensure_dir(parent).await?;
    }
    Ok(target)
}
