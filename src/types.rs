//! Core types for ftp-artifact

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Separator of the remote namespace, independent of the local platform
pub const REMOTE_SEPARATOR: char = '/';

/// A path on the remote server
///
/// Remote paths are joined with `/` on every platform. They are never built with
/// [`std::path::Path::join`], which would insert `\` on Windows.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemotePath(String);

impl RemotePath {
    /// Create a remote path from its textual form
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// The remote root, `/`
    pub fn root() -> Self {
        Self(REMOTE_SEPARATOR.to_string())
    }

    /// Textual form as sent to the server
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Append one or more segments using the remote separator
    ///
    /// ```
    /// use ftp_artifact::types::RemotePath;
    ///
    /// let base = RemotePath::new("/artifacts/");
    /// assert_eq!(base.join("42").join("logs").as_str(), "/artifacts/42/logs");
    /// assert_eq!(RemotePath::root().join("a/b").as_str(), "/a/b");
    /// ```
    #[must_use]
    pub fn join(&self, segment: &str) -> Self {
        let segment = segment.trim_start_matches(REMOTE_SEPARATOR);
        let base = self.0.trim_end_matches(REMOTE_SEPARATOR);
        if segment.is_empty() {
            return self.clone();
        }
        if base.is_empty() && self.0.starts_with(REMOTE_SEPARATOR) {
            return Self(format!("{REMOTE_SEPARATOR}{segment}"));
        }
        if base.is_empty() {
            return Self(segment.to_string());
        }
        Self(format!("{base}{REMOTE_SEPARATOR}{segment}"))
    }

    /// Part of `self` below `root`, without the leading separator
    ///
    /// `None` if `self` is not inside `root`. The remainder is returned as the
    /// server spelled it, so repeated separators show up as empty segments.
    ///
    /// ```
    /// use ftp_artifact::types::RemotePath;
    ///
    /// let file = RemotePath::new("/0/TestArtifact/3/3.txt");
    /// assert_eq!(file.relative_to(&RemotePath::new("/0/TestArtifact")), Some("3/3.txt"));
    /// assert_eq!(file.relative_to(&RemotePath::new("/0/Test")), None);
    /// ```
    pub fn relative_to(&self, root: &RemotePath) -> Option<&str> {
        let root = root.0.trim_end_matches(REMOTE_SEPARATOR);
        let rest = self.0.strip_prefix(root)?;
        if !root.is_empty() && !rest.is_empty() && !rest.starts_with(REMOTE_SEPARATOR) {
            // "/a/bc" is not inside "/a/b"
            return None;
        }
        Some(rest.trim_start_matches(REMOTE_SEPARATOR))
    }
}

impl std::fmt::Display for RemotePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RemotePath {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl From<String> for RemotePath {
    fn from(path: String) -> Self {
        Self(path)
    }
}

/// Kind of a listing entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Regular file
    File,
    /// Directory
    Directory,
}

/// One record of a directory listing
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteEntry {
    /// Entry name (a single segment, no separators)
    pub name: String,
    /// File or directory
    pub kind: EntryKind,
    /// Directory that was listed to produce this entry
    pub parent: RemotePath,
    /// Size in bytes, when the listing reports it
    pub size: Option<u64>,
}

impl RemoteEntry {
    /// Absolute remote path of this entry
    pub fn path(&self) -> RemotePath {
        self.parent.join(&self.name)
    }
}

/// A remote file discovered by the tree walker
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteFileRef {
    /// Absolute remote path
    pub path: RemotePath,
    /// Size in bytes, when the listing reports it
    pub size: Option<u64>,
}

/// Options for a single artifact download
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadOptions {
    /// Place the files under a new subdirectory named after the artifact
    #[serde(default)]
    pub create_artifact_folder: bool,
}

/// Input to one artifact download
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArtifactRequest {
    /// Artifact name (a directory under the run's remote root)
    pub name: String,
    /// Local destination root
    pub destination: PathBuf,
    /// Download options
    pub options: DownloadOptions,
}

impl ArtifactRequest {
    /// Create a request
    pub fn new(
        name: impl Into<String>,
        destination: impl Into<PathBuf>,
        options: DownloadOptions,
    ) -> Self {
        Self {
            name: name.into(),
            destination: destination.into(),
            options,
        }
    }
}

/// Outcome of one artifact download
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadResult {
    /// Name of the downloaded artifact
    pub artifact_name: String,
    /// Local directory the artifact's files were written to
    pub download_path: PathBuf,
}

/// Progress events emitted during a download call
///
/// Events are informational. A slow or absent subscriber never affects the download.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A session was opened and authenticated
    SessionOpened {
        /// Server hostname
        host: String,
        /// Server port
        port: u16,
    },

    /// An artifact download started
    ArtifactStarted {
        /// Artifact name
        name: String,
        /// Remote directory holding the artifact
        remote_root: String,
        /// Resolved local root
        local_root: PathBuf,
    },

    /// One file was fully written to disk
    FileDownloaded {
        /// Artifact the file belongs to
        artifact: String,
        /// Remote file path
        remote_path: String,
        /// Local file path
        local_path: PathBuf,
        /// Bytes written
        bytes: u64,
    },

    /// Every file of an artifact was written to disk
    ArtifactComplete {
        /// Artifact name
        name: String,
        /// Local directory holding the artifact
        path: PathBuf,
        /// Number of files written
        files: usize,
        /// Total bytes written
        bytes: u64,
    },

    /// The session was closed (after success or failure)
    SessionClosed {
        /// Server hostname
        host: String,
    },
}
