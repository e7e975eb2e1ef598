//! Artifact client: the public entry point that ties the session, walker, path
//! mapper and transfer executor together.
//!
//! Split into focused submodules:
//! - [`download`] - Single-artifact and whole-run download flows

mod download;

use crate::config::{Config, ServerConfig};
use crate::error::Result;
use crate::ftp::FtpConnector;
use crate::session::SessionFactory;
use crate::types::{DownloadOptions, DownloadResult, Event};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// What an artifact backend can do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactCapabilities {
    /// Can fetch artifacts from the store
    pub can_download: bool,
    /// Can publish artifacts to the store
    pub can_upload: bool,
}

/// Outcome of an upload
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    /// Name the artifact was stored under
    pub artifact_name: String,
    /// Total bytes uploaded
    pub size: u64,
}

/// Upload half of an artifact backend
///
/// Only backends reporting `can_upload` hand one out through
/// [`ArtifactClient::uploader`].
#[async_trait]
pub trait ArtifactUploader: Send + Sync {
    /// Upload `files` (all below `root_directory`) as the artifact `name`
    async fn upload_artifact(
        &self,
        name: &str,
        files: &[PathBuf],
        root_directory: &Path,
    ) -> Result<UploadResult>;
}

/// Common interface of artifact stores
///
/// Backends differ in what they support; callers check [`ArtifactClient::capabilities`]
/// or the `Option` returned by [`ArtifactClient::uploader`] instead of expecting
/// an error from operations a backend does not have.
///
/// # Examples
///
/// ```no_run
/// use ftp_artifact::{ArtifactClient, DownloadOptions, create};
/// use std::path::Path;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let client = create("ftp.example.com", 21, "ci", "secret", Some("/artifacts"))?;
///
/// let result = client
///     .download_artifact("logs", Path::new("out"), DownloadOptions::default())
///     .await?;
/// println!("{} -> {}", result.artifact_name, result.download_path.display());
///
/// if client.uploader().is_none() {
///     println!("{} is download-only", client.name());
/// }
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait ArtifactClient: Send + Sync {
    /// Download the artifact `name` of the current run into `destination`
    async fn download_artifact(
        &self,
        name: &str,
        destination: &Path,
        options: DownloadOptions,
    ) -> Result<DownloadResult>;

    /// Download every artifact of the current run, each into its own subfolder
    ///
    /// `None` uses the backend's configured default destination.
    async fn download_all_artifacts(
        &self,
        destination: Option<&Path>,
    ) -> Result<Vec<DownloadResult>>;

    /// What this backend supports
    fn capabilities(&self) -> ArtifactCapabilities;

    /// Upload support, when the backend has it
    fn uploader(&self) -> Option<&dyn ArtifactUploader> {
        None
    }

    /// Human-readable backend name for logging
    fn name(&self) -> &str;
}

/// Artifact client backed by an FTP or FTPS server
///
/// Every top-level call opens its own session and closes it before returning,
/// so calls on one client (or its clones) can run concurrently without sharing
/// a control connection.
#[derive(Clone)]
pub struct FtpArtifactClient {
    /// Configuration (wrapped in Arc for sharing across clones)
    pub(crate) config: Arc<Config>,
    /// Opens one session per top-level call
    pub(crate) sessions: Arc<dyn SessionFactory>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: broadcast::Sender<Event>,
    /// Checked before each artifact and each file
    pub(crate) cancel_token: CancellationToken,
}

impl std::fmt::Debug for FtpArtifactClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FtpArtifactClient")
            .field("config", &self.config)
            .field("cancelled", &self.cancel_token.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl FtpArtifactClient {
    /// Create a client for the configured server
    ///
    /// Fails with [`crate::Error::Config`] when the configuration cannot be used.
    /// No connection is made until the first download.
    pub fn new(config: Config) -> Result<Self> {
        Self::with_session_factory(config, Arc::new(FtpConnector))
    }

    /// Create a client that opens its sessions through `sessions`
    pub fn with_session_factory(config: Config, sessions: Arc<dyn SessionFactory>) -> Result<Self> {
        config.validate()?;

        // Buffer size matches a large artifact's worth of per-file events
        let (event_tx, _rx) = broadcast::channel(1000);

        Ok(Self {
            config: Arc::new(config),
            sessions,
            event_tx,
            cancel_token: CancellationToken::new(),
        })
    }

    /// Subscribe to progress events
    ///
    /// Subscribers that fall behind miss events (`RecvError::Lagged`); the
    /// download itself never waits for them.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Token that stops running and future downloads at the next file or artifact boundary
    ///
    /// A transfer that has started always runs to completion. Cancelled calls
    /// close their session and return [`crate::Error::Cancelled`].
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Get the current configuration
    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    pub(crate) fn emit_event(&self, event: Event) {
        // send() only fails when nobody is subscribed
        self.event_tx.send(event).ok();
    }
}

#[async_trait]
impl ArtifactClient for FtpArtifactClient {
    async fn download_artifact(
        &self,
        name: &str,
        destination: &Path,
        options: DownloadOptions,
    ) -> Result<DownloadResult> {
        FtpArtifactClient::download_artifact(self, name, destination, options).await
    }

    async fn download_all_artifacts(
        &self,
        destination: Option<&Path>,
    ) -> Result<Vec<DownloadResult>> {
        FtpArtifactClient::download_all_artifacts(self, destination).await
    }

    fn capabilities(&self) -> ArtifactCapabilities {
        ArtifactCapabilities {
            can_download: true,
            can_upload: false,
        }
    }

    fn name(&self) -> &str {
        if self.config.server.secure { "ftps" } else { "ftp" }
    }
}

/// Create an FTP artifact client from connection parameters
///
/// `remote_path` is the base directory holding the per-run folders (default
/// `/`). The run identifier is read from `GITHUB_RUN_ID`, falling back to `0`.
pub fn create(
    host: &str,
    port: u16,
    username: &str,
    password: &str,
    remote_path: Option<&str>,
) -> Result<FtpArtifactClient> {
    let mut server = ServerConfig::new(host, port, username, password);
    if let Some(remote_path) = remote_path {
        server.remote_path = remote_path.to_string();
    }
    FtpArtifactClient::new(Config::new(server))
}
