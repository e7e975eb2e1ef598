//! # ftp-artifact
//!
//! Download build artifacts from an FTP or FTPS server.
//!
//! Artifacts live in a run-scoped directory tree on the server,
//! `remote_path/run_id/<artifact>`. The client opens one authenticated session
//! per call, walks the artifact's directory tree, and recreates it file by file
//! under a local destination.
//!
//! ## Design Philosophy
//!
//! - **Library-first** - No CLI, purely a Rust crate for embedding in CI tooling
//! - **Sequential and predictable** - One control connection per call, files in
//!   depth-first listing order, no hidden retries
//! - **Fail loudly** - The first listing or transfer error aborts the call and
//!   the session is always closed first
//! - **Event-driven** - Consumers subscribe to progress events
//!
//! ## Quick Start
//!
//! ```no_run
//! use ftp_artifact::{Config, DownloadOptions, FtpArtifactClient, ServerConfig};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = ServerConfig::new("ftp.example.com", 21, "ci", "secret");
//!     server.remote_path = "/artifacts".to_string();
//!     let client = FtpArtifactClient::new(Config::new(server))?;
//!
//!     let mut events = client.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let result = client
//!         .download_artifact(
//!             "TestArtifact",
//!             Path::new("downloads"),
//!             DownloadOptions { create_artifact_folder: true },
//!         )
//!         .await?;
//!     println!("{} -> {}", result.artifact_name, result.download_path.display());
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Artifact client and the `ArtifactClient` capability trait
pub mod client;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// FTP/FTPS session implementation
pub mod ftp;
/// Remote path to local path mapping
pub mod paths;
/// Retry logic with exponential backoff
pub mod retry;
/// Session traits shared by the walker, transfer executor and client
pub mod session;
/// Single file transfer
pub mod transfer;
/// Core types and events
pub mod types;
/// Remote directory tree walker
pub mod walker;

#[cfg(test)]
pub(crate) mod test_helpers;

// Re-export commonly used types
pub use client::{
    ArtifactCapabilities, ArtifactClient, ArtifactUploader, FtpArtifactClient, UploadResult,
    create,
};
pub use config::{Config, RetryConfig, ServerConfig, TimeoutConfig};
pub use error::{Error, FtpError, Result, TransferError};
pub use ftp::{FtpConnector, FtpSession};
pub use session::{RemoteSession, SessionFactory};
pub use types::{
    ArtifactRequest, DownloadOptions, DownloadResult, EntryKind, Event, RemoteEntry,
    RemoteFileRef, RemotePath,
};
