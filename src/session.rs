//! Session abstraction used by the walker, the transfer executor and the client.
//!
//! [`crate::ftp::FtpSession`] is the production implementation. Keeping the
//! higher layers on these traits lets them run against any backend that can
//! list a directory and stream a file.

use crate::config::{ServerConfig, TimeoutConfig};
use crate::error::FtpError;
use crate::types::{RemoteEntry, RemotePath};
use async_trait::async_trait;
use tokio::io::AsyncRead;

/// Byte stream of one remote file
pub type DataStream = Box<dyn AsyncRead + Unpin + Send>;

/// One open, authenticated session
///
/// Operations are sequential; the `&mut self` receivers make a second
/// concurrent operation on the same session impossible.
#[async_trait]
pub trait RemoteSession: Send {
    /// Entries directly inside the directory `path`
    async fn list(&mut self, path: &RemotePath) -> Result<Vec<RemoteEntry>, FtpError>;

    /// Start reading the file at `path`
    ///
    /// The stream must be drained (or abandoned) and dropped before
    /// [`RemoteSession::finish_read`] is called.
    async fn open_read_stream(&mut self, path: &RemotePath) -> Result<DataStream, FtpError>;

    /// Confirm that the last stream was delivered completely
    async fn finish_read(&mut self) -> Result<(), FtpError>;

    /// Close the session; idempotent and infallible
    async fn close(&mut self);
}

/// Opens sessions against a server
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Connect and authenticate
    async fn open(
        &self,
        server: &ServerConfig,
        timeouts: &TimeoutConfig,
    ) -> Result<Box<dyn RemoteSession>, FtpError>;
}
