//! Error types for ftp-artifact
//!
//! Errors are layered the same way the download is:
//! - [`FtpError`] describes what went wrong on the wire (control or data connection)
//! - [`TransferError`] describes which side of a single file copy failed
//! - [`Error`] is what the public entry points return, carrying the host, remote
//!   path or local path that was being worked on when the lower-level error happened

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for ftp-artifact operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for ftp-artifact
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "host")
        key: Option<String>,
    },

    /// Could not establish or authenticate a session
    #[error("failed to connect to {host}:{port}: {source}")]
    Connection {
        /// Server hostname
        host: String,
        /// Server port
        port: u16,
        /// Underlying protocol failure
        #[source]
        source: FtpError,
    },

    /// A remote directory could not be enumerated
    #[error("failed to list remote directory {path}: {source}")]
    Listing {
        /// Remote directory that was being listed
        path: String,
        /// Underlying protocol failure
        #[source]
        source: FtpError,
    },

    /// A single file could not be copied from the server to local disk
    #[error("failed to download {remote_path} to {}: {source}", local_path.display())]
    Transfer {
        /// Remote file being downloaded
        remote_path: String,
        /// Local file being written
        local_path: PathBuf,
        /// Which side of the copy failed
        #[source]
        source: TransferError,
    },

    /// A remote name cannot be mapped safely onto the local filesystem
    #[error("invalid path {path}: {reason}")]
    InvalidPath {
        /// The offending path
        path: String,
        /// Why it was rejected
        reason: String,
    },

    /// Local I/O error (directory creation)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The caller cancelled the download between two files or artifacts
    #[error("download cancelled")]
    Cancelled,
}

/// FTP protocol and connection errors
#[derive(Debug, Error)]
pub enum FtpError {
    /// Socket-level failure on the control or data connection
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS negotiation failed
    #[error("TLS error: {0}")]
    Tls(#[from] native_tls::Error),

    /// The server did not answer in time
    #[error("timed out waiting for {operation}")]
    Timeout {
        /// What was being waited on (e.g., "greeting", "reply to LIST")
        operation: String,
    },

    /// The server answered with a reply code the command does not accept
    #[error("{command} rejected with {code} {message}")]
    UnexpectedReply {
        /// The command that was sent (arguments included, PASS masked)
        command: String,
        /// Three-digit reply code
        code: u16,
        /// Reply text
        message: String,
    },

    /// A reply line did not follow the `NNN text` format
    #[error("malformed reply: {0}")]
    MalformedReply(String),

    /// The EPSV/PASV reply did not contain a usable port
    #[error("invalid passive mode reply: {0}")]
    InvalidPassiveReply(String),

    /// The control connection was closed, either by the server or by `close()`
    #[error("control connection closed")]
    Closed,
}

impl FtpError {
    /// Reply code of the server rejection, if this error is one
    pub fn reply_code(&self) -> Option<u16> {
        match self {
            FtpError::UnexpectedReply { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Failure while copying one remote file to one local file
#[derive(Debug, Error)]
pub enum TransferError {
    /// The server refused to open the file (e.g., 550 on RETR)
    #[error("failed to open remote stream: {0}")]
    Open(#[source] FtpError),

    /// The local target could not be created or truncated
    #[error("failed to create local file: {0}")]
    CreateLocal(#[source] std::io::Error),

    /// Reading from the data connection failed mid-transfer
    #[error("remote read failed after {bytes} bytes: {source}")]
    Read {
        /// Bytes written locally before the failure
        bytes: u64,
        /// Underlying read error
        #[source]
        source: std::io::Error,
    },

    /// Writing to the local file failed mid-transfer
    #[error("local write failed after {bytes} bytes: {source}")]
    Write {
        /// Bytes written locally before the failure
        bytes: u64,
        /// Underlying write error
        #[source]
        source: std::io::Error,
    },

    /// The data arrived but the server did not confirm the transfer
    #[error("server did not confirm transfer: {0}")]
    Completion(#[source] FtpError),
}

impl Error {
    /// Create a configuration error for the given key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }
}
