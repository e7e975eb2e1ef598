//! Retry logic with exponential backoff
//!
//! The download core never retries: a failed listing or transfer aborts the
//! call. Callers that want to repeat a whole call after a transient network
//! failure wrap it in [`with_retry`], which only retries errors classified as
//! transient by [`IsRetryable`].
//!
//! # Example
//!
//! ```no_run
//! use ftp_artifact::config::RetryConfig;
//! use ftp_artifact::retry::with_retry;
//! use ftp_artifact::{DownloadOptions, create};
//! use std::path::Path;
//!
//! # async fn example() -> ftp_artifact::Result<()> {
//! let client = create("ftp.example.com", 21, "ci", "secret", None)?;
//! let result = with_retry(&RetryConfig::default(), || {
//!     client.download_artifact("logs", Path::new("out"), DownloadOptions::default())
//! })
//! .await?;
//! println!("downloaded to {}", result.download_path.display());
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::{Error, FtpError, TransferError};
use rand::Rng;
use std::future::Future;
use std::io::ErrorKind;
use std::time::Duration;

/// FTP reply codes for transient conditions (RFC 959 `4yz` replies worth retrying)
const TRANSIENT_REPLY_CODES: [u16; 5] = [421, 425, 426, 450, 451];

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (network timeouts, connection reset, server busy) should return `true`.
/// Permanent failures (login rejected, file not found, local disk errors) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

fn is_transient_io(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::TimedOut
            | ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof
            | ErrorKind::Interrupted
    )
}

impl IsRetryable for FtpError {
    fn is_retryable(&self) -> bool {
        match self {
            FtpError::Io(e) => is_transient_io(e.kind()),
            FtpError::Timeout { .. } => true,
            // The server dropped the control connection
            FtpError::Closed => true,
            FtpError::UnexpectedReply { code, .. } => TRANSIENT_REPLY_CODES.contains(code),
            // Certificate and handshake problems do not fix themselves
            FtpError::Tls(_) => false,
            FtpError::MalformedReply(_) | FtpError::InvalidPassiveReply(_) => false,
        }
    }
}

impl IsRetryable for TransferError {
    fn is_retryable(&self) -> bool {
        match self {
            TransferError::Open(e) | TransferError::Completion(e) => e.is_retryable(),
            TransferError::Read { source, .. } => is_transient_io(source.kind()),
            // Local disk problems need user action
            TransferError::CreateLocal(_) | TransferError::Write { .. } => false,
        }
    }
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Connection { source, .. } | Error::Listing { source, .. } => {
                source.is_retryable()
            }
            Error::Transfer { source, .. } => source.is_retryable(),
            // Local directory creation
            Error::Io(_) => false,
            Error::Config { .. } => false,
            Error::InvalidPath { .. } => false,
            // The caller asked to stop
            Error::Cancelled => false,
        }
    }
}

/// Execute an async operation with exponential backoff retry logic
///
/// # Arguments
///
/// * `config` - Retry configuration (max attempts, delays, backoff multiplier, jitter)
/// * `operation` - Async closure that returns Result<T, E> where E implements IsRetryable
///
/// # Returns
///
/// Returns the successful result or the last error after all retry attempts are exhausted.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < config.max_attempts => {
                attempt += 1;

                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis(),
                    "Operation failed, retrying"
                );

                let jittered_delay = if config.jitter {
                    add_jitter(delay)
                } else {
                    delay
                };
                tokio::time::sleep(jittered_delay).await;

                delay = next_delay(delay, config);
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(
                        error = %e,
                        attempts = attempt + 1,
                        "Operation failed after all retry attempts exhausted"
                    );
                } else {
                    tracing::error!(error = %e, "Operation failed with non-retryable error");
                }
                return Err(e);
            }
        }
    }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// The result lies between `delay` and `2 * delay`.
/// Grow `delay` by the backoff multiplier, capped at `max_delay`
///
/// A multiplier that yields no valid duration (negative, NaN, overflow) jumps
/// straight to the cap.
fn next_delay(delay: Duration, config: &RetryConfig) -> Duration {
    Duration::try_from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier)
        .unwrap_or(config.max_delay)
        .min(config.max_delay)
}

fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::try_from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor)).unwrap_or(delay)
}
