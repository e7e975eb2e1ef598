//! Transfer executor: copies one remote file into one local file.

use crate::error::{Error, Result, TransferError};
use crate::session::RemoteSession;
use crate::types::RemotePath;
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

/// Copy buffer size
const CHUNK_SIZE: usize = 64 * 1024;

/// Download `remote` into `local`, returning the number of bytes written
///
/// `local` is created, or truncated if it exists. Both the remote stream and
/// the local handle are dropped before this returns, on success and on every
/// error path. A failed transfer leaves whatever was already written in place;
/// there is no rename-on-success and no retry.
pub async fn transfer(
    session: &mut dyn RemoteSession,
    remote: &RemotePath,
    local: &Path,
) -> Result<u64> {
    let fail = |source: TransferError| Error::Transfer {
        remote_path: remote.to_string(),
        local_path: local.to_path_buf(),
        source,
    };

    let mut stream = session
        .open_read_stream(remote)
        .await
        .map_err(|e| fail(TransferError::Open(e)))?;

    let copied = async {
        let mut file = tokio::fs::File::create(local)
            .await
            .map_err(TransferError::CreateLocal)?;

        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut bytes = 0u64;
        loop {
            let n = stream
                .read(&mut buf)
                .await
                .map_err(|source| TransferError::Read { bytes, source })?;
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n])
                .await
                .map_err(|source| TransferError::Write { bytes, source })?;
            bytes += n as u64;
        }
        file.flush()
            .await
            .map_err(|source| TransferError::Write { bytes, source })?;
        Ok::<u64, TransferError>(bytes)
    }
    .await;
    // The data connection must be closed before the server sends its completion reply
    drop(stream);

    let bytes = copied.map_err(fail)?;
    session
        .finish_read()
        .await
        .map_err(|e| fail(TransferError::Completion(e)))?;

    debug!(remote_path = %remote, local_path = %local.display(), bytes, "File transferred");
    Ok(bytes)
}
