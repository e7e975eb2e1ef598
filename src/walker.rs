//! Remote tree walker: flattens an artifact's directory tree into its files.

use crate::error::{Error, Result};
use crate::session::RemoteSession;
use crate::types::{EntryKind, RemoteEntry, RemoteFileRef, RemotePath};
use tracing::debug;

async fn list_dir(
    session: &mut dyn RemoteSession,
    path: &RemotePath,
) -> Result<Vec<RemoteEntry>> {
    let entries = session.list(path).await.map_err(|source| Error::Listing {
        path: path.to_string(),
        source,
    })?;
    debug!(path = %path, entries = entries.len(), "Listed remote directory");
    Ok(entries)
}

/// Collect every file below `root`, depth-first, in the server's listing order
///
/// Uses an explicit stack of partially consumed listings instead of recursion:
/// when a directory entry is reached, its listing is pushed and consumed in full
/// before the remaining siblings are resumed. Each directory is listed exactly
/// once and no file is read. A listing failure anywhere aborts the whole walk.
///
/// A name that did not decode as UTF-8 cannot be requested back from the
/// server and fails the walk with [`Error::InvalidPath`].
pub async fn walk(
    session: &mut dyn RemoteSession,
    root: &RemotePath,
) -> Result<Vec<RemoteFileRef>> {
    let mut files = Vec::new();
    let mut pending = vec![list_dir(session, root).await?.into_iter()];

    while let Some(listing) = pending.last_mut() {
        let Some(entry) = listing.next() else {
            pending.pop();
            continue;
        };
        if matches!(entry.name.as_str(), "" | "." | "..") {
            continue;
        }
        if entry.name.contains(char::REPLACEMENT_CHARACTER) {
            return Err(Error::InvalidPath {
                path: entry.path().to_string(),
                reason: "name is not valid UTF-8 and cannot be addressed on the server".to_string(),
            });
        }

        match entry.kind {
            EntryKind::File => files.push(RemoteFileRef {
                path: entry.path(),
                size: entry.size,
            }),
            EntryKind::Directory => {
                let children = list_dir(session, &entry.path()).await?;
                pending.push(children.into_iter());
            }
        }
    }

    debug!(root = %root, files = files.len(), "Remote walk complete");
    Ok(files)
}
