//! Download flows: one named artifact, or every artifact of the run.

use super::FtpArtifactClient;
use crate::error::{Error, Result};
use crate::paths::{check_artifact_name, map_file_target, map_local_root};
use crate::session::RemoteSession;
use crate::transfer::transfer;
use crate::types::{ArtifactRequest, DownloadOptions, DownloadResult, EntryKind, Event};
use crate::walker::walk;
use std::path::Path;
use tracing::{debug, info, warn};

impl FtpArtifactClient {
    /// Download the artifact `name` of the configured run into `destination`
    ///
    /// The artifact is read from `remote_path/run_id/name`. With
    /// `create_artifact_folder` the files land in `destination/name`, otherwise
    /// directly in `destination`. One session is opened for the call and closed
    /// before it returns, whether the download succeeded or not.
    ///
    /// Files are fetched one at a time in depth-first discovery order. The first
    /// failure aborts the artifact; files already written stay on disk.
    pub async fn download_artifact(
        &self,
        name: &str,
        destination: &Path,
        options: DownloadOptions,
    ) -> Result<DownloadResult> {
        check_artifact_name(name)?;
        self.check_cancelled()?;

        let request = ArtifactRequest::new(name, destination, options);
        let mut session = self.open_session().await?;
        let result = self.fetch_artifact(session.as_mut(), &request).await;
        self.close_session(session).await;

        if let Err(e) = &result {
            warn!(artifact = name, error = %e, "Artifact download failed");
        }
        result
    }

    /// Download every artifact directory of the configured run
    ///
    /// Each artifact is written to its own subfolder of `destination`
    /// ([`crate::Config::download_dir`] when `None`). Artifacts are processed in
    /// the order the server lists them, all over one shared session. Any failure
    /// aborts the remaining artifacts.
    pub async fn download_all_artifacts(
        &self,
        destination: Option<&Path>,
    ) -> Result<Vec<DownloadResult>> {
        let destination = destination.unwrap_or(self.config.download_dir.as_path());
        self.check_cancelled()?;

        let mut session = self.open_session().await?;
        let result = self.fetch_run(session.as_mut(), destination).await;
        self.close_session(session).await;

        if let Err(e) = &result {
            warn!(run_id = %self.config.run_id, error = %e, "Run download failed");
        }
        result
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel_token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    async fn open_session(&self) -> Result<Box<dyn RemoteSession>> {
        let server = &self.config.server;
        let session = self
            .sessions
            .open(server, &self.config.timeouts)
            .await
            .map_err(|source| Error::Connection {
                host: server.host.clone(),
                port: server.port,
                source,
            })?;

        info!(host = %server.host, port = server.port, "Session opened");
        self.emit_event(Event::SessionOpened {
            host: server.host.clone(),
            port: server.port,
        });
        Ok(session)
    }

    async fn close_session(&self, mut session: Box<dyn RemoteSession>) {
        session.close().await;
        debug!(host = %self.config.server.host, "Session closed");
        self.emit_event(Event::SessionClosed {
            host: self.config.server.host.clone(),
        });
    }

    async fn fetch_run(
        &self,
        session: &mut dyn RemoteSession,
        destination: &Path,
    ) -> Result<Vec<DownloadResult>> {
        let run_root = self.config.run_root();
        let entries = session
            .list(&run_root)
            .await
            .map_err(|source| Error::Listing {
                path: run_root.to_string(),
                source,
            })?;

        let mut results = Vec::new();
        for entry in entries {
            if entry.kind != EntryKind::Directory {
                debug!(name = %entry.name, run_root = %run_root, "Skipping non-directory entry in run folder");
                continue;
            }
            // Several artifacts share one destination, so each gets its own folder
            let request = ArtifactRequest::new(
                entry.name,
                destination,
                DownloadOptions {
                    create_artifact_folder: true,
                },
            );
            results.push(self.fetch_artifact(session, &request).await?);
        }

        info!(run_id = %self.config.run_id, artifacts = results.len(), "All artifacts downloaded");
        Ok(results)
    }

    async fn fetch_artifact(
        &self,
        session: &mut dyn RemoteSession,
        request: &ArtifactRequest,
    ) -> Result<DownloadResult> {
        self.check_cancelled()?;

        let remote_root = self.config.artifact_root(&request.name);
        let local_root = map_local_root(
            &request.destination,
            &request.name,
            request.options.create_artifact_folder,
        )
        .await?;

        info!(
            artifact = %request.name,
            remote_path = %remote_root,
            local_path = %local_root.display(),
            "Downloading artifact"
        );
        self.emit_event(Event::ArtifactStarted {
            name: request.name.clone(),
            remote_root: remote_root.to_string(),
            local_root: local_root.clone(),
        });

        let files = walk(session, &remote_root).await?;
        debug!(artifact = %request.name, files = files.len(), "Artifact tree discovered");

        let mut total_bytes = 0u64;
        for file in &files {
            self.check_cancelled()?;

            let local_path = map_file_target(&local_root, &remote_root, &file.path).await?;
            let bytes = transfer(session, &file.path, &local_path).await?;
            total_bytes += bytes;

            self.emit_event(Event::FileDownloaded {
                artifact: request.name.clone(),
                remote_path: file.path.to_string(),
                local_path,
                bytes,
            });
        }

        info!(
            artifact = %request.name,
            files = files.len(),
            bytes = total_bytes,
            "Artifact downloaded"
        );
        self.emit_event(Event::ArtifactComplete {
            name: request.name.clone(),
            path: local_root.clone(),
            files: files.len(),
            bytes: total_bytes,
        });

        Ok(DownloadResult {
            artifact_name: request.name.clone(),
            download_path: local_root,
        })
    }
}
