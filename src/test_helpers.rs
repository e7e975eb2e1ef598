//! In-memory server used by unit tests in place of a real FTP connection.

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use crate::config::{ServerConfig, TimeoutConfig};
use crate::error::FtpError;
use crate::session::{DataStream, RemoteSession, SessionFactory};
use crate::types::{EntryKind, RemoteEntry, RemotePath};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct State {
    /// Children of each directory, in insertion order
    dirs: HashMap<String, Vec<(String, EntryKind)>>,
    files: HashMap<String, Vec<u8>>,
    fail_list: HashSet<String>,
    fail_open: HashSet<String>,
    fail_read: HashMap<String, usize>,
    fail_completion: HashSet<String>,
    refuse_login: bool,
    cancel_on_open: Option<(String, CancellationToken)>,
    calls: Vec<String>,
    sessions_opened: usize,
    sessions_closed: usize,
}

impl State {
    fn add_child(&mut self, parent: &str, name: &str, kind: EntryKind) {
        let children = self.dirs.entry(parent.to_string()).or_default();
        if !children.iter().any(|(existing, _)| existing == name) {
            children.push((name.to_string(), kind));
        }
    }

    /// Register `path` and every ancestor as directories
    fn add_dir(&mut self, path: &str) {
        self.dirs.entry("/".to_string()).or_default();
        let mut current = String::from("/");
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            let next = RemotePath::new(current.as_str()).join(segment).to_string();
            self.add_child(&current, segment, EntryKind::Directory);
            self.dirs.entry(next.clone()).or_default();
            current = next;
        }
    }
}

/// A fake remote tree with failure injection and a log of the calls it served
///
/// Clones share state, so a test can hand one clone to the client as its
/// [`SessionFactory`] and inspect the other afterwards.
#[derive(Clone, Default)]
pub(crate) struct MemoryServer {
    state: Arc<Mutex<State>>,
}

impl MemoryServer {
    pub(crate) fn new() -> Self {
        let server = Self::default();
        server.lock().add_dir("/");
        server
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Add a file, creating its parent directories
    pub(crate) fn file(self, path: &str, content: &[u8]) -> Self {
        {
            let mut state = self.lock();
            let (parent, name) = path.rsplit_once('/').unwrap();
            let parent = if parent.is_empty() { "/" } else { parent };
            state.add_dir(parent);
            state.add_child(parent, name, EntryKind::File);
            state.files.insert(path.to_string(), content.to_vec());
        }
        self
    }

    /// Add a (possibly empty) directory
    pub(crate) fn dir(self, path: &str) -> Self {
        self.lock().add_dir(path);
        self
    }

    pub(crate) fn fail_listing(self, path: &str) -> Self {
        self.lock().fail_list.insert(path.to_string());
        self
    }

    pub(crate) fn fail_open(self, path: &str) -> Self {
        self.lock().fail_open.insert(path.to_string());
        self
    }

    /// Deliver the first `bytes` of the file, then fail with a connection reset
    pub(crate) fn fail_read_after(self, path: &str, bytes: usize) -> Self {
        self.lock().fail_read.insert(path.to_string(), bytes);
        self
    }

    pub(crate) fn fail_completion(self, path: &str) -> Self {
        self.lock().fail_completion.insert(path.to_string());
        self
    }

    pub(crate) fn refuse_login(self) -> Self {
        self.lock().refuse_login = true;
        self
    }

    /// Cancel `token` when the download of `path` starts
    pub(crate) fn cancel_on_open(self, path: &str, token: CancellationToken) -> Self {
        self.lock().cancel_on_open = Some((path.to_string(), token));
        self
    }

    pub(crate) fn session(&self) -> MemorySession {
        self.lock().sessions_opened += 1;
        MemorySession {
            server: self.clone(),
            open: true,
            reading: None,
        }
    }

    /// Every operation served so far, e.g. `LIST /r`, `RETR /r/f`, `DONE /r/f`, `QUIT`
    pub(crate) fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub(crate) fn sessions_opened(&self) -> usize {
        self.lock().sessions_opened
    }

    pub(crate) fn sessions_closed(&self) -> usize {
        self.lock().sessions_closed
    }

    fn record(&self, call: String) {
        self.lock().calls.push(call);
    }
}

fn rejected(command: String, code: u16, message: &str) -> FtpError {
    FtpError::UnexpectedReply {
        command,
        code,
        message: message.to_string(),
    }
}

/// Reader that always fails, appended after the bytes that were delivered
struct ResetReader;

impl AsyncRead for ResetReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Poll::Ready(Err(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "connection reset by peer",
        )))
    }
}

pub(crate) struct MemorySession {
    server: MemoryServer,
    open: bool,
    reading: Option<String>,
}

#[async_trait]
impl RemoteSession for MemorySession {
    async fn list(&mut self, path: &RemotePath) -> Result<Vec<RemoteEntry>, FtpError> {
        if !self.open {
            return Err(FtpError::Closed);
        }
        self.server.record(format!("LIST {path}"));
        let state = self.server.lock();
        if state.fail_list.contains(path.as_str()) {
            return Err(rejected(format!("MLSD {path}"), 451, "Local error in processing."));
        }
        let children = state
            .dirs
            .get(path.as_str())
            .ok_or_else(|| rejected(format!("MLSD {path}"), 550, "No such directory."))?;

        Ok(children
            .iter()
            .map(|(name, kind)| {
                let entry_path = path.join(name);
                RemoteEntry {
                    name: name.clone(),
                    kind: *kind,
                    parent: path.clone(),
                    size: state.files.get(entry_path.as_str()).map(|c| c.len() as u64),
                }
            })
            .collect())
    }

    async fn open_read_stream(&mut self, path: &RemotePath) -> Result<DataStream, FtpError> {
        if !self.open {
            return Err(FtpError::Closed);
        }
        self.server.record(format!("RETR {path}"));
        let state = self.server.lock();
        if let Some((target, token)) = &state.cancel_on_open {
            if target == path.as_str() {
                token.cancel();
            }
        }
        if state.fail_open.contains(path.as_str()) {
            return Err(rejected(format!("RETR {path}"), 550, "Permission denied."));
        }
        let content = state
            .files
            .get(path.as_str())
            .cloned()
            .ok_or_else(|| rejected(format!("RETR {path}"), 550, "No such file."))?;
        self.reading = Some(path.to_string());

        match state.fail_read.get(path.as_str()) {
            Some(&limit) => {
                let delivered = content[..limit.min(content.len())].to_vec();
                Ok(Box::new(Cursor::new(delivered).chain(ResetReader)))
            }
            None => Ok(Box::new(Cursor::new(content))),
        }
    }

    async fn finish_read(&mut self) -> Result<(), FtpError> {
        let path = self.reading.take().unwrap_or_default();
        self.server.record(format!("DONE {path}"));
        if self.server.lock().fail_completion.contains(&path) {
            return Err(rejected(
                format!("RETR {path}"),
                426,
                "Connection closed; transfer aborted.",
            ));
        }
        Ok(())
    }

    async fn close(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        self.server.record("QUIT".to_string());
        self.server.lock().sessions_closed += 1;
    }
}

#[async_trait]
impl SessionFactory for MemoryServer {
    async fn open(
        &self,
        server: &ServerConfig,
        _timeouts: &TimeoutConfig,
    ) -> Result<Box<dyn RemoteSession>, FtpError> {
        if self.lock().refuse_login {
            return Err(rejected(
                format!("USER {}", server.username),
                530,
                "Login incorrect.",
            ));
        }
        Ok(Box::new(self.session()))
    }
}
