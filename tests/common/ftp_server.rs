//! In-process FTP server serving a local directory, for end-to-end tests
//!
//! Supports the subset of RFC 959 / RFC 3659 / RFC 4217 the client uses:
//! AUTH TLS, USER, PASS, PBSZ, PROT, TYPE, EPSV, PASV, MLSD, LIST, RETR, QUIT.
//! Listings are sorted by name so walk order is deterministic regardless of
//! the host filesystem.

use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_native_tls::TlsAcceptor;

trait Stream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Stream for T {}

/// Plain TCP or TLS-wrapped connection
type BoxStream = Box<dyn Stream>;

/// Acceptor for the self-signed `localhost` / `127.0.0.1` test certificate
pub fn test_tls_acceptor() -> TlsAcceptor {
    let identity = native_tls::Identity::from_pkcs8(
        include_bytes!("../fixtures/ftps-cert.pem"),
        include_bytes!("../fixtures/ftps-key.pem"),
    )
    .unwrap();
    TlsAcceptor::from(native_tls::TlsAcceptor::new(identity).unwrap())
}

/// Behaviour switches for [`FakeFtpServer`]
#[derive(Clone)]
pub struct ServerOptions {
    pub username: String,
    pub password: String,
    /// Answer MLSD with 502 so clients must fall back to LIST
    pub mlsd: bool,
    /// Answer EPSV with 502 so clients must fall back to PASV
    pub epsv: bool,
    /// Directories (as requested by the client) whose listing fails with 550
    pub fail_list: Vec<String>,
    /// File whose RETR stops after the given number of bytes and ends with 426
    pub truncate_retr: Option<(String, usize)>,
    /// Enables `AUTH TLS`; without it the command is answered with 502
    pub tls: Option<TlsAcceptor>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            username: "ci".to_string(),
            password: "secret".to_string(),
            mlsd: true,
            epsv: true,
            fail_list: Vec::new(),
            truncate_retr: None,
            tls: None,
        }
    }
}

/// Running fake server; stopped when dropped
pub struct FakeFtpServer {
    port: u16,
    commands: Arc<Mutex<Vec<String>>>,
    handle: JoinHandle<()>,
}

impl FakeFtpServer {
    /// Serve `root` on an ephemeral localhost port
    pub async fn start(root: &Path, options: ServerOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let commands = Arc::new(Mutex::new(Vec::new()));

        let root = root.to_path_buf();
        let log = commands.clone();
        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let session = Session {
                    root: root.clone(),
                    options: options.clone(),
                    log: log.clone(),
                    passive: None,
                    user: None,
                    logged_in: false,
                    protect_data: false,
                };
                tokio::spawn(session.run(stream));
            }
        });

        Self {
            port,
            commands,
            handle,
        }
    }

    pub fn host(&self) -> &'static str {
        "127.0.0.1"
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Commands received so far, across all connections, with PASS masked
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    /// Number of commands starting with `verb`
    pub fn count(&self, verb: &str) -> usize {
        self.commands()
            .iter()
            .filter(|c| c.split(' ').next() == Some(verb))
            .count()
    }
}

impl Drop for FakeFtpServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

struct Session {
    root: PathBuf,
    options: ServerOptions,
    log: Arc<Mutex<Vec<String>>>,
    passive: Option<TcpListener>,
    user: Option<String>,
    logged_in: bool,
    /// Set by `PROT P`: data connections are TLS-wrapped
    protect_data: bool,
}

async fn reply<W>(out: &mut W, line: &str)
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let _ = out.write_all(format!("{line}\r\n").as_bytes()).await;
    let _ = out.flush().await;
}

impl Session {
    async fn run(mut self, stream: TcpStream) {
        let mut control: BufReader<BoxStream> = BufReader::new(Box::new(stream));

        reply(&mut control, "220-Fake FTP server").await;
        reply(&mut control, "220 Ready").await;

        loop {
            let mut raw = String::new();
            match control.read_line(&mut raw).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            let line = raw.trim_end_matches(['\r', '\n']).to_string();
            let (verb, arg) = match line.split_once(' ') {
                Some((verb, arg)) => (verb.to_ascii_uppercase(), arg.to_string()),
                None => (line.to_ascii_uppercase(), String::new()),
            };
            let logged = if verb == "PASS" {
                "PASS ****".to_string()
            } else {
                line.clone()
            };
            self.log.lock().unwrap().push(logged);

            if !self.logged_in && !matches!(verb.as_str(), "AUTH" | "USER" | "PASS" | "QUIT") {
                reply(&mut control, "530 Please login with USER and PASS.").await;
                continue;
            }

            match verb.as_str() {
                "AUTH" => match self.options.tls.clone() {
                    Some(acceptor) if arg.eq_ignore_ascii_case("TLS") => {
                        reply(&mut control, "234 Proceed with negotiation.").await;
                        match acceptor.accept(control.into_inner()).await {
                            Ok(tls) => control = BufReader::new(Box::new(tls)),
                            Err(_) => break,
                        }
                    }
                    _ => reply(&mut control, "502 AUTH not supported.").await,
                },
                "USER" => {
                    self.user = Some(arg);
                    reply(&mut control, "331 Password required").await;
                }
                "PASS" => {
                    let user_ok = self.user.as_deref() == Some(self.options.username.as_str());
                    if user_ok && arg == self.options.password {
                        self.logged_in = true;
                        reply(&mut control, "230 Login successful.").await;
                    } else {
                        reply(&mut control, "530 Login incorrect.").await;
                    }
                }
                "PBSZ" => reply(&mut control, "200 PBSZ=0").await,
                "PROT" => {
                    self.protect_data = arg.eq_ignore_ascii_case("P");
                    reply(&mut control, "200 Protection level set.").await;
                }
                "TYPE" => reply(&mut control, "200 Switching to Binary mode.").await,
                "EPSV" if self.options.epsv => {
                    let port = self.open_passive().await;
                    let message = format!("229 Entering Extended Passive Mode (|||{port}|)");
                    reply(&mut control, &message).await;
                }
                "PASV" => {
                    let port = self.open_passive().await;
                    // Advertise an unroutable address; clients must use the control peer
                    let message = format!(
                        "227 Entering Passive Mode (10,255,255,1,{},{}).",
                        port >> 8,
                        port & 0xff
                    );
                    reply(&mut control, &message).await;
                }
                "MLSD" if self.options.mlsd => self.send_listing(&mut control, &arg, true).await,
                "LIST" => self.send_listing(&mut control, &arg, false).await,
                "RETR" => self.send_file(&mut control, &arg).await,
                "QUIT" => {
                    reply(&mut control, "221 Goodbye.").await;
                    break;
                }
                _ => {
                    self.passive = None;
                    reply(&mut control, "502 Command not implemented.").await;
                }
            }
        }
    }

    async fn open_passive(&mut self) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        self.passive = Some(listener);
        port
    }

    /// Accept the pending data connection, completing the TLS handshake under `PROT P`
    async fn accept_data(&mut self) -> Option<BoxStream> {
        let listener = self.passive.take()?;
        let limit = Duration::from_secs(5);
        let (tcp, _) = tokio::time::timeout(limit, listener.accept())
            .await
            .ok()?
            .ok()?;
        if !self.protect_data {
            return Some(Box::new(tcp));
        }
        let acceptor = self.options.tls.as_ref()?;
        let tls = tokio::time::timeout(limit, acceptor.accept(tcp))
            .await
            .ok()?
            .ok()?;
        Some(Box::new(tls))
    }

    /// Map a client path onto the served directory, refusing `..`
    fn resolve(&self, remote: &str) -> Option<PathBuf> {
        let relative = Path::new(remote.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return None;
        }
        Some(self.root.join(relative))
    }

    async fn send_listing<W>(&mut self, out: &mut W, path: &str, machine: bool)
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let dir = match self.resolve(path) {
            Some(dir) if dir.is_dir() && !self.options.fail_list.iter().any(|p| p == path) => dir,
            _ => {
                self.passive = None;
                reply(out, "550 Failed to open directory.").await;
                return;
            }
        };

        let mut entries: Vec<_> = std::fs::read_dir(&dir)
            .unwrap()
            .map(|e| e.unwrap())
            .collect();
        entries.sort_by_key(|e| e.file_name());

        // Names go out as the filesystem stores them, like a real server would
        let mut body = Vec::new();
        if machine {
            body.extend_from_slice(b"type=cdir;modify=20240101000000; .\r\n");
            body.extend_from_slice(b"type=pdir;modify=20240101000000; ..\r\n");
        }
        for entry in entries {
            let meta = entry.metadata().unwrap();
            let facts = match (machine, meta.is_dir()) {
                (true, true) => "type=dir;modify=20240101000000; ".to_string(),
                (true, false) => format!("type=file;size={};modify=20240101000000; ", meta.len()),
                (false, true) => {
                    "drwxr-xr-x    2 ftp      ftp          4096 Jan 01 00:00 ".to_string()
                }
                (false, false) => {
                    format!("-rw-r--r--    1 ftp      ftp    {:>10} Jan 01 00:00 ", meta.len())
                }
            };
            body.extend_from_slice(facts.as_bytes());
            body.extend_from_slice(entry.file_name().as_encoded_bytes());
            body.extend_from_slice(b"\r\n");
        }

        reply(out, "150 Here comes the directory listing.").await;
        let Some(mut data) = self.accept_data().await else {
            reply(out, "425 Can't open data connection.").await;
            return;
        };
        let _ = data.write_all(&body).await;
        let _ = data.shutdown().await;
        drop(data);
        reply(out, "226 Directory send OK.").await;
    }

    async fn send_file<W>(&mut self, out: &mut W, path: &str)
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let content = match self.resolve(path) {
            Some(file) if file.is_file() => std::fs::read(file).unwrap(),
            _ => {
                self.passive = None;
                reply(out, "550 Failed to open file.").await;
                return;
            }
        };

        let truncate = self
            .options
            .truncate_retr
            .as_ref()
            .filter(|(target, _)| target == path)
            .map(|(_, limit)| *limit);

        reply(out, "150 Opening BINARY mode data connection.").await;
        let Some(mut data) = self.accept_data().await else {
            reply(out, "425 Can't open data connection.").await;
            return;
        };
        let sent = truncate.map_or(content.len(), |limit| limit.min(content.len()));
        let _ = data.write_all(&content[..sent]).await;
        let _ = data.shutdown().await;
        drop(data);

        if truncate.is_some() {
            reply(out, "426 Connection closed; transfer aborted.").await;
        } else {
            reply(out, "226 Transfer complete.").await;
        }
    }
}
