//! FTP/FTPS session: one authenticated control connection plus a passive-mode
//! data connection per listing or download.
//!
//! Split into focused submodules:
//! - [`reply`] - Control connection reply parsing
//! - [`listing`] - MLSD and LIST body parsing
//! - [`transport`] - Plain/TLS byte streams, passive reply parsing, idle timeouts

mod listing;
mod reply;
mod transport;

use crate::config::{ServerConfig, TimeoutConfig};
use crate::error::FtpError;
use crate::session::{DataStream, RemoteSession, SessionFactory};
use crate::types::{RemoteEntry, RemotePath};
use async_trait::async_trait;
use reply::Reply;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};
use transport::{BoxedTransport, IdleTimeoutReader, TlsSettings};

/// Reply codes meaning "command not implemented / not understood"
const NOT_IMPLEMENTED: [u16; 3] = [500, 502, 504];

/// Mask the argument of commands that carry secrets
fn redact(command: &str) -> String {
    match command.split_once(' ') {
        Some((verb, _)) if verb.eq_ignore_ascii_case("PASS") => format!("{verb} ****"),
        _ => command.to_string(),
    }
}

fn unexpected(command: &str, reply: &Reply) -> FtpError {
    FtpError::UnexpectedReply {
        command: redact(command),
        code: reply.code,
        message: reply.message(),
    }
}

async fn with_timeout<T, F>(limit: Duration, operation: &str, future: F) -> Result<T, FtpError>
where
    F: Future<Output = Result<T, FtpError>>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => Err(FtpError::Timeout {
            operation: operation.to_string(),
        }),
    }
}

/// An authenticated FTP session
///
/// Commands are strictly sequential: one outstanding command at a time, and at
/// most one open data connection. The session is not `Clone` and every method
/// takes `&mut self`, so sharing it between concurrent operations does not compile.
pub struct FtpSession {
    /// Control connection; `None` once closed
    control: Option<BufReader<BoxedTransport>>,
    /// Address data connections are opened to
    peer: IpAddr,
    host: String,
    /// Present on FTPS sessions; data connections are wrapped too
    tls: Option<TlsSettings>,
    timeouts: TimeoutConfig,
    /// Cleared after the server rejects EPSV once
    use_epsv: bool,
    /// Cleared after the server rejects MLSD once
    use_mlsd: bool,
    /// RETR command whose completion reply has not been read yet
    pending_transfer: Option<String>,
}

impl std::fmt::Debug for FtpSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FtpSession")
            .field("host", &self.host)
            .field("peer", &self.peer)
            .field("secure", &self.tls.is_some())
            .field("open", &self.control.is_some())
            .finish()
    }
}

impl FtpSession {
    /// Connect, optionally negotiate explicit FTPS, log in and switch to binary mode
    ///
    /// The whole handshake is bounded by `timeouts.connect_timeout`.
    pub async fn connect(
        server: &ServerConfig,
        timeouts: &TimeoutConfig,
    ) -> Result<Self, FtpError> {
        with_timeout(
            timeouts.connect_timeout,
            "connection handshake",
            Self::handshake(server, timeouts),
        )
        .await
    }

    async fn handshake(server: &ServerConfig, timeouts: &TimeoutConfig) -> Result<Self, FtpError> {
        debug!(host = %server.host, port = server.port, secure = server.secure, "Connecting to FTP server");

        let tcp = TcpStream::connect((server.host.as_str(), server.port)).await?;
        let peer = tcp.peer_addr()?.ip();
        let mut plain = BufReader::new(tcp);

        loop {
            let greeting = reply::read_reply(&mut plain).await?;
            match greeting.code {
                120 => debug!(message = %greeting.message(), "Server not ready yet, waiting"),
                220 => break,
                _ => return Err(unexpected("(greeting)", &greeting)),
            }
        }

        let (control, tls): (BoxedTransport, _) = if server.secure {
            plain.write_all(b"AUTH TLS\r\n").await?;
            plain.flush().await?;
            let auth = reply::read_reply(&mut plain).await?;
            if auth.code != 234 {
                return Err(unexpected("AUTH TLS", &auth));
            }
            let tls = TlsSettings::new(server)?;
            let stream = tls.wrap(plain.into_inner()).await?;
            (stream, Some(tls))
        } else {
            (Box::new(plain.into_inner()), None)
        };

        let mut session = Self {
            control: Some(BufReader::new(control)),
            peer,
            host: server.host.clone(),
            tls,
            timeouts: timeouts.clone(),
            use_epsv: true,
            use_mlsd: true,
            pending_transfer: None,
        };

        session.login(&server.username, &server.password).await?;
        if session.tls.is_some() {
            session.expect("PBSZ 0", &[200]).await?;
            session.expect("PROT P", &[200]).await?;
        }
        session.expect("TYPE I", &[200]).await?;

        info!(host = %server.host, port = server.port, user = %server.username, secure = server.secure, "FTP session established");
        Ok(session)
    }

    async fn login(&mut self, username: &str, password: &str) -> Result<(), FtpError> {
        let user = format!("USER {username}");
        let reply = self.command(&user).await?;
        match reply.code {
            230 => return Ok(()),
            331 => {}
            _ => return Err(unexpected(&user, &reply)),
        }

        let pass = format!("PASS {password}");
        let reply = self.command(&pass).await?;
        match reply.code {
            230 | 202 => Ok(()),
            332 => Err(FtpError::UnexpectedReply {
                command: redact(&pass),
                code: reply.code,
                message: format!("account (ACCT) login is not supported: {}", reply.message()),
            }),
            _ => Err(unexpected(&pass, &reply)),
        }
    }

    fn control(&mut self) -> Result<&mut BufReader<BoxedTransport>, FtpError> {
        self.control.as_mut().ok_or(FtpError::Closed)
    }

    async fn send(&mut self, command: &str) -> Result<(), FtpError> {
        debug!(command = %redact(command), "-> FTP");
        let control = self.control()?;
        control.write_all(command.as_bytes()).await?;
        control.write_all(b"\r\n").await?;
        control.flush().await?;
        Ok(())
    }

    async fn read_reply(&mut self, command: &str) -> Result<Reply, FtpError> {
        let limit = self.timeouts.command_timeout;
        let operation = format!("reply to {}", redact(command));
        let control = self.control()?;
        let reply = with_timeout(limit, &operation, reply::read_reply(control)).await?;
        debug!(code = reply.code, message = %reply.message(), "<- FTP");
        Ok(reply)
    }

    async fn command(&mut self, command: &str) -> Result<Reply, FtpError> {
        self.send(command).await?;
        self.read_reply(command).await
    }

    async fn expect(&mut self, command: &str, accepted: &[u16]) -> Result<Reply, FtpError> {
        let reply = self.command(command).await?;
        if accepted.contains(&reply.code) {
            Ok(reply)
        } else {
            Err(unexpected(command, &reply))
        }
    }

    /// Ask the server for a passive data port (EPSV, falling back to PASV)
    async fn passive_port(&mut self) -> Result<u16, FtpError> {
        if self.use_epsv {
            let reply = self.command("EPSV").await?;
            match reply.code {
                229 => return transport::parse_epsv_port(&reply.message()),
                code if NOT_IMPLEMENTED.contains(&code) => {
                    debug!(host = %self.host, code, "EPSV not supported, falling back to PASV");
                    self.use_epsv = false;
                }
                _ => return Err(unexpected("EPSV", &reply)),
            }
        }
        let reply = self.expect("PASV", &[227]).await?;
        transport::parse_pasv_port(&reply.message())
    }

    /// Open a data connection and issue `command` over it
    ///
    /// TLS on the data connection is negotiated after the server's preliminary
    /// reply, since servers only start their TLS accept once the command arrives.
    async fn open_data(&mut self, command: &str) -> Result<DataStream, FtpError> {
        let port = self.passive_port().await?;
        let address = SocketAddr::new(self.peer, port);
        let tcp = with_timeout(self.timeouts.connect_timeout, "data connection", async {
            TcpStream::connect(address).await.map_err(FtpError::from)
        })
        .await?;

        let reply = self.command(command).await?;
        if !matches!(reply.code, 125 | 150) {
            return Err(unexpected(command, &reply));
        }

        let stream: BoxedTransport = match &self.tls {
            Some(tls) => {
                with_timeout(
                    self.timeouts.connect_timeout,
                    "data connection TLS handshake",
                    tls.wrap(tcp),
                )
                .await?
            }
            None => Box::new(tcp),
        };
        Ok(Box::new(IdleTimeoutReader::new(
            stream,
            self.timeouts.command_timeout,
        )))
    }

    /// Read the `226`/`250` reply that closes a data transfer
    async fn expect_completion(&mut self, command: &str) -> Result<(), FtpError> {
        let reply = self.read_reply(command).await?;
        match reply.code {
            226 | 250 => Ok(()),
            _ => Err(unexpected(command, &reply)),
        }
    }

    async fn fetch_listing(&mut self, verb: &str, path: &RemotePath) -> Result<String, FtpError> {
        let command = format!("{verb} {path}");
        let mut data = self.open_data(&command).await?;
        let mut body = Vec::new();
        data.read_to_end(&mut body).await?;
        drop(data);
        self.expect_completion(&command).await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    /// List the files and directories directly inside `path`
    ///
    /// Uses MLSD, falling back to LIST for the rest of the session when the
    /// server does not implement it.
    pub async fn list(&mut self, path: &RemotePath) -> Result<Vec<RemoteEntry>, FtpError> {
        if self.use_mlsd {
            match self.fetch_listing("MLSD", path).await {
                Ok(body) => return Ok(listing::parse_mlsd(&body, path)),
                Err(e) if e.reply_code().is_some_and(|c| NOT_IMPLEMENTED.contains(&c)) => {
                    debug!(host = %self.host, "MLSD not supported, falling back to LIST");
                    self.use_mlsd = false;
                }
                Err(e) => return Err(e),
            }
        }
        let body = self.fetch_listing("LIST", path).await?;
        Ok(listing::parse_list(&body, path))
    }

    /// Start downloading `path`; the returned stream yields the file's bytes
    ///
    /// Call [`FtpSession::finish_read`] after the stream is drained and dropped.
    pub async fn open_read_stream(&mut self, path: &RemotePath) -> Result<DataStream, FtpError> {
        if self.pending_transfer.is_some() {
            warn!(host = %self.host, "Previous transfer was not finished, control connection may be out of sync");
        }
        let command = format!("RETR {path}");
        let stream = self.open_data(&command).await?;
        self.pending_transfer = Some(command);
        Ok(stream)
    }

    /// Consume the completion reply of the transfer started by `open_read_stream`
    pub async fn finish_read(&mut self) -> Result<(), FtpError> {
        let command = self
            .pending_transfer
            .take()
            .unwrap_or_else(|| "RETR".to_string());
        self.expect_completion(&command).await
    }

    /// Whether `close` has not been called yet
    pub fn is_open(&self) -> bool {
        self.control.is_some()
    }

    /// Send QUIT and shut the control connection down
    ///
    /// Best-effort and idempotent: failures are logged, never returned.
    pub async fn close(&mut self) {
        let Some(mut control) = self.control.take() else {
            return;
        };
        self.pending_transfer = None;

        let quit = async {
            control.write_all(b"QUIT\r\n").await?;
            control.flush().await?;
            // A pending transfer reply may arrive first; either way one reply is enough
            reply::read_reply(&mut control).await?;
            Ok::<(), FtpError>(())
        };
        match tokio::time::timeout(self.timeouts.command_timeout, quit).await {
            Ok(Ok(())) => debug!(host = %self.host, "FTP session closed"),
            Ok(Err(e)) => debug!(host = %self.host, error = %e, "QUIT failed, dropping connection"),
            Err(_) => warn!(host = %self.host, "Timed out waiting for QUIT reply, dropping connection"),
        }

        if let Err(e) = control.get_mut().shutdown().await {
            debug!(host = %self.host, error = %e, "Control connection shutdown failed");
        }
    }
}

#[async_trait]
impl RemoteSession for FtpSession {
    async fn list(&mut self, path: &RemotePath) -> Result<Vec<RemoteEntry>, FtpError> {
        FtpSession::list(self, path).await
    }

    async fn open_read_stream(&mut self, path: &RemotePath) -> Result<DataStream, FtpError> {
        FtpSession::open_read_stream(self, path).await
    }

    async fn finish_read(&mut self) -> Result<(), FtpError> {
        FtpSession::finish_read(self).await
    }

    async fn close(&mut self) {
        FtpSession::close(self).await
    }
}

/// Production [`SessionFactory`] that opens [`FtpSession`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct FtpConnector;

#[async_trait]
impl SessionFactory for FtpConnector {
    async fn open(
        &self,
        server: &ServerConfig,
        timeouts: &TimeoutConfig,
    ) -> Result<Box<dyn RemoteSession>, FtpError> {
        let session = FtpSession::connect(server, timeouts).await?;
        Ok(Box::new(session))
    }
}
