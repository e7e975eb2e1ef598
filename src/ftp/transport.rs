//! Byte transports for the control and data connections.
//!
//! Plain TCP and TLS-wrapped TCP are both carried as a boxed [`Transport`] so the
//! session code does not care which one it talks to.

use crate::config::ServerConfig;
use crate::error::FtpError;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio::time::{Instant, Sleep};

/// Anything the session can read from and write to
pub(crate) trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Transport for T {}

pub(crate) type BoxedTransport = Box<dyn Transport>;

/// TLS client settings for one session (explicit FTPS)
#[derive(Clone)]
pub(crate) struct TlsSettings {
    connector: tokio_native_tls::TlsConnector,
    domain: String,
}

impl TlsSettings {
    pub(crate) fn new(server: &ServerConfig) -> Result<Self, FtpError> {
        let connector = native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(server.accept_invalid_certs)
            .build()?;
        Ok(Self {
            connector: tokio_native_tls::TlsConnector::from(connector),
            domain: server.host.clone(),
        })
    }

    /// Run the client handshake over an established TCP connection
    pub(crate) async fn wrap(&self, stream: TcpStream) -> Result<BoxedTransport, FtpError> {
        let stream = self.connector.connect(&self.domain, stream).await?;
        Ok(Box::new(stream))
    }
}

/// Extract the port from a `229 Entering Extended Passive Mode (|||port|)` reply
pub(crate) fn parse_epsv_port(message: &str) -> Result<u16, FtpError> {
    let invalid = || FtpError::InvalidPassiveReply(message.to_string());

    let start = message.find('(').ok_or_else(invalid)?;
    let end = message[start..].find(')').ok_or_else(invalid)? + start;
    let inner = &message[start + 1..end];

    // The delimiter is the first character and is repeated four times
    let delimiter = inner.chars().next().ok_or_else(invalid)?;
    let fields: Vec<&str> = inner.split(delimiter).collect();
    match fields.as_slice() {
        ["", "", "", port, ""] => port.parse().map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}

/// Extract the port from a `227 Entering Passive Mode (h1,h2,h3,h4,p1,p2)` reply
///
/// The advertised address is ignored; data connections go to the control
/// connection's peer.
pub(crate) fn parse_pasv_port(message: &str) -> Result<u16, FtpError> {
    let invalid = || FtpError::InvalidPassiveReply(message.to_string());

    // Some servers omit the parentheses, so look for the first digit run instead
    let start = message.find(|c: char| c.is_ascii_digit()).ok_or_else(invalid)?;
    let numbers: Vec<u8> = message[start..]
        .split(',')
        .take(6)
        .map(|part| {
            let digits: String = part
                .trim()
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            digits.parse::<u8>().map_err(|_| invalid())
        })
        .collect::<Result<_, _>>()?;

    match numbers.as_slice() {
        [_, _, _, _, p1, p2] => Ok((u16::from(*p1) << 8) | u16::from(*p2)),
        _ => Err(invalid()),
    }
}

/// Reader that fails with `TimedOut` when no data arrives for `timeout`
pub(crate) struct IdleTimeoutReader<R> {
    inner: R,
    timeout: Duration,
    deadline: Pin<Box<Sleep>>,
}

impl<R> IdleTimeoutReader<R> {
    pub(crate) fn new(inner: R, timeout: Duration) -> Self {
        Self {
            inner,
            timeout,
            deadline: Box::pin(tokio::time::sleep(timeout)),
        }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for IdleTimeoutReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;
        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(result) => {
                let next = Instant::now() + this.timeout;
                this.deadline.as_mut().reset(next);
                Poll::Ready(result)
            }
            Poll::Pending => match this.deadline.as_mut().poll(cx) {
                Poll::Ready(()) => Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("no data received for {:?}", this.timeout),
                ))),
                Poll::Pending => Poll::Pending,
            },
        }
    }
}
