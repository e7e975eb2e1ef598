//! Control connection reply parsing (RFC 959 section 4.2).

use crate::error::FtpError;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

/// Upper bound on a single reply line, newline excluded
const MAX_LINE_LENGTH: usize = 8 * 1024;

/// Upper bound on the number of lines of one multi-line reply
const MAX_REPLY_LINES: usize = 1024;

/// A complete server reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Reply {
    /// Three-digit reply code
    pub(crate) code: u16,
    /// Reply text, one entry per line, with the code prefix removed
    pub(crate) lines: Vec<String>,
}

impl Reply {
    /// Reply text with lines joined by `\n`
    pub(crate) fn message(&self) -> String {
        self.lines.join("\n")
    }
}

/// Split `NNN-text` / `NNN text` into code, separator and text
fn split_code(line: &str) -> Option<(u16, char, &str)> {
    let code = line.get(..3)?;
    if !code.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let code: u16 = code.parse().ok()?;
    match line[3..].chars().next() {
        None => Some((code, ' ', "")),
        Some(sep @ (' ' | '-')) => Some((code, sep, &line[4..])),
        Some(_) => None,
    }
}

/// Read one line, never buffering more than `MAX_LINE_LENGTH` bytes of it
///
/// Reply text is decoded lossily. Servers echo file names in whatever encoding
/// the filesystem uses, and only the code is interpreted.
async fn read_line<R>(reader: &mut R) -> Result<String, FtpError>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    let mut line = Vec::new();
    let read = (&mut *reader)
        .take(MAX_LINE_LENGTH as u64 + 1)
        .read_until(b'\n', &mut line)
        .await?;
    if read == 0 {
        return Err(FtpError::Closed);
    }
    if line.last() != Some(&b'\n') && line.len() > MAX_LINE_LENGTH {
        return Err(FtpError::MalformedReply(format!(
            "reply line longer than {MAX_LINE_LENGTH} bytes"
        )));
    }
    let text = String::from_utf8_lossy(&line);
    Ok(text.trim_end_matches(['\r', '\n']).to_string())
}

/// Read one complete (possibly multi-line) reply
pub(crate) async fn read_reply<R>(reader: &mut R) -> Result<Reply, FtpError>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    let first = read_line(reader).await?;
    let (code, separator, text) =
        split_code(&first).ok_or_else(|| FtpError::MalformedReply(first.clone()))?;

    let mut lines = vec![text.to_string()];
    if separator == ' ' {
        return Ok(Reply { code, lines });
    }

    // Multi-line: runs until a line starting with the same code followed by a space
    loop {
        if lines.len() >= MAX_REPLY_LINES {
            return Err(FtpError::MalformedReply(format!(
                "multi-line {code} reply exceeds {MAX_REPLY_LINES} lines"
            )));
        }
        let line = read_line(reader).await?;
        match split_code(&line) {
            Some((end_code, ' ', text)) if end_code == code => {
                lines.push(text.to_string());
                return Ok(Reply { code, lines });
            }
            Some((same_code, '-', text)) if same_code == code => lines.push(text.to_string()),
            _ => lines.push(line.trim_start().to_string()),
        }
    }
}
