//! Directory listing parsers: MLSD (RFC 3659) and the `LIST` fallback.

use crate::types::{EntryKind, RemoteEntry, RemotePath};
use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

/// Parse an MLSD response body
///
/// Each line is `fact=value;fact=value; name`. Entries of type `cdir`/`pdir`
/// and kinds other than `file`/`dir` are dropped.
pub(crate) fn parse_mlsd(body: &str, parent: &RemotePath) -> Vec<RemoteEntry> {
    body.lines()
        .filter_map(|line| parse_mlsd_line(line.trim_end_matches('\r'), parent))
        .collect()
}

fn parse_mlsd_line(line: &str, parent: &RemotePath) -> Option<RemoteEntry> {
    if line.is_empty() {
        return None;
    }
    let (facts, name) = line.split_once(' ')?;
    let name = last_segment(name)?;

    let mut kind = None;
    let mut size = None;
    for fact in facts.split(';').filter(|f| !f.is_empty()) {
        let Some((key, value)) = fact.split_once('=') else {
            continue;
        };
        match key.to_ascii_lowercase().as_str() {
            "type" => kind = Some(value.to_ascii_lowercase()),
            "size" => size = value.parse().ok(),
            _ => {}
        }
    }

    let kind = match kind.as_deref() {
        Some("file") => EntryKind::File,
        Some("dir") => EntryKind::Directory,
        Some("cdir" | "pdir") => return None,
        other => {
            debug!(parent = %parent, name, kind = ?other, "skipping MLSD entry that is neither file nor directory");
            return None;
        }
    };

    Some(RemoteEntry {
        name: name.to_string(),
        kind,
        parent: parent.clone(),
        size: if kind == EntryKind::File { size } else { None },
    })
}

#[allow(clippy::expect_used)]
fn unix_line() -> &'static Regex {
    static UNIX_LINE: OnceLock<Regex> = OnceLock::new();
    UNIX_LINE.get_or_init(|| {
        Regex::new(
            r"^(?P<type>[-dlbcps])[-rwxsStTl]{9}[+@.]?\s+\d+\s+\S+\s+(?:\S+\s+)?(?P<size>\d+)\s+\w{3}\s+\d{1,2}\s+(?:\d{1,2}:\d{2}|\d{4})\s(?P<name>.+)$",
        )
        .expect("unix LIST pattern is valid")
    })
}

#[allow(clippy::expect_used)]
fn dos_line() -> &'static Regex {
    static DOS_LINE: OnceLock<Regex> = OnceLock::new();
    DOS_LINE.get_or_init(|| {
        Regex::new(
            r"^\d{2}-\d{2}-\d{2,4}\s+\d{1,2}:\d{2}(?:[AaPp][Mm])?\s+(?P<size><DIR>|\d+)\s+(?P<name>.+)$",
        )
        .expect("DOS LIST pattern is valid")
    })
}

/// Parse a `LIST` response body in Unix `ls -l` or DOS/IIS format
///
/// Symbolic links, devices and unparseable lines (e.g. `total 12`) are dropped.
pub(crate) fn parse_list(body: &str, parent: &RemotePath) -> Vec<RemoteEntry> {
    body.lines()
        .filter_map(|line| parse_list_line(line.trim_end_matches('\r'), parent))
        .collect()
}

fn parse_list_line(line: &str, parent: &RemotePath) -> Option<RemoteEntry> {
    let (kind, size, name): (EntryKind, Option<u64>, &str) =
        if let Some(caps) = unix_line().captures(line) {
            let kind = match &caps["type"] {
                "-" => EntryKind::File,
                "d" => EntryKind::Directory,
                other => {
                    debug!(parent = %parent, line, kind = other, "skipping LIST entry that is neither file nor directory");
                    return None;
                }
            };
            let name = caps.name("name")?.as_str().trim_start_matches(' ');
            (kind, caps["size"].parse().ok(), name)
        } else if let Some(caps) = dos_line().captures(line) {
            let name = caps.name("name")?.as_str();
            match &caps["size"] {
                "<DIR>" => (EntryKind::Directory, None, name),
                size => (EntryKind::File, size.parse().ok(), name),
            }
        } else {
            if !line.trim().is_empty() && !line.starts_with("total ") {
                debug!(parent = %parent, line, "ignoring unrecognized LIST line");
            }
            return None;
        };

    let name = last_segment(name)?;
    Some(RemoteEntry {
        name: name.to_string(),
        kind,
        parent: parent.clone(),
        size: if kind == EntryKind::File { size } else { None },
    })
}

/// Some servers report paths instead of bare names; keep only the last segment
fn last_segment(name: &str) -> Option<&str> {
    let name = name.trim_end_matches('/').rsplit('/').next()?;
    match name {
        "" | "." | ".." => None,
        name => Some(name),
    }
}
