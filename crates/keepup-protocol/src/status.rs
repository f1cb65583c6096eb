//! Game server status probe protocol.
//!
//! A single UDP datagram `\xFF\xFF\xFF\xFFgetstatus` is answered with:
//!
//! ```text
//! \xFF\xFF\xFF\xFFstatusResponse\n
//! \key1\value1\key2\value2...\n
//! <score> <ping> "<name>"\n      (one line per player)
//! ```
//!
//! # Panic-Free Guarantees
//!
//! Parsing never indexes directly into line or field slices; malformed
//! replies produce [`StatusParseError`] or are skipped line by line.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Connectionless status request datagram.
pub const STATUS_REQUEST: &[u8] = b"\xFF\xFF\xFF\xFFgetstatus";

/// Errors from parsing a status reply.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StatusParseError {
    #[error("empty status reply")]
    Empty,

    #[error("status reply has no info line")]
    MissingInfoLine,
}

/// Parsed status reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerStatus {
    /// Server cvars from the info line. Later duplicates win.
    pub keys: BTreeMap<String, String>,
    /// Player names, color codes intact, in reply order.
    pub players: Vec<String>,
}

impl ServerStatus {
    /// Server hostname with color codes stripped.
    pub fn hostname(&self) -> Option<String> {
        self.keys.get("sv_hostname").map(|h| strip_colors(h))
    }

    pub fn map_name(&self) -> Option<&str> {
        self.keys.get("mapname").map(String::as_str)
    }

    pub fn max_clients(&self) -> Option<u32> {
        self.keys
            .get("sv_maxclients")
            .and_then(|v| v.trim().parse().ok())
    }
}

/// Parses a raw status reply.
///
/// The first line is the header and is ignored. The second line holds the
/// backslash-separated key/value pairs. Every line after that except the
/// final one is a player line; lines without a quoted name are skipped.
pub fn parse_status_response(bytes: &[u8]) -> Result<ServerStatus, StatusParseError> {
    if bytes.is_empty() {
        return Err(StatusParseError::Empty);
    }

    let text = String::from_utf8_lossy(bytes);
    let lines: Vec<&str> = text.split('\n').collect();

    let info = lines.get(1).ok_or(StatusParseError::MissingInfoLine)?;
    let keys = parse_info_line(info);

    let player_lines = match lines.len() {
        n if n > 3 => lines.get(2..n - 1).unwrap_or_default(),
        _ => &[],
    };
    let players = player_lines
        .iter()
        .filter_map(|line| quoted_name(line))
        .map(str::to_string)
        .collect();

    Ok(ServerStatus { keys, players })
}

fn parse_info_line(line: &str) -> BTreeMap<String, String> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let line = line.strip_prefix('\\').unwrap_or(line);

    let fields: Vec<&str> = line.split('\\').collect();
    let mut keys = BTreeMap::new();
    for pair in fields.chunks(2) {
        if let [key, value] = pair {
            if !key.is_empty() {
                keys.insert((*key).to_string(), (*value).to_string());
            }
        }
    }
    keys
}

fn quoted_name(line: &str) -> Option<&str> {
    let start = line.find('"')? + 1;
    let rest = line.get(start..)?;
    let len = rest.find('"')?;
    rest.get(..len)
}

/// Removes `^X` color codes from a name or hostname.
///
/// `^^` yields a literal `^` and still consumes the following character as
/// a color code. A doubled caret at the very end of the text is preserved.
pub fn strip_colors(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut after_caret = false;

    for (i, &c) in chars.iter().enumerate() {
        if c == '^' {
            if after_caret {
                out.push('^');
                if i + 1 == chars.len() {
                    out.push('^');
                }
            } else {
                after_caret = true;
            }
        } else if after_caret {
            after_caret = false;
        } else {
            out.push(c);
        }
    }

    out
}
