//! Command vocabulary and frame classification.
//!
//! A command frame is one line starting with a bracket tag such as `[GET]`.
//! Tags are matched exactly and case-sensitively. Anything after the tag on
//! the same line is the inline payload:
//!
//! ```text
//! [GET]                      <- tag only, payload follows on the next line
//! [GET]https://example.com   <- tag with inline payload
//! ```

use flipper_bridge_core::{BodyMode, HttpMethod};

/// Every command the bridge understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Get,
    Post,
    Put,
    Delete,
    GetBytes,
    PostBytes,
    SocketStart,
    SocketStop,
    WifiSave,
    WifiList,
    WifiIp,
    IpAddress,
    WifiStatus,
    WifiScan,
    WifiConnect,
    WifiDisconnect,
    LedOn,
    LedOff,
    Reboot,
    Version,
    Ping,
    List,
    Parse,
    ParseArray,
}

/// Tag table. Canonical tags come first; later entries are aliases.
const VOCABULARY: &[(&str, Command)] = &[
    ("[GET]", Command::Get),
    ("[POST]", Command::Post),
    ("[PUT]", Command::Put),
    ("[DELETE]", Command::Delete),
    ("[GET/BYTES]", Command::GetBytes),
    ("[POST/BYTES]", Command::PostBytes),
    ("[SOCKET/START]", Command::SocketStart),
    ("[SOCKET/STOP]", Command::SocketStop),
    ("[WIFI/SAVE]", Command::WifiSave),
    ("[WIFI/LIST]", Command::WifiList),
    ("[WIFI/IP]", Command::WifiIp),
    ("[IP/ADDRESS]", Command::IpAddress),
    ("[WIFI/STATUS]", Command::WifiStatus),
    ("[WIFI/SCAN]", Command::WifiScan),
    ("[WIFI/CONNECT]", Command::WifiConnect),
    ("[WIFI/DISCONNECT]", Command::WifiDisconnect),
    ("[LED/ON]", Command::LedOn),
    ("[LED/OFF]", Command::LedOff),
    ("[REBOOT]", Command::Reboot),
    ("[VERSION]", Command::Version),
    ("[PING]", Command::Ping),
    ("[LIST]", Command::List),
    ("[PARSE]", Command::Parse),
    ("[PARSE/ARRAY]", Command::ParseArray),
    // Older hosts send the JSON request forms under these names.
    ("[GET/HTTP]", Command::Get),
    ("[POST/HTTP]", Command::Post),
    ("[PUT/HTTP]", Command::Put),
    ("[DELETE/HTTP]", Command::Delete),
];

impl Command {
    /// Look up an exact tag, brackets included.
    pub fn from_tag(tag: &str) -> Option<Command> {
        VOCABULARY
            .iter()
            .find(|(known, _)| *known == tag)
            .map(|(_, command)| *command)
    }

    /// Canonical tag for this command.
    pub fn tag(&self) -> &'static str {
        VOCABULARY
            .iter()
            .find(|(_, command)| command == self)
            .map(|(tag, _)| *tag)
            .unwrap_or("[?]")
    }

    /// Canonical tags in vocabulary order, aliases excluded.
    pub fn vocabulary() -> impl Iterator<Item = &'static str> {
        let mut seen: Vec<Command> = Vec::new();
        VOCABULARY.iter().filter_map(move |(tag, command)| {
            if seen.contains(command) {
                None
            } else {
                seen.push(*command);
                Some(*tag)
            }
        })
    }

    /// Method and body mode for HTTP commands.
    pub fn request(&self) -> Option<(HttpMethod, BodyMode)> {
        match self {
            Command::Get => Some((HttpMethod::Get, BodyMode::Text)),
            Command::Post => Some((HttpMethod::Post, BodyMode::Text)),
            Command::Put => Some((HttpMethod::Put, BodyMode::Text)),
            Command::Delete => Some((HttpMethod::Delete, BodyMode::Text)),
            Command::GetBytes => Some((HttpMethod::Get, BodyMode::Bytes)),
            Command::PostBytes => Some((HttpMethod::Post, BodyMode::Bytes)),
            _ => None,
        }
    }

    /// Whether the command carries a payload (inline or on the next line).
    pub fn takes_payload(&self) -> bool {
        self.request().is_some()
            || matches!(
                self,
                Command::SocketStart | Command::WifiSave | Command::Parse | Command::ParseArray
            )
    }
}

/// One classified command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandFrame<'a> {
    pub command: Command,
    /// The tag as received (may be an alias).
    pub tag: &'a str,
    /// Text after the tag on the same line, if any.
    pub inline_payload: Option<&'a str>,
}

impl<'a> CommandFrame<'a> {
    /// Classify a line. Returns `None` for anything outside the vocabulary.
    pub fn parse(line: &'a str) -> Option<Self> {
        let line = line.trim();
        if !line.starts_with('[') {
            return None;
        }
        let close = line.find(']')?;
        let (tag, rest) = line.split_at(close + 1);
        let command = Command::from_tag(tag)?;
        let rest = rest.trim();

        Some(Self {
            command,
            tag,
            inline_payload: (!rest.is_empty()).then_some(rest),
        })
    }
}
