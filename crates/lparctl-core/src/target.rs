//! Connection targets of the form `phyp://user@host[:port]/managed_system`.

use std::fmt;

use percent_encoding::percent_decode_str;
use url::Url;

use crate::error::{Error, Result};

/// Characters never allowed in a managed-system name, since it is pasted
/// into console command lines.
pub const SPECIAL_CHARACTERS: &[char] = &[
    '&', ';', '`', '@', '"', '|', '*', '?', '~', '<', '>', '^', '(', ')', '[', ']', '{', '}', '$',
    '%', '#', '\\', '\n', '\r', '\t',
];

const SCHEMES: &[&str] = &["phyp", "ssh"];

pub const DEFAULT_PORT: u16 = 22;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub user: Option<String>,
    pub host: String,
    pub port: Option<u16>,
    /// First path component; required for HMC consoles only
    pub managed_system: Option<String>,
}

impl Target {
    /// Parses a target URI. A bare `user@host/system` is read as `ssh://`.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        let url = if input.contains("://") {
            Url::parse(input)
        } else {
            Url::parse(&format!("ssh://{input}"))
        }
        .map_err(|e| Error::Target(format!("'{input}': {e}")))?;

        if !SCHEMES.contains(&url.scheme()) {
            return Err(Error::Target(format!(
                "unsupported scheme '{}', expected phyp or ssh",
                url.scheme()
            )));
        }
        if url.query().is_some() || url.fragment().is_some() {
            return Err(Error::Target(
                "path contains special characters".to_string(),
            ));
        }

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| Error::Target("missing server name".to_string()))?
            .to_string();

        let user = match url.username() {
            "" => None,
            raw => Some(decode(raw)?),
        };

        let path = decode(url.path())?;
        if has_special_characters(&path) {
            return Err(Error::Target(format!(
                "path '{path}' contains special characters"
            )));
        }
        let managed_system = path
            .split('/')
            .find(|part| !part.is_empty())
            .map(str::to_string);

        Ok(Self {
            user,
            host,
            port: url.port(),
            managed_system,
        })
    }

    pub fn port_or_default(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "phyp://")?;
        if let Some(user) = &self.user {
            write!(f, "{user}@")?;
        }
        write!(f, "{}", self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }
        if let Some(ms) = &self.managed_system {
            write!(f, "/{ms}")?;
        }
        Ok(())
    }
}

fn decode(raw: &str) -> Result<String> {
    percent_decode_str(raw)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|e| Error::Target(e.to_string()))
}

pub fn has_special_characters(text: &str) -> bool {
    text.contains(SPECIAL_CHARACTERS)
}

/// Removes every special character from `text`.
pub fn strip_special_characters(text: &str) -> String {
    text.chars()
        .filter(|c| !SPECIAL_CHARACTERS.contains(c))
        .collect()
}
