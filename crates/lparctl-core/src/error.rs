//! Error types for lparctl-core

use std::fmt;
use thiserror::Error;

use crate::config::ConfigError;

/// Result type alias using the library's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// A single protocol step driven through the would-block retry loop.
///
/// Used to say which step failed, and as a tracing field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Handshake,
    PublicKeyAuth,
    PasswordAuth,
    ChannelOpen,
    Exec,
    Read,
    Write,
    Close,
    ScpSend,
    ScpRecv,
    SendEof,
    WaitEof,
    WaitClose,
    Disconnect,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Handshake => "ssh handshake",
            Self::PublicKeyAuth => "public key authentication",
            Self::PasswordAuth => "password authentication",
            Self::ChannelOpen => "channel open",
            Self::Exec => "channel exec",
            Self::Read => "channel read",
            Self::Write => "channel write",
            Self::Close => "channel close",
            Self::ScpSend => "scp send",
            Self::ScpRecv => "scp receive",
            Self::SendEof => "send eof",
            Self::WaitEof => "wait eof",
            Self::WaitClose => "wait close",
            Self::Disconnect => "disconnect",
        };
        f.write_str(name)
    }
}

/// Hard (non would-block) failure reported by the transport library
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (code {code})")]
pub struct Failure {
    /// Raw libssh2 code, or the OS errno when the failure came from the socket
    pub code: i32,
    pub message: String,
}

impl Failure {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Main error type for lparctl-core
#[derive(Error, Debug)]
pub enum Error {
    /// Address resolution or TCP connection failure
    #[error("unable to connect to {host}: {reason}")]
    Connect { host: String, reason: String },

    /// No prompt available, or both key and password were rejected
    #[error("authentication failed: {0}")]
    Auth(String),

    /// A protocol step failed with something other than would-block
    #[error("{step} failed: {source}")]
    Protocol {
        step: Step,
        #[source]
        source: Failure,
    },

    /// A remote file or a table entry does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Command output could not be interpreted
    #[error("parse error: {0}")]
    Parse(String),

    /// The two live partition enumerations disagree
    #[error("unable to determine number of partitions: counted {counted}, listed {listed}")]
    Consistency { counted: usize, listed: usize },

    /// The remote table holds fewer records than there are live partitions
    #[error("correspondence table holds {records} records, {live} partitions are live")]
    ShortTable { records: usize, live: usize },

    /// Table entries are only recorded for real partition ids
    #[error("invalid partition id {0}")]
    InvalidPartitionId(i32),

    /// The correspondence table was used before a successful init
    #[error("correspondence table is not ready")]
    TableNotReady,

    /// Invalid connection target
    #[error("invalid target: {0}")]
    Target(String),

    /// Configuration errors
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Local filesystem or socket failures
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Short hint on what to check next, for CLI output
    #[must_use]
    pub fn remediation(&self) -> Option<&'static str> {
        match self {
            Self::Connect { .. } => {
                Some("Check the console hostname and that sshd listens on the configured port.")
            }
            Self::Auth(_) => Some(
                "Install ~/.ssh/id_rsa(.pub) for the console user or run interactively to enter a password.",
            ),
            Self::Protocol { .. } => {
                Some("Discard this connection and reconnect; the session is no longer usable.")
            }
            Self::Consistency { .. } => Some(
                "Partitions were being created or removed while listing; retry once the console is idle.",
            ),
            Self::ShortTable { .. } => Some(
                "Partitions were created outside lparctl. Move the remote table file aside on the console; the next connection recreates it with new UUIDs.",
            ),
            Self::InvalidPartitionId(_) => Some("Partition ids are non-negative integers."),
            Self::Config(_) => Some("Fix lparctl.toml or pass --config with a valid file."),
            Self::Target(_) => Some("Use the form phyp://user@host/managed_system."),
            Self::NotFound(_) | Self::Parse(_) | Self::TableNotReady | Self::Io(_) => None,
        }
    }

    pub(crate) fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }
}
