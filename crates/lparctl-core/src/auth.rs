//! Public key authentication with password fallback.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{Error, Failure, Result, Step};
use crate::nonblock::retry_until_ready;
use crate::ssh_code::Libssh2Code;
use crate::transport::UserAuth;

/// Interactive source of credentials. Returning `None` declines.
pub trait AuthPrompt {
    fn username(&self, host: &str) -> Option<String>;

    fn password(&self, username: &str, host: &str) -> Option<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPair {
    pub private: PathBuf,
    pub public: PathBuf,
}

impl KeyPair {
    pub fn new(private: impl Into<PathBuf>, public: impl Into<PathBuf>) -> Self {
        Self {
            private: private.into(),
            public: public.into(),
        }
    }

    /// `~/.ssh/id_rsa` and `~/.ssh/id_rsa.pub`
    pub fn default_rsa() -> Option<Self> {
        let ssh = dirs::home_dir()?.join(".ssh");
        Some(Self::new(ssh.join("id_rsa"), ssh.join("id_rsa.pub")))
    }

    /// Explicit paths win; a missing half falls back to the default pair.
    pub fn resolve(private: Option<&Path>, public: Option<&Path>) -> Option<Self> {
        match (private, public) {
            (Some(private), Some(public)) => Some(Self::new(private, public)),
            (Some(private), None) => {
                let mut public = private.as_os_str().to_owned();
                public.push(".pub");
                Some(Self::new(private, public))
            }
            _ => Self::default_rsa(),
        }
    }

    pub fn exists(&self) -> bool {
        self.private.is_file() && self.public.is_file()
    }
}

/// What a public key failure means for the rest of authentication
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyVerdict {
    /// Key not accepted; try a password
    FallBack,
    /// Session is broken; stop
    Fatal,
    /// Any other failure; stop without trying a password
    Rejected,
}

fn classify(failure: &Failure) -> KeyVerdict {
    match Libssh2Code::from_error_code(failure.code) {
        Some(
            Libssh2Code::SocketNone
            | Libssh2Code::AuthenticationFailed
            | Libssh2Code::PublickeyUnverified,
        ) => KeyVerdict::FallBack,
        Some(Libssh2Code::Alloc | Libssh2Code::SocketSend | Libssh2Code::SocketTimeout) => {
            KeyVerdict::Fatal
        }
        _ => KeyVerdict::Rejected,
    }
}

/// Authenticates `session`, returning the username that succeeded.
///
/// The username is `explicit_user` if given, else asked from `prompt`. A
/// key pair that exists is tried first; a missing pair or a key the server
/// does not accept leads to a password prompt.
pub fn authenticate<S: UserAuth + ?Sized>(
    session: &mut S,
    host: &str,
    explicit_user: Option<&str>,
    key: Option<&KeyPair>,
    prompt: Option<&dyn AuthPrompt>,
) -> Result<String> {
    let username = match explicit_user {
        Some(user) => user.to_string(),
        None => prompt
            .and_then(|p| p.username(host))
            .filter(|u| !u.is_empty())
            .ok_or_else(|| Error::Auth("no username given and no prompt available".into()))?,
    };

    match key.filter(|k| k.exists()) {
        Some(key) => {
            let attempt = retry_until_ready(session, Step::PublicKeyAuth, |s| {
                s.auth_publickey_file(&username, &key.public, &key.private)
            });
            match attempt {
                Ok(()) => {
                    info!(user = %username, host, "authenticated with public key");
                    return Ok(username);
                }
                Err(Error::Protocol { source, .. }) => match classify(&source) {
                    KeyVerdict::FallBack => {
                        debug!(user = %username, %source, "public key not accepted");
                    }
                    KeyVerdict::Fatal => {
                        return Err(Error::Protocol {
                            step: Step::PublicKeyAuth,
                            source,
                        });
                    }
                    KeyVerdict::Rejected => {
                        return Err(Error::Auth(format!("public key authentication: {source}")));
                    }
                },
                Err(err) => return Err(err),
            }
        }
        None => debug!("no key pair available, using password"),
    }

    let prompt = prompt.ok_or_else(|| {
        Error::Auth("public key not usable and no password prompt available".into())
    })?;
    let password = prompt
        .password(&username, host)
        .ok_or_else(|| Error::Auth("password prompt declined".into()))?;

    match retry_until_ready(session, Step::PasswordAuth, |s| {
        s.auth_password(&username, &password)
    }) {
        Ok(()) => {
            info!(user = %username, host, "authenticated with password");
            Ok(username)
        }
        Err(Error::Protocol { source, .. }) => {
            warn!(user = %username, host, "password rejected");
            Err(Error::Auth(format!("password authentication: {source}")))
        }
        Err(err) => Err(err),
    }
}
