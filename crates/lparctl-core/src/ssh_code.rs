use thiserror::Error;

/// Session-level error codes reported by libssh2.
///
/// Only the codes this crate reacts to are named; everything else is kept as
/// the raw integer by the conversions below.
#[derive(Copy, Clone, Debug, Error, Hash, PartialEq, Eq)]
#[repr(i32)]
pub enum Libssh2Code {
    #[error("No socket or no key available")]
    SocketNone = -1,
    #[error("Banner receive failed")]
    BannerRecv = -2,
    #[error("Key exchange failed")]
    KexFailure = -5,
    #[error("Memory allocation failed")]
    Alloc = -6,
    #[error("Unable to send data on socket")]
    SocketSend = -7,
    #[error("Timed out")]
    Timeout = -9,
    #[error("Socket disconnected")]
    SocketDisconnect = -13,
    #[error("Protocol error")]
    Proto = -14,
    #[error("Unable to read key file")]
    File = -16,
    /// Also reported as "public key unrecognized".
    #[error("Authentication failed or public key unrecognized")]
    AuthenticationFailed = -18,
    #[error("Public key unverified")]
    PublickeyUnverified = -19,
    #[error("Channel failure")]
    ChannelFailure = -21,
    #[error("Channel request denied")]
    ChannelRequestDenied = -22,
    #[error("Channel closed")]
    ChannelClosed = -26,
    #[error("Channel EOF already sent")]
    ChannelEofSent = -27,
    #[error("SCP protocol error")]
    ScpProtocol = -28,
    #[error("Socket timeout")]
    SocketTimeout = -30,
    #[error("Request denied")]
    RequestDenied = -32,
    #[error("Operation would block")]
    Eagain = -37,
}

impl Libssh2Code {
    /// Produces a code from the raw libssh2 value if it matches a known one
    pub fn from_error_code(code: i32) -> Option<Self> {
        Self::try_from(code).ok()
    }

    /// Converts into the raw libssh2 value
    pub fn to_error_code(self) -> i32 {
        self as i32
    }

    /// Whether the call should simply be repeated once the socket is ready
    pub fn is_would_block(self) -> bool {
        self == Self::Eagain
    }
}

impl TryFrom<i32> for Libssh2Code {
    type Error = Result<(), i32>;

    /// `Err(Ok(()))` for success (zero), `Err(Err(code))` for codes that
    /// are not named here.
    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Err(Ok(())),
            -1 => Ok(Self::SocketNone),
            -2 => Ok(Self::BannerRecv),
            -5 => Ok(Self::KexFailure),
            -6 => Ok(Self::Alloc),
            -7 => Ok(Self::SocketSend),
            -9 => Ok(Self::Timeout),
            -13 => Ok(Self::SocketDisconnect),
            -14 => Ok(Self::Proto),
            -16 => Ok(Self::File),
            -18 => Ok(Self::AuthenticationFailed),
            -19 => Ok(Self::PublickeyUnverified),
            -21 => Ok(Self::ChannelFailure),
            -22 => Ok(Self::ChannelRequestDenied),
            -26 => Ok(Self::ChannelClosed),
            -27 => Ok(Self::ChannelEofSent),
            -28 => Ok(Self::ScpProtocol),
            -30 => Ok(Self::SocketTimeout),
            -32 => Ok(Self::RequestDenied),
            -37 => Ok(Self::Eagain),
            x => Err(Err(x)),
        }
    }
}

impl TryFrom<ssh2::ErrorCode> for Libssh2Code {
    type Error = ssh2::ErrorCode;

    fn try_from(code: ssh2::ErrorCode) -> Result<Self, Self::Error> {
        match code {
            ssh2::ErrorCode::Session(x) => Self::from_error_code(x).ok_or(code),
            x => Err(x),
        }
    }
}

/// Raw value carried by an `ssh2::ErrorCode`, session or sftp alike
pub fn raw_code(code: ssh2::ErrorCode) -> i32 {
    match code {
        ssh2::ErrorCode::Session(x) | ssh2::ErrorCode::SFTP(x) => x,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_from_zero_is_success() {
        assert_eq!(Libssh2Code::try_from(0), Err(Ok(())));
    }

    #[test]
    fn try_from_eagain() {
        assert_eq!(Libssh2Code::try_from(-37), Ok(Libssh2Code::Eagain));
        assert!(Libssh2Code::Eagain.is_would_block());
        assert!(!Libssh2Code::SocketSend.is_would_block());
    }

    #[test]
    fn try_from_unknown_code() {
        assert_eq!(Libssh2Code::try_from(-999), Err(Err(-999)));
        assert_eq!(Libssh2Code::from_error_code(7), None);
    }

    #[test]
    fn to_error_code_roundtrip() {
        let variants = [
            (Libssh2Code::SocketNone, -1),
            (Libssh2Code::Alloc, -6),
            (Libssh2Code::SocketSend, -7),
            (Libssh2Code::AuthenticationFailed, -18),
            (Libssh2Code::PublickeyUnverified, -19),
            (Libssh2Code::SocketTimeout, -30),
            (Libssh2Code::Eagain, -37),
        ];
        for (code, raw) in variants {
            assert_eq!(code.to_error_code(), raw);
            assert_eq!(Libssh2Code::try_from(raw), Ok(code));
        }
    }

    #[test]
    fn from_ssh2_session_code() {
        assert_eq!(
            Libssh2Code::try_from(ssh2::ErrorCode::Session(-19)),
            Ok(Libssh2Code::PublickeyUnverified)
        );
    }

    #[test]
    fn sftp_codes_are_not_session_codes() {
        let code = ssh2::ErrorCode::SFTP(2);
        assert_eq!(Libssh2Code::try_from(code), Err(code));
        assert_eq!(raw_code(code), 2);
    }

    #[test]
    fn display_messages() {
        assert_eq!(Libssh2Code::Eagain.to_string(), "Operation would block");
        assert_eq!(Libssh2Code::ScpProtocol.to_string(), "SCP protocol error");
    }
}
