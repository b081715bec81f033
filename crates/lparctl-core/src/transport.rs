//! Transport primitives the command and file-transfer layers are written
//! against.
//!
//! Every method is a single non-blocking attempt; callers drive them through
//! [`retry_until_ready`](crate::nonblock::retry_until_ready). All methods take
//! the transport by `&mut`, so at most one channel is ever in flight.

use std::path::Path;

use crate::error::Failure;
use crate::nonblock::{Readiness, StepResult};

pub trait Transport: Readiness {
    /// Ephemeral channel; one per command or per file transfer
    type Channel;

    fn open_session_channel(&mut self) -> StepResult<Self::Channel>;

    fn exec(&mut self, channel: &mut Self::Channel, command: &str) -> StepResult<()>;

    /// `Ok(0)` means end of stream
    fn read(&mut self, channel: &mut Self::Channel, buf: &mut [u8]) -> StepResult<usize>;

    /// Returns how many bytes the channel accepted
    fn write(&mut self, channel: &mut Self::Channel, buf: &[u8]) -> StepResult<usize>;

    fn close(&mut self, channel: &mut Self::Channel) -> StepResult<()>;

    /// Only meaningful after a successful [`close`](Self::close)
    fn exit_status(&mut self, channel: &Self::Channel) -> Result<i32, Failure>;

    fn send_eof(&mut self, channel: &mut Self::Channel) -> StepResult<()>;

    fn wait_eof(&mut self, channel: &mut Self::Channel) -> StepResult<()>;

    fn wait_close(&mut self, channel: &mut Self::Channel) -> StepResult<()>;

    /// Opens an outbound scp channel for a file of `size` bytes
    fn scp_send(&mut self, remote: &Path, mode: i32, size: u64) -> StepResult<Self::Channel>;

    /// Opens an inbound scp channel, returning it with the remote file size
    fn scp_recv(&mut self, remote: &Path) -> StepResult<(Self::Channel, u64)>;
}

/// Credentials-level operations used by [`crate::auth::authenticate`]
pub trait UserAuth: Readiness {
    fn auth_publickey_file(
        &mut self,
        username: &str,
        public_key: &Path,
        private_key: &Path,
    ) -> StepResult<()>;

    fn auth_password(&mut self, username: &str, password: &str) -> StepResult<()>;
}
