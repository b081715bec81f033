//! Would-block retry around the session's readiness wait.
//!
//! libssh2 in non-blocking mode never waits on the socket itself: every call
//! either makes progress, fails, or reports `EAGAIN`. Each protocol step in
//! this crate is therefore written as a single attempt returning
//! [`StepResult`], and [`retry_until_ready`] turns it into a call that only
//! returns once the step made progress or failed for real.
//!
//! The readiness wait is the one place the calling thread blocks.

use tracing::trace;

use crate::error::{Error, Failure, Result, Step};

/// Outcome of a single non-blocking attempt that did not succeed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepError {
    /// Nothing can happen until the socket becomes ready
    WouldBlock,
    /// Any other failure; never retried
    Failed(Failure),
}

impl From<Failure> for StepError {
    fn from(failure: Failure) -> Self {
        Self::Failed(failure)
    }
}

/// Result of a single non-blocking attempt
pub type StepResult<T> = std::result::Result<T, StepError>;

/// Something that can block until the underlying socket is ready for the
/// direction the protocol currently needs.
pub trait Readiness {
    /// Blocks without timeout. Interrupted waits are retried internally;
    /// only genuine I/O failures are returned.
    fn wait_ready(&mut self) -> Result<()>;
}

/// Repeats `attempt` until it stops reporting would-block.
///
/// Between attempts `io.wait_ready()` is called exactly once. A hard failure
/// is returned as [`Error::Protocol`] tagged with `step`.
pub fn retry_until_ready<R, T, F>(io: &mut R, step: Step, mut attempt: F) -> Result<T>
where
    R: Readiness + ?Sized,
    F: FnMut(&mut R) -> StepResult<T>,
{
    loop {
        match attempt(io) {
            Ok(value) => return Ok(value),
            Err(StepError::WouldBlock) => {
                trace!(%step, "would block, waiting for socket");
                io.wait_ready()?;
            }
            Err(StepError::Failed(source)) => return Err(Error::Protocol { step, source }),
        }
    }
}
