//! Remote command execution.
//!
//! Each command runs on a fresh session channel that is opened, drained and
//! closed within the call. Higher layers only see the [`Execute`] trait, so
//! they can be driven by an in-memory executor in tests.

use std::borrow::Cow;

use tracing::{debug, warn};

use crate::error::{Error, Result, Step};
use crate::nonblock::{StepError, retry_until_ready};
use crate::transport::Transport;

/// Exit code reported when the channel could not be closed cleanly.
///
/// Remote exit statuses are always in `0..=255`, so this never collides with
/// a real one.
pub const EXIT_CLOSE_FAILED: i32 = -1;

const READ_BUFFER_SIZE: usize = 16 * 1024;

/// Output and exit status of one remote command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Everything the command wrote to stdout
    pub output: Vec<u8>,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn new(output: impl Into<Vec<u8>>, exit_code: i32) -> Self {
        Self {
            output: output.into(),
            exit_code,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Output decoded as UTF-8, invalid sequences replaced
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.output)
    }

    /// Drops everything from the first newline on, but only for a successful
    /// command; a failed command keeps its raw output.
    #[must_use]
    pub fn trimmed(mut self) -> Self {
        if self.success() {
            truncate_at_newline(&mut self.output);
        }
        self
    }
}

fn truncate_at_newline(buf: &mut Vec<u8>) {
    if let Some(pos) = buf.iter().position(|&b| b == b'\n') {
        buf.truncate(pos);
    }
}

/// The upward contract: run command text verbatim, get bytes and an exit code.
pub trait Execute {
    fn execute(&mut self, command: &str) -> Result<CommandOutput>;

    /// Like [`execute`](Self::execute), keeping only the first line of a
    /// successful command's output
    fn execute_trimmed(&mut self, command: &str) -> Result<CommandOutput> {
        Ok(self.execute(command)?.trimmed())
    }

    /// Runs the command and parses the leading integer of its first line.
    ///
    /// Trailing non-numeric text is tolerated with a warning.
    fn execute_expect_int(&mut self, command: &str) -> Result<i32> {
        let result = self.execute_trimmed(command)?;
        if !result.success() {
            return Err(Error::parse(format!(
                "command exited with status {}, expected an integer",
                result.exit_code
            )));
        }
        let text = result.text();
        let (value, rest) = parse_leading_int(&text)
            .ok_or_else(|| Error::parse(format!("no integer in output '{text}'")))?;
        if !rest.is_empty() {
            warn!(value, suffix_len = rest.len(), "ignoring suffix during integer parsing");
        }
        Ok(value)
    }
}

/// Parses an optionally signed run of leading decimal digits, after leading
/// whitespace, returning the value and whatever follows it.
pub fn parse_leading_int(text: &str) -> Option<(i32, &str)> {
    let trimmed = text.trim_start();
    let sign_len = usize::from(trimmed.starts_with(['-', '+']));
    let digits = trimmed[sign_len..]
        .bytes()
        .take_while(u8::is_ascii_digit)
        .count();
    if digits == 0 {
        return None;
    }
    let end = sign_len + digits;
    let value = trimmed[..end].parse::<i32>().ok()?;
    Some((value, &trimmed[end..]))
}

/// Runs `command` on a new channel of `transport`.
///
/// A hard failure while opening the channel or requesting execution aborts
/// the call. Output is drained until end of stream; a hard read error ends
/// the drain early. If closing the channel fails the exit code is
/// [`EXIT_CLOSE_FAILED`].
pub fn run<T: Transport>(transport: &mut T, command: &str) -> Result<CommandOutput> {
    let mut channel = retry_until_ready(transport, Step::ChannelOpen, |t| {
        t.open_session_channel()
    })?;
    retry_until_ready(transport, Step::Exec, |t| t.exec(&mut channel, command))?;

    let mut output = Vec::new();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        match transport.read(&mut channel, &mut buf) {
            Ok(0) => break,
            Ok(n) => output.extend_from_slice(&buf[..n]),
            Err(StepError::WouldBlock) => transport.wait_ready()?,
            Err(StepError::Failed(failure)) => {
                warn!(%failure, "channel read failed, keeping partial output");
                break;
            }
        }
    }

    let exit_code = match retry_until_ready(transport, Step::Close, |t| t.close(&mut channel)) {
        Ok(()) => transport.exit_status(&channel).unwrap_or_else(|failure| {
            warn!(%failure, "unable to fetch exit status");
            EXIT_CLOSE_FAILED
        }),
        Err(Error::Protocol { source, .. }) => {
            warn!(failure = %source, "channel close failed");
            EXIT_CLOSE_FAILED
        }
        Err(err) => return Err(err),
    };

    debug!(bytes = output.len(), exit_code, "command finished");
    Ok(CommandOutput { output, exit_code })
}
