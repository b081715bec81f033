//! In-memory transport for unit tests.
//!
//! Scripted command replies, a remote filesystem for scp, and counters for
//! readiness waits and transfers. Knobs inject would-block and hard failures
//! at specific steps.

use std::cell::Cell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::connection::RemoteSession;
use crate::error::{Failure, Result};
use crate::exec::{self, CommandOutput, Execute};
use crate::nonblock::{Readiness, StepError, StepResult};
use crate::scp;
use crate::transport::Transport;
use crate::uuid_table::TableSync;

#[derive(Debug)]
pub(crate) enum FakeChannel {
    Session {
        reply: Option<(Vec<u8>, i32)>,
        pos: usize,
        closed: bool,
        primed: bool,
    },
    Send {
        path: PathBuf,
        mode: i32,
        size: u64,
        data: Vec<u8>,
    },
    Recv {
        data: Vec<u8>,
        pos: usize,
    },
}

#[derive(Debug, Default)]
pub(crate) struct FakeTransport {
    pub replies: HashMap<String, (Vec<u8>, i32)>,
    pub files: HashMap<PathBuf, Vec<u8>>,
    pub modes: HashMap<PathBuf, i32>,
    pub executed: Vec<String>,
    pub waits: usize,
    pub pushes: usize,
    pub pulls: usize,
    /// Would-block count before `open_session_channel` succeeds
    pub open_would_block: usize,
    /// Max bytes handed out per read; 0 means unlimited
    pub read_chunk: usize,
    /// Report would-block before every read result
    pub read_would_block: bool,
    /// Max bytes accepted per write; 0 means unlimited
    pub write_chunk: usize,
    pub fail_open: bool,
    pub fail_exec: bool,
    pub fail_close: bool,
    pub fail_scp_send: bool,
    /// Bytes delivered by scp receive before a premature end of stream
    pub truncate_recv: Option<usize>,
    pub disconnected: bool,
    /// Disconnect count, shared so it stays readable after the fake is moved
    pub hangups: Rc<Cell<usize>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(&mut self, command: &str, output: &[u8], exit_code: i32) {
        self.replies
            .insert(command.to_string(), (output.to_vec(), exit_code));
    }

    pub fn remote_file(&self, path: impl AsRef<Path>) -> Option<&Vec<u8>> {
        self.files.get(path.as_ref())
    }

    fn hard(message: &str) -> StepError {
        StepError::Failed(Failure::new(-21, message))
    }
}

impl Readiness for FakeTransport {
    fn wait_ready(&mut self) -> Result<()> {
        self.waits += 1;
        Ok(())
    }
}

impl Transport for FakeTransport {
    type Channel = FakeChannel;

    fn open_session_channel(&mut self) -> StepResult<FakeChannel> {
        if self.open_would_block > 0 {
            self.open_would_block -= 1;
            return Err(StepError::WouldBlock);
        }
        if self.fail_open {
            return Err(Self::hard("channel open refused"));
        }
        Ok(FakeChannel::Session {
            reply: None,
            pos: 0,
            closed: false,
            primed: false,
        })
    }

    fn exec(&mut self, channel: &mut FakeChannel, command: &str) -> StepResult<()> {
        if self.fail_exec {
            return Err(Self::hard("exec request denied"));
        }
        self.executed.push(command.to_string());
        if let FakeChannel::Session { reply, .. } = channel {
            *reply = Some(
                self.replies
                    .get(command)
                    .cloned()
                    .unwrap_or_else(|| (Vec::new(), 127)),
            );
        }
        Ok(())
    }

    fn read(&mut self, channel: &mut FakeChannel, buf: &mut [u8]) -> StepResult<usize> {
        let chunk = if self.read_chunk == 0 {
            buf.len()
        } else {
            self.read_chunk.min(buf.len())
        };
        match channel {
            FakeChannel::Session {
                reply, pos, primed, ..
            } => {
                if self.read_would_block && !*primed {
                    *primed = true;
                    return Err(StepError::WouldBlock);
                }
                *primed = false;
                let data = reply.as_ref().map(|(data, _)| data.as_slice()).unwrap_or(&[]);
                let n = chunk.min(data.len() - *pos);
                buf[..n].copy_from_slice(&data[*pos..*pos + n]);
                *pos += n;
                Ok(n)
            }
            FakeChannel::Recv { data, pos } => {
                let n = chunk.min(data.len() - *pos);
                buf[..n].copy_from_slice(&data[*pos..*pos + n]);
                *pos += n;
                Ok(n)
            }
            FakeChannel::Send { .. } => Err(Self::hard("read on outbound channel")),
        }
    }

    fn write(&mut self, channel: &mut FakeChannel, buf: &[u8]) -> StepResult<usize> {
        match channel {
            FakeChannel::Send { data, .. } => {
                let n = if self.write_chunk == 0 {
                    buf.len()
                } else {
                    self.write_chunk.min(buf.len())
                };
                data.extend_from_slice(&buf[..n]);
                Ok(n)
            }
            _ => Err(Self::hard("write on inbound channel")),
        }
    }

    fn close(&mut self, channel: &mut FakeChannel) -> StepResult<()> {
        if self.fail_close {
            return Err(Self::hard("close failed"));
        }
        if let FakeChannel::Session { closed, .. } = channel {
            *closed = true;
        }
        Ok(())
    }

    fn exit_status(&mut self, channel: &FakeChannel) -> std::result::Result<i32, Failure> {
        match channel {
            FakeChannel::Session {
                reply: Some((_, code)),
                closed: true,
                ..
            } => Ok(*code),
            _ => Err(Failure::new(-26, "channel not closed")),
        }
    }

    fn send_eof(&mut self, channel: &mut FakeChannel) -> StepResult<()> {
        if let FakeChannel::Send {
            path,
            mode,
            size,
            data,
        } = channel
        {
            if data.len() as u64 != *size {
                return Err(Self::hard("short scp upload"));
            }
            self.files.insert(path.clone(), data.clone());
            self.modes.insert(path.clone(), *mode);
        }
        Ok(())
    }

    fn wait_eof(&mut self, _channel: &mut FakeChannel) -> StepResult<()> {
        Ok(())
    }

    fn wait_close(&mut self, _channel: &mut FakeChannel) -> StepResult<()> {
        Ok(())
    }

    fn scp_send(&mut self, remote: &Path, mode: i32, size: u64) -> StepResult<FakeChannel> {
        if self.fail_scp_send {
            return Err(Self::hard("scp send refused"));
        }
        self.pushes += 1;
        Ok(FakeChannel::Send {
            path: remote.to_path_buf(),
            mode,
            size,
            data: Vec::new(),
        })
    }

    fn scp_recv(&mut self, remote: &Path) -> StepResult<(FakeChannel, u64)> {
        let Some(data) = self.files.get(remote) else {
            return Err(StepError::Failed(Failure::new(-28, "no such file")));
        };
        self.pulls += 1;
        let size = data.len() as u64;
        let mut data = data.clone();
        if let Some(keep) = self.truncate_recv {
            data.truncate(keep);
        }
        Ok((FakeChannel::Recv { data, pos: 0 }, size))
    }
}

impl Execute for FakeTransport {
    fn execute(&mut self, command: &str) -> Result<CommandOutput> {
        exec::run(self, command)
    }
}

impl TableSync for FakeTransport {
    fn push_table(&mut self, local: &Path, remote: &Path) -> Result<()> {
        scp::push(self, local, remote).map(drop)
    }

    fn pull_table(&mut self, remote: &Path, local: &Path) -> Result<()> {
        scp::pull(self, remote, local).map(drop)
    }
}

impl RemoteSession for FakeTransport {
    fn disconnect(&mut self) -> Result<()> {
        self.disconnected = true;
        self.hangups.set(self.hangups.get() + 1);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.disconnected
    }
}
