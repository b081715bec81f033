//! libssh2-backed transport.
//!
//! The session is switched to non-blocking mode right after the TCP connect,
//! before the handshake. From then on every libssh2 call returns `EAGAIN`
//! instead of blocking, and [`Ssh2Session::wait_ready`] polls the socket in
//! whichever direction libssh2 says it is blocked on.

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;

use filedescriptor::{AsRawSocketDescriptor, POLLIN, POLLOUT, poll, pollfd};
use socket2::{Domain, Protocol, Socket, Type};
use ssh2::{BlockDirections, Channel, Session};
use tracing::{debug, trace};

use crate::connection::RemoteSession;
use crate::error::{Error, Failure, Result, Step};
use crate::exec::{self, CommandOutput, Execute};
use crate::nonblock::{Readiness, StepError, StepResult, retry_until_ready};
use crate::scp;
use crate::ssh_code::{Libssh2Code, raw_code};
use crate::transport::{Transport, UserAuth};
use crate::uuid_table::TableSync;

impl From<ssh2::Error> for StepError {
    fn from(err: ssh2::Error) -> Self {
        step_error_from_ssh2(&err)
    }
}

fn step_error_from_ssh2(err: &ssh2::Error) -> StepError {
    let code = raw_code(err.code());
    match Libssh2Code::from_error_code(code) {
        Some(c) if c.is_would_block() => StepError::WouldBlock,
        _ => StepError::Failed(Failure::new(code, err.message())),
    }
}

/// Channel reads and writes surface libssh2 errors wrapped in `io::Error`.
fn step_error_from_io(err: &io::Error) -> StepError {
    if err.kind() == io::ErrorKind::WouldBlock {
        return StepError::WouldBlock;
    }
    if let Some(inner) = err.get_ref().and_then(|e| e.downcast_ref::<ssh2::Error>()) {
        return step_error_from_ssh2(inner);
    }
    StepError::Failed(Failure::new(err.raw_os_error().unwrap_or(0), err.to_string()))
}

/// An established, non-blocking SSH session to one console
pub struct Ssh2Session {
    session: Session,
    /// Clone of the socket handed to libssh2, kept for polling
    socket: TcpStream,
    host: String,
}

impl std::fmt::Debug for Ssh2Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ssh2Session")
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

impl Ssh2Session {
    /// Connects to the first resolved address of `host` that accepts, then
    /// completes the SSH handshake.
    pub fn connect(host: &str, port: u16) -> Result<Self> {
        let stream = connect_tcp(host, port)?;
        let socket = stream.try_clone()?;

        let mut session = Session::new().map_err(|e| Error::Connect {
            host: host.to_string(),
            reason: e.to_string(),
        })?;
        session.set_tcp_stream(stream);
        session.set_blocking(false);

        let mut this = Self {
            session,
            socket,
            host: host.to_string(),
        };
        retry_until_ready(&mut this, Step::Handshake, |s| {
            s.session.handshake().map_err(StepError::from)
        })?;
        debug!(host, port, "ssh handshake complete");
        Ok(this)
    }
}

fn connect_tcp(host: &str, port: u16) -> Result<TcpStream> {
    let connect_error = |reason: String| Error::Connect {
        host: host.to_string(),
        reason,
    };
    let addrs = (host, port)
        .to_socket_addrs()
        .map_err(|e| connect_error(e.to_string()))?;

    let mut last_error = None;
    for addr in addrs {
        let attempt = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
            .and_then(|socket| socket.connect(&addr.into()).map(|()| socket));
        match attempt {
            Ok(socket) => {
                debug!(host, %addr, "tcp connected");
                return Ok(TcpStream::from(socket));
            }
            Err(err) => {
                trace!(host, %addr, error = %err, "address refused");
                last_error = Some(err);
            }
        }
    }
    Err(connect_error(last_error.map_or_else(
        || "no addresses resolved".to_string(),
        |e| e.to_string(),
    )))
}

impl Readiness for Ssh2Session {
    fn wait_ready(&mut self) -> Result<()> {
        let events = match self.session.block_directions() {
            BlockDirections::Inbound => POLLIN,
            BlockDirections::Outbound => POLLOUT,
            BlockDirections::Both | BlockDirections::None => POLLIN | POLLOUT,
        };
        let mut pfd = [pollfd {
            fd: self.socket.as_socket_descriptor(),
            events,
            revents: 0,
        }];
        loop {
            match poll(&mut pfd, None) {
                Ok(_) => return Ok(()),
                Err(filedescriptor::Error::Poll(err))
                    if err.kind() == io::ErrorKind::Interrupted =>
                {
                    continue;
                }
                Err(filedescriptor::Error::Poll(err)) => return Err(Error::Io(err)),
                Err(other) => return Err(Error::Io(io::Error::other(other))),
            }
        }
    }
}

impl Transport for Ssh2Session {
    type Channel = Channel;

    fn open_session_channel(&mut self) -> StepResult<Channel> {
        Ok(self.session.channel_session()?)
    }

    fn exec(&mut self, channel: &mut Channel, command: &str) -> StepResult<()> {
        Ok(channel.exec(command)?)
    }

    fn read(&mut self, channel: &mut Channel, buf: &mut [u8]) -> StepResult<usize> {
        channel.read(buf).map_err(|e| step_error_from_io(&e))
    }

    fn write(&mut self, channel: &mut Channel, buf: &[u8]) -> StepResult<usize> {
        channel.write(buf).map_err(|e| step_error_from_io(&e))
    }

    fn close(&mut self, channel: &mut Channel) -> StepResult<()> {
        Ok(channel.close()?)
    }

    fn exit_status(&mut self, channel: &Channel) -> std::result::Result<i32, Failure> {
        channel
            .exit_status()
            .map_err(|e| Failure::new(raw_code(e.code()), e.message()))
    }

    fn send_eof(&mut self, channel: &mut Channel) -> StepResult<()> {
        Ok(channel.send_eof()?)
    }

    fn wait_eof(&mut self, channel: &mut Channel) -> StepResult<()> {
        Ok(channel.wait_eof()?)
    }

    fn wait_close(&mut self, channel: &mut Channel) -> StepResult<()> {
        Ok(channel.wait_close()?)
    }

    fn scp_send(&mut self, remote: &Path, mode: i32, size: u64) -> StepResult<Channel> {
        Ok(self.session.scp_send(remote, mode, size, None)?)
    }

    fn scp_recv(&mut self, remote: &Path) -> StepResult<(Channel, u64)> {
        let (channel, stat) = self.session.scp_recv(remote)?;
        Ok((channel, stat.size()))
    }
}

impl UserAuth for Ssh2Session {
    fn auth_publickey_file(
        &mut self,
        username: &str,
        public_key: &Path,
        private_key: &Path,
    ) -> StepResult<()> {
        Ok(self
            .session
            .userauth_pubkey_file(username, Some(public_key), private_key, None)?)
    }

    fn auth_password(&mut self, username: &str, password: &str) -> StepResult<()> {
        Ok(self.session.userauth_password(username, password)?)
    }
}

impl Execute for Ssh2Session {
    fn execute(&mut self, command: &str) -> Result<CommandOutput> {
        exec::run(self, command)
    }
}

impl TableSync for Ssh2Session {
    fn push_table(&mut self, local: &Path, remote: &Path) -> Result<()> {
        scp::push(self, local, remote).map(drop)
    }

    fn pull_table(&mut self, remote: &Path, local: &Path) -> Result<()> {
        scp::pull(self, remote, local).map(drop)
    }
}

impl RemoteSession for Ssh2Session {
    fn disconnect(&mut self) -> Result<()> {
        retry_until_ready(self, Step::Disconnect, |s| {
            s.session
                .disconnect(None, "Disconnecting...", None)
                .map_err(StepError::from)
        })?;
        debug!(host = %self.host, "disconnected");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.session.authenticated()
    }
}
