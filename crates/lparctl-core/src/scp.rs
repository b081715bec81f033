//! SCP push and pull of small files over the session.
//!
//! Both directions move data in fixed [`BLOCK_SIZE`] blocks and always finish
//! the channel with send-eof, wait-eof and wait-close, even after an error
//! mid-transfer.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use tracing::debug;

use crate::error::{Error, Failure, Result, Step};
use crate::nonblock::retry_until_ready;
use crate::transport::Transport;

/// Transfer block size in bytes
pub const BLOCK_SIZE: usize = 1024;

/// Uploads `local` to `remote`, keeping the local permission bits.
///
/// Returns the number of bytes sent.
pub fn push<T: Transport>(transport: &mut T, local: &Path, remote: &Path) -> Result<u64> {
    let metadata = fs::metadata(local)?;
    let size = metadata.len();
    let mode = permission_bits(&metadata);
    let mut file = File::open(local)?;

    let mut channel = retry_until_ready(transport, Step::ScpSend, |t| {
        t.scp_send(remote, mode, size)
    })?;
    debug!(local = %local.display(), remote = %remote.display(), size, "scp push");

    let streamed = stream_to_channel(transport, &mut channel, &mut file);
    let finished = finish(transport, &mut channel);
    let sent = streamed?;
    finished?;
    Ok(sent)
}

fn stream_to_channel<T: Transport>(
    transport: &mut T,
    channel: &mut T::Channel,
    file: &mut File,
) -> Result<u64> {
    let mut block = [0u8; BLOCK_SIZE];
    let mut total = 0u64;
    loop {
        let len = file.read(&mut block)?;
        if len == 0 {
            return Ok(total);
        }
        let mut sent = 0;
        while sent < len {
            let accepted =
                retry_until_ready(transport, Step::Write, |t| t.write(channel, &block[sent..len]))?;
            if accepted == 0 {
                return Err(Error::Protocol {
                    step: Step::Write,
                    source: Failure::new(0, "channel accepted no data"),
                });
            }
            sent += accepted;
        }
        total += len as u64;
    }
}

/// Downloads `remote` into `local`, creating or truncating it.
///
/// Any hard failure while opening the inbound channel means the remote file
/// is absent and maps to [`Error::NotFound`]. Returns the number of bytes
/// received.
pub fn pull<T: Transport>(transport: &mut T, remote: &Path, local: &Path) -> Result<u64> {
    let (mut channel, size) =
        match retry_until_ready(transport, Step::ScpRecv, |t| t.scp_recv(remote)) {
            Ok(opened) => opened,
            Err(Error::Protocol { source, .. }) => {
                debug!(remote = %remote.display(), %source, "remote file unavailable");
                return Err(Error::NotFound(remote.display().to_string()));
            }
            Err(err) => return Err(err),
        };
    debug!(remote = %remote.display(), local = %local.display(), size, "scp pull");

    let received = File::create(local)
        .map_err(Error::from)
        .and_then(|mut file| stream_from_channel(transport, &mut channel, &mut file, size));
    let finished = finish(transport, &mut channel);
    let received = received?;
    finished?;
    Ok(received)
}

fn stream_from_channel<T: Transport>(
    transport: &mut T,
    channel: &mut T::Channel,
    file: &mut File,
    size: u64,
) -> Result<u64> {
    let mut block = [0u8; BLOCK_SIZE];
    let mut total = 0u64;
    while total < size {
        let want = usize::try_from(size - total).map_or(BLOCK_SIZE, |left| left.min(BLOCK_SIZE));
        let got = retry_until_ready(transport, Step::Read, |t| t.read(channel, &mut block[..want]))?;
        if got == 0 {
            return Err(Error::Protocol {
                step: Step::Read,
                source: Failure::new(
                    0,
                    format!("premature end of stream after {total} of {size} bytes"),
                ),
            });
        }
        file.write_all(&block[..got])?;
        total += got as u64;
    }
    file.flush()?;
    Ok(total)
}

fn finish<T: Transport>(transport: &mut T, channel: &mut T::Channel) -> Result<()> {
    retry_until_ready(transport, Step::SendEof, |t| t.send_eof(channel))?;
    retry_until_ready(transport, Step::WaitEof, |t| t.wait_eof(channel))?;
    retry_until_ready(transport, Step::WaitClose, |t| t.wait_close(channel))
}

#[cfg(unix)]
fn permission_bits(metadata: &fs::Metadata) -> i32 {
    use std::os::unix::fs::PermissionsExt;
    // Masked to 0o777, always fits.
    (metadata.permissions().mode() & 0o777) as i32
}

#[cfg(not(unix))]
fn permission_bits(metadata: &fs::Metadata) -> i32 {
    if metadata.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}
