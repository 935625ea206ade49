use std::fs::File;
use std::io::{self, Read};
use std::ops::DerefMut;
use std::path::Path;

use tracing::{debug, info, instrument};

use super::{Event, Transfer, Turn};
use crate::channel::Endpoint;
use crate::error::{Error, Result};
use crate::msg::{ChunkConsumed, ChunkReady};
use crate::signal;

pub fn open_source<P: AsRef<Path>>(path: P) -> Result<File> {
    let path = path.as_ref();
    File::open(path).map_err(|source| Error::SourceUnavailable {
        path: path.to_path_buf(),
        source,
    })
}

/// Streams `source` through `buffer`, one chunk per handshake, then sends the
/// terminal `ChunkReady{0}` without waiting for a reply.
///
/// The buffer is only written between receiving a `ChunkConsumed` (or at the
/// start) and sending the next `ChunkReady`.
#[instrument(skip_all, fields(capacity = buffer.len()))]
pub fn send_all<R, B, E>(source: &mut R, buffer: &mut B, endpoint: &mut E) -> Result<Transfer>
where
    R: Read + ?Sized,
    B: DerefMut<Target = [u8]> + ?Sized,
    E: Endpoint<Tx = ChunkReady, Rx = ChunkConsumed>,
{
    chunk_limit(buffer.len())?;

    let mut turn = Turn::producer();
    let mut transfer = Transfer::default();
    loop {
        signal::check()?;
        let n = fill(source, &mut buffer[..])?;
        if n == 0 {
            break;
        }
        // Bounded by chunk_limit.
        let size = n as u32;
        turn.advance(Event::Filled(size))?;

        endpoint.send(ChunkReady { size })?;
        turn.advance(Event::Ready(size))?;
        debug!(size, "chunk ready");

        endpoint.recv()?;
        turn.advance(Event::Consumed)?;
        transfer.record(size);
    }

    endpoint.send(ChunkReady::TERMINAL)?;
    turn.advance(Event::Ready(0))?;
    info!(
        chunks = transfer.chunks,
        bytes = transfer.bytes,
        "sent terminal chunk"
    );
    Ok(transfer)
}

fn chunk_limit(capacity: usize) -> Result<u32> {
    match u32::try_from(capacity) {
        Ok(0) => Err(Error::Config(String::from("shared buffer has no capacity"))),
        Ok(limit) => Ok(limit),
        Err(_) => Err(Error::Config(format!(
            "shared buffer of {} bytes exceeds the 32-bit chunk size field",
            capacity
        ))),
    }
}

/// Reads until `buf` is full or the source is exhausted.
fn fill<R: Read + ?Sized>(source: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => signal::check()?,
            Err(e) => return Err(Error::Source(e)),
        }
    }
    Ok(filled)
}
