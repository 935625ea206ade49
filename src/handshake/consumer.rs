use std::fs::File;
use std::io::{self, Write};
use std::ops::Deref;
use std::path::Path;

use tracing::{debug, info, instrument};

use super::{Event, Transfer, Turn};
use crate::channel::Endpoint;
use crate::error::{Error, Result};
use crate::msg::{ChunkConsumed, ChunkReady};
use crate::signal;

/// Creates or truncates the destination file.
pub fn create_sink<P: AsRef<Path>>(path: P) -> Result<File> {
    let path = path.as_ref();
    File::create(path).map_err(|source| Error::SinkUnavailable {
        path: path.to_path_buf(),
        source,
    })
}

/// Drains chunks from `buffer` into `sink` until the terminal `ChunkReady{0}`
/// arrives.
///
/// `ChunkConsumed` is sent only after a chunk has been fully written. A short
/// write aborts the loop with [`Error::PartialWrite`] and no reply is sent for
/// that chunk.
#[instrument(skip_all, fields(capacity = buffer.len()))]
pub fn receive_all<W, B, E>(sink: &mut W, buffer: &B, endpoint: &mut E) -> Result<Transfer>
where
    W: Write + ?Sized,
    B: Deref<Target = [u8]> + ?Sized,
    E: Endpoint<Tx = ChunkConsumed, Rx = ChunkReady>,
{
    let mut turn = Turn::consumer();
    let mut transfer = Transfer::default();
    loop {
        signal::check()?;
        let ready = endpoint.recv()?;
        turn.advance(Event::Ready(ready.size))?;
        if turn.is_terminated() {
            break;
        }

        let size = ready.size as usize;
        if size > buffer.len() {
            return Err(Error::ChunkTooLarge {
                size,
                capacity: buffer.len(),
            });
        }
        drain(sink, &buffer[..size])?;
        debug!(size, "chunk drained");

        endpoint.send(ChunkConsumed)?;
        turn.advance(Event::Consumed)?;
        transfer.record(ready.size);
    }

    sink.flush().map_err(Error::Sink)?;
    info!(
        chunks = transfer.chunks,
        bytes = transfer.bytes,
        "received terminal chunk"
    );
    Ok(transfer)
}

fn drain<W: Write + ?Sized>(sink: &mut W, chunk: &[u8]) -> Result<()> {
    let mut written = 0;
    while written < chunk.len() {
        match sink.write(&chunk[written..]) {
            Ok(0) => {
                return Err(Error::PartialWrite {
                    expected: chunk.len(),
                    written,
                })
            }
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => signal::check()?,
            Err(e) => return Err(Error::Sink(e)),
        }
    }
    Ok(())
}
