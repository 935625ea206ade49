use std::marker::PhantomData;
use std::ptr;

use nix::errno::Errno;
use nix::libc::{self, c_int, c_void};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::key::TransferKey;
use crate::msg::{ChunkConsumed, ChunkReady, MType, Message, RawMessage, SysvMessage};
use crate::signal;

const QUEUE_MODE: c_int = 0o666;

/// One side's view of the control channel: it only sends `Tx` and only
/// receives `Rx`.
pub trait Endpoint {
    type Tx: Message;
    type Rx: Message;

    fn send(&mut self, msg: Self::Tx) -> Result<()>;

    /// Blocks until the peer sends an `Rx`.
    fn recv(&mut self) -> Result<Self::Rx>;
}

/// Handle to a System V message queue carrying both directions of the
/// handshake, told apart by `mtype`.
#[derive(Debug)]
pub struct ControlChannel {
    key: TransferKey,
    id: c_int,
    removed: bool,
}

impl ControlChannel {
    /// Attaches to the queue for `key`, creating it if the peer has not yet.
    pub fn new(key: TransferKey) -> Result<Self> {
        Self::get(key, libc::IPC_CREAT)
    }

    pub fn open(key: TransferKey) -> Result<Self> {
        Self::get(key, 0)
    }

    fn get(key: TransferKey, flags: c_int) -> Result<Self> {
        let id = Errno::result(unsafe { libc::msgget(key.as_raw(), QUEUE_MODE | flags) }).map_err(
            |e| Error::ResourceUnavailable {
                what: "message queue",
                source: e.into(),
            },
        )?;
        debug!(%key, id, "resolved message queue");
        Ok(ControlChannel {
            key,
            id,
            removed: false,
        })
    }

    pub fn id(&self) -> c_int {
        self.id
    }

    pub fn send<M: Message>(&self, msg: &M) -> Result<()> {
        trace!(?msg, "send");
        self.send_raw(&msg.encode())
    }

    pub fn recv<M: Message>(&self) -> Result<M> {
        let raw: RawMessage = self.recv_raw(M::KIND.mtype())?;
        let msg = M::decode(raw)?;
        trace!(?msg, "recv");
        Ok(msg)
    }

    pub fn send_raw<M: SysvMessage>(&self, msg: &M) -> Result<()> {
        loop {
            signal::check()?;
            let res = Errno::result(unsafe {
                libc::msgsnd(
                    self.id,
                    msg as *const M as *const c_void,
                    M::PAYLOAD_LEN,
                    0,
                )
            });
            match res {
                Ok(_) => return Ok(()),
                Err(e) => self.retry_or_fail("send", e)?,
            }
        }
    }

    /// Blocks until a record with the given `mtype` is queued.
    pub fn recv_raw<M: SysvMessage>(&self, mtype: MType) -> Result<M> {
        let mut msg = M::default();
        loop {
            signal::check()?;
            let res = Errno::result(unsafe {
                libc::msgrcv(
                    self.id,
                    &mut msg as *mut M as *mut c_void,
                    M::PAYLOAD_LEN,
                    mtype,
                    0,
                )
            });
            match res {
                Ok(_) => return Ok(msg),
                Err(e) => self.retry_or_fail("receive", e)?,
            }
        }
    }

    fn retry_or_fail(&self, op: &'static str, err: Errno) -> Result<()> {
        match err {
            Errno::EINTR if signal::interrupted() => Err(Error::Interrupted),
            Errno::EINTR => Ok(()),
            Errno::EIDRM | Errno::EINVAL => Err(Error::ResourceRemoved),
            e => Err(Error::Channel {
                op,
                source: e.into(),
            }),
        }
    }

    pub fn producer_end(&self) -> Directional<'_, ChunkReady, ChunkConsumed> {
        Directional::new(self)
    }

    pub fn consumer_end(&self) -> Directional<'_, ChunkConsumed, ChunkReady> {
        Directional::new(self)
    }

    /// Removes the queue immediately, waking any blocked receiver with
    /// `EIDRM`.
    pub fn remove(&mut self) -> Result<()> {
        if self.removed {
            return Err(Error::AlreadyDestroyed);
        }
        let res = Errno::result(unsafe { libc::msgctl(self.id, libc::IPC_RMID, ptr::null_mut()) });
        self.removed = true;
        match res {
            Ok(_) => {
                debug!(key = %self.key, id = self.id, "removed message queue");
                Ok(())
            }
            Err(Errno::EINVAL) | Err(Errno::EIDRM) => Err(Error::AlreadyDestroyed),
            Err(e) => {
                self.removed = false;
                Err(Error::Teardown {
                    what: "message queue removal",
                    source: e.into(),
                })
            }
        }
    }

    pub fn is_removed(&self) -> bool {
        self.removed
    }
}

pub struct Directional<'a, Tx, Rx> {
    channel: &'a ControlChannel,
    _marker: PhantomData<fn(Tx) -> Rx>,
}

impl<'a, Tx, Rx> Directional<'a, Tx, Rx> {
    fn new(channel: &'a ControlChannel) -> Self {
        Directional {
            channel,
            _marker: PhantomData,
        }
    }
}

impl<Tx: Message, Rx: Message> Endpoint for Directional<'_, Tx, Rx> {
    type Tx = Tx;
    type Rx = Rx;

    fn send(&mut self, msg: Tx) -> Result<()> {
        self.channel.send(&msg)
    }

    fn recv(&mut self) -> Result<Rx> {
        self.channel.recv()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::write_keyfile;
    use anyhow::Result;
    use std::thread;
    use tempfile::tempdir;

    #[test]
    fn kinds_are_routed_by_mtype() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("keyfile.txt");
        write_keyfile(&path)?;
        let key = TransferKey::derive(&path, b'c')?;
        let mut channel = ControlChannel::new(key)?;

        // Both kinds queued: each end only sees its own.
        channel.send(&ChunkReady { size: 9 })?;
        channel.send(&ChunkConsumed)?;
        assert_eq!(channel.recv::<ChunkConsumed>()?, ChunkConsumed);
        assert_eq!(channel.recv::<ChunkReady>()?, ChunkReady { size: 9 });

        channel.remove()?;
        assert!(matches!(channel.remove(), Err(Error::AlreadyDestroyed)));
        Ok(())
    }

    #[test]
    fn removal_wakes_blocked_receiver() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("keyfile.txt");
        write_keyfile(&path)?;
        let key = TransferKey::derive(&path, b'w')?;
        let mut channel = ControlChannel::new(key)?;

        let waiter = thread::spawn(move || -> crate::Result<ChunkConsumed> {
            let peer = ControlChannel::open(key)?;
            peer.recv::<ChunkConsumed>()
        });
        thread::sleep(std::time::Duration::from_millis(50));
        channel.remove()?;

        let res = waiter.join().map_err(|e| anyhow::anyhow!("{:?}", e))?;
        assert!(matches!(
            res,
            Err(Error::ResourceRemoved) | Err(Error::ResourceUnavailable { .. })
        ));
        Ok(())
    }
}
