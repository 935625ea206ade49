use std::io;
use std::mem::{ManuallyDrop, MaybeUninit};
use std::ops::{Deref, DerefMut};
use std::ptr::{self, NonNull};
use std::slice;

use nix::errno::Errno;
use nix::libc::{self, c_int, c_void};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::key::TransferKey;

const SEGMENT_MODE: c_int = 0o666;

pub struct OpenOptions {
    create: bool,
}

impl OpenOptions {
    /// Resolves the segment for `key`, which must hold exactly `len` bytes.
    pub fn open(self, key: TransferKey, len: usize) -> Result<SharedBuffer> {
        if len == 0 {
            return Err(Error::Config(String::from(
                "shared buffer capacity cannot be zero",
            )));
        }
        let mut flags = SEGMENT_MODE;
        if self.create {
            flags |= libc::IPC_CREAT;
        }
        let id = Errno::result(unsafe { libc::shmget(key.as_raw(), len, flags) })
            .map_err(unavailable)?;

        let actual = segment_size(id).map_err(|source| Error::ResourceUnavailable {
            what: "shared memory segment",
            source,
        })?;
        if actual != len {
            return Err(Error::ResourceUnavailable {
                what: "shared memory segment",
                source: io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("existing segment holds {} bytes, expected {}", actual, len),
                ),
            });
        }
        debug!(%key, id, len, "resolved shared memory segment");
        Ok(SharedBuffer {
            key,
            id,
            len,
            removed: false,
        })
    }

    pub fn create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }
}

impl Default for OpenOptions {
    fn default() -> Self {
        OpenOptions { create: false }
    }
}

fn unavailable(err: Errno) -> Error {
    Error::ResourceUnavailable {
        what: "shared memory segment",
        source: err.into(),
    }
}

fn segment_size(id: c_int) -> io::Result<usize> {
    let mut stat = MaybeUninit::<libc::shmid_ds>::uninit();
    unsafe {
        Errno::result(libc::shmctl(id, libc::IPC_STAT, stat.as_mut_ptr()))?;
        Ok(stat.assume_init().shm_segsz as usize)
    }
}

/// Handle to a System V shared memory segment. Holding one does not map the
/// segment; call [`SharedBuffer::attach`] for that.
#[derive(Debug)]
pub struct SharedBuffer {
    key: TransferKey,
    id: c_int,
    len: usize,
    removed: bool,
}

impl SharedBuffer {
    /// Attaches to the segment for `key`, creating it if the peer has not yet.
    pub fn new(key: TransferKey, len: usize) -> Result<Self> {
        SharedBuffer::options().create(true).open(key, len)
    }

    pub fn open(key: TransferKey, len: usize) -> Result<Self> {
        SharedBuffer::options().open(key, len)
    }

    pub fn options() -> OpenOptions {
        OpenOptions::default()
    }

    pub fn id(&self) -> c_int {
        self.id
    }

    pub fn attach(&self) -> Result<Attachment> {
        let ptr = Errno::result(unsafe { libc::shmat(self.id, ptr::null(), 0) })
            .map_err(unavailable)?;
        let ptr = NonNull::new(ptr).ok_or_else(|| Error::ResourceUnavailable {
            what: "shared memory segment",
            source: io::Error::new(io::ErrorKind::Other, "shmat returned a null mapping"),
        })?;
        Ok(Attachment { ptr, len: self.len })
    }

    /// Marks the segment for removal. The memory stays valid for every
    /// attachment until it is detached.
    pub fn remove(&mut self) -> Result<()> {
        if self.removed {
            return Err(Error::AlreadyDestroyed);
        }
        let res = Errno::result(unsafe { libc::shmctl(self.id, libc::IPC_RMID, ptr::null_mut()) });
        match res {
            Ok(_) => {
                self.removed = true;
                debug!(key = %self.key, id = self.id, "removed shared memory segment");
                Ok(())
            }
            Err(Errno::EINVAL) | Err(Errno::EIDRM) => {
                self.removed = true;
                Err(Error::AlreadyDestroyed)
            }
            Err(e) => Err(Error::Teardown {
                what: "shared memory removal",
                source: e.into(),
            }),
        }
    }

    pub fn is_removed(&self) -> bool {
        self.removed
    }
}

/// The calling process's mapping of a segment.
#[derive(Debug)]
pub struct Attachment {
    ptr: NonNull<c_void>,
    len: usize,
}

// The mapping is plain process memory; ownership of the handle moves with it.
unsafe impl Send for Attachment {}

impl Attachment {
    pub fn detach(self) -> Result<()> {
        let this = ManuallyDrop::new(self);
        Errno::result(unsafe { libc::shmdt(this.ptr.as_ptr()) })
            .map(drop)
            .map_err(|e| Error::Teardown {
                what: "shared memory detach",
                source: e.into(),
            })
    }
}

impl Deref for Attachment {
    type Target = [u8];
    fn deref(&self) -> &Self::Target {
        unsafe { slice::from_raw_parts(self.ptr.as_ptr() as *const u8, self.len) }
    }
}

impl DerefMut for Attachment {
    fn deref_mut(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr() as *mut u8, self.len) }
    }
}

impl Drop for Attachment {
    fn drop(&mut self) {
        if let Err(e) = Errno::result(unsafe { libc::shmdt(self.ptr.as_ptr()) }) {
            warn!("unable to detach shared memory: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::write_keyfile;
    use anyhow::Result;
    use tempfile::tempdir;

    #[test]
    fn two_attachments_share_bytes() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("keyfile.txt");
        write_keyfile(&path)?;
        let key = TransferKey::derive(&path, b's')?;

        let mut buffer = SharedBuffer::new(key, 64)?;
        let mut a = buffer.attach()?;
        let b = SharedBuffer::open(key, 64)?.attach()?;

        a[..5].copy_from_slice(b"hello");
        assert_eq!(&b[..5], b"hello");
        assert_eq!(b.len(), 64);

        a.detach()?;
        drop(b);
        buffer.remove()?;
        assert!(matches!(buffer.remove(), Err(Error::AlreadyDestroyed)));
        Ok(())
    }

    #[test]
    fn capacity_mismatch_is_unavailable() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("keyfile.txt");
        write_keyfile(&path)?;
        let key = TransferKey::derive(&path, b'm')?;

        let mut buffer = SharedBuffer::new(key, 128)?;
        let err = SharedBuffer::new(key, 64).unwrap_err();
        assert!(matches!(err, Error::ResourceUnavailable { .. }));
        buffer.remove()?;
        Ok(())
    }

    #[test]
    fn open_without_create_needs_existing_segment() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("keyfile.txt");
        write_keyfile(&path)?;
        let key = TransferKey::derive(&path, b'o')?;

        assert!(SharedBuffer::open(key, 32).is_err());
        Ok(())
    }
}
