use std::ffi::CString;
use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use nix::errno::Errno;
use nix::libc::{self, key_t};

use crate::error::{Error, Result};

/// Contents written to a freshly created key file. `ftok` only looks at the
/// file's identity, never at what it contains.
pub const KEYFILE_CONTENTS: &[u8] = b"Hello world";

/// System V IPC key shared by the buffer segment and the control queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransferKey(key_t);

impl TransferKey {
    /// Derives the key from an existing file and a project id, the same way
    /// on both sides of the transfer.
    pub fn derive<P: AsRef<Path>>(path: P, proj_id: u8) -> Result<Self> {
        let path = path.as_ref();
        let key_err = |source| Error::KeyDerivation {
            path: path.to_path_buf(),
            source,
        };
        if proj_id == 0 {
            return Err(key_err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "project id must be non-zero",
            )));
        }
        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| key_err(io::Error::new(io::ErrorKind::InvalidInput, e)))?;
        let key = Errno::result(unsafe { libc::ftok(c_path.as_ptr(), proj_id as libc::c_int) })
            .map_err(|e| key_err(e.into()))?;
        Ok(TransferKey(key))
    }

    pub fn as_raw(&self) -> key_t {
        self.0
    }
}

impl fmt::Display for TransferKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Creates the key file if it does not exist yet. Returns `true` when a new
/// file was written.
pub fn write_keyfile<P: AsRef<Path>>(path: P) -> io::Result<bool> {
    match OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path.as_ref())
    {
        Ok(mut file) => {
            file.write_all(KEYFILE_CONTENTS)?;
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e),
    }
}
