//! File transfer between two processes over a System V shared memory segment,
//! with a message queue deciding whose turn it is to touch the segment.

extern crate self as shmxfer;

pub mod channel;
pub mod config;
pub mod error;
pub mod handshake;
pub mod key;
pub mod msg;
pub mod session;
pub mod shm;
pub mod signal;

pub use channel::{ControlChannel, Endpoint};
pub use config::TransferConfig;
pub use error::{Error, ErrorClass, Result};
pub use handshake::{receive_all, send_all, Transfer, Turn};
pub use key::TransferKey;
pub use session::{Role, Session};
pub use shm::{Attachment, SharedBuffer};
