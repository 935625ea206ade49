//! Control channel records.
//!
//! On the wire every record is `{ mtype, size: u32 }`. The System V `mtype`
//! doubles as the message kind, so each side can receive only the kind meant
//! for it.

use std::fmt::Debug;

use msg_derive::SysvMessage;
use nix::libc::c_long;

use crate::error::{Error, Result};

pub type MType = c_long;

/// A record that can be passed to `msgsnd`/`msgrcv`.
///
/// # Safety
///
/// The type must be `repr(C)`, start with an `mtype` field, and be valid for
/// any bit pattern of its payload.
pub unsafe trait SysvMessage: Copy + Default {
    /// Bytes following `mtype`.
    const PAYLOAD_LEN: usize;

    fn mtype(&self) -> MType;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    ChunkReady = 1,
    ChunkConsumed = 2,
}

impl MessageKind {
    pub fn mtype(self) -> MType {
        self as MType
    }

    pub fn from_mtype(mtype: MType) -> Option<Self> {
        match mtype {
            1 => Some(MessageKind::ChunkReady),
            2 => Some(MessageKind::ChunkConsumed),
            _ => None,
        }
    }
}

#[derive(SysvMessage, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct RawMessage {
    pub mtype: MType,
    pub size: u32,
}

/// A typed control message with a fixed direction.
pub trait Message: Sized + Debug {
    const KIND: MessageKind;

    fn encode(&self) -> RawMessage;

    fn decode(raw: RawMessage) -> Result<Self>;
}

/// Producer to consumer: `size` bytes are waiting in the shared buffer. A
/// size of zero ends the transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkReady {
    pub size: u32,
}

impl ChunkReady {
    pub const TERMINAL: ChunkReady = ChunkReady { size: 0 };

    pub fn is_terminal(&self) -> bool {
        self.size == 0
    }
}

/// Consumer to producer: the last chunk has been drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConsumed;

impl Message for ChunkReady {
    const KIND: MessageKind = MessageKind::ChunkReady;

    fn encode(&self) -> RawMessage {
        RawMessage {
            mtype: Self::KIND.mtype(),
            size: self.size,
        }
    }

    fn decode(raw: RawMessage) -> Result<Self> {
        check_kind::<Self>(&raw)?;
        Ok(ChunkReady { size: raw.size })
    }
}

impl Message for ChunkConsumed {
    const KIND: MessageKind = MessageKind::ChunkConsumed;

    fn encode(&self) -> RawMessage {
        RawMessage {
            mtype: Self::KIND.mtype(),
            size: 0,
        }
    }

    fn decode(raw: RawMessage) -> Result<Self> {
        check_kind::<Self>(&raw)?;
        Ok(ChunkConsumed)
    }
}

fn check_kind<M: Message>(raw: &RawMessage) -> Result<()> {
    if raw.mtype == M::KIND.mtype() {
        Ok(())
    } else {
        Err(Error::Channel {
            op: "decode",
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("expected {:?}, got mtype {}", M::KIND, raw.mtype),
            ),
        })
    }
}
