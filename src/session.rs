use std::fmt;

use tracing::{info, warn};

use crate::channel::ControlChannel;
use crate::error::{Error, Result};
use crate::key::TransferKey;
use crate::shm::{Attachment, SharedBuffer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Sends the file; only detaches on teardown.
    Producer,
    /// Receives the file; detaches and destroys both resources on teardown.
    Consumer,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Producer => write!(f, "producer"),
            Role::Consumer => write!(f, "consumer"),
        }
    }
}

/// The shared buffer and control channel of one transfer, as seen by one
/// side.
///
/// Dropping a session runs the role's teardown on every exit path; use
/// [`Session::finish`] to observe teardown errors.
#[derive(Debug)]
pub struct Session {
    role: Role,
    buffer: SharedBuffer,
    attachment: Option<Attachment>,
    channel: ControlChannel,
}

impl Session {
    /// Resolves the buffer and channel for `key`, creating them if this side
    /// runs first.
    pub fn acquire_or_create(key: TransferKey, capacity: usize, role: Role) -> Result<Self> {
        let buffer = SharedBuffer::new(key, capacity)?;
        let attachment = buffer.attach()?;
        let channel = ControlChannel::new(key)?;
        info!(
            %role,
            %key,
            shm_id = buffer.id(),
            msq_id = channel.id(),
            capacity,
            "acquired shared resources"
        );
        Ok(Session {
            role,
            buffer,
            attachment: Some(attachment),
            channel,
        })
    }

    /// Borrows the mapped buffer and the channel together, as a handshake
    /// loop needs both.
    pub fn split(&mut self) -> Result<(&mut Attachment, &ControlChannel)> {
        let attachment = self.attachment.as_mut().ok_or(Error::AlreadyReleased)?;
        Ok((attachment, &self.channel))
    }

    /// Detaches this process's mapping. The segment itself stays.
    pub fn release(&mut self) -> Result<()> {
        let attachment = self.attachment.take().ok_or(Error::AlreadyReleased)?;
        attachment.detach()
    }

    pub fn is_released(&self) -> bool {
        self.attachment.is_none()
    }

    /// Removes the segment and the queue from the system. Only one side may
    /// do this, once both are done with them.
    pub fn destroy(&mut self) -> Result<()> {
        if self.is_destroyed() {
            return Err(Error::AlreadyDestroyed);
        }
        let shm = if self.buffer.is_removed() {
            Ok(())
        } else {
            self.buffer.remove()
        };
        let msq = if self.channel.is_removed() {
            Ok(())
        } else {
            self.channel.remove()
        };
        shm.and(msq)
    }

    pub fn is_destroyed(&self) -> bool {
        self.buffer.is_removed() && self.channel.is_removed()
    }

    /// Runs the role's teardown, reporting the first failure.
    pub fn finish(mut self) -> Result<()> {
        let res = self.teardown();
        info!(role = %self.role, "released shared resources");
        res
    }

    fn teardown(&mut self) -> Result<()> {
        let released = if self.is_released() {
            Ok(())
        } else {
            self.release()
        };
        let destroyed = match self.role {
            Role::Consumer if !self.is_destroyed() => self.destroy(),
            _ => Ok(()),
        };
        released.and(destroyed)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            warn!(role = %self.role, "teardown failed: {}", e);
        }
    }
}
