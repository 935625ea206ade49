use std::io;
use std::path::PathBuf;

use crate::handshake::{Event, Turn};

pub type Result<T> = std::result::Result<T, Error>;

/// Failure classes of a transfer, one per stage where an error can be detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Setup,
    Sink,
    Source,
    Teardown,
    Protocol,
    Interrupted,
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("unable to derive transfer key from {}: {source}", path.display())]
    KeyDerivation { path: PathBuf, source: io::Error },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("{what} unavailable: {source}")]
    ResourceUnavailable {
        what: &'static str,
        source: io::Error,
    },

    #[error("unable to open destination {}: {source}", path.display())]
    SinkUnavailable { path: PathBuf, source: io::Error },

    #[error("write to destination failed: {0}")]
    Sink(#[source] io::Error),

    #[error("short write to destination: {written} of {expected} bytes")]
    PartialWrite { expected: usize, written: usize },

    #[error("unable to open source {}: {source}", path.display())]
    SourceUnavailable { path: PathBuf, source: io::Error },

    #[error("read from source failed: {0}")]
    Source(#[source] io::Error),

    #[error("control channel {op} failed: {source}")]
    Channel {
        op: &'static str,
        source: io::Error,
    },

    #[error("control channel was removed by the peer")]
    ResourceRemoved,

    #[error("unexpected {event:?} while in {state:?}")]
    Protocol { state: Turn, event: Event },

    #[error("chunk of {size} bytes exceeds buffer capacity of {capacity} bytes")]
    ChunkTooLarge { size: usize, capacity: usize },

    #[error("{what} failed: {source}")]
    Teardown {
        what: &'static str,
        source: io::Error,
    },

    #[error("shared buffer already released")]
    AlreadyReleased,

    #[error("shared resources already destroyed")]
    AlreadyDestroyed,

    #[error("interrupted")]
    Interrupted,
}

impl Error {
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::KeyDerivation { .. } | Error::Config(_) | Error::ResourceUnavailable { .. } => {
                ErrorClass::Setup
            }
            Error::SinkUnavailable { .. } | Error::Sink(_) | Error::PartialWrite { .. } => {
                ErrorClass::Sink
            }
            Error::SourceUnavailable { .. } | Error::Source(_) => ErrorClass::Source,
            Error::Channel { .. }
            | Error::ResourceRemoved
            | Error::Protocol { .. }
            | Error::ChunkTooLarge { .. } => ErrorClass::Protocol,
            Error::Teardown { .. } | Error::AlreadyReleased | Error::AlreadyDestroyed => {
                ErrorClass::Teardown
            }
            Error::Interrupted => ErrorClass::Interrupted,
        }
    }
}
