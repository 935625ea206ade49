//! The lockstep protocol that hands the shared buffer back and forth.
//!
//! ```text
//!  producer                               consumer
//!  Idle                                   AwaitingFirstReady
//!   | fill                                    |
//!  ProducerWriting                            |
//!   | ChunkReady{n} ------------------------> ConsumerReading
//!  AwaitingConsumed                           | drain n bytes
//!   | <-------------------------- ChunkConsumed
//!  Idle                                   AwaitingReady
//!   ...                                       ...
//!   | ChunkReady{0} ------------------------> Terminated
//!  Terminated
//! ```
//!
//! Only message arrival moves a side forward; there are no timeouts.

mod consumer;
mod producer;

pub use consumer::{create_sink, receive_all};
pub use producer::{open_source, send_all};

use tracing::trace;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Turn {
    /// Producer start, and producer after each `ChunkConsumed`: the buffer
    /// belongs to the producer.
    Idle,
    ProducerWriting,
    AwaitingConsumed,
    /// Consumer start.
    AwaitingFirstReady,
    ConsumerReading,
    AwaitingReady,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// The producer copied this many bytes into the buffer.
    Filled(u32),
    /// A `ChunkReady` was sent (producer) or received (consumer).
    Ready(u32),
    /// A `ChunkConsumed` was sent (consumer) or received (producer).
    Consumed,
}

impl Turn {
    pub fn producer() -> Self {
        Turn::Idle
    }

    pub fn consumer() -> Self {
        Turn::AwaitingFirstReady
    }

    pub fn next(self, event: Event) -> Result<Turn> {
        use Event::*;
        use Turn::*;

        let next = match (self, event) {
            (Idle, Filled(n)) if n > 0 => ProducerWriting,
            (Idle, Ready(0)) => Terminated,
            (ProducerWriting, Ready(n)) if n > 0 => AwaitingConsumed,
            (AwaitingConsumed, Consumed) => Idle,

            (AwaitingFirstReady | AwaitingReady, Ready(0)) => Terminated,
            (AwaitingFirstReady | AwaitingReady, Ready(_)) => ConsumerReading,
            (ConsumerReading, Consumed) => AwaitingReady,

            (state, event) => return Err(Error::Protocol { state, event }),
        };
        Ok(next)
    }

    /// Applies `event` in place, logging the transition.
    pub fn advance(&mut self, event: Event) -> Result<()> {
        let next = self.next(event)?;
        trace!(from = ?*self, to = ?next, ?event, "turn");
        *self = next;
        Ok(())
    }

    pub fn is_terminated(&self) -> bool {
        *self == Turn::Terminated
    }
}

/// Totals for one side of a finished transfer. The terminal sentinel is not
/// counted as a chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Transfer {
    pub chunks: u64,
    pub bytes: u64,
}

impl Transfer {
    fn record(&mut self, size: u32) {
        self.chunks += 1;
        self.bytes += u64::from(size);
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn producer_cycle() {
        let mut turn = Turn::producer();
        for event in [Event::Filled(10), Event::Ready(10), Event::Consumed] {
            turn.advance(event).unwrap();
        }
        assert_eq!(turn, Turn::Idle);
        turn.advance(Event::Ready(0)).unwrap();
        assert!(turn.is_terminated());
    }

    #[test]
    fn consumer_cycle() {
        let mut turn = Turn::consumer();
        turn.advance(Event::Ready(3)).unwrap();
        assert_eq!(turn, Turn::ConsumerReading);
        turn.advance(Event::Consumed).unwrap();
        assert_eq!(turn, Turn::AwaitingReady);
        turn.advance(Event::Ready(0)).unwrap();
        assert!(turn.is_terminated());
    }

    #[test]
    fn empty_source_terminates_immediately() {
        assert_eq!(Turn::producer().next(Event::Ready(0)).unwrap(), Turn::Terminated);
        assert_eq!(Turn::consumer().next(Event::Ready(0)).unwrap(), Turn::Terminated);
    }

    #[test]
    fn overwriting_before_consumed_is_rejected() {
        let turn = Turn::AwaitingConsumed;
        assert!(matches!(
            turn.next(Event::Filled(5)),
            Err(Error::Protocol {
                state: Turn::AwaitingConsumed,
                event: Event::Filled(5)
            })
        ));
        assert!(turn.next(Event::Ready(0)).is_err());
    }

    #[test]
    fn nothing_leaves_terminated() {
        for event in [Event::Filled(1), Event::Ready(1), Event::Ready(0), Event::Consumed] {
            assert!(Turn::Terminated.next(event).is_err());
        }
    }

    #[test]
    fn consumed_requires_a_drained_chunk() {
        assert!(Turn::consumer().next(Event::Consumed).is_err());
        assert!(Turn::AwaitingReady.next(Event::Consumed).is_err());
    }
}
