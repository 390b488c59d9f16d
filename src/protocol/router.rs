//! The message buffer: turns an unframed byte stream into typed messages.
//!
//! `push` may be called with any slicing of the stream, down to one byte at a
//! time. Whatever is not yet complete (type tag, scalar, blob, message) is
//! kept until the next call. The router is driven by a single thread and is
//! not internally synchronised; only its listener list is shared.

use std::sync::Arc;

use log::{debug, warn};

use crate::error::{Error, Result};
use crate::listeners::ListenerSet;
use crate::protocol::decoder::{Decoded, PrimitiveDecoder};
use crate::protocol::message::{Descriptor, Message, MessageType};

/// Receives every fully decoded message.
pub trait MessageListener: Send + Sync {
    fn on_message(&self, message: &Message);
}

impl<F> MessageListener for F
where
    F: Fn(&Message) + Send + Sync,
{
    fn on_message(&self, message: &Message) {
        self(message)
    }
}

pub type Listeners = ListenerSet<dyn MessageListener>;

pub struct Router {
    decoder: PrimitiveDecoder,
    in_flight: Option<Descriptor<Message>>,
    listeners: Arc<Listeners>,
    dispatched: u64,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    pub fn new() -> Self {
        Self::with_max_blob_len(None)
    }

    pub fn with_max_blob_len(max_blob_len: Option<u32>) -> Self {
        Self {
            decoder: PrimitiveDecoder::with_max_blob_len(max_blob_len),
            in_flight: None,
            listeners: Arc::new(ListenerSet::new()),
            dispatched: 0,
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn MessageListener>) {
        self.listeners.add(listener);
    }

    /// Shared handle on the listener list, usable after the router has been
    /// moved onto the reading thread.
    pub fn listeners(&self) -> Arc<Listeners> {
        Arc::clone(&self.listeners)
    }

    /// Total number of messages dispatched since creation.
    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    /// True when no tag, primitive or message is partially decoded.
    pub fn is_idle(&self) -> bool {
        self.in_flight.is_none() && self.decoder.is_idle()
    }

    /// Type of the message currently being decoded, if any.
    pub fn in_flight(&self) -> Option<MessageType> {
        self.in_flight.as_ref().map(|d| d.body().message_type())
    }

    /// Forget every partially decoded value.
    pub fn reset(&mut self) {
        self.decoder.reset();
        self.in_flight = None;
    }

    /// Feed the next chunk of the stream. Returns the number of messages
    /// dispatched while consuming it.
    ///
    /// A stream error (unknown tag, invalid blob length) resets all decoding
    /// state and discards the remainder of `data`; the caller is expected to
    /// tear the connection down.
    pub fn push(&mut self, data: &[u8]) -> Result<usize> {
        let mut offset = 0;
        let mut dispatched = 0;

        loop {
            if self.in_flight.is_none() {
                if offset >= data.len() {
                    break;
                }
                match self.decoder.read_i16(data, offset) {
                    Decoded::Complete { value, next } => {
                        offset = next;
                        match MessageType::from_i16(value) {
                            Some(ty) => {
                                self.in_flight = Some(Descriptor::new(ty.new_message()));
                            }
                            None => {
                                warn!("Unknown message type {}, resetting the stream", value);
                                self.reset();
                                return Err(Error::UnknownMessageType(value));
                            }
                        }
                    }
                    Decoded::Incomplete => break,
                }
            }

            let outcome = match self.in_flight.as_mut() {
                Some(desc) => feed(&mut self.decoder, desc, data, &mut offset),
                None => continue,
            };

            match outcome {
                Ok(true) => {
                    if let Some(desc) = self.in_flight.take() {
                        self.dispatch(&desc.into_inner());
                        dispatched += 1;
                    }
                }
                Ok(false) => break,
                Err(e) => {
                    warn!("Stream error while decoding {:?}: {}", self.in_flight(), e);
                    self.reset();
                    return Err(e);
                }
            }
        }

        Ok(dispatched)
    }

    fn dispatch(&mut self, message: &Message) {
        self.dispatched += 1;
        debug!("Dispatching {:?}", message.message_type());
        for listener in self.listeners.snapshot() {
            listener.on_message(message);
        }
    }
}

/// Decode primitives into `desc` until it completes (`Ok(true)`) or the input
/// runs out (`Ok(false)`). A message without fields completes immediately.
fn feed(
    decoder: &mut PrimitiveDecoder,
    desc: &mut Descriptor<Message>,
    data: &[u8],
    offset: &mut usize,
) -> Result<bool> {
    while !desc.is_complete() {
        match decoder.read_value(desc.expected_kind(), data, *offset)? {
            Decoded::Complete { value, next } => {
                *offset = next;
                desc.accept(value);
            }
            Decoded::Incomplete => return Ok(false),
        }
    }
    Ok(true)
}
