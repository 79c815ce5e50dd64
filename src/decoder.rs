//! Byte stream → [`ProtocolEvent`]s.
//!
//! One decoder per transport. The buffered partial frame belongs to a single
//! stream; interleaving two streams through one decoder corrupts both.

use crate::frame::FrameSplitter;
use crate::protocol::ProtocolEvent;

/// Stateful inbound decoder: frame scanning plus message parsing.
///
/// # Example
///
/// ```
/// use shotlink::{Decoder, ProtocolEvent};
///
/// let mut decoder = Decoder::new();
/// assert!(decoder.feed(b"<HIT,T").is_empty());
/// let events = decoder.feed(b"1>");
/// assert!(matches!(&events[..], [ProtocolEvent::Hit(h)] if h.id == "T1"));
/// ```
#[derive(Default)]
pub struct Decoder {
    splitter: FrameSplitter,
    /// Called for every event as it completes, before `feed` returns.
    on_event: Option<Box<dyn FnMut(&ProtocolEvent) + Send>>,
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback invoked for each decoded event.
    pub fn set_on_event(&mut self, f: impl FnMut(&ProtocolEvent) + Send + 'static) {
        self.on_event = Some(Box::new(f));
    }

    /// Feed a chunk of bytes. Returns the events for every frame completed by
    /// this chunk, in arrival order.
    pub fn feed(&mut self, data: &[u8]) -> Vec<ProtocolEvent> {
        let frames = self.splitter.feed(data);
        let mut events = Vec::with_capacity(frames.len());

        for frame in frames {
            let event = ProtocolEvent::from_frame(&frame);
            if let ProtocolEvent::ParseError { message } = &event {
                log::error!("dropping frame <{}>: {message}", frame.content);
            }
            if let Some(cb) = self.on_event.as_mut() {
                cb(&event);
            }
            events.push(event);
        }

        events
    }

    /// True while a frame is partially buffered.
    pub fn in_frame(&self) -> bool {
        self.splitter.in_frame()
    }

    /// Drop any partially buffered frame.
    pub fn reset(&mut self) {
        self.splitter.reset();
    }
}

impl std::fmt::Debug for Decoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decoder")
            .field("splitter", &self.splitter)
            .field("on_event", &self.on_event.is_some())
            .finish()
    }
}
