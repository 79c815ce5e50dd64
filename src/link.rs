//! Byte-stream link to the receiver hardware.
//!
//! Wraps any `Read + Write` transport (serial bridge, BLE UART bridge, TCP
//! test rig) with frame scanning, event decoding and command encoding.
//! No correlation logic: see [`Session`](crate::session::Session).

use std::collections::VecDeque;
use std::fmt;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::decoder::Decoder;
use crate::protocol::{Command, ProtocolEvent};

/// Errors from link operations. Malformed frames are not errors here; they
/// arrive as [`ProtocolEvent::ParseError`].
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("recv timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("link closed by peer")]
    Disconnected,
}

/// A framed, decoded link over a byte stream.
///
/// Synchronous and single-threaded. For push-style transports that deliver
/// bytes through a callback, use [`receive`](Self::receive) instead of
/// [`recv`](Self::recv).
///
/// # Example
///
/// ```no_run
/// use shotlink::link::{Link, LinkError};
/// use shotlink::protocol::Command;
///
/// let mut link = Link::connect("192.168.4.1:5000")?;
/// link.send(&Command::Query)?;
/// loop {
///     let event = link.recv()?;
///     println!("{event:?}");
/// }
/// # Ok::<(), LinkError>(())
/// ```
pub struct Link<S> {
    stream: S,
    decoder: Decoder,
    read_buf: [u8; 1024],
    /// Events decoded but not yet returned by `recv()`.
    pending: VecDeque<ProtocolEvent>,
    on_send: Option<Box<dyn FnMut(&Command) + Send>>,
    on_recv: Option<Box<dyn FnMut(&ProtocolEvent) + Send>>,
}

impl<S: Read + Write> Link<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            decoder: Decoder::new(),
            read_buf: [0u8; 1024],
            pending: VecDeque::new(),
            on_send: None,
            on_recv: None,
        }
    }

    /// Register a callback invoked at the top of every [`send()`](Self::send).
    pub fn set_on_send(&mut self, f: impl FnMut(&Command) + Send + 'static) {
        self.on_send = Some(Box::new(f));
    }

    /// Register a callback invoked for every event handed to the caller.
    pub fn set_on_recv(&mut self, f: impl FnMut(&ProtocolEvent) + Send + 'static) {
        self.on_recv = Some(Box::new(f));
    }

    /// Encode and write a command.
    pub fn send(&mut self, cmd: &Command) -> Result<(), LinkError> {
        if let Some(cb) = self.on_send.as_mut() {
            cb(cmd);
        }
        log::debug!("send {cmd}");
        self.stream.write_all(&cmd.encode())?;
        self.stream.flush()?;
        Ok(())
    }

    /// Block until the next event arrives.
    pub fn recv(&mut self) -> Result<ProtocolEvent, LinkError> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                if let Some(cb) = self.on_recv.as_mut() {
                    cb(&event);
                }
                return Ok(event);
            }

            let n = self.stream.read(&mut self.read_buf)?;
            if n == 0 {
                return Err(LinkError::Disconnected);
            }
            let events = self.decoder.feed(&self.read_buf[..n]);
            self.pending.extend(events);
            // No complete frame yet: read more.
        }
    }

    /// Decode bytes delivered out of band (push transports). Returns every
    /// event they complete; events already queued for `recv()` are untouched.
    pub fn receive(&mut self, bytes: &[u8]) -> Vec<ProtocolEvent> {
        let events = self.decoder.feed(bytes);
        if let Some(cb) = self.on_recv.as_mut() {
            events.iter().for_each(|e| cb(e));
        }
        events
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl Link<TcpStream> {
    /// Connect to a TCP bridge.
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self, LinkError> {
        let stream = TcpStream::connect(addr)?;
        Ok(Self::from_tcp(stream))
    }

    /// Connect with an explicit timeout.
    pub fn connect_timeout(addr: &SocketAddr, timeout: Duration) -> Result<Self, LinkError> {
        let stream = TcpStream::connect_timeout(addr, timeout)?;
        Ok(Self::from_tcp(stream))
    }

    fn from_tcp(stream: TcpStream) -> Self {
        // Frames are tiny; don't let Nagle hold them back.
        if let Err(e) = stream.set_nodelay(true) {
            log::warn!("set_nodelay failed: {e}");
        }
        Self::new(stream)
    }

    /// Block up to `timeout` for the next event.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Result<ProtocolEvent, LinkError> {
        self.stream.set_read_timeout(Some(timeout))?;
        let result = match self.recv() {
            Err(LinkError::Io(ref e))
                if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut =>
            {
                Err(LinkError::Timeout { timeout })
            }
            other => other,
        };
        self.stream.set_read_timeout(None)?;
        result
    }
}

impl<S> fmt::Debug for Link<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("decoder", &self.decoder)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    /// In-memory stream: reads `input` in `chunk`-sized pieces, records writes
    /// (or rejects them with `fail_writes`).
    #[derive(Debug, Default)]
    pub(crate) struct MockStream {
        pub input: Vec<u8>,
        pub pos: usize,
        pub chunk: usize,
        pub output: Vec<u8>,
        pub fail_writes: bool,
    }

    impl MockStream {
        pub fn new(input: &[u8], chunk: usize) -> Self {
            Self { input: input.to_vec(), chunk, ..Self::default() }
        }
    }

    impl Read for MockStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.chunk.min(buf.len()).min(self.input.len() - self.pos);
            buf[..n].copy_from_slice(&self.input[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    impl Write for MockStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.fail_writes {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "link down"));
            }
            self.output.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn recv_across_small_reads() {
        let mut link = Link::new(MockStream::new(b"<HIT,T1><SHOT,T2,99>", 3));
        assert!(matches!(link.recv().unwrap(), ProtocolEvent::Hit(h) if h.id == "T1"));
        assert!(matches!(link.recv().unwrap(), ProtocolEvent::ShotFired(s) if s.timestamp == 99));
        assert!(matches!(link.recv(), Err(LinkError::Disconnected)));
    }

    #[test]
    fn recv_preserves_order_within_one_read() {
        let mut link = Link::new(MockStream::new(b"<HIT,A><HIT,B><HIT,C>", 1024));
        let ids: Vec<_> = (0..3)
            .map(|_| match link.recv().unwrap() {
                ProtocolEvent::Hit(h) => h.id,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(ids, ["A", "B", "C"]);
    }

    #[test]
    fn parse_errors_are_events_not_failures() {
        let mut link = Link::new(MockStream::new(b"<POS,T1,x,1,2,3>", 64));
        assert!(matches!(link.recv().unwrap(), ProtocolEvent::ParseError { .. }));
    }

    #[test]
    fn send_writes_framed_command() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&sent);
        let mut link = Link::new(MockStream::default());
        link.set_on_send(move |c| log.lock().unwrap().push(c.clone()));

        link.send(&Command::Calibrate { id: "T4".into() }).unwrap();
        link.send(&Command::Query).unwrap();

        assert_eq!(link.get_ref().output, b"<CAL,T4><QUERY>");
        assert_eq!(*sent.lock().unwrap(), vec![Command::Calibrate { id: "T4".into() }, Command::Query]);
    }

    #[test]
    fn receive_for_push_transports() {
        let seen = Arc::new(Mutex::new(0usize));
        let count = Arc::clone(&seen);
        let mut link = Link::new(MockStream::default());
        link.set_on_recv(move |_| *count.lock().unwrap() += 1);

        assert!(link.receive(b"<CALACK,T").is_empty());
        let events = link.receive(b"1><HIT,T1>");
        assert_eq!(events.len(), 2);
        assert_eq!(*seen.lock().unwrap(), 2);
    }
}
