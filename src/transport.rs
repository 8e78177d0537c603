//! The byte-stream seam between the codec core and a connection.
//!
//! The core only needs an ordered, bidirectional byte stream that can report
//! whether it is still usable and be closed. Handshakes, query packets and
//! pooling belong to the owner of the connection.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::error::ChwireError;

pub trait Transport: Read + Write + Send {
    /// Whether the stream can still carry traffic.
    fn is_alive(&self) -> bool;

    /// Closes the stream. Closing twice is not an error.
    fn close(&mut self) -> Result<(), ChwireError>;
}

//==================================================================================
// 1. Cancellation
//==================================================================================

/// A shared flag checked before every transport read and write.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<(), ChwireError> {
        if self.is_cancelled() {
            Err(ChwireError::Cancelled)
        } else {
            Ok(())
        }
    }
}

//==================================================================================
// 2. TCP
//==================================================================================

#[derive(Debug)]
pub struct TcpTransport {
    stream: TcpStream,
    closed: bool,
}

impl TcpTransport {
    /// Connects and applies `timeout` to the connect and to every read/write.
    pub fn connect(addr: impl ToSocketAddrs, timeout: Option<Duration>) -> Result<Self, ChwireError> {
        let mut last_error = None;
        for candidate in addr.to_socket_addrs()? {
            let attempt = match timeout {
                Some(t) => TcpStream::connect_timeout(&candidate, t),
                None => TcpStream::connect(candidate),
            };
            match attempt {
                Ok(stream) => {
                    stream.set_read_timeout(timeout)?;
                    stream.set_write_timeout(timeout)?;
                    stream.set_nodelay(true)?;
                    return Ok(Self::from_stream(stream));
                }
                Err(e) => {
                    log::debug!("connect to {} failed: {}", candidate, e);
                    last_error = Some(e);
                }
            }
        }
        Err(match last_error {
            Some(e) => e.into(),
            None => ChwireError::Transport(io::Error::new(
                io::ErrorKind::NotFound,
                "address resolved to no endpoints",
            )),
        })
    }

    pub fn from_stream(stream: TcpStream) -> Self {
        Self {
            stream,
            closed: false,
        }
    }
}

impl Read for TcpTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Write for TcpTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

impl Transport for TcpTransport {
    fn is_alive(&self) -> bool {
        !self.closed && self.stream.peer_addr().is_ok()
    }

    fn close(&mut self) -> Result<(), ChwireError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        match self.stream.shutdown(Shutdown::Both) {
            Err(e) if e.kind() != io::ErrorKind::NotConnected => Err(e.into()),
            _ => Ok(()),
        }
    }
}

//==================================================================================
// 3. In-Memory
//==================================================================================

#[derive(Debug, Default)]
struct MemoryState {
    incoming: VecDeque<u8>,
    written: Vec<u8>,
    write_calls: usize,
    fail_writes_after: Option<usize>,
    closed: bool,
    close_calls: usize,
}

/// An in-process transport: reads are served from scripted bytes, writes are
/// captured. Clones share the same state, so a test can keep a handle while
/// a batch owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport whose reads return `bytes`, then end of stream.
    pub fn with_incoming(bytes: &[u8]) -> Self {
        let transport = Self::new();
        transport.push_incoming(bytes);
        transport
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn push_incoming(&self, bytes: &[u8]) {
        self.lock().incoming.extend(bytes.iter().copied());
    }

    /// Everything written so far.
    pub fn written(&self) -> Vec<u8> {
        self.lock().written.clone()
    }

    pub fn write_calls(&self) -> usize {
        self.lock().write_calls
    }

    /// Makes every write after the first `n` fail with a broken pipe.
    pub fn fail_writes_after(&self, n: usize) {
        self.lock().fail_writes_after = Some(n);
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn close_calls(&self) -> usize {
        self.lock().close_calls
    }
}

impl Read for MemoryTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.lock();
        if state.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "transport is closed"));
        }
        let n = buf.len().min(state.incoming.len());
        for (slot, byte) in buf.iter_mut().zip(state.incoming.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for MemoryTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.lock();
        if state.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "transport is closed"));
        }
        if state.fail_writes_after.is_some_and(|n| state.write_calls >= n) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "scripted write failure"));
        }
        state.write_calls += 1;
        state.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Transport for MemoryTransport {
    fn is_alive(&self) -> bool {
        !self.lock().closed
    }

    fn close(&mut self) -> Result<(), ChwireError> {
        let mut state = self.lock();
        state.closed = true;
        state.close_calls += 1;
        Ok(())
    }
}
