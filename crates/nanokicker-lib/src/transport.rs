//! Byte-stream transport — trait + serial port backend + mock.

use std::fmt;
use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

use serialport::{ClearBuffer, SerialPort};

use crate::protocol::{DEFAULT_BAUD_RATE, DEFAULT_READ_TIMEOUT};

// ── Error type ──

/// Transport-level errors.
///
/// `Io` means the stream itself failed (cable pulled, device reset). Read
/// timeouts are not errors: reads return whatever arrived before the deadline.
#[derive(Debug)]
pub enum TransportError {
    NotConnected,
    OpenFailed(String),
    Io(io::Error),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::NotConnected => write!(f, "Transport is not open"),
            TransportError::OpenFailed(e) => write!(f, "Failed to open port: {e}"),
            TransportError::Io(e) => write!(f, "Serial I/O error: {e}"),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransportError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for TransportError {
    fn from(e: io::Error) -> Self {
        TransportError::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;

// ── Traits ──

/// An open byte stream to the motherboard.
///
/// Every read is bounded by the transport's read timeout, applied per call.
/// After [`close`](Transport::close) every operation fails with `NotConnected`.
pub trait Transport: Send {
    /// Write all bytes and flush.
    fn write(&mut self, bytes: &[u8]) -> Result<()>;
    /// Read up to `n` bytes. Returns fewer if the timeout expires first.
    fn read_exact(&mut self, n: usize) -> Result<Vec<u8>>;
    /// Read one line, without its line ending. Returns the partial text on timeout.
    fn read_line(&mut self) -> Result<String>;
    /// Drop everything currently buffered on the input side.
    fn discard_input(&mut self) -> Result<()>;
    fn close(&mut self);
}

/// Capability to open a [`Transport`] by port identifier.
pub trait Connector: Send {
    fn open(&self, port: &str) -> Result<Box<dyn Transport>>;
}

// ── Serial backend ──

/// Opens OS serial ports via `serialport`.
#[derive(Debug, Clone)]
pub struct SerialConnector {
    pub baud_rate: u32,
    pub read_timeout: Duration,
}

impl Default for SerialConnector {
    fn default() -> Self {
        SerialConnector {
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

impl Connector for SerialConnector {
    fn open(&self, port: &str) -> Result<Box<dyn Transport>> {
        let serial = serialport::new(port, self.baud_rate)
            .timeout(self.read_timeout)
            .open()
            .map_err(|e| TransportError::OpenFailed(format!("{port}: {e}")))?;
        log::debug!("opened {port} at {} baud", self.baud_rate);
        Ok(Box::new(SerialTransport {
            port: Some(serial),
            read_timeout: self.read_timeout,
        }))
    }
}

/// A byte source whose blocking reads can be bounded.
trait TimedRead: Read {
    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()>;
}

impl TimedRead for Box<dyn SerialPort> {
    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        (**self).set_timeout(timeout).map_err(io::Error::from)
    }
}

/// Read into `buf` until `done` says stop, `limit` is reached, or `timeout`
/// passes. A timeout is not an error: `buf` keeps whatever arrived.
fn read_until<R: TimedRead + ?Sized>(
    source: &mut R,
    timeout: Duration,
    buf: &mut Vec<u8>,
    limit: usize,
    done: impl Fn(&[u8]) -> bool,
) -> io::Result<()> {
    let deadline = Instant::now() + timeout;
    let mut byte = [0u8; 1];
    while buf.len() < limit && !done(buf) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        source.set_read_timeout(deadline - now)?;
        match source.read(&mut byte) {
            Ok(0) => continue,
            Ok(_) => buf.push(byte[0]),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => break,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

pub struct SerialTransport {
    port: Option<Box<dyn SerialPort>>,
    read_timeout: Duration,
}

impl SerialTransport {
    fn port_mut(&mut self) -> Result<&mut Box<dyn SerialPort>> {
        self.port.as_mut().ok_or(TransportError::NotConnected)
    }

    fn read_until(
        &mut self,
        buf: &mut Vec<u8>,
        limit: usize,
        done: impl Fn(&[u8]) -> bool,
    ) -> Result<()> {
        let timeout = self.read_timeout;
        read_until(self.port_mut()?, timeout, buf, limit, done)?;
        Ok(())
    }
}

/// Upper bound on a single text line; firmware diagnostics are short.
const MAX_LINE_LEN: usize = 1024;

impl Transport for SerialTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let port = self.port_mut()?;
        port.write_all(bytes)?;
        port.flush()?;
        Ok(())
    }

    fn read_exact(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(n);
        self.read_until(&mut buf, n, |_| false)?;
        Ok(buf)
    }

    fn read_line(&mut self) -> Result<String> {
        let mut buf = Vec::new();
        self.read_until(&mut buf, MAX_LINE_LEN, |b| b.last() == Some(&b'\n'))?;
        Ok(trim_line(&buf))
    }

    fn discard_input(&mut self) -> Result<()> {
        self.port_mut()?
            .clear(ClearBuffer::Input)
            .map_err(io::Error::from)?;
        Ok(())
    }

    fn close(&mut self) {
        self.port = None;
    }
}

/// Decode a received line, dropping the trailing line ending.
pub fn trim_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches(['\r', '\n'])
        .to_string()
}

// ── Mock transport (for testing) ──

pub mod mock {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

    /// What the simulated firmware does after a frame is written.
    #[derive(Debug, Clone)]
    pub enum Reply {
        /// Put these bytes on the input side.
        Bytes(Vec<u8>),
        /// Send nothing; reads time out empty.
        Silence,
        /// The next read fails as if the cable were pulled.
        Drop,
    }

    /// Shared state between a [`MockConnector`] and the transports it opens.
    #[derive(Debug, Default)]
    pub struct MockState {
        /// Every byte written, in order.
        pub written: Vec<u8>,
        /// Replies consumed one per write. Empty queue means silence.
        pub replies: VecDeque<Reply>,
        /// Bytes waiting to be read.
        pub input: VecDeque<u8>,
        /// Number of `discard_input` calls.
        pub discards: usize,
        /// Ports passed to `open`, in order.
        pub opened: Vec<String>,
        /// Number of `close` calls.
        pub closes: usize,
        /// If true, `open` fails.
        pub fail_open: bool,
        /// If true, the next `write` fails and clears the flag.
        pub fail_next_write: bool,
        read_fails: bool,
    }

    /// In-memory connector for unit tests. Clones share state, so a test can
    /// keep one clone for inspection after the link takes ownership of another.
    #[derive(Debug, Clone, Default)]
    pub struct MockConnector {
        state: Arc<Mutex<MockState>>,
    }

    impl MockConnector {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn state(&self) -> MutexGuard<'_, MockState> {
            self.state.lock().unwrap_or_else(PoisonError::into_inner)
        }

        pub fn push_reply(&self, reply: Reply) {
            self.state().replies.push_back(reply);
        }

        /// Queue a 4-byte big-endian binary reply.
        pub fn push_value(&self, value: u32) {
            self.push_reply(Reply::Bytes(value.to_be_bytes().to_vec()));
        }

        /// Queue a CRLF-terminated text reply.
        pub fn push_line(&self, line: &str) {
            self.push_reply(Reply::Bytes(format!("{line}\r\n").into_bytes()));
        }

        /// Put unsolicited bytes on the input side right now.
        pub fn inject_noise(&self, bytes: &[u8]) {
            self.state().input.extend(bytes);
        }

        /// Written bytes split into 6-byte frames.
        pub fn frames(&self) -> Vec<Vec<u8>> {
            self.state()
                .written
                .chunks(crate::protocol::COMMAND_LEN)
                .map(<[u8]>::to_vec)
                .collect()
        }
    }

    impl Connector for MockConnector {
        fn open(&self, port: &str) -> Result<Box<dyn Transport>> {
            let mut st = self.state();
            st.opened.push(port.to_string());
            if st.fail_open {
                return Err(TransportError::OpenFailed(format!(
                    "{port}: mock open failure injected"
                )));
            }
            Ok(Box::new(MockTransport {
                state: Arc::clone(&self.state),
                open: true,
            }))
        }
    }

    pub struct MockTransport {
        state: Arc<Mutex<MockState>>,
        open: bool,
    }

    impl MockTransport {
        fn state(&self) -> Result<MutexGuard<'_, MockState>> {
            if !self.open {
                return Err(TransportError::NotConnected);
            }
            Ok(self.state.lock().unwrap_or_else(PoisonError::into_inner))
        }
    }

    fn dropped() -> TransportError {
        TransportError::Io(io::Error::new(
            io::ErrorKind::BrokenPipe,
            "mock: device disconnected",
        ))
    }

    impl Transport for MockTransport {
        fn write(&mut self, bytes: &[u8]) -> Result<()> {
            let mut st = self.state()?;
            if st.fail_next_write {
                st.fail_next_write = false;
                return Err(dropped());
            }
            st.written.extend_from_slice(bytes);
            match st.replies.pop_front().unwrap_or(Reply::Silence) {
                Reply::Bytes(b) => st.input.extend(b),
                Reply::Silence => {}
                Reply::Drop => st.read_fails = true,
            }
            Ok(())
        }

        fn read_exact(&mut self, n: usize) -> Result<Vec<u8>> {
            let mut st = self.state()?;
            if std::mem::take(&mut st.read_fails) {
                return Err(dropped());
            }
            let take = n.min(st.input.len());
            Ok(st.input.drain(..take).collect())
        }

        fn read_line(&mut self) -> Result<String> {
            let mut st = self.state()?;
            if std::mem::take(&mut st.read_fails) {
                return Err(dropped());
            }
            let end = st
                .input
                .iter()
                .position(|&b| b == b'\n')
                .map(|i| i + 1)
                .unwrap_or(st.input.len());
            let line: Vec<u8> = st.input.drain(..end).collect();
            Ok(trim_line(&line))
        }

        fn discard_input(&mut self) -> Result<()> {
            let mut st = self.state()?;
            st.input.clear();
            st.discards += 1;
            Ok(())
        }

        fn close(&mut self) {
            if self.open {
                self.open = false;
                self.state
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .closes += 1;
            }
        }
    }
}
