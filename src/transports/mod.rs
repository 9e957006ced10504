//! The byte-stream transport and the handshake run over it.
//!
//! Socket.io always sets up a session using HTTP long polling and then
//! upgrades a second connection to websockets. Both phases talk raw HTTP
//! over a [`Transport`](trait.Transport.html) so that the same code works on
//! plain TCP sockets, TLS streams or whatever the device offers.

pub mod polling;
pub mod tcp;
pub mod websocket;

use std::io::Result as IoResult;
use std::time::Duration;

use crate::clock::Clock;
use crate::error::{EngineError, Result};
use crate::frame::{FrameEncoder, MaskSource};

use tracing::{info, warn};

pub use self::tcp::TcpTransport;

const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Default bounded wait for each handshake phase.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default upper bound for one HTTP response line.
pub const DEFAULT_MAX_LINE_LEN: usize = 4096;

/// A raw, possibly TLS wrapped, byte stream.
///
/// `available` and `read` must not block, the client polls them from
/// its `service` routine.
pub trait Transport {
    /// Opens the stream. `trust_anchor` configures TLS, if the transport supports it.
    fn connect(&mut self, host: &str, port: u16, trust_anchor: Option<&str>) -> IoResult<()>;

    /// Whether the stream is open.
    fn connected(&self) -> bool;

    /// Number of bytes that can be read without blocking.
    fn available(&mut self) -> IoResult<usize>;

    /// Reads up to `buf.len()` of the available bytes.
    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize>;

    /// Writes all of `buf`.
    fn write_all(&mut self, buf: &[u8]) -> IoResult<()>;

    /// Closes the stream. Closing a closed stream does nothing.
    fn close(&mut self);
}

/// The session parameters the server hands out during the handshake.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Handshake {
    sid: String,
    ping_interval: Duration,
}

impl Handshake {
    pub fn new(sid: String, ping_interval: Duration) -> Handshake {
        Handshake {
            sid: sid,
            ping_interval: ping_interval,
        }
    }

    pub fn sid(&self) -> &str {
        &self.sid
    }

    pub fn ping_interval(&self) -> Duration {
        self.ping_interval
    }
}

/// Settings shared by both handshake phases.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HandshakeOptions {
    /// Value of the `Origin` header.
    pub origin: String,

    /// The socket.io endpoint, e.g. `/socket.io/1/`.
    pub path: String,

    /// How long to wait for the server to start answering.
    pub timeout: Duration,

    /// Longest accepted HTTP response line.
    pub max_line_len: usize,
}

impl Default for HandshakeOptions {
    fn default() -> HandshakeOptions {
        HandshakeOptions {
            origin: "socketio-rs".to_owned(),
            path: "/socket.io/1/".to_owned(),
            timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            max_line_len: DEFAULT_MAX_LINE_LEN,
        }
    }
}

/// Runs both handshake phases against `host:port`.
///
/// On success the transport is left open and upgraded to websocket
/// framing. On failure it is left closed. No retries are attempted.
pub fn perform_handshake<T, C, M>(
    transport: &mut T,
    clock: &C,
    encoder: &mut FrameEncoder<M>,
    options: &HandshakeOptions,
    host: &str,
    port: u16,
    trust_anchor: Option<&str>,
) -> Result<Handshake>
where
    T: Transport,
    C: Clock,
    M: MaskSource,
{
    let result = polling::handshake(transport, clock, options, host, port, trust_anchor).and_then(|handshake| {
        websocket::upgrade(transport, clock, encoder, options, host, port, trust_anchor, &handshake)?;
        Ok(handshake)
    });

    match result {
        Ok(handshake) => {
            info!(
                "Connected to {}:{}, sid={} ping interval={:?}",
                host,
                port,
                handshake.sid(),
                handshake.ping_interval()
            );
            Ok(handshake)
        }
        Err(err) => {
            warn!("Handshake with {}:{} failed: {}", host, port, err);
            transport.close();
            Err(err)
        }
    }
}

/// Waits until the transport has bytes to read, at most `timeout`.
pub fn wait_for_input<T: Transport, C: Clock>(transport: &mut T, clock: &C, timeout: Duration) -> Result<()> {
    let start = clock.now();
    loop {
        if transport.available()? > 0 {
            return Ok(());
        }
        if !transport.connected() {
            return Err(EngineError::Transport(std::io::ErrorKind::UnexpectedEof.into()));
        }
        if clock.now().duration_since(start) >= timeout {
            return Err(EngineError::Timeout(timeout));
        }
        clock.sleep(POLL_INTERVAL);
    }
}

/// Reads HTTP response lines off a transport.
///
/// The line buffer grows as needed up to `max_line_len`. Carriage
/// returns, NUL and `0xFF` bytes are dropped.
#[derive(Debug)]
pub struct LineReader {
    line: Vec<u8>,
    max_line_len: usize,
    timeout: Duration,
}

impl LineReader {
    pub fn new(options: &HandshakeOptions) -> LineReader {
        LineReader {
            line: Vec::new(),
            max_line_len: options.max_line_len,
            timeout: options.timeout,
        }
    }

    /// Reads one line, without its terminator.
    pub fn read_line<T: Transport, C: Clock>(&mut self, transport: &mut T, clock: &C) -> Result<String> {
        self.line.clear();
        let mut byte = [0u8; 1];
        loop {
            wait_for_input(transport, clock, self.timeout)?;
            if transport.read(&mut byte)? == 0 {
                continue;
            }
            match byte[0] {
                b'\n' => break,
                b'\r' | 0 | 0xFF => {}
                b => {
                    if self.line.len() >= self.max_line_len {
                        return Err(EngineError::MalformedHandshake("response line too long"));
                    }
                    self.line.push(b);
                }
            }
        }
        Ok(String::from_utf8_lossy(&self.line).into_owned())
    }

    /// Reads exactly `len` bytes.
    pub fn read_exact<T: Transport, C: Clock>(&mut self, transport: &mut T, clock: &C, len: usize) -> Result<String> {
        if len > self.max_line_len {
            return Err(EngineError::MalformedHandshake("response body too long"));
        }
        self.line.clear();
        self.line.resize(len, 0);
        let mut filled = 0;
        while filled < len {
            wait_for_input(transport, clock, self.timeout)?;
            filled += transport.read(&mut self.line[filled..])?;
        }
        Ok(String::from_utf8_lossy(&self.line).into_owned())
    }

    /// Reads the status line and returns the status code.
    pub fn read_status<T: Transport, C: Clock>(&mut self, transport: &mut T, clock: &C) -> Result<u16> {
        let line = self.read_line(transport, clock)?;
        line.split_whitespace()
            .nth(1)
            .and_then(|code| code.parse().ok())
            .ok_or(EngineError::MalformedHandshake("invalid status line"))
    }

    /// Reads header lines up to and including the blank line. Returns
    /// the `Content-Length`, if one was sent.
    pub fn read_headers<T: Transport, C: Clock>(&mut self, transport: &mut T, clock: &C) -> Result<Option<usize>> {
        let mut content_length = None;
        loop {
            let line = self.read_line(transport, clock)?;
            if line.is_empty() {
                return Ok(content_length);
            }
            if let Some((name, value)) = line.split_once(':') {
                if name.trim().eq_ignore_ascii_case("content-length") {
                    content_length = value.trim().parse().ok();
                }
            }
        }
    }
}

/// A scripted in-memory transport.
#[cfg(test)]
pub(crate) mod mock {
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::io::{Error, ErrorKind, Result as IoResult};
    use std::rc::Rc;

    use super::Transport;
    use crate::frame;

    #[derive(Debug, Default)]
    pub(crate) struct MockState {
        /// Bytes the server sends after each successive connect.
        pub responses: VecDeque<Vec<u8>>,
        pub inbound: VecDeque<u8>,
        /// Every `write_all` call, in order.
        pub written: Vec<Vec<u8>>,
        pub connects: usize,
        pub closes: usize,
        pub open: bool,
        pub refuse_connect: bool,
        pub fail_writes: bool,
    }

    /// Clones share their state, so a test keeps one and hands the other out.
    #[derive(Clone, Debug, Default)]
    pub(crate) struct MockTransport(pub Rc<RefCell<MockState>>);

    pub(crate) fn polling_response(status: &str, body: &str) -> Vec<u8> {
        format!(
            "HTTP/1.1 {}\r\nContent-Type: text/plain; charset=UTF-8\r\nContent-Length: {}\r\n\r\n{}",
            status,
            body.len(),
            body
        )
        .into_bytes()
    }

    pub(crate) fn handshake_body(sid: &str, ping_interval_ms: u64) -> String {
        format!(
            "97:0{{\"sid\":\"{}\",\"upgrades\":[\"websocket\"],\"pingInterval\":{},\"pingTimeout\":60000}}",
            sid, ping_interval_ms
        )
    }

    pub(crate) fn upgrade_response(status: &str) -> Vec<u8> {
        format!(
            "HTTP/1.1 {}\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\r\n",
            status
        )
        .into_bytes()
    }

    impl MockTransport {
        /// A server that accepts the handshake with the given sid and interval.
        pub(crate) fn accepting(sid: &str, ping_interval_ms: u64) -> MockTransport {
            let mock = MockTransport::default();
            mock.script_handshake(sid, ping_interval_ms);
            mock
        }

        pub(crate) fn script_handshake(&self, sid: &str, ping_interval_ms: u64) {
            let mut state = self.0.borrow_mut();
            state
                .responses
                .push_back(polling_response("200 OK", &handshake_body(sid, ping_interval_ms)));
            state.responses.push_back(upgrade_response("101 Switching Protocols"));
        }

        /// Queues a server frame on the open connection.
        pub(crate) fn push_frame(&self, text: &str) {
            let bytes = frame::server_frame(text.as_bytes());
            self.0.borrow_mut().inbound.extend(bytes);
        }

        /// Decodes every client frame written since the last call.
        pub(crate) fn take_frames(&self) -> Vec<String> {
            let written: Vec<Vec<u8>> = self.0.borrow_mut().written.drain(..).collect();
            written
                .iter()
                .filter_map(|w| frame::decode_client_frame(w))
                .map(|(payload, _, _)| String::from_utf8(payload).unwrap())
                .collect()
        }

        pub(crate) fn written_text(&self) -> Vec<String> {
            self.0
                .borrow()
                .written
                .iter()
                .map(|w| String::from_utf8_lossy(w).into_owned())
                .collect()
        }
    }

    impl Transport for MockTransport {
        fn connect(&mut self, _host: &str, _port: u16, _trust_anchor: Option<&str>) -> IoResult<()> {
            let mut state = self.0.borrow_mut();
            state.connects += 1;
            if state.refuse_connect {
                return Err(Error::new(ErrorKind::ConnectionRefused, "refused"));
            }
            state.open = true;
            if let Some(response) = state.responses.pop_front() {
                state.inbound.extend(response);
            }
            Ok(())
        }

        fn connected(&self) -> bool {
            self.0.borrow().open
        }

        fn available(&mut self) -> IoResult<usize> {
            Ok(self.0.borrow().inbound.len())
        }

        fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
            let mut state = self.0.borrow_mut();
            let n = buf.len().min(state.inbound.len());
            for (slot, byte) in buf.iter_mut().zip(state.inbound.drain(..n)) {
                *slot = byte;
            }
            Ok(n)
        }

        fn write_all(&mut self, buf: &[u8]) -> IoResult<()> {
            let mut state = self.0.borrow_mut();
            if state.fail_writes || !state.open {
                state.open = false;
                return Err(Error::new(ErrorKind::BrokenPipe, "broken pipe"));
            }
            state.written.push(buf.to_vec());
            Ok(())
        }

        fn close(&mut self) {
            let mut state = self.0.borrow_mut();
            if state.open {
                state.closes += 1;
            }
            state.open = false;
            state.inbound.clear();
        }
    }
}
