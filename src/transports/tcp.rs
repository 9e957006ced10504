//! A plain TCP transport on top of `std::net`.

use std::io::{Error, ErrorKind, Read, Result as IoResult, Write};
use std::net::{Shutdown, TcpStream};

use crate::transports::Transport;

use tracing::trace;

const READ_CHUNK: usize = 512;

/// A non-TLS transport. Reads are buffered so that `available` can be
/// answered without blocking.
#[derive(Debug, Default)]
pub struct TcpTransport {
    stream: Option<TcpStream>,
    buf: Vec<u8>,
    eof: bool,
}

impl TcpTransport {
    pub fn new() -> TcpTransport {
        TcpTransport::default()
    }

    fn stream(&mut self) -> IoResult<&mut TcpStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| Error::new(ErrorKind::NotConnected, "transport is not connected"))
    }

    /// Moves whatever the socket has ready into the buffer.
    fn fill(&mut self) -> IoResult<()> {
        if self.eof {
            return Ok(());
        }
        let mut chunk = [0u8; READ_CHUNK];
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| Error::new(ErrorKind::NotConnected, "transport is not connected"))?;
        stream.set_nonblocking(true)?;
        let result = loop {
            match stream.read(&mut chunk) {
                Ok(0) => break Ok(Some(0)),
                Ok(n) => {
                    self.buf.extend_from_slice(&chunk[..n]);
                    if n < READ_CHUNK {
                        break Ok(None);
                    }
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => break Ok(None),
                Err(ref e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => break Err(e),
            }
        };
        stream.set_nonblocking(false)?;
        if let Some(0) = result? {
            trace!("Peer closed the connection");
            self.eof = true;
        }
        Ok(())
    }
}

impl Transport for TcpTransport {
    fn connect(&mut self, host: &str, port: u16, trust_anchor: Option<&str>) -> IoResult<()> {
        if trust_anchor.is_some() {
            return Err(Error::new(
                ErrorKind::Unsupported,
                "TcpTransport does not speak TLS, use a TLS capable transport",
            ));
        }
        self.close();
        let stream = TcpStream::connect((host, port))?;
        stream.set_nodelay(true)?;
        self.stream = Some(stream);
        Ok(())
    }

    fn connected(&self) -> bool {
        self.stream.is_some() && (!self.eof || !self.buf.is_empty())
    }

    fn available(&mut self) -> IoResult<usize> {
        if self.stream.is_some() {
            self.fill()?;
        }
        Ok(self.buf.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        if self.buf.is_empty() {
            self.fill()?;
        }
        let n = buf.len().min(self.buf.len());
        buf[..n].copy_from_slice(&self.buf[..n]);
        self.buf.drain(..n);
        Ok(n)
    }

    fn write_all(&mut self, buf: &[u8]) -> IoResult<()> {
        let stream = self.stream()?;
        stream.write_all(buf)?;
        stream.flush()
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.buf.clear();
        self.eof = false;
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;
    use std::thread;

    use super::*;

    #[test]
    fn tls_is_rejected() {
        let mut transport = TcpTransport::new();
        let err = transport.connect("localhost", 443, Some("-----BEGIN CERTIFICATE-----")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
        assert!(!transport.connected());
    }

    #[test]
    fn reads_what_the_peer_sent() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            conn.write_all(b"hello").unwrap();
        });

        let mut transport = TcpTransport::new();
        transport.connect("127.0.0.1", port, None).unwrap();
        server.join().unwrap();

        let mut buf = [0u8; 16];
        let mut got = Vec::new();
        while got.len() < 5 {
            if transport.available().unwrap() > 0 {
                let n = transport.read(&mut buf).unwrap();
                got.extend_from_slice(&buf[..n]);
            }
        }
        assert_eq!(got, b"hello");

        // The peer is gone and everything has been read.
        while transport.connected() {
            transport.available().unwrap();
        }
    }
}
