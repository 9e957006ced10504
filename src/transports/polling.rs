//! The HTTP long polling phase of the handshake.
//!
//! A single polling request creates the session. Its response carries
//! the session id and the heartbeat interval, after which the connection
//! is closed; the server does not keep it around for the upgrade.

use std::time::Duration;

use crate::clock::Clock;
use crate::error::{EngineError, Result};
use crate::transports::{wait_for_input, Handshake, HandshakeOptions, LineReader, Transport};

use tracing::debug;

const SID_MARKER: &str = "sid\":\"";
const PING_INTERVAL_MARKER: &str = "pingInterval\":";

/// Requests a new session and closes the transport again.
pub fn handshake<T: Transport, C: Clock>(
    transport: &mut T,
    clock: &C,
    options: &HandshakeOptions,
    host: &str,
    port: u16,
    trust_anchor: Option<&str>,
) -> Result<Handshake> {
    transport.connect(host, port, trust_anchor)?;
    let request = format!(
        "GET {}?transport=polling&b64=true HTTP/1.1\r\nHost: {}\r\nOrigin: {}\r\n\r\n",
        options.path, host, options.origin
    );
    let result = transport
        .write_all(request.as_bytes())
        .map_err(EngineError::from)
        .and_then(|_| read_response(transport, clock, options));
    transport.close();
    result
}

fn read_response<T: Transport, C: Clock>(transport: &mut T, clock: &C, options: &HandshakeOptions) -> Result<Handshake> {
    wait_for_input(transport, clock, options.timeout)?;

    let mut reader = LineReader::new(options);
    let status = reader.read_status(transport, clock)?;
    if status != 200 {
        return Err(EngineError::HandshakeRejected(status));
    }

    match reader.read_headers(transport, clock)? {
        Some(len) => parse_body(&reader.read_exact(transport, clock, len)?),
        None => loop {
            // Chunked bodies put the chunk size on a line of its own.
            let line = reader.read_line(transport, clock)?;
            if line.contains(SID_MARKER) {
                break parse_body(&line);
            }
            debug!("Skipping handshake body line {:?}", line);
        },
    }
}

/// Extracts the session id and ping interval from a handshake body.
///
/// The body is JSON, but only these two fields matter, so they are
/// located by their markers instead of decoding the whole document.
pub fn parse_body(body: &str) -> Result<Handshake> {
    let sid = value_after(body, SID_MARKER, '"').ok_or(EngineError::MalformedHandshake("missing sid"))?;
    if sid.is_empty() {
        return Err(EngineError::MalformedHandshake("empty sid"));
    }

    let interval = value_after(body, PING_INTERVAL_MARKER, ',')
        .or_else(|| value_after(body, PING_INTERVAL_MARKER, '}'))
        .ok_or(EngineError::MalformedHandshake("missing pingInterval"))?;
    let interval: u64 = interval
        .trim()
        .parse()
        .map_err(|_| EngineError::MalformedHandshake("invalid pingInterval"))?;

    Ok(Handshake::new(sid.to_owned(), Duration::from_millis(interval)))
}

fn value_after<'a>(body: &'a str, marker: &str, end: char) -> Option<&'a str> {
    let start = body.find(marker)? + marker.len();
    let rest = &body[start..];
    rest.find(end).map(|stop| &rest[..stop])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::transports::mock::*;

    #[test]
    fn parses_sid_and_interval() {
        let hs = parse_body(&handshake_body("Xy_9-z", 25000)).unwrap();
        assert_eq!(hs.sid(), "Xy_9-z");
        assert_eq!(hs.ping_interval(), Duration::from_secs(25));
    }

    #[test]
    fn interval_may_be_the_last_field() {
        let hs = parse_body("0{\"sid\":\"a\",\"pingInterval\":5000}").unwrap();
        assert_eq!(hs.ping_interval(), Duration::from_secs(5));
    }

    #[test]
    fn missing_interval_is_fatal() {
        match parse_body("0{\"sid\":\"abc\",\"pingTimeout\":60000}") {
            Err(EngineError::MalformedHandshake(reason)) => assert!(reason.contains("pingInterval")),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn garbage_interval_is_fatal() {
        assert!(matches!(
            parse_body("0{\"sid\":\"abc\",\"pingInterval\":\"soon\",}"),
            Err(EngineError::MalformedHandshake(_))
        ));
    }

    #[test]
    fn missing_sid_is_fatal() {
        assert!(matches!(
            parse_body("0{\"pingInterval\":25000,}"),
            Err(EngineError::MalformedHandshake(_))
        ));
    }

    #[test]
    fn chunked_body_is_searched_for_the_sid() {
        let mut mock = MockTransport::default();
        let body = handshake_body("chunky", 1000);
        let response = format!(
            "HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n{:x}\r\n{}\r\n0\r\n\r\n",
            body.len(),
            body
        );
        mock.0.borrow_mut().responses.push_back(response.into_bytes());

        let hs = handshake(&mut mock, &ManualClock::new(), &HandshakeOptions::default(), "h", 80, None).unwrap();
        assert_eq!(hs.sid(), "chunky");
        assert!(!mock.connected());
    }

    #[test]
    fn request_uses_configured_path_and_origin() {
        let mut mock = MockTransport::default();
        mock.0
            .borrow_mut()
            .responses
            .push_back(polling_response("200 OK", &handshake_body("s", 1000)));
        let options = HandshakeOptions {
            origin: "sensor-7".to_owned(),
            path: "/io/".to_owned(),
            ..HandshakeOptions::default()
        };

        handshake(&mut mock, &ManualClock::new(), &options, "10.0.0.2", 8080, None).unwrap();
        let request = &mock.written_text()[0];
        assert!(request.starts_with("GET /io/?transport=polling&b64=true HTTP/1.1\r\n"));
        assert!(request.contains("Host: 10.0.0.2\r\n"));
        assert!(request.contains("Origin: sensor-7\r\n"));
        assert!(request.ends_with("\r\n\r\n"));
    }
}
