//! The websocket upgrade phase of the handshake.
//!
//! A second connection is opened and switched to websocket framing with
//! an HTTP Upgrade request bound to the session via the `io` cookie. The
//! client then confirms the upgrade with an engine.io `Upgrade` packet.

use crate::clock::Clock;
use crate::error::{EngineError, Result};
use crate::frame::{FrameEncoder, MaskSource};
use crate::packet::{OpCode, Packet};
use crate::transports::{wait_for_input, Handshake, HandshakeOptions, LineReader, Transport};

use tracing::debug;

/// The `Sec-WebSocket-Key` sent with every upgrade.
///
/// The accept header of the response is not verified, so the key does
/// not need to be random.
pub const WEBSOCKET_KEY: &str = "dGhlIHNhbXBsZSBub25jZQ==";

/// Reopens the transport and upgrades it to websocket framing.
#[allow(clippy::too_many_arguments)]
pub fn upgrade<T: Transport, C: Clock, M: MaskSource>(
    transport: &mut T,
    clock: &C,
    encoder: &mut FrameEncoder<M>,
    options: &HandshakeOptions,
    host: &str,
    port: u16,
    trust_anchor: Option<&str>,
    handshake: &Handshake,
) -> Result<()> {
    transport.connect(host, port, trust_anchor)?;
    transport.write_all(upgrade_request(options, host, handshake.sid()).as_bytes())?;

    wait_for_input(transport, clock, options.timeout)?;
    let mut reader = LineReader::new(options);
    let status = reader.read_status(transport, clock)?;
    if status != 101 {
        return Err(EngineError::UpgradeRejected(status));
    }
    // Frames the server sends right away stay on the transport.
    reader.read_headers(transport, clock)?;

    let confirm = Packet::empty(OpCode::Upgrade).to_string();
    transport.write_all(&encoder.encode(confirm.as_bytes()))?;
    debug!("Upgraded session {} to websocket", handshake.sid());
    Ok(())
}

fn upgrade_request(options: &HandshakeOptions, host: &str, sid: &str) -> String {
    format!(
        "GET {path}websocket/?transport=websocket&b64=true&sid={sid} HTTP/1.1\r\n\
         Host: {host}\r\n\
         Sec-WebSocket-Version: 13\r\n\
         Origin: {origin}\r\n\
         Sec-WebSocket-Key: {key}\r\n\
         Cookie: io={sid}\r\n\
         Connection: Upgrade\r\n\
         Upgrade: websocket\r\n\r\n",
        path = options.path,
        sid = sid,
        host = host,
        origin = options.origin,
        key = WEBSOCKET_KEY
    )
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::clock::ManualClock;
    use crate::frame::{self, FixedMask};
    use crate::transports::mock::*;

    #[test]
    fn request_headers() {
        let request = upgrade_request(&HandshakeOptions::default(), "example.com", "s1d");
        let lines: Vec<&str> = request.split("\r\n").collect();
        assert_eq!(lines[0], "GET /socket.io/1/websocket/?transport=websocket&b64=true&sid=s1d HTTP/1.1");
        assert!(lines.contains(&"Host: example.com"));
        assert!(lines.contains(&"Sec-WebSocket-Version: 13"));
        assert!(lines.contains(&"Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ=="));
        assert!(lines.contains(&"Cookie: io=s1d"));
        assert!(lines.contains(&"Connection: Upgrade"));
        assert!(lines.contains(&"Upgrade: websocket"));
        assert!(request.ends_with("\r\n\r\n"));
    }

    #[test]
    fn frames_after_headers_stay_unread() {
        let mut mock = MockTransport::default();
        let mut response = upgrade_response("101 Switching Protocols");
        response.extend(frame::server_frame(b"40"));
        mock.0.borrow_mut().responses.push_back(response);

        let handshake = Handshake::new("s".into(), Duration::from_secs(25));
        let mut encoder = FrameEncoder::new(FixedMask(*b"1111"));
        upgrade(
            &mut mock,
            &ManualClock::new(),
            &mut encoder,
            &HandshakeOptions::default(),
            "h",
            80,
            None,
            &handshake,
        )
        .unwrap();

        assert_eq!(mock.0.borrow().inbound.len(), 4);
        assert_eq!(mock.take_frames(), vec!["5".to_owned()]);
    }
}
