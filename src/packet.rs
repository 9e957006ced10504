use std::fmt::{Display, Formatter, Result as FmtResult};

use crate::error::{EngineError, Result};
use crate::parser::PacketBody;

/// An engine.io message, as carried by one websocket frame.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Packet {
    pub opcode: OpCode,
    pub payload: String,
}

impl Packet {
    /// Constructs a new `Packet`.
    pub fn new(opcode: OpCode, payload: String) -> Packet {
        Packet {
            opcode: opcode,
            payload: payload,
        }
    }

    /// Constructs a new `Packet` without payload.
    pub fn empty(opcode: OpCode) -> Packet {
        Packet::new(opcode, String::new())
    }

    /// Constructs an engine.io `Message` packet carrying the given socket.io message.
    pub fn with_message(message: &Message) -> Packet {
        Packet::new(OpCode::Message, message.to_string())
    }

    /// Parses a `Packet` from a string slice.
    pub fn from_str(buf: &str) -> Result<Packet> {
        let mut chars = buf.chars();
        match chars.next() {
            Some(ch) => {
                let opcode = OpCode::parse_char(ch)?;
                Ok(Packet::new(opcode, chars.as_str().to_owned()))
            }
            None => Err(EngineError::malformed("empty engine.io packet")),
        }
    }

    /// Decodes the socket.io message nested in a `Message` packet.
    pub fn message(&self) -> Result<Message> {
        if self.opcode != OpCode::Message {
            return Err(EngineError::malformed(format!(
                "engine.io {:?} packet carries no socket.io message",
                self.opcode
            )));
        }
        Message::parse(&self.payload)
    }
}

impl Display for Packet {
    fn fmt(&self, formatter: &mut Formatter) -> FmtResult {
        write!(formatter, "{}{}", self.opcode.string_repr(), self.payload)
    }
}

/// An engine.io message opcode.
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
#[repr(u8)]
pub enum OpCode {
    /// Sent from the server when a new connection is opened.
    Open = 0,

    /// Requests the shutdown of the connection.
    Close = 1,

    /// A ping message sent by the client. The server will respond with
    /// a `Pong` message containing the same data.
    Ping = 2,

    /// The answer to a ping message.
    Pong = 3,

    /// An actual data message, wrapping a socket.io message.
    Message = 4,

    /// Sent by the client once the websocket is up, asking the server
    /// to flush its cache on the polling transport and switch over.
    Upgrade = 5,

    /// A noop packet. Used for forcing a polling cycle.
    Noop = 6,
}

impl OpCode {
    /// Creates a new OpCode from the given scalar value.
    pub fn from_scalar(value: u8) -> Result<OpCode> {
        match value {
            0 => Ok(OpCode::Open),
            1 => Ok(OpCode::Close),
            2 => Ok(OpCode::Ping),
            3 => Ok(OpCode::Pong),
            4 => Ok(OpCode::Message),
            5 => Ok(OpCode::Upgrade),
            6 => Ok(OpCode::Noop),
            _ => Err(EngineError::malformed(format!("invalid engine.io opcode {}", value))),
        }
    }

    /// Tries to parse an OpCode from a scalar value encoded as char.
    pub fn parse_char(value: char) -> Result<OpCode> {
        match value.to_digit(10) {
            Some(d) => OpCode::from_scalar(d as u8),
            None => Err(EngineError::malformed(format!("invalid engine.io opcode {:?}", value))),
        }
    }

    /// Gets the string representation of the OpCode.
    pub fn string_repr(&self) -> String {
        (*self as u8).to_string()
    }
}

/// A socket.io message type, nested in an engine.io `Message`.
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
#[repr(u8)]
pub enum SocketOpCode {
    Connect = 0,
    Disconnect = 1,
    Event = 2,
    Ack = 3,
    Error = 4,
    BinaryEvent = 5,
    BinaryAck = 6,
}

impl SocketOpCode {
    /// Tries to parse a SocketOpCode from a scalar value encoded as char.
    pub fn parse_char(value: char) -> Result<SocketOpCode> {
        match value {
            '0' => Ok(SocketOpCode::Connect),
            '1' => Ok(SocketOpCode::Disconnect),
            '2' => Ok(SocketOpCode::Event),
            '3' => Ok(SocketOpCode::Ack),
            '4' => Ok(SocketOpCode::Error),
            '5' => Ok(SocketOpCode::BinaryEvent),
            '6' => Ok(SocketOpCode::BinaryAck),
            _ => Err(EngineError::malformed(format!("invalid socket.io message type {:?}", value))),
        }
    }

    /// Gets the string representation of the SocketOpCode.
    pub fn string_repr(&self) -> String {
        (*self as u8).to_string()
    }
}

/// A socket.io message.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Message {
    /// The server accepted the connection.
    Connect,

    /// The server closed the connection.
    Disconnect,

    /// A named event, optionally expecting an ack.
    Event {
        id: Option<u64>,
        event: String,
        data: Option<String>,
    },

    /// The reply to an event that carried an ack id.
    Ack { id: u64, data: Option<String> },
}

impl Message {
    /// Parses the socket.io part of an engine.io `Message` payload.
    ///
    /// Error and binary messages are recognized but rejected with
    /// `EngineError::UnhandledMessageType`.
    pub fn parse(buf: &str) -> Result<Message> {
        let mut chars = buf.chars();
        let kind = match chars.next() {
            Some(ch) => SocketOpCode::parse_char(ch)?,
            None => return Err(EngineError::malformed("empty socket.io message")),
        };
        let body = chars.as_str();

        match kind {
            SocketOpCode::Connect => Ok(Message::Connect),
            SocketOpCode::Disconnect => Ok(Message::Disconnect),
            SocketOpCode::Event => {
                let body = PacketBody::parse(body)?;
                Ok(Message::Event {
                    id: body.ack_id(),
                    event: body.event,
                    data: Some(body.data).filter(|d| !d.is_empty()),
                })
            }
            SocketOpCode::Ack => {
                let body = PacketBody::parse_ack(body)?;
                let id = body
                    .ack_id()
                    .ok_or_else(|| EngineError::malformed("ack without id"))?;
                Ok(Message::Ack {
                    id: id,
                    data: Some(body.data).filter(|d| !d.is_empty()),
                })
            }
            other => Err(EngineError::UnhandledMessageType(other)),
        }
    }

    /// Gets the message type.
    pub fn kind(&self) -> SocketOpCode {
        match *self {
            Message::Connect => SocketOpCode::Connect,
            Message::Disconnect => SocketOpCode::Disconnect,
            Message::Event { .. } => SocketOpCode::Event,
            Message::Ack { .. } => SocketOpCode::Ack,
        }
    }
}

/// Writes a payload as a JSON array element. Payloads that already look
/// like JSON objects or arrays are written as is, everything else is
/// wrapped in quotes.
fn write_data(formatter: &mut Formatter, data: &str) -> FmtResult {
    if data.starts_with('{') || data.starts_with('[') {
        write!(formatter, "{}", data)
    } else {
        write!(formatter, "\"{}\"", data)
    }
}

impl Display for Message {
    fn fmt(&self, formatter: &mut Formatter) -> FmtResult {
        write!(formatter, "{}", self.kind().string_repr())?;
        match *self {
            Message::Connect | Message::Disconnect => Ok(()),
            Message::Event { id, ref event, ref data } => {
                if let Some(id) = id {
                    write!(formatter, "{}", id)?;
                }
                write!(formatter, "[\"{}\"", event)?;
                if let Some(ref data) = *data {
                    write!(formatter, ",")?;
                    write_data(formatter, data)?;
                }
                write!(formatter, "]")
            }
            Message::Ack { id, ref data } => {
                write!(formatter, "{}[", id)?;
                if let Some(ref data) = *data {
                    write_data(formatter, data)?;
                }
                write!(formatter, "]")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_from_int_scalar() {
        assert_eq!(OpCode::Ping, OpCode::from_scalar(2).expect("Could not parse OpCode from int scalar."));
        assert!(OpCode::from_scalar(7).is_err());
    }

    #[test]
    fn opcode_from_char_scalar() {
        assert_eq!(OpCode::Ping, OpCode::parse_char('2').expect("Could not parse OpCode from char scalar."));
        assert!(OpCode::parse_char('7').is_err());
        assert!(OpCode::parse_char('x').is_err());
    }

    #[test]
    fn opcode_string_repr() {
        assert_eq!(OpCode::Open.string_repr(), "0");
        assert_eq!(OpCode::Close.string_repr(), "1");
        assert_eq!(OpCode::Ping.string_repr(), "2");
        assert_eq!(OpCode::Pong.string_repr(), "3");
        assert_eq!(OpCode::Message.string_repr(), "4");
        assert_eq!(OpCode::Upgrade.string_repr(), "5");
        assert_eq!(OpCode::Noop.string_repr(), "6");
    }

    #[test]
    fn packet_string_encoding() {
        assert_eq!(Packet::empty(OpCode::Ping).to_string(), "2");
        assert_eq!(Packet::new(OpCode::Message, "hello".into()).to_string(), "4hello");
    }

    #[test]
    fn packet_decoding() {
        let p = Packet::from_str("3probe").expect("Failed to parse packet.");
        assert_eq!(p.opcode, OpCode::Pong);
        assert_eq!(p.payload, "probe");
        assert!(Packet::from_str("").is_err());
        assert!(Packet::from_str("9").is_err());
    }

    #[test]
    fn event_encoding() {
        let plain = Message::Event { id: None, event: "x".into(), data: Some("y".into()) };
        assert_eq!(Packet::with_message(&plain).to_string(), "42[\"x\",\"y\"]");

        let json = Message::Event { id: Some(3), event: "x".into(), data: Some("{\"a\":1}".into()) };
        assert_eq!(Packet::with_message(&json).to_string(), "423[\"x\",{\"a\":1}]");

        let bare = Message::Event { id: None, event: "ping".into(), data: None };
        assert_eq!(bare.to_string(), "2[\"ping\"]");
    }

    #[test]
    fn ack_encoding() {
        let ack = Message::Ack { id: 12, data: Some("done".into()) };
        assert_eq!(Packet::with_message(&ack).to_string(), "4312[\"done\"]");
        assert_eq!(Message::Ack { id: 1, data: None }.to_string(), "31[]");
    }

    #[test]
    fn message_decoding() {
        assert_eq!(Message::parse("0").unwrap(), Message::Connect);
        assert_eq!(Message::parse("0/chat").unwrap(), Message::Connect);
        assert_eq!(Message::parse("1").unwrap(), Message::Disconnect);
        assert_eq!(
            Message::parse("29[\"news\",{\"hello\":\"world\"}]").unwrap(),
            Message::Event {
                id: Some(9),
                event: "news".into(),
                data: Some("{\"hello\":\"world\"}".into())
            }
        );
        assert_eq!(
            Message::parse("34[\"ok\"]").unwrap(),
            Message::Ack { id: 4, data: Some("ok".into()) }
        );
    }

    #[test]
    fn unhandled_message_types() {
        for (raw, kind) in [
            ("4\"oops\"", SocketOpCode::Error),
            ("51-[\"bin\"]", SocketOpCode::BinaryEvent),
            ("61-1[]", SocketOpCode::BinaryAck),
        ] {
            match Message::parse(raw) {
                Err(EngineError::UnhandledMessageType(k)) => assert_eq!(k, kind),
                other => panic!("unexpected result {:?}", other),
            }
        }
    }

    #[test]
    fn ack_without_id_is_malformed() {
        assert!(matches!(Message::parse("3[\"ok\"]"), Err(EngineError::MalformedPacket(_))));
    }

    #[test]
    fn nested_message_requires_message_opcode() {
        assert!(Packet::empty(OpCode::Ping).message().is_err());
        let p = Packet::from_str("40").unwrap();
        assert_eq!(p.message().unwrap(), Message::Connect);
    }
}
