//! A socket.io v1 client for small devices, written in and for Rust.
//!
//! The client runs over any byte stream implementing
//! [`Transport`](trait.Transport.html), performs the polling handshake and
//! websocket upgrade itself and is driven from the caller's main loop:
//!
//! ```no_run
//! use socketio::{Ack, Client, TcpTransport};
//!
//! let mut client = Client::new(TcpTransport::new());
//! client.on("news", |data: &str, _ack: Ack| println!("news: {}", data));
//! client.connect("localhost", 3000, None).unwrap();
//! client.emit("hello", "world").unwrap();
//!
//! loop {
//!     client.service();
//! }
//! ```

mod builder;
mod client;
mod clock;
mod connection;
mod error;
mod frame;
mod handler;
mod packet;
mod parser;
mod transports;

pub use crate::builder::Builder;
pub use crate::client::Client;
pub use crate::clock::{Clock, ManualClock, SystemClock};
pub use crate::connection::ConnectionState;
pub use crate::error::{EngineError, Result};
pub use crate::frame::{FixedMask, Frame, FrameDecoder, FrameEncoder, MaskSource, RandomMask};
pub use crate::handler::{Ack, AckCallback, EventHandler};
pub use crate::packet::{Message, OpCode, Packet, SocketOpCode};
pub use crate::parser::PacketBody;
pub use crate::transports::{Handshake, TcpTransport, Transport};
