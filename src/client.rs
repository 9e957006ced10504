use std::fmt::{Debug, Formatter, Result as FmtResult};

use crate::builder::{normalize_path, Builder};
use crate::clock::{Clock, SystemClock};
use crate::connection::{ConnectionState, Session, Target};
use crate::error::{EngineError, Result};
use crate::frame::{FrameDecoder, FrameEncoder, MaskSource, RandomMask};
use crate::handler::{Ack, AckRegistry, EventHandler, EventRegistry, Outbox};
use crate::packet::{Message, OpCode, Packet};
use crate::transports::{perform_handshake, HandshakeOptions, Transport};

use tracing::{debug, info, trace, warn};
use url::Url;

const READ_CHUNK: usize = 512;

/// A socket.io client driving one session over a [`Transport`](trait.Transport.html).
///
/// The client never spawns threads. Call [`service`](#method.service)
/// regularly from the main loop; it keeps the heartbeat going, delivers
/// inbound events to their handlers and reconnects after failures.
pub struct Client<T, C = SystemClock, M = RandomMask> {
    transport: T,
    clock: C,
    encoder: FrameEncoder<M>,
    decoder: FrameDecoder,
    options: HandshakeOptions,
    session: Session,
    events: EventRegistry,
    acks: AckRegistry,
    outbox: Outbox,
}

impl<T: Transport> Client<T> {
    /// Creates a client with default settings.
    ///
    /// Use a [`Builder`](struct.Builder.html) to change them.
    pub fn new(transport: T) -> Client<T> {
        Builder::new().build(transport)
    }
}

impl<T: Transport, C: Clock, M: MaskSource> Client<T, C, M> {
    pub(crate) fn from_parts(
        transport: T,
        clock: C,
        encoder: FrameEncoder<M>,
        decoder: FrameDecoder,
        acks: AckRegistry,
        options: HandshakeOptions,
    ) -> Client<T, C, M> {
        Client {
            transport: transport,
            clock: clock,
            encoder: encoder,
            decoder: decoder,
            options: options,
            session: Session::new(),
            events: EventRegistry::default(),
            acks: acks,
            outbox: Outbox::default(),
        }
    }

    /// Connects to the given endpoint, if the client isn't already connected.
    ///
    /// The endpoint is remembered, so that [`service`](#method.service)
    /// can reconnect to it later. Pending ack callbacks are dropped.
    pub fn connect(&mut self, host: &str, port: u16, trust_anchor: Option<&str>) -> Result<()> {
        if self.is_connected() {
            debug!("Already connected, not connecting to {}:{}", host, port);
            return Ok(());
        }
        self.session.set_target(Some(Target::new(host, port, trust_anchor)));
        self.open_session()
    }

    /// Connects to the endpoint named by an `http`, `https`, `ws` or `wss` URL.
    ///
    /// A URL path other than `/` replaces the configured endpoint path.
    pub fn connect_url(&mut self, url: &Url, trust_anchor: Option<&str>) -> Result<()> {
        let host = url.host_str().ok_or(EngineError::InvalidUrl("URL has no host"))?;
        let port = url
            .port_or_known_default()
            .ok_or(EngineError::InvalidUrl("URL has no port and an unknown scheme"))?;
        if url.path() != "/" && !url.path().is_empty() {
            self.options.path = normalize_path(url.path());
        }
        self.connect(host, port, trust_anchor)
    }

    /// Drops the current session, if any, and performs a fresh handshake
    /// with the last endpoint.
    pub fn reconnect(&mut self) -> Result<()> {
        self.open_session()
    }

    /// Closes the session and forgets the endpoint, so that `service`
    /// stops reconnecting. Pending ack callbacks are dropped.
    pub fn disconnect(&mut self) {
        if self.session.state() == ConnectionState::Connected {
            info!("Disconnecting session {:?}", self.session.sid());
        }
        self.mark_disconnected();
        self.acks.clear();
        self.outbox = Outbox::default();
        self.session.set_target(None);
    }

    /// Returns whether the session is established and the transport open.
    pub fn is_connected(&self) -> bool {
        self.session.state() == ConnectionState::Connected && self.transport.connected()
    }

    /// Gets the state of the session.
    pub fn state(&self) -> ConnectionState {
        self.session.state()
    }

    /// Gets the session id handed out by the server, while connected.
    pub fn sid(&self) -> Option<&str> {
        self.session.sid()
    }

    /// Gets the number of emissions still waiting for their ack.
    pub fn pending_acks(&self) -> usize {
        self.acks.len()
    }

    /// Gets the underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Does one round of connection upkeep.
    ///
    /// Reconnects to the last endpoint if the session was lost, sends a
    /// ping when the heartbeat interval has passed, reads and dispatches
    /// every frame that has arrived and sends queued ack replies. Errors
    /// are logged and never returned; a transport failure marks the
    /// session disconnected so that the next call reconnects.
    pub fn service(&mut self) {
        if !self.is_connected() {
            if self.session.state() == ConnectionState::Connected {
                warn!("Transport closed by the peer");
                self.mark_disconnected();
            }
            if self.session.target().is_none() {
                return;
            }
            if let Err(err) = self.open_session() {
                debug!("Reconnect failed: {}", err);
                return;
            }
        }

        let now = self.clock.now();
        if self.session.heartbeat_due(now) {
            trace!("Sending heartbeat");
            if let Err(err) = self.send_packet(&Packet::empty(OpCode::Ping)) {
                self.fail(&err);
                return;
            }
            self.session.record_ping(now);
        }

        if let Err(err) = self.receive().and_then(|_| self.flush_outbox()) {
            self.fail(&err);
        }
    }

    /// Emits an event.
    ///
    /// Payloads starting with `{` or `[` are sent as JSON, anything else
    /// as a JSON string. An empty payload sends the event name alone,
    /// `["event"]`, not `["event",""]`.
    pub fn emit(&mut self, event: &str, payload: &str) -> Result<()> {
        self.emit_message(Message::Event {
            id: None,
            event: event.to_owned(),
            data: Some(payload.to_owned()).filter(|p| !p.is_empty()),
        })
    }

    /// Emits an event and calls `callback` with the data of the server's ack.
    ///
    /// Returns the ack id the event was sent with.
    pub fn emit_with_ack<F: FnOnce(&str) + 'static>(&mut self, event: &str, payload: &str, callback: F) -> Result<u64> {
        if !self.is_connected() {
            return Err(EngineError::NotConnected);
        }
        let id = self.acks.insert(Box::new(callback));
        let result = self.emit_message(Message::Event {
            id: Some(id),
            event: event.to_owned(),
            data: Some(payload.to_owned()).filter(|p| !p.is_empty()),
        });
        match result {
            Ok(()) => Ok(id),
            Err(err) => {
                self.acks.remove(id);
                Err(err)
            }
        }
    }

    /// Emits a `message` event.
    pub fn send(&mut self, content: &str) -> Result<()> {
        self.emit("message", content)
    }

    /// Emits an event with a serialized payload.
    ///
    /// The value is sent exactly as `serde_json` writes it, the quoting
    /// rules of [`emit`](#method.emit) do not apply.
    #[cfg(feature = "serde-serialization")]
    pub fn emit_json<S: serde::Serialize + ?Sized>(&mut self, event: &str, value: &S) -> Result<()> {
        let body = format!(
            "{}[{},{}]",
            crate::packet::SocketOpCode::Event.string_repr(),
            serde_json::to_string(event)?,
            serde_json::to_string(value)?
        );
        self.emit_packet(Packet::new(OpCode::Message, body))
    }

    /// Registers the handler for an event, replacing any previous one.
    ///
    /// The events `connect` and `disconnect` are raised with empty data
    /// when the server sends the matching socket.io message.
    pub fn on<H: EventHandler + 'static>(&mut self, event: &str, handler: H) {
        self.events.insert(event, Box::new(handler));
    }

    /// Removes the handler for an event. Returns whether there was one.
    pub fn off(&mut self, event: &str) -> bool {
        self.events.remove(event)
    }

    /// Removes all event handlers.
    pub fn clear(&mut self) {
        self.events.clear();
    }

    fn open_session(&mut self) -> Result<()> {
        let target = self.session.target().cloned().ok_or(EngineError::NotConnected)?;
        self.mark_disconnected();
        if !self.acks.is_empty() {
            debug!("Dropping {} pending acks", self.acks.len());
        }
        self.acks.clear();
        // Acks handed out during the old session must not reach the new one.
        self.outbox = Outbox::default();

        let handshake = perform_handshake(
            &mut self.transport,
            &self.clock,
            &mut self.encoder,
            &self.options,
            &target.host,
            target.port,
            target.trust_anchor.as_deref(),
        )?;
        self.session.establish(handshake, self.clock.now());
        Ok(())
    }

    fn mark_disconnected(&mut self) {
        self.transport.close();
        self.session.drop_session();
        self.decoder.clear();
    }

    fn fail(&mut self, err: &EngineError) {
        warn!("Connection lost: {}", err);
        self.mark_disconnected();
    }

    fn emit_message(&mut self, message: Message) -> Result<()> {
        self.emit_packet(Packet::with_message(&message))
    }

    fn emit_packet(&mut self, packet: Packet) -> Result<()> {
        if !self.is_connected() {
            return Err(EngineError::NotConnected);
        }
        self.send_packet(&packet).map_err(|err| {
            self.fail(&err);
            err
        })
    }

    fn send_packet(&mut self, packet: &Packet) -> Result<()> {
        let text = packet.to_string();
        trace!("Sending {:?}", text);
        let frame = self.encoder.encode(text.as_bytes());
        self.transport.write_all(&frame)?;
        Ok(())
    }

    fn receive(&mut self) -> Result<()> {
        let mut chunk = [0u8; READ_CHUNK];
        while self.transport.available()? > 0 {
            let read = self.transport.read(&mut chunk)?;
            if read == 0 {
                break;
            }
            self.decoder.push(&chunk[..read]);
        }

        while let Some(frame) = self.decoder.next_frame() {
            let packet = match frame.text().map(Packet::from_str) {
                Some(Ok(packet)) => packet,
                Some(Err(err)) => {
                    warn!("Dropping frame: {}", err);
                    continue;
                }
                None => {
                    warn!("Dropping frame that is not valid UTF-8");
                    continue;
                }
            };
            self.handle_packet(packet)?;
            if self.session.state() != ConnectionState::Connected {
                break;
            }
        }
        Ok(())
    }

    fn handle_packet(&mut self, packet: Packet) -> Result<()> {
        trace!("Received {}", packet);
        match packet.opcode {
            OpCode::Ping => self.send_packet(&Packet::new(OpCode::Pong, packet.payload))?,
            OpCode::Pong => debug!("Heartbeat answered"),
            OpCode::Message => self.handle_message(&packet),
            OpCode::Close => {
                info!("Server closed session {:?}", self.session.sid());
                self.mark_disconnected();
            }
            OpCode::Open | OpCode::Upgrade | OpCode::Noop => debug!("Ignoring {:?} packet", packet.opcode),
        }
        Ok(())
    }

    fn handle_message(&mut self, packet: &Packet) {
        match packet.message() {
            Ok(Message::Connect) => self.deliver("connect", "", None),
            Ok(Message::Disconnect) => self.deliver("disconnect", "", None),
            Ok(Message::Event { id, event, data }) => self.deliver(&event, data.as_deref().unwrap_or(""), id),
            Ok(Message::Ack { id, data }) => {
                self.acks.resolve(id, data.as_deref().unwrap_or(""));
            }
            Err(EngineError::UnhandledMessageType(kind)) => {
                warn!("Dropping unsupported {:?} message {:?}", kind, packet.payload)
            }
            Err(err) => warn!("Dropping message {:?}: {}", packet.payload, err),
        }
    }

    fn deliver(&mut self, event: &str, data: &str, id: Option<u64>) {
        let ack = Ack::new(id, self.outbox.clone());
        self.events.dispatch(event, data, ack);
    }

    fn flush_outbox(&mut self) -> Result<()> {
        loop {
            let reply = self.outbox.borrow_mut().pop_front();
            match reply {
                Some(message) => self.send_packet(&Packet::with_message(&message))?,
                None => return Ok(()),
            }
        }
    }
}

impl<T, C, M> Debug for Client<T, C, M> {
    fn fmt(&self, formatter: &mut Formatter) -> FmtResult {
        write!(
            formatter,
            "Client {{ session: {:?}, events: {:?}, acks: {:?}, ... }}",
            self.session, self.events, self.acks
        )
    }
}
