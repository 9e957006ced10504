//! The state of the one session a client holds.

use std::time::{Duration, Instant};

use crate::transports::Handshake;

/// The state of a session.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConnectionState {
    /// No session. `service` keeps trying to connect if a target is known.
    Disconnected,

    /// Handshake and upgrade completed.
    Connected,
}

/// Where the client connects to.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Target {
    pub host: String,
    pub port: u16,
    pub trust_anchor: Option<String>,
}

impl Target {
    pub fn new(host: &str, port: u16, trust_anchor: Option<&str>) -> Target {
        Target {
            host: host.to_owned(),
            port: port,
            trust_anchor: trust_anchor.map(str::to_owned),
        }
    }
}

/// The negotiated session and its heartbeat clock.
#[derive(Clone, Debug)]
pub struct Session {
    target: Option<Target>,
    handshake: Option<Handshake>,
    last_ping: Option<Instant>,
    state: ConnectionState,
}

impl Session {
    pub fn new() -> Session {
        Session {
            target: None,
            handshake: None,
            last_ping: None,
            state: ConnectionState::Disconnected,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn target(&self) -> Option<&Target> {
        self.target.as_ref()
    }

    pub fn set_target(&mut self, target: Option<Target>) {
        self.target = target;
    }

    /// The session id, while connected.
    pub fn sid(&self) -> Option<&str> {
        self.handshake.as_ref().map(Handshake::sid)
    }

    /// The negotiated heartbeat interval, while connected.
    pub fn ping_interval(&self) -> Option<Duration> {
        self.handshake.as_ref().map(Handshake::ping_interval)
    }

    /// Records a completed handshake and restarts the heartbeat clock.
    pub fn establish(&mut self, handshake: Handshake, now: Instant) {
        self.handshake = Some(handshake);
        self.last_ping = Some(now);
        self.state = ConnectionState::Connected;
    }

    /// Forgets the negotiated session. The target is kept.
    pub fn drop_session(&mut self) {
        self.handshake = None;
        self.last_ping = None;
        self.state = ConnectionState::Disconnected;
    }

    /// Whether a ping is due at `now`.
    pub fn heartbeat_due(&self, now: Instant) -> bool {
        match (self.state, self.ping_interval(), self.last_ping) {
            (ConnectionState::Connected, Some(interval), Some(last)) => now.duration_since(last) >= interval,
            _ => false,
        }
    }

    pub fn record_ping(&mut self, now: Instant) {
        self.last_ping = Some(now);
    }
}

impl Default for Session {
    fn default() -> Session {
        Session::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_follows_interval() {
        let start = Instant::now();
        let mut session = Session::new();
        assert!(!session.heartbeat_due(start + Duration::from_secs(60)));

        session.establish(Handshake::new("sid".into(), Duration::from_secs(25)), start);
        assert_eq!(session.state(), ConnectionState::Connected);
        assert!(!session.heartbeat_due(start + Duration::from_secs(24)));
        assert!(session.heartbeat_due(start + Duration::from_secs(25)));

        session.record_ping(start + Duration::from_secs(25));
        assert!(!session.heartbeat_due(start + Duration::from_secs(30)));
    }

    #[test]
    fn dropping_the_session_keeps_the_target() {
        let mut session = Session::new();
        session.set_target(Some(Target::new("example.com", 80, None)));
        session.establish(Handshake::new("sid".into(), Duration::from_secs(1)), Instant::now());

        session.drop_session();
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert_eq!(session.sid(), None);
        assert_eq!(session.target().map(|t| t.port), Some(80));
    }
}
