//! Event handlers and pending acknowledgements.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::rc::Rc;

use crate::packet::Message;

use tracing::{debug, warn};

/// Default capacity of the pending ack registry.
pub const DEFAULT_MAX_PENDING_ACKS: usize = 64;

/// Handles one named event.
///
/// Closures taking the event data and an [`Ack`](struct.Ack.html)
/// implement this trait.
pub trait EventHandler {
    fn on_event(&mut self, data: &str, ack: Ack);
}

impl<F: FnMut(&str, Ack)> EventHandler for F {
    fn on_event(&mut self, data: &str, ack: Ack) {
        self(data, ack)
    }
}

/// Called once with the data of the matching ack.
pub type AckCallback = Box<dyn FnOnce(&str)>;

/// Ack replies queued by handlers, flushed by the client.
pub(crate) type Outbox = Rc<RefCell<VecDeque<Message>>>;

/// Lets a handler answer the event it was given.
///
/// The reply is sent when the client next services the connection.
/// Answering an event that did not ask for an ack does nothing.
pub struct Ack {
    id: Option<u64>,
    outbox: Outbox,
}

impl Ack {
    pub(crate) fn new(id: Option<u64>, outbox: Outbox) -> Ack {
        Ack {
            id: id,
            outbox: outbox,
        }
    }

    /// Whether the sender is waiting for a reply.
    pub fn is_requested(&self) -> bool {
        self.id.is_some()
    }

    /// Sends the reply.
    pub fn send(self, payload: &str) {
        match self.id {
            Some(id) => self.outbox.borrow_mut().push_back(Message::Ack {
                id: id,
                data: Some(payload.to_owned()).filter(|p| !p.is_empty()),
            }),
            None => debug!("Ignoring ack reply to an event without ack id"),
        }
    }
}

impl Debug for Ack {
    fn fmt(&self, formatter: &mut Formatter) -> FmtResult {
        formatter.debug_struct("Ack").field("id", &self.id).finish()
    }
}

/// Event name to handler. Names are case sensitive, registering a name
/// again replaces its handler.
#[derive(Default)]
pub struct EventRegistry {
    handlers: HashMap<String, Box<dyn EventHandler>>,
}

impl EventRegistry {
    pub fn insert(&mut self, event: &str, handler: Box<dyn EventHandler>) {
        self.handlers.insert(event.to_owned(), handler);
    }

    pub fn remove(&mut self, event: &str) -> bool {
        self.handlers.remove(event).is_some()
    }

    pub fn clear(&mut self) {
        self.handlers.clear();
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Hands the data to the handler registered for `event`.
    ///
    /// Returns `false` if there is none.
    pub fn dispatch(&mut self, event: &str, data: &str, ack: Ack) -> bool {
        match self.handlers.get_mut(event) {
            Some(handler) => {
                handler.on_event(data, ack);
                true
            }
            None => {
                debug!("No handler for event {:?}", event);
                false
            }
        }
    }
}

impl Debug for EventRegistry {
    fn fmt(&self, formatter: &mut Formatter) -> FmtResult {
        formatter
            .debug_set()
            .entries(self.handlers.keys())
            .finish()
    }
}

/// Callbacks waiting for their ack, keyed by ack id.
///
/// Ids come from a counter that starts at 1 and only goes up. The
/// registry holds at most `capacity` callbacks; making room drops the
/// oldest one, which is then never called.
pub struct AckRegistry {
    pending: BTreeMap<u64, AckCallback>,
    next_id: u64,
    capacity: usize,
}

impl AckRegistry {
    pub fn new(capacity: usize) -> AckRegistry {
        AckRegistry {
            pending: BTreeMap::new(),
            next_id: 1,
            capacity: capacity.max(1),
        }
    }

    /// Stores the callback under a fresh id and returns the id.
    pub fn insert(&mut self, callback: AckCallback) -> u64 {
        let id = self.next_id;
        self.next_id += 1;

        while self.pending.len() >= self.capacity {
            if let Some((evicted, _)) = self.pending.pop_first() {
                warn!("Ack registry full, dropping callback for ack {}", evicted);
            }
        }
        self.pending.insert(id, callback);
        id
    }

    /// Removes the callback for `id` without calling it.
    pub fn remove(&mut self, id: u64) -> bool {
        self.pending.remove(&id).is_some()
    }

    /// Calls and removes the callback for `id`.
    ///
    /// Returns `false` for unknown ids.
    pub fn resolve(&mut self, id: u64, data: &str) -> bool {
        match self.pending.remove(&id) {
            Some(callback) => {
                callback(data);
                true
            }
            None => {
                debug!("Dropping ack {} nobody waits for", id);
                false
            }
        }
    }

    /// Drops all pending callbacks. Ids are not reused afterwards.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn contains(&self, id: u64) -> bool {
        self.pending.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl Default for AckRegistry {
    fn default() -> AckRegistry {
        AckRegistry::new(DEFAULT_MAX_PENDING_ACKS)
    }
}

impl Debug for AckRegistry {
    fn fmt(&self, formatter: &mut Formatter) -> FmtResult {
        formatter
            .debug_struct("AckRegistry")
            .field("pending", &self.pending.keys().collect::<Vec<_>>())
            .field("next_id", &self.next_id)
            .field("capacity", &self.capacity)
            .finish()
    }
}
