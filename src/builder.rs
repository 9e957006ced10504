//! The module that contains the code for the client builder.

use std::time::Duration;

use crate::client::Client;
use crate::clock::{Clock, SystemClock};
use crate::frame::{FrameDecoder, FrameEncoder, MaskSource, RandomMask, DEFAULT_MAX_FRAME_LEN};
use crate::handler::{AckRegistry, DEFAULT_MAX_PENDING_ACKS};
use crate::transports::{HandshakeOptions, Transport};

/// A builder for a socket.io client.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Builder {
    options: HandshakeOptions,
    max_frame_len: usize,
    max_pending_acks: usize,
    mask_seed: Option<u64>,
}

impl Builder {
    /// Creates a new [`Builder`](struct.Builder.html) with default settings.
    pub fn new() -> Self {
        Builder {
            options: HandshakeOptions::default(),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            max_pending_acks: DEFAULT_MAX_PENDING_ACKS,
            mask_seed: None,
        }
    }

    /// Builds a client on the given transport using the system clock and
    /// randomly seeded masks, unless [`Builder::mask_seed`](#method.mask_seed)
    /// was set.
    pub fn build<T: Transport>(self, transport: T) -> Client<T> {
        let masks = match self.mask_seed {
            Some(seed) => RandomMask::seeded(seed),
            None => RandomMask::new(),
        };
        self.build_with(transport, SystemClock, masks)
    }

    /// Builds a client with an explicit clock and mask source.
    pub fn build_with<T: Transport, C: Clock, M: MaskSource>(self, transport: T, clock: C, masks: M) -> Client<T, C, M> {
        Client::from_parts(
            transport,
            clock,
            FrameEncoder::new(masks),
            FrameDecoder::new(self.max_frame_len),
            AckRegistry::new(self.max_pending_acks),
            self.options,
        )
    }

    /// Sets the `Origin` header sent with both handshake requests.
    pub fn origin(mut self, origin: &str) -> Self {
        self.options.origin = origin.to_owned();
        self
    }

    /// Sets the path of the socket.io endpoint.
    ///
    /// Defaults to `/socket.io/1/`. Leading and trailing slashes are added
    /// if missing.
    pub fn path(mut self, path: &str) -> Self {
        self.options.path = normalize_path(path);
        self
    }

    /// Sets how long each handshake phase waits for the server to answer.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = timeout;
        self
    }

    /// Sets the longest HTTP response line accepted during the handshake.
    pub fn max_line_len(mut self, len: usize) -> Self {
        self.options.max_line_len = len;
        self
    }

    /// Sets the largest inbound frame payload. Larger frames are skipped.
    pub fn max_frame_len(mut self, len: usize) -> Self {
        self.max_frame_len = len;
        self
    }

    /// Sets how many emissions may wait for their ack at once. When the
    /// limit is hit, the oldest waiting callback is dropped.
    pub fn max_pending_acks(mut self, count: usize) -> Self {
        self.max_pending_acks = count;
        self
    }

    /// Seeds the mask generator, making the emitted frames reproducible.
    pub fn mask_seed(mut self, seed: u64) -> Self {
        self.mask_seed = Some(seed);
        self
    }
}

impl Default for Builder {
    fn default() -> Self {
        Builder::new()
    }
}

pub(crate) fn normalize_path(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_owned()
    } else {
        format!("/{}/", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_is_normalized() {
        assert_eq!(normalize_path("socket.io/1"), "/socket.io/1/");
        assert_eq!(normalize_path("/io/"), "/io/");
        assert_eq!(normalize_path(""), "/");
    }

    #[test]
    fn setters_override_defaults() {
        let builder = Builder::new()
            .origin("esp32")
            .path("chat")
            .handshake_timeout(Duration::from_secs(5))
            .max_line_len(1024)
            .max_frame_len(2048)
            .max_pending_acks(8)
            .mask_seed(99);

        assert_eq!(builder.options.origin, "esp32");
        assert_eq!(builder.options.path, "/chat/");
        assert_eq!(builder.options.timeout, Duration::from_secs(5));
        assert_eq!(builder.options.max_line_len, 1024);
        assert_eq!(builder.max_frame_len, 2048);
        assert_eq!(builder.max_pending_acks, 8);
        assert_eq!(builder.mask_seed, Some(99));
        assert_eq!(Builder::default(), Builder::new());
    }
}
