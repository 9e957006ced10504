//! The websocket framing used once the connection has been upgraded.
//!
//! Only single, final text frames are produced and consumed:
//!
//! ```text
//! client -> server: [0x81][len | 0x80][ext len?][4 byte mask][masked payload]
//! server -> client: [0x81][len]       [ext len?]             [payload]
//! ```
//!
//! `len` is the payload length when it is at most 125. Longer payloads set
//! it to 126 followed by a 16 bit length, or to 127 followed by a 64 bit
//! length, both big endian.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, trace};

/// First byte of a final text frame.
pub const FINAL_TEXT: u8 = 0x81;

const MASK_BIT: u8 = 0x80;
const LEN_16: u8 = 126;
const LEN_64: u8 = 127;

/// Default upper bound for an inbound frame payload.
pub const DEFAULT_MAX_FRAME_LEN: usize = 1 << 20;

/// Produces the masking keys for outgoing frames.
///
/// Masks only need to differ between frames, they carry no
/// cryptographic weight.
pub trait MaskSource {
    /// Returns the key for the next frame.
    fn next_mask(&mut self) -> [u8; 4];
}

/// Masks made of random ASCII digits, drawn from an explicitly seeded PRNG.
#[derive(Clone, Debug)]
pub struct RandomMask(StdRng);

impl RandomMask {
    /// Seeds the generator from the operating system.
    pub fn new() -> RandomMask {
        RandomMask(StdRng::from_entropy())
    }

    /// Seeds the generator with a fixed value, for reproducible masks.
    pub fn seeded(seed: u64) -> RandomMask {
        RandomMask(StdRng::seed_from_u64(seed))
    }
}

impl Default for RandomMask {
    fn default() -> RandomMask {
        RandomMask::new()
    }
}

impl MaskSource for RandomMask {
    fn next_mask(&mut self) -> [u8; 4] {
        let mut mask = [0; 4];
        for b in mask.iter_mut() {
            *b = self.0.gen_range(b'0'..=b'9');
        }
        mask
    }
}

/// Always hands out the same mask.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FixedMask(pub [u8; 4]);

impl MaskSource for FixedMask {
    fn next_mask(&mut self) -> [u8; 4] {
        self.0
    }
}

/// XORs every byte with `mask[i % 4]`. Applying it twice restores the input.
pub fn apply_mask(buf: &mut [u8], mask: [u8; 4]) {
    for (i, byte) in buf.iter_mut().enumerate() {
        *byte ^= mask[i & 3];
    }
}

/// The encoding chosen for a payload length.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LengthField {
    /// Fits into the 7 bit length.
    Short(u8),

    /// 126 followed by a 16 bit length.
    Medium(u16),

    /// 127 followed by a 64 bit length.
    Long(u64),
}

impl LengthField {
    pub fn for_len(len: usize) -> LengthField {
        if len <= 125 {
            LengthField::Short(len as u8)
        } else if len <= 0xFFFF {
            LengthField::Medium(len as u16)
        } else {
            LengthField::Long(len as u64)
        }
    }

    /// Writes the length byte with the given flag bits, then the extended length.
    fn write_to(&self, flags: u8, dst: &mut Vec<u8>) {
        match *self {
            LengthField::Short(len) => dst.push(len | flags),
            LengthField::Medium(len) => {
                dst.push(LEN_16 | flags);
                dst.extend_from_slice(&len.to_be_bytes());
            }
            LengthField::Long(len) => {
                dst.push(LEN_64 | flags);
                dst.extend_from_slice(&len.to_be_bytes());
            }
        }
    }
}

/// Encodes a payload into a masked final text frame using the given mask.
pub fn encode(payload: &[u8], mask: [u8; 4]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(payload.len() + 14);
    frame.push(FINAL_TEXT);
    LengthField::for_len(payload.len()).write_to(MASK_BIT, &mut frame);
    frame.extend_from_slice(&mask);

    let start = frame.len();
    frame.extend_from_slice(payload);
    apply_mask(&mut frame[start..], mask);
    frame
}

/// Encodes outgoing frames with a fresh mask each.
#[derive(Clone, Debug)]
pub struct FrameEncoder<M> {
    masks: M,
}

impl<M: MaskSource> FrameEncoder<M> {
    pub fn new(masks: M) -> FrameEncoder<M> {
        FrameEncoder { masks: masks }
    }

    pub fn encode(&mut self, payload: &[u8]) -> Vec<u8> {
        let mask = self.masks.next_mask();
        encode(payload, mask)
    }
}

/// A decoded inbound frame.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Frame {
    pub payload: Vec<u8>,
}

impl Frame {
    /// The payload as text, if it is valid UTF-8.
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}

/// Collects inbound bytes and cuts complete frames out of them.
///
/// Frames are located by their `0x81` marker. Bytes in front of a marker
/// (frames of other kinds, garbage after a resync) are discarded. A frame
/// larger than `max_frame_len` is skipped whole, even when its bytes
/// arrive over several reads.
#[derive(Clone, Debug)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    max_frame_len: usize,
    skip: usize,
}

enum Header {
    Complete { header_len: usize, mask: Option<[u8; 4]>, payload_len: u64 },
    Incomplete,
}

impl FrameDecoder {
    pub fn new(max_frame_len: usize) -> FrameDecoder {
        FrameDecoder {
            buf: Vec::new(),
            max_frame_len: max_frame_len,
            skip: 0,
        }
    }

    /// Appends freshly read bytes.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Drops everything buffered.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.skip = 0;
    }

    /// Returns the next complete frame, or `None` if more bytes are needed.
    pub fn next_frame(&mut self) -> Option<Frame> {
        loop {
            if self.skip > 0 {
                let n = self.skip.min(self.buf.len());
                self.buf.drain(..n);
                self.skip -= n;
                if self.skip > 0 {
                    return None;
                }
            }

            let start = self.buf.iter().position(|&b| b == FINAL_TEXT)?;
            if start > 0 {
                trace!("Skipping {} bytes in front of frame marker", start);
                self.buf.drain(..start);
            }

            let (header_len, mask, payload_len) = match self.parse_header() {
                Header::Complete { header_len, mask, payload_len } => (header_len, mask, payload_len),
                Header::Incomplete => return None,
            };

            let payload_len = match usize::try_from(payload_len) {
                Ok(len) if len <= self.max_frame_len => len,
                _ => {
                    debug!("Skipping frame of {} bytes", payload_len);
                    self.skip = usize::try_from(payload_len)
                        .unwrap_or(usize::MAX)
                        .saturating_add(header_len);
                    continue;
                }
            };

            if self.buf.len() < header_len + payload_len {
                return None;
            }

            let mut payload: Vec<u8> = self.buf.drain(..header_len + payload_len).skip(header_len).collect();
            if let Some(mask) = mask {
                apply_mask(&mut payload, mask);
            }
            return Some(Frame { payload: payload });
        }
    }

    fn parse_header(&self) -> Header {
        let buf = &self.buf;
        if buf.len() < 2 {
            return Header::Incomplete;
        }

        let masked = buf[1] & MASK_BIT != 0;
        let (mut header_len, payload_len) = match buf[1] & !MASK_BIT {
            LEN_16 => {
                if buf.len() < 4 {
                    return Header::Incomplete;
                }
                (4, u16::from_be_bytes([buf[2], buf[3]]) as u64)
            }
            LEN_64 => {
                if buf.len() < 10 {
                    return Header::Incomplete;
                }
                let mut len = [0; 8];
                len.copy_from_slice(&buf[2..10]);
                (10, u64::from_be_bytes(len))
            }
            len => (2, len as u64),
        };

        let mask = if masked {
            if buf.len() < header_len + 4 {
                return Header::Incomplete;
            }
            let mut mask = [0; 4];
            mask.copy_from_slice(&buf[header_len..header_len + 4]);
            header_len += 4;
            Some(mask)
        } else {
            None
        };

        Header::Complete {
            header_len: header_len,
            mask: mask,
            payload_len: payload_len,
        }
    }
}

impl Default for FrameDecoder {
    fn default() -> FrameDecoder {
        FrameDecoder::new(DEFAULT_MAX_FRAME_LEN)
    }
}

/// Builds an unmasked frame the way a server sends it.
#[cfg(test)]
pub(crate) fn server_frame(payload: &[u8]) -> Vec<u8> {
    let mut frame = vec![FINAL_TEXT];
    LengthField::for_len(payload.len()).write_to(0, &mut frame);
    frame.extend_from_slice(payload);
    frame
}

/// Decodes a masked client frame the way a server would.
///
/// Returns the payload, the chosen length encoding and the number of bytes consumed.
#[cfg(test)]
pub(crate) fn decode_client_frame(buf: &[u8]) -> Option<(Vec<u8>, LengthField, usize)> {
    if buf.len() < 2 || buf[0] != FINAL_TEXT || buf[1] & MASK_BIT == 0 {
        return None;
    }
    let (field, mut pos) = match buf[1] & !MASK_BIT {
        LEN_16 => (LengthField::Medium(u16::from_be_bytes([buf[2], buf[3]])), 4),
        LEN_64 => {
            let mut len = [0; 8];
            len.copy_from_slice(&buf[2..10]);
            (LengthField::Long(u64::from_be_bytes(len)), 10)
        }
        len => (LengthField::Short(len), 2),
    };
    let len = match field {
        LengthField::Short(l) => l as usize,
        LengthField::Medium(l) => l as usize,
        LengthField::Long(l) => l as usize,
    };
    let mut mask = [0; 4];
    mask.copy_from_slice(buf.get(pos..pos + 4)?);
    pos += 4;
    let mut payload = buf.get(pos..pos + len)?.to_vec();
    apply_mask(&mut payload, mask);
    Some((payload, field, pos + len))
}
