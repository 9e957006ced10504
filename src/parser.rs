//! Scanner for socket.io event and ack bodies.
//!
//! A body has the shape `<ack id>[<event>,<data>]` where the ack id is
//! optional and `data` may itself contain JSON. The scanner walks the body
//! once, left to right, and splits it into its three fields without
//! interpreting the JSON. Delimiters only count while the scanner is outside
//! of strings, objects and nested arrays, so `data` may carry commas and
//! brackets as long as they are quoted or nested.

use crate::error::{EngineError, Result};

/// The fields of an event or ack body.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PacketBody {
    /// The acknowledgement id. Empty when the sender expects no ack.
    pub ack_id: String,

    /// The event name, without its quotes. Always empty for acks.
    pub event: String,

    /// The data, passed through uninterpreted.
    pub data: String,
}

impl PacketBody {
    /// Parses the body of an event packet.
    ///
    /// ## Example
    /// ```
    /// # use socketio::PacketBody;
    /// let body = PacketBody::parse("12[\"foo\",{\"a\":1}]").unwrap();
    /// assert_eq!(body.ack_id, "12");
    /// assert_eq!(body.event, "foo");
    /// assert_eq!(body.data, "{\"a\":1}");
    /// ```
    pub fn parse(text: &str) -> Result<PacketBody> {
        Scanner::new(Field::Event).run(text)
    }

    /// Parses the body of an ack packet, `<ack id>[<data>]`.
    ///
    /// Acks carry no event name, so everything inside the brackets
    /// ends up in `data`.
    pub fn parse_ack(text: &str) -> Result<PacketBody> {
        Scanner::new(Field::Data).run(text)
    }

    /// Returns the ack id as a number, if one was sent.
    pub fn ack_id(&self) -> Option<u64> {
        self.ack_id.parse().ok()
    }
}

/// The field the scanner currently appends to.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Field {
    Id,
    Event,
    Data,
}

/// What to do with the character that was just scanned.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Step {
    /// Append the character to the current field.
    Keep,

    /// Drop the character (a quote or a delimiter).
    Skip,

    /// The body is complete.
    Stop,
}

#[derive(Debug)]
struct Scanner {
    field: Field,
    after_id: Field,
    escaped: bool,
    in_string: bool,
    object_depth: usize,
    array_depth: usize,
}

impl Scanner {
    fn new(after_id: Field) -> Scanner {
        Scanner {
            field: Field::Id,
            after_id: after_id,
            escaped: false,
            in_string: false,
            object_depth: 0,
            array_depth: 0,
        }
    }

    fn run(mut self, text: &str) -> Result<PacketBody> {
        let mut body = PacketBody::default();
        let mut terminated = false;

        for c in text.chars() {
            match self.step(c) {
                Step::Keep => match self.field {
                    Field::Id => body.ack_id.push(c),
                    Field::Event => body.event.push(c),
                    Field::Data => body.data.push(c),
                },
                Step::Skip => {}
                Step::Stop => {
                    terminated = true;
                    break;
                }
            }
        }

        if self.field == Field::Id {
            return Err(EngineError::malformed(format!("missing '[' in body {:?}", text)));
        }
        if !terminated {
            return Err(EngineError::malformed(format!("unterminated body {:?}", text)));
        }
        if !body.ack_id.chars().all(|c| c.is_ascii_digit()) {
            return Err(EngineError::malformed(format!("invalid ack id {:?}", body.ack_id)));
        }
        Ok(body)
    }

    fn is_nested(&self) -> bool {
        self.in_string || self.object_depth > 0 || self.array_depth > 0
    }

    fn step(&mut self, c: char) -> Step {
        if c == '"' && !self.escaped {
            self.in_string = !self.in_string;
            // Quotes around top-level strings are stripped, quotes
            // inside objects and arrays belong to the data.
            if self.object_depth == 0 && self.array_depth == 0 {
                return Step::Skip;
            }
        }

        if c == '\\' {
            self.escaped = !self.escaped;
        } else if self.escaped {
            self.escaped = false;
        }

        if !self.in_string {
            match c {
                '{' => self.object_depth += 1,
                '}' if self.object_depth > 0 => self.object_depth -= 1,
                '[' if self.field != Field::Id => self.array_depth += 1,
                _ => {}
            }
        }

        if !self.is_nested() && !self.escaped {
            match (c, self.field) {
                ('[', Field::Id) => {
                    self.field = self.after_id;
                    return Step::Skip;
                }
                (',', Field::Event) => {
                    self.field = Field::Data;
                    return Step::Skip;
                }
                (']', _) => return Step::Stop,
                _ => {}
            }
        }

        if c == ']' && !self.in_string && self.array_depth > 0 {
            self.array_depth -= 1;
        }

        Step::Keep
    }
}
