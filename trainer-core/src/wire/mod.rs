//! Text vocabulary exchanged with the operator console.
//!
//! Every datagram carries exactly one command as plain UTF-8 text. Matching is
//! case-sensitive and exact after surrounding whitespace has been trimmed, so
//! `"OK"` and `"ok"` are different commands and `"OK1"` never satisfies a wait
//! for `"OK"`.

use core::fmt;
use core::str;

use heapless::String;
use winnow::combinator::{alt, eof, terminated};
use winnow::error::ContextError;
use winnow::prelude::*;

/// Largest inbound payload kept per datagram (255-byte receive buffer minus terminator).
pub const MAX_MESSAGE_LEN: usize = 254;

/// Prefix placed in front of every receipt acknowledgment.
pub const ACK_PREFIX: &str = "ACK: ";

/// Largest outbound acknowledgment (`ACK: ` plus a full inbound message).
pub const MAX_REPLY_LEN: usize = MAX_MESSAGE_LEN + ACK_PREFIX.len();

/// Trimmed inbound command text.
pub type Message = String<MAX_MESSAGE_LEN>;

/// Outbound acknowledgment text.
pub type Reply = String<MAX_REPLY_LEN>;

/// Event notifications the device pushes to the operator console.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Notification {
    Pain1,
    Pain2,
    HighDamp,
    LowDamp,
    Keep,
}

impl Notification {
    /// Wire spelling of the notification.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Notification::Pain1 => "Pain1",
            Notification::Pain2 => "Pain2",
            Notification::HighDamp => "HighDamp",
            Notification::LowDamp => "LowDamp",
            Notification::Keep => "Keep",
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Acknowledgment tokens that are only meaningful to a pending sequencer wait.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AckToken {
    /// Releases the locked brake after `HighDamp`.
    Ok,
    /// Releases the weak brake after `LowDamp`.
    Ok1,
    /// Asks the trainee to keep pulling after `LowDamp`.
    Continue,
    /// Releases the brake after `Keep`.
    Ok2,
}

impl AckToken {
    /// Wire spelling of the token.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            AckToken::Ok => "OK",
            AckToken::Ok1 => "OK1",
            AckToken::Continue => "Continue",
            AckToken::Ok2 => "OK2",
        }
    }
}

impl fmt::Display for AckToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Commands the dispatch loop acts on without a pending wait.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TopLevelCommand {
    Start,
    Stop,
    Winding,
}

impl TopLevelCommand {
    /// Wire spelling of the command.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            TopLevelCommand::Start => "Start",
            TopLevelCommand::Stop => "Stop",
            TopLevelCommand::Winding => "Winding",
        }
    }
}

impl fmt::Display for TopLevelCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a single inbound message.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum InboundCommand<'a> {
    TopLevel(TopLevelCommand),
    Ack(AckToken),
    Other(&'a str),
}

impl<'a> InboundCommand<'a> {
    /// Classifies already-trimmed message text. Anything unrecognized is `Other`.
    #[must_use]
    pub fn classify(text: &'a str) -> Self {
        Self::token()
            .parse(text)
            .unwrap_or(InboundCommand::Other(text))
    }

    /// Returns the top-level command, if this is one.
    #[must_use]
    pub const fn top_level(self) -> Option<TopLevelCommand> {
        match self {
            InboundCommand::TopLevel(command) => Some(command),
            _ => None,
        }
    }

    fn token() -> impl Parser<&'a str, InboundCommand<'a>, ContextError> {
        move |input: &mut &'a str| {
            terminated(
                alt((
                    "Start".value(InboundCommand::TopLevel(TopLevelCommand::Start)),
                    "Stop".value(InboundCommand::TopLevel(TopLevelCommand::Stop)),
                    "Winding".value(InboundCommand::TopLevel(TopLevelCommand::Winding)),
                    "Continue".value(InboundCommand::Ack(AckToken::Continue)),
                    // Longer tokens first: `OK` is a prefix of both.
                    "OK1".value(InboundCommand::Ack(AckToken::Ok1)),
                    "OK2".value(InboundCommand::Ack(AckToken::Ok2)),
                    "OK".value(InboundCommand::Ack(AckToken::Ok)),
                )),
                eof,
            )
            .parse_next(input)
        }
    }
}

/// Decodes a received datagram into a trimmed [`Message`].
///
/// Payloads longer than [`MAX_MESSAGE_LEN`] are truncated and a character
/// split by the truncation is dropped. Invalid sequences inside the payload
/// become U+FFFD, so a corrupted datagram never decodes to a clean token.
#[must_use]
pub fn decode_datagram(payload: &[u8]) -> Message {
    let mut rest = &payload[..payload.len().min(MAX_MESSAGE_LEN)];
    let mut decoded = Message::new();

    while !rest.is_empty() {
        let (valid, skip) = match str::from_utf8(rest) {
            Ok(text) => (text, None),
            Err(error) => {
                let (head, _) = rest.split_at(error.valid_up_to());
                (
                    str::from_utf8(head).unwrap_or_default(),
                    error.error_len().map(|len| error.valid_up_to() + len),
                )
            }
        };
        if push_bounded(&mut decoded, valid).is_err() {
            break;
        }
        // `None` is an incomplete sequence at the end of the buffer.
        let Some(skip) = skip else {
            break;
        };
        if push_bounded(&mut decoded, "\u{FFFD}").is_err() {
            break;
        }
        rest = &rest[skip..];
    }

    let mut message = Message::new();
    // `decoded` has the same capacity as `message`.
    let _ = message.push_str(decoded.trim());
    message
}

/// Appends as much of `text` as fits on a character boundary; errors once full.
fn push_bounded(buffer: &mut Message, text: &str) -> Result<(), ()> {
    if buffer.push_str(text).is_ok() {
        return Ok(());
    }
    let mut end = (buffer.capacity() - buffer.len()).min(text.len());
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    let _ = buffer.push_str(&text[..end]);
    Err(())
}

/// Builds the `ACK: <text>` reply for an inbound message.
#[must_use]
pub fn acknowledgment(text: &str) -> Reply {
    let mut reply = Reply::new();
    let _ = reply.push_str(ACK_PREFIX);
    if reply.push_str(text).is_err() {
        let mut end = MAX_MESSAGE_LEN.min(text.len());
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        let _ = reply.push_str(&text[..end]);
    }
    reply
}
