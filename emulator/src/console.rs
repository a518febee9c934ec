//! Operator console on stdin.
//!
//! Lines starting with `:` control the simulation; anything else is sent
//! verbatim to the last remote peer, the same way the bench signal tester
//! forwards serial input.
//!
//! | Line            | Effect                                   |
//! |-----------------|------------------------------------------|
//! | `:pull <cm>`    | move the cord out (negative winds it in) |
//! | `:set <cm>`     | place the cord at an absolute position   |
//! | `:status`       | log the sequencer state                  |
//! | `:quit`         | stop the emulator                        |
//! | anything else   | send to the last peer                    |

use std::io::{self, BufRead};
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};

use thiserror::Error;
use tracing::{info, warn};

use crate::hardware::SimulatedCord;

/// Parsed console line.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleInput {
    Pull(f32),
    Set(f32),
    Status,
    Quit,
    Inject(String),
}

/// Requests the device loop handles between ticks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleRequest {
    Inject(String),
    Status,
    Quit,
}

/// Console line that could not be understood.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unknown console command `{0}`")]
    UnknownCommand(String),
    #[error("`{0}` is not a distance in cm")]
    InvalidDistance(String),
}

/// Parses one console line. Blank lines yield `Ok(None)`.
pub fn parse_line(line: &str) -> Result<Option<ConsoleInput>, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let Some(command) = line.strip_prefix(':') else {
        return Ok(Some(ConsoleInput::Inject(line.to_string())));
    };

    let mut words = command.split_whitespace();
    let input = match (words.next(), words.next()) {
        (Some("pull"), Some(value)) => ConsoleInput::Pull(parse_cm(value)?),
        (Some("set"), Some(value)) => ConsoleInput::Set(parse_cm(value)?),
        (Some("status"), None) => ConsoleInput::Status,
        (Some("quit" | "exit"), None) => ConsoleInput::Quit,
        _ => return Err(ParseError::UnknownCommand(line.to_string())),
    };
    Ok(Some(input))
}

fn parse_cm(value: &str) -> Result<f32, ParseError> {
    value
        .parse::<f32>()
        .ok()
        .filter(|cm| cm.is_finite())
        .ok_or_else(|| ParseError::InvalidDistance(value.to_string()))
}

/// Reads stdin on a background thread.
///
/// Cord movements are applied immediately so they take effect while the
/// device loop is blocked in a wait; everything else is forwarded to
/// `requests`. The thread exits on end of input or when the receiver is gone.
pub fn spawn(cord: SimulatedCord, requests: Sender<ConsoleRequest>) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("console".into())
        .spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(error) => {
                        warn!(%error, "console read failed");
                        break;
                    }
                };

                let request = match parse_line(&line) {
                    Ok(None) => continue,
                    Ok(Some(ConsoleInput::Pull(delta))) => {
                        let position = cord.pull(delta);
                        info!(position, "cord pulled");
                        continue;
                    }
                    Ok(Some(ConsoleInput::Set(position))) => {
                        cord.set_position(position);
                        info!(position = cord.position(), "cord placed");
                        continue;
                    }
                    Ok(Some(ConsoleInput::Status)) => ConsoleRequest::Status,
                    Ok(Some(ConsoleInput::Quit)) => ConsoleRequest::Quit,
                    Ok(Some(ConsoleInput::Inject(text))) => ConsoleRequest::Inject(text),
                    Err(error) => {
                        warn!(%error, "ignored console line");
                        continue;
                    }
                };

                if requests.send(request).is_err() {
                    break;
                }
            }
        })
}
