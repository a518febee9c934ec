//! Diagnostic records emitted by the channel, sequencer and dispatch loop.
//!
//! The core never logs directly. Every observable step is handed to a
//! [`DiagnosticSink`] as a borrowed [`Diagnostic`]; host builds forward these
//! to `tracing`, firmware builds may drop them or keep the most recent ones
//! in a [`TelemetryLog`].

use core::fmt;

use heapless::{HistoryBuf, OldestOrdered, String};

use crate::actuator::BrakeState;
use crate::channel::RemoteEndpoint;
use crate::profile::{Stage, ThresholdProfile};
use crate::wire::MAX_REPLY_LEN;

/// Number of records retained by the default [`TelemetryLog`].
pub const TELEMETRY_RING_CAPACITY: usize = 64;

/// A single observable step, borrowing any message text involved.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Diagnostic<'a> {
    /// A datagram arrived and was decoded.
    Received {
        from: RemoteEndpoint,
        text: &'a str,
    },
    /// A datagram was handed to the transport.
    Sent { to: RemoteEndpoint, text: &'a str },
    /// A send was requested before any peer had been seen.
    SendSkipped { text: &'a str },
    /// The transport rejected an outbound datagram.
    SendFailed { to: RemoteEndpoint, text: &'a str },
    /// The transport reported a receive error; treated as no datagram.
    ReceiveFailed,
    /// A blocking wait began for the listed tokens.
    WaitStarted { targets: &'a [&'static str] },
    /// A pending wait was satisfied.
    WaitMatched { text: &'a str },
    /// A message arrived during a wait and was dropped.
    WaitDiscarded { text: &'a str },
    /// A top-level command arrived during a wait and was parked.
    WaitDeferred { text: &'a str },
    /// The deferred queue was full, so the command was dropped instead.
    DeferredOverflow { text: &'a str },
    /// A bounded wait ran out of polls.
    WaitTimedOut,
    /// A run started with the profile at `index`.
    RunStarted {
        index: usize,
        profile: ThresholdProfile,
    },
    /// The active run was stopped by the operator.
    RunStopped,
    /// Every stage of the active run has completed.
    RunCompleted,
    /// A stage threshold was crossed.
    StageFired { stage: Stage, distance: f32 },
    /// The brake moved to a new state.
    BrakeChanged { state: BrakeState },
    /// The cord rewind was triggered.
    Rewound,
}

impl fmt::Display for Diagnostic<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::Received { from, text } => write!(f, "received {text:?} from {from}"),
            Diagnostic::Sent { to, text } => write!(f, "sent {text:?} to {to}"),
            Diagnostic::SendSkipped { text } => write!(f, "no peer yet, dropped {text:?}"),
            Diagnostic::SendFailed { to, text } => write!(f, "failed to send {text:?} to {to}"),
            Diagnostic::ReceiveFailed => f.write_str("receive failed"),
            Diagnostic::WaitStarted { targets } => {
                f.write_str("waiting for")?;
                for target in *targets {
                    write!(f, " {target}")?;
                }
                Ok(())
            }
            Diagnostic::WaitMatched { text } => write!(f, "wait matched {text:?}"),
            Diagnostic::WaitDiscarded { text } => write!(f, "discarded {text:?} during wait"),
            Diagnostic::WaitDeferred { text } => write!(f, "deferred {text:?} until wait ends"),
            Diagnostic::DeferredOverflow { text } => {
                write!(f, "deferred queue full, dropped {text:?}")
            }
            Diagnostic::WaitTimedOut => f.write_str("wait timed out"),
            Diagnostic::RunStarted { index, profile } => {
                write!(f, "run started with profile {index} {profile}")
            }
            Diagnostic::RunStopped => f.write_str("run stopped"),
            Diagnostic::RunCompleted => f.write_str("run completed"),
            Diagnostic::StageFired { stage, distance } => {
                write!(f, "{stage} fired at {distance}")
            }
            Diagnostic::BrakeChanged { state } => write!(f, "brake {state}"),
            Diagnostic::Rewound => f.write_str("rewound"),
        }
    }
}

/// Receiver for [`Diagnostic`] records.
pub trait DiagnosticSink {
    fn record(&mut self, diagnostic: Diagnostic<'_>);
}

impl<S> DiagnosticSink for &mut S
where
    S: DiagnosticSink + ?Sized,
{
    fn record(&mut self, diagnostic: Diagnostic<'_>) {
        (**self).record(diagnostic);
    }
}

/// Sink that drops every record.
#[derive(Copy, Clone, Debug, Default)]
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn record(&mut self, _: Diagnostic<'_>) {}
}

/// Owned text carried by a [`TelemetryEvent`].
pub type EventText = String<MAX_REPLY_LEN>;

/// Owned copy of a [`Diagnostic`], suitable for storing in a ring.
#[derive(Clone, Debug, PartialEq)]
pub enum TelemetryEvent {
    Received {
        from: RemoteEndpoint,
        text: EventText,
    },
    Sent {
        to: RemoteEndpoint,
        text: EventText,
    },
    SendSkipped {
        text: EventText,
    },
    SendFailed {
        to: RemoteEndpoint,
        text: EventText,
    },
    ReceiveFailed,
    WaitStarted,
    WaitMatched {
        text: EventText,
    },
    WaitDiscarded {
        text: EventText,
    },
    WaitDeferred {
        text: EventText,
    },
    DeferredOverflow {
        text: EventText,
    },
    WaitTimedOut,
    RunStarted {
        index: usize,
        profile: ThresholdProfile,
    },
    RunStopped,
    RunCompleted,
    StageFired {
        stage: Stage,
        distance: f32,
    },
    BrakeChanged {
        state: BrakeState,
    },
    Rewound,
}

impl From<Diagnostic<'_>> for TelemetryEvent {
    fn from(diagnostic: Diagnostic<'_>) -> Self {
        match diagnostic {
            Diagnostic::Received { from, text } => TelemetryEvent::Received {
                from,
                text: owned(text),
            },
            Diagnostic::Sent { to, text } => TelemetryEvent::Sent {
                to,
                text: owned(text),
            },
            Diagnostic::SendSkipped { text } => TelemetryEvent::SendSkipped { text: owned(text) },
            Diagnostic::SendFailed { to, text } => TelemetryEvent::SendFailed {
                to,
                text: owned(text),
            },
            Diagnostic::ReceiveFailed => TelemetryEvent::ReceiveFailed,
            Diagnostic::WaitStarted { .. } => TelemetryEvent::WaitStarted,
            Diagnostic::WaitMatched { text } => TelemetryEvent::WaitMatched { text: owned(text) },
            Diagnostic::WaitDiscarded { text } => {
                TelemetryEvent::WaitDiscarded { text: owned(text) }
            }
            Diagnostic::WaitDeferred { text } => TelemetryEvent::WaitDeferred { text: owned(text) },
            Diagnostic::DeferredOverflow { text } => {
                TelemetryEvent::DeferredOverflow { text: owned(text) }
            }
            Diagnostic::WaitTimedOut => TelemetryEvent::WaitTimedOut,
            Diagnostic::RunStarted { index, profile } => {
                TelemetryEvent::RunStarted { index, profile }
            }
            Diagnostic::RunStopped => TelemetryEvent::RunStopped,
            Diagnostic::RunCompleted => TelemetryEvent::RunCompleted,
            Diagnostic::StageFired { stage, distance } => {
                TelemetryEvent::StageFired { stage, distance }
            }
            Diagnostic::BrakeChanged { state } => TelemetryEvent::BrakeChanged { state },
            Diagnostic::Rewound => TelemetryEvent::Rewound,
        }
    }
}

impl TelemetryEvent {
    /// Text of a [`TelemetryEvent::Sent`] record.
    #[must_use]
    pub fn sent_text(&self) -> Option<&str> {
        match self {
            TelemetryEvent::Sent { text, .. } => Some(text.as_str()),
            _ => None,
        }
    }
}

fn owned(text: &str) -> EventText {
    let mut copy = EventText::new();
    let mut end = text.len().min(MAX_REPLY_LEN);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    let _ = copy.push_str(&text[..end]);
    copy
}

/// Sink that keeps the most recent `CAPACITY` records.
pub struct TelemetryLog<const CAPACITY: usize = TELEMETRY_RING_CAPACITY> {
    ring: HistoryBuf<TelemetryEvent, CAPACITY>,
    recorded: u32,
}

impl<const CAPACITY: usize> TelemetryLog<CAPACITY> {
    /// Creates an empty log.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            recorded: 0,
        }
    }

    /// Retained records in chronological order.
    #[must_use]
    pub fn oldest_first(&self) -> OldestOrdered<'_, TelemetryEvent> {
        self.ring.oldest_ordered()
    }

    /// Most recent record, if any.
    #[must_use]
    pub fn latest(&self) -> Option<&TelemetryEvent> {
        self.ring.recent()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Total records seen, including ones that have since been overwritten.
    #[must_use]
    pub const fn recorded(&self) -> u32 {
        self.recorded
    }

    pub fn clear(&mut self) {
        self.ring.clear();
    }
}

impl<const CAPACITY: usize> Default for TelemetryLog<CAPACITY> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const CAPACITY: usize> DiagnosticSink for TelemetryLog<CAPACITY> {
    fn record(&mut self, diagnostic: Diagnostic<'_>) {
        self.recorded = self.recorded.wrapping_add(1);
        self.ring.write(TelemetryEvent::from(diagnostic));
    }
}
