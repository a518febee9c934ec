//! Per-tick scheduler tying the channel, sequencer and actuator together.

use core::fmt;

use rand::Rng;

use crate::actuator::{Actuator, ActuatorDriver, BrakeState};
use crate::channel::{CommandChannel, DatagramTransport, Pause, RemoteEndpoint};
use crate::distance::DistanceSource;
use crate::sequencer::{Sequencer, SequencerStatus, StopPolicy, TickOutcome};
use crate::telemetry::{Diagnostic, DiagnosticSink};
use crate::wire::{InboundCommand, TopLevelCommand};

/// What the dispatch loop did with an inbound message.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum HandledCommand {
    /// `Start` armed a run with the profile at `index`.
    Started { index: usize },
    /// `Stop` locked the brake, ending the run under [`StopPolicy::LockAndEnd`].
    Stopped,
    /// `Winding` rewound the cord.
    Rewound,
    /// Anything else: acknowledged and ignored.
    Acknowledged,
}

impl fmt::Display for HandledCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandledCommand::Started { index } => write!(f, "started profile {index}"),
            HandledCommand::Stopped => f.write_str("stopped"),
            HandledCommand::Rewound => f.write_str("rewound"),
            HandledCommand::Acknowledged => f.write_str("acknowledged"),
        }
    }
}

/// Summary of one [`Dispatcher::tick`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TickReport {
    pub handled: Option<HandledCommand>,
    pub distance: f32,
    pub outcome: TickOutcome,
}

/// Device main loop body.
pub struct Dispatcher<T, P, S, A, D, R> {
    channel: CommandChannel<T, P, S>,
    sequencer: Sequencer,
    actuator: Actuator<A>,
    source: D,
    rng: R,
}

impl<T, P, S, A, D, R> Dispatcher<T, P, S, A, D, R>
where
    T: DatagramTransport,
    P: Pause,
    S: DiagnosticSink,
    A: ActuatorDriver,
    D: DistanceSource,
    R: Rng,
{
    pub fn new(
        channel: CommandChannel<T, P, S>,
        sequencer: Sequencer,
        actuator: Actuator<A>,
        source: D,
        rng: R,
    ) -> Self {
        Self {
            channel,
            sequencer,
            actuator,
            source,
            rng,
        }
    }

    /// Handles at most one inbound command, then advances the sequencer with
    /// a fresh distance reading.
    pub fn tick(&mut self) -> TickReport {
        let handled = self
            .channel
            .poll_from()
            .map(|(message, from)| self.handle(&message, from));
        let distance = self.source.read();
        let outcome = self.sequencer.tick(
            distance,
            &mut self.channel,
            &mut self.actuator,
            &mut self.source,
        );

        TickReport {
            handled,
            distance,
            outcome,
        }
    }

    /// Acts on one already-echoed message and acknowledges it to `from`.
    pub fn handle(&mut self, text: &str, from: RemoteEndpoint) -> HandledCommand {
        let handled = match InboundCommand::classify(text).top_level() {
            Some(TopLevelCommand::Start) => {
                let run = self
                    .sequencer
                    .start(&mut self.rng, self.channel.diagnostics_mut());
                HandledCommand::Started { index: run.index() }
            }
            Some(TopLevelCommand::Stop) => {
                self.actuator.set(BrakeState::Locked);
                self.channel.record(Diagnostic::BrakeChanged {
                    state: BrakeState::Locked,
                });
                if self.sequencer.config().stop == StopPolicy::LockAndEnd {
                    self.sequencer.stop(self.channel.diagnostics_mut());
                }
                HandledCommand::Stopped
            }
            Some(TopLevelCommand::Winding) => {
                self.actuator.rewind();
                self.source.reset();
                self.channel.record(Diagnostic::Rewound);
                HandledCommand::Rewound
            }
            None => HandledCommand::Acknowledged,
        };

        self.channel.acknowledge_to(from, text);
        handled
    }

    pub fn status(&self) -> SequencerStatus {
        self.sequencer.status()
    }

    pub const fn channel(&self) -> &CommandChannel<T, P, S> {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut CommandChannel<T, P, S> {
        &mut self.channel
    }

    pub const fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }

    pub fn sequencer_mut(&mut self) -> &mut Sequencer {
        &mut self.sequencer
    }

    pub const fn actuator(&self) -> &Actuator<A> {
        &self.actuator
    }

    pub fn actuator_mut(&mut self) -> &mut Actuator<A> {
        &mut self.actuator
    }

    pub const fn source(&self) -> &D {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut D {
        &mut self.source
    }
}
