//! Threshold-driven event sequencer.
//!
//! A run walks four stages in order as the cord is pulled further out:
//!
//! 1. `Pain1`: notify only.
//! 2. `Pain2`: notify only.
//! 3. `HighDamp`: notify, lock the brake, block for `OK`, release.
//! 4. `LowDamp`: notify, weaken the brake, block for `OK1` or `Continue`.
//!    `OK1` releases immediately. `Continue` first blocks until the cord has
//!    moved a further short pull, sends `Keep` and blocks for `OK2`.
//!
//! Each stage latches once its actions complete and does not fire again until
//! the next [`Sequencer::start`]. A stage interrupted by a wait timeout stays
//! unlatched and fires again on the next tick.

use core::fmt;

use rand::Rng;

use crate::actuator::{Actuator, ActuatorDriver, BrakeState};
use crate::channel::{CommandChannel, DatagramTransport, Pause, WaitError, WaitLimit};
use crate::distance::DistanceSource;
use crate::profile::{ProfileBank, ProfileRanges, STAGE_COUNT, Stage, ThresholdProfile};
use crate::telemetry::{Diagnostic, DiagnosticSink};
use crate::wire::{AckToken, Notification};

/// Extra pull, in centimeters, required after `Continue` before `Keep` is sent.
pub const DEFAULT_SHORT_PULL: f32 = 0.5;

/// What happens once the fourth stage has completed.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum CompletionPolicy {
    /// The run ends and the sequencer goes back to idle.
    #[default]
    ReturnToIdle,
    /// The run stays armed with every stage latched until the next start.
    StayArmed,
}

/// What an operator `Stop` does besides locking the brake.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum StopPolicy {
    /// Only the brake is locked; the run keeps evaluating thresholds.
    #[default]
    LockOnly,
    /// The brake is locked and the run ends.
    LockAndEnd,
}

/// Sequencer tuning.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SequencerConfig {
    pub short_pull: f32,
    pub wait_limit: WaitLimit,
    pub completion: CompletionPolicy,
    pub stop: StopPolicy,
    pub ranges: ProfileRanges,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            short_pull: DEFAULT_SHORT_PULL,
            wait_limit: WaitLimit::Unbounded,
            completion: CompletionPolicy::default(),
            stop: StopPolicy::default(),
            ranges: ProfileRanges::DEFAULT,
        }
    }
}

/// Coarse position of the sequencer within a run.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum SequencerState {
    #[default]
    Idle,
    /// Running, no stage fired yet.
    Armed,
    Pain1,
    Pain2,
    HighDamp,
    LowDamp,
}

impl From<Stage> for SequencerState {
    fn from(stage: Stage) -> Self {
        match stage {
            Stage::Pain1 => SequencerState::Pain1,
            Stage::Pain2 => SequencerState::Pain2,
            Stage::HighDamp => SequencerState::HighDamp,
            Stage::LowDamp => SequencerState::LowDamp,
        }
    }
}

impl fmt::Display for SequencerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SequencerState::Idle => f.write_str("idle"),
            SequencerState::Armed => f.write_str("armed"),
            SequencerState::Pain1 => f.write_str("pain1"),
            SequencerState::Pain2 => f.write_str("pain2"),
            SequencerState::HighDamp => f.write_str("high-damp"),
            SequencerState::LowDamp => f.write_str("low-damp"),
        }
    }
}

/// Profile and progress of the current (or most recent) run.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ActiveRun {
    index: usize,
    profile: ThresholdProfile,
    running: bool,
    latches: [bool; STAGE_COUNT],
}

impl ActiveRun {
    const fn new(index: usize, profile: ThresholdProfile) -> Self {
        Self {
            index,
            profile,
            running: true,
            latches: [false; STAGE_COUNT],
        }
    }

    /// Bank slot the profile was copied from.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub const fn profile(&self) -> &ThresholdProfile {
        &self.profile
    }

    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.running
    }

    #[must_use]
    pub const fn is_latched(&self, stage: Stage) -> bool {
        self.latches[stage.as_index()]
    }

    #[must_use]
    pub const fn latches(&self) -> [bool; STAGE_COUNT] {
        self.latches
    }

    fn is_complete(&self) -> bool {
        self.latches.iter().all(|latched| *latched)
    }
}

/// Snapshot reported to operators and logs.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SequencerStatus {
    pub state: SequencerState,
    pub run: Option<ActiveRun>,
}

impl fmt::Display for SequencerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.state)?;
        if let Some(run) = &self.run {
            write!(f, " profile {} {}", run.index, run.profile)?;
            for stage in Stage::ALL {
                let mark = if run.is_latched(stage) { '+' } else { '-' };
                write!(f, " {mark}{stage}")?;
            }
        }
        Ok(())
    }
}

/// Result of a single [`Sequencer::tick`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum TickOutcome {
    /// No run is active.
    Inactive,
    /// Nothing crossed a threshold.
    Quiet,
    /// One or more stages fired; `last` is the furthest.
    Progressed { last: Stage },
    /// The final stage fired and every stage is latched.
    Completed,
    /// A wait inside `stage` gave up. The stage stays unlatched.
    Interrupted { stage: Stage, error: WaitError },
}

/// Owner of the profile bank and the active run.
#[derive(Debug)]
pub struct Sequencer {
    bank: ProfileBank,
    config: SequencerConfig,
    run: Option<ActiveRun>,
    state: SequencerState,
}

impl Sequencer {
    #[must_use]
    pub const fn new(bank: ProfileBank, config: SequencerConfig) -> Self {
        Self {
            bank,
            config,
            run: None,
            state: SequencerState::Idle,
        }
    }

    /// Builds the bank from `config.ranges`. Called once at power-up.
    pub fn generate<R: Rng + ?Sized>(config: SequencerConfig, rng: &mut R) -> Self {
        Self::new(ProfileBank::generate(&config.ranges, rng), config)
    }

    #[must_use]
    pub const fn bank(&self) -> &ProfileBank {
        &self.bank
    }

    #[must_use]
    pub const fn config(&self) -> &SequencerConfig {
        &self.config
    }

    #[must_use]
    pub const fn state(&self) -> SequencerState {
        self.state
    }

    #[must_use]
    pub const fn active_run(&self) -> Option<&ActiveRun> {
        self.run.as_ref()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.run.as_ref().is_some_and(ActiveRun::is_running)
    }

    #[must_use]
    pub const fn status(&self) -> SequencerStatus {
        SequencerStatus {
            state: self.state,
            run: self.run,
        }
    }

    /// Arms a run with a uniformly chosen profile, replacing any current run.
    pub fn start<R, S>(&mut self, rng: &mut R, sink: &mut S) -> ActiveRun
    where
        R: Rng + ?Sized,
        S: DiagnosticSink + ?Sized,
    {
        let (index, profile) = self.bank.pick(rng);
        self.arm(index, profile, sink)
    }

    /// Arms a run with the profile at `index`. Returns `None` when out of range.
    pub fn start_with<S>(&mut self, index: usize, sink: &mut S) -> Option<ActiveRun>
    where
        S: DiagnosticSink + ?Sized,
    {
        let profile = *self.bank.get(index)?;
        Some(self.arm(index, profile, sink))
    }

    /// Ends the active run. Returns `true` if one was running.
    pub fn stop<S>(&mut self, sink: &mut S) -> bool
    where
        S: DiagnosticSink + ?Sized,
    {
        self.state = SequencerState::Idle;
        match self.run.as_mut() {
            Some(run) if run.running => {
                run.running = false;
                sink.record(Diagnostic::RunStopped);
                true
            }
            _ => false,
        }
    }

    /// Evaluates every unlatched stage against `distance`, in order.
    ///
    /// Blocks inside the channel while a stage waits for the operator.
    pub fn tick<T, P, S, A, D>(
        &mut self,
        distance: f32,
        channel: &mut CommandChannel<T, P, S>,
        actuator: &mut Actuator<A>,
        source: &mut D,
    ) -> TickOutcome
    where
        T: DatagramTransport,
        P: Pause,
        S: DiagnosticSink,
        A: ActuatorDriver,
        D: DistanceSource + ?Sized,
    {
        let Some(run) = self.run.as_mut().filter(|run| run.running) else {
            return TickOutcome::Inactive;
        };

        let mut last = None;
        for stage in Stage::ALL {
            if run.latches[stage.as_index()] || distance < run.profile.threshold(stage) {
                continue;
            }

            self.state = SequencerState::from(stage);
            channel.record(Diagnostic::StageFired { stage, distance });
            if let Err(error) = perform(stage, &self.config, channel, actuator, source) {
                return TickOutcome::Interrupted { stage, error };
            }
            run.latches[stage.as_index()] = true;
            last = Some(stage);
        }

        match last {
            None => TickOutcome::Quiet,
            Some(_) if run.is_complete() => {
                channel.record(Diagnostic::RunCompleted);
                if self.config.completion == CompletionPolicy::ReturnToIdle {
                    run.running = false;
                    self.state = SequencerState::Idle;
                }
                TickOutcome::Completed
            }
            Some(stage) => TickOutcome::Progressed { last: stage },
        }
    }

    fn arm<S>(&mut self, index: usize, profile: ThresholdProfile, sink: &mut S) -> ActiveRun
    where
        S: DiagnosticSink + ?Sized,
    {
        let run = ActiveRun::new(index, profile);
        self.run = Some(run);
        self.state = SequencerState::Armed;
        sink.record(Diagnostic::RunStarted { index, profile });
        run
    }
}

fn perform<T, P, S, A, D>(
    stage: Stage,
    config: &SequencerConfig,
    channel: &mut CommandChannel<T, P, S>,
    actuator: &mut Actuator<A>,
    source: &mut D,
) -> Result<(), WaitError>
where
    T: DatagramTransport,
    P: Pause,
    S: DiagnosticSink,
    A: ActuatorDriver,
    D: DistanceSource + ?Sized,
{
    let limit = config.wait_limit;
    match stage {
        Stage::Pain1 => channel.notify(Notification::Pain1),
        Stage::Pain2 => channel.notify(Notification::Pain2),
        Stage::HighDamp => {
            channel.notify(Notification::HighDamp);
            set_brake(BrakeState::Locked, channel, actuator);
            channel.wait_for(AckToken::Ok.as_str(), limit)?;
            set_brake(BrakeState::Released, channel, actuator);
        }
        Stage::LowDamp => {
            channel.notify(Notification::LowDamp);
            set_brake(BrakeState::Weak, channel, actuator);
            let reply = channel.wait_for_any(
                &[AckToken::Ok1.as_str(), AckToken::Continue.as_str()],
                limit,
            )?;
            if reply == AckToken::Continue.as_str() {
                let target = source.read() + config.short_pull;
                channel.wait_until(limit, |_| source.read() >= target)?;
                channel.notify(Notification::Keep);
                channel.wait_for(AckToken::Ok2.as_str(), limit)?;
            }
            set_brake(BrakeState::Released, channel, actuator);
        }
    }
    Ok(())
}

fn set_brake<T, P, S, A>(
    state: BrakeState,
    channel: &mut CommandChannel<T, P, S>,
    actuator: &mut Actuator<A>,
) where
    T: DatagramTransport,
    P: Pause,
    S: DiagnosticSink,
    A: ActuatorDriver,
{
    actuator.set(state);
    channel.record(Diagnostic::BrakeChanged { state });
}
