//! Simulated cord, encoder, brake servo and winding motor.
//!
//! The cord state is shared between the device loop and the console thread so
//! an operator can keep pulling while the loop is blocked in a wait.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU32, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info};
use trainer_core::actuator::{ActuatorDriver, BrakeState};
use trainer_core::channel::Pause;
use trainer_core::distance::DistanceSource;

#[derive(Debug, Default)]
struct CordState {
    /// `f32` bits of the pulled-out length in centimeters.
    position: AtomicU32,
    brake: AtomicU8,
}

/// Handle to the shared cord.
#[derive(Debug, Clone, Default)]
pub struct SimulatedCord {
    state: Arc<CordState>,
}

impl SimulatedCord {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn position(&self) -> f32 {
        f32::from_bits(self.state.position.load(Ordering::Acquire))
    }

    pub fn set_position(&self, cm: f32) {
        self.state
            .position
            .store(cm.max(0.0).to_bits(), Ordering::Release);
    }

    /// Moves the cord by `delta_cm`, clamping at fully wound.
    pub fn pull(&self, delta_cm: f32) -> f32 {
        let mut updated = 0.0;
        let _ = self
            .state
            .position
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                updated = (f32::from_bits(bits) + delta_cm).max(0.0);
                Some(updated.to_bits())
            });
        updated
    }

    #[must_use]
    pub fn brake(&self) -> BrakeState {
        match self.state.brake.load(Ordering::Acquire) {
            1 => BrakeState::Locked,
            2 => BrakeState::Weak,
            _ => BrakeState::Released,
        }
    }

    fn set_brake(&self, state: BrakeState) {
        let code = match state {
            BrakeState::Released => 0,
            BrakeState::Locked => 1,
            BrakeState::Weak => 2,
        };
        self.state.brake.store(code, Ordering::Release);
    }
}

/// Encoder that reports the shared cord position.
///
/// With a non-zero pull rate the simulated trainee keeps withdrawing at that
/// speed: full speed with the brake released, half against the weak brake and
/// not at all while locked.
#[derive(Debug)]
pub struct SimulatedEncoder {
    cord: SimulatedCord,
    pull_rate: f32,
    last_read: Option<Instant>,
}

impl SimulatedEncoder {
    #[must_use]
    pub fn new(cord: SimulatedCord, pull_rate_cm_per_s: f32) -> Self {
        Self {
            cord,
            pull_rate: pull_rate_cm_per_s.max(0.0),
            last_read: None,
        }
    }

    /// Applies the automatic pull for `elapsed` and returns the new position.
    pub fn advance(&mut self, elapsed: Duration) -> f32 {
        let factor = match self.cord.brake() {
            BrakeState::Released => 1.0,
            BrakeState::Weak => 0.5,
            BrakeState::Locked => 0.0,
        };
        let delta = self.pull_rate * factor * elapsed.as_secs_f32();
        if delta > 0.0 {
            self.cord.pull(delta)
        } else {
            self.cord.position()
        }
    }
}

impl DistanceSource for SimulatedEncoder {
    fn read(&mut self) -> f32 {
        let now = Instant::now();
        let elapsed = self
            .last_read
            .map_or(Duration::ZERO, |last| now.saturating_duration_since(last));
        self.last_read = Some(now);
        self.advance(elapsed)
    }

    fn reset(&mut self) {
        self.cord.set_position(0.0);
        self.last_read = None;
    }
}

/// Brake servo and winding motor acting on the shared cord.
#[derive(Debug)]
pub struct SimulatedBrake {
    cord: SimulatedCord,
}

impl SimulatedBrake {
    #[must_use]
    pub fn new(cord: SimulatedCord) -> Self {
        Self { cord }
    }
}

impl ActuatorDriver for SimulatedBrake {
    fn drive_brake(&mut self, state: BrakeState) {
        debug!(%state, "servo");
        self.cord.set_brake(state);
    }

    fn rewind(&mut self) {
        info!(from = self.cord.position(), "motor winding cord back");
        self.cord.set_position(0.0);
    }
}

/// Sleeps the device thread between polls.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostPause;

impl Pause for HostPause {
    fn pause(&mut self, interval: Duration) {
        thread::sleep(interval);
    }
}
