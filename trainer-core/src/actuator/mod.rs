//! Brake and rewind actuation.
//!
//! The servo brake only has three meaningful positions, so the core models it
//! as a discrete state and leaves angles and settling time to the driver.

use core::fmt;

/// Discrete brake positions.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum BrakeState {
    /// Cord moves freely.
    #[default]
    Released,
    /// Cord is held fast.
    Locked,
    /// Cord moves against light resistance.
    Weak,
}

impl fmt::Display for BrakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BrakeState::Released => "released",
            BrakeState::Locked => "locked",
            BrakeState::Weak => "weak",
        };
        f.write_str(label)
    }
}

/// Abstraction over the physical servo and winding motor.
pub trait ActuatorDriver {
    /// Moves the brake to `state`. Assumed to complete immediately.
    fn drive_brake(&mut self, state: BrakeState);

    /// Winds the cord back into the housing.
    fn rewind(&mut self);
}

/// Driver that performs no hardware interaction.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopActuatorDriver;

impl NoopActuatorDriver {
    /// Creates a new no-op driver.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ActuatorDriver for NoopActuatorDriver {
    fn drive_brake(&mut self, _: BrakeState) {}

    fn rewind(&mut self) {}
}

/// Sole owner of the brake state.
#[derive(Debug)]
pub struct Actuator<D> {
    driver: D,
    state: BrakeState,
    rewinds: u32,
}

impl<D> Actuator<D>
where
    D: ActuatorDriver,
{
    /// Wraps a driver whose brake powers up released.
    pub const fn new(driver: D) -> Self {
        Self {
            driver,
            state: BrakeState::Released,
            rewinds: 0,
        }
    }

    /// Current brake state.
    pub const fn state(&self) -> BrakeState {
        self.state
    }

    /// Drives the brake to `state`, returning the previous state.
    ///
    /// Every request reaches the driver, even when the state is unchanged.
    pub fn set(&mut self, state: BrakeState) -> BrakeState {
        self.driver.drive_brake(state);
        core::mem::replace(&mut self.state, state)
    }

    /// Fires the one-shot rewind. Does not touch the brake state.
    pub fn rewind(&mut self) {
        self.driver.rewind();
        self.rewinds = self.rewinds.saturating_add(1);
    }

    /// Number of rewinds issued since construction.
    pub const fn rewind_count(&self) -> u32 {
        self.rewinds
    }

    pub const fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }
}
