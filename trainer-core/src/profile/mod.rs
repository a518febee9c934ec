//! Threshold profiles and the bank they are drawn from.
//!
//! A profile is four pull distances that trigger, in order, the two pain
//! cues, the high-damping cue and the low-damping cue. The bank is generated
//! once at power-up and never mutated afterwards; every `Start` copies one of
//! its entries into the active run.

use core::fmt;

use rand::Rng;

/// Number of profiles held by a [`ProfileBank`].
pub const PROFILE_COUNT: usize = 10;

/// Number of thresholds in a single profile.
pub const STAGE_COUNT: usize = 4;

/// Stages of a sequence run, in firing order.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Stage {
    Pain1,
    Pain2,
    HighDamp,
    LowDamp,
}

impl Stage {
    /// Every stage in evaluation order.
    pub const ALL: [Stage; STAGE_COUNT] =
        [Stage::Pain1, Stage::Pain2, Stage::HighDamp, Stage::LowDamp];

    /// Deterministic index into a profile's thresholds.
    #[must_use]
    pub const fn as_index(self) -> usize {
        match self {
            Stage::Pain1 => 0,
            Stage::Pain2 => 1,
            Stage::HighDamp => 2,
            Stage::LowDamp => 3,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::Pain1 => "pain1",
            Stage::Pain2 => "pain2",
            Stage::HighDamp => "high-damp",
            Stage::LowDamp => "low-damp",
        };
        f.write_str(label)
    }
}

/// Ordered trigger distances for one sequence run.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ThresholdProfile {
    thresholds: [f32; STAGE_COUNT],
}

impl ThresholdProfile {
    /// Builds a profile from explicit thresholds. Ordering is not enforced.
    #[must_use]
    pub const fn new(thresholds: [f32; STAGE_COUNT]) -> Self {
        Self { thresholds }
    }

    /// Distance at which `stage` fires.
    #[must_use]
    pub const fn threshold(&self, stage: Stage) -> f32 {
        self.thresholds[stage.as_index()]
    }

    /// All four thresholds in stage order.
    #[must_use]
    pub const fn thresholds(&self) -> [f32; STAGE_COUNT] {
        self.thresholds
    }

    /// Returns `true` when the thresholds never decrease.
    #[must_use]
    pub fn is_ordered(&self) -> bool {
        self.thresholds.windows(2).all(|pair| pair[0] <= pair[1])
    }
}

impl fmt::Display for ThresholdProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [t0, t1, t2, t3] = self.thresholds;
        write!(f, "[{t0}, {t1}, {t2}, {t3}]")
    }
}

/// Half-open whole-number range `[low, high)` a single threshold is drawn from.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct StageRange {
    low: u16,
    high: u16,
}

impl StageRange {
    /// Creates a range, rejecting empty or inverted bounds.
    #[must_use]
    pub const fn new(low: u16, high: u16) -> Option<Self> {
        if low < high {
            Some(Self { low, high })
        } else {
            None
        }
    }

    /// Inclusive lower bound.
    #[must_use]
    pub const fn low(&self) -> u16 {
        self.low
    }

    /// Exclusive upper bound.
    #[must_use]
    pub const fn high(&self) -> u16 {
        self.high
    }

    fn sample<R: Rng + ?Sized>(self, rng: &mut R) -> f32 {
        f32::from(rng.gen_range(self.low..self.high))
    }
}

/// Generation ranges for each stage of a profile.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ProfileRanges {
    ranges: [StageRange; STAGE_COUNT],
}

impl ProfileRanges {
    /// Disjoint per-stage ranges used by the stock firmware.
    pub const DEFAULT: Self = Self {
        ranges: [
            StageRange { low: 5, high: 15 },
            StageRange { low: 15, high: 25 },
            StageRange { low: 25, high: 35 },
            StageRange { low: 35, high: 45 },
        ],
    };

    /// Builds a range set from per-stage ranges.
    #[must_use]
    pub const fn new(ranges: [StageRange; STAGE_COUNT]) -> Self {
        Self { ranges }
    }

    /// Range used for `stage`.
    #[must_use]
    pub const fn range(&self, stage: Stage) -> StageRange {
        self.ranges[stage.as_index()]
    }

    /// Returns `true` when every range ends at or before the next one starts,
    /// which guarantees ordered profiles.
    #[must_use]
    pub fn is_disjoint(&self) -> bool {
        self.ranges
            .windows(2)
            .all(|pair| pair[0].high <= pair[1].low)
    }

    /// Draws one profile.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> ThresholdProfile {
        let mut thresholds = [0.0; STAGE_COUNT];
        for (slot, range) in thresholds.iter_mut().zip(self.ranges) {
            *slot = range.sample(rng);
        }
        ThresholdProfile::new(thresholds)
    }
}

impl Default for ProfileRanges {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Fixed collection of profiles generated at startup.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ProfileBank {
    profiles: [ThresholdProfile; PROFILE_COUNT],
}

impl ProfileBank {
    /// Generates every profile from `ranges`.
    pub fn generate<R: Rng + ?Sized>(ranges: &ProfileRanges, rng: &mut R) -> Self {
        let mut profiles = [ThresholdProfile::new([0.0; STAGE_COUNT]); PROFILE_COUNT];
        for profile in &mut profiles {
            *profile = ranges.sample(rng);
        }
        Self { profiles }
    }

    /// Uses explicitly supplied profiles.
    #[must_use]
    pub const fn from_profiles(profiles: [ThresholdProfile; PROFILE_COUNT]) -> Self {
        Self { profiles }
    }

    /// Fills every slot with the same profile, making `Start` deterministic.
    #[must_use]
    pub const fn uniform(profile: ThresholdProfile) -> Self {
        Self {
            profiles: [profile; PROFILE_COUNT],
        }
    }

    /// Profile stored at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&ThresholdProfile> {
        self.profiles.get(index)
    }

    /// Number of stored profiles (always [`PROFILE_COUNT`]).
    #[must_use]
    pub const fn len(&self) -> usize {
        PROFILE_COUNT
    }

    /// Banks are never empty; provided for API symmetry with `len`.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// Iterates the stored profiles in index order.
    pub fn iter(&self) -> impl Iterator<Item = &ThresholdProfile> {
        self.profiles.iter()
    }

    /// Picks a uniformly random index.
    pub fn pick_index<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        rng.gen_range(0..PROFILE_COUNT)
    }

    /// Picks a uniformly random profile along with its index.
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> (usize, ThresholdProfile) {
        let index = self.pick_index(rng);
        (index, self.profiles[index])
    }
}
