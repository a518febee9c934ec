//! TOML configuration for the emulator.
//!
//! Every section and field is optional; an empty file yields the stock
//! firmware behavior listening on `0.0.0.0:4210`.
//!
//! ```toml
//! [network]
//! bind = "127.0.0.1:4210"
//!
//! [channel]
//! poll_interval_ms = 10
//! receipt_ack = "always"          # or "dispatch-only"
//! unmatched = "defer-top-level"   # or "discard"
//!
//! [sequencer]
//! short_pull_cm = 0.5
//! wait_timeout_ms = 30000
//! completion = "return-to-idle"   # or "stay-armed"
//! stop = "lock-only"              # or "lock-and-end"
//!
//! [profiles]
//! ranges = [[5, 15], [15, 25], [25, 35], [35, 45]]
//!
//! [simulation]
//! tick_interval_ms = 10
//! pull_rate_cm_per_s = 2.0
//! seed = 7
//!
//! [logging]
//! level = "debug"
//! ```

use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use clap::ValueEnum;
use rand::Rng;
use serde::Deserialize;
use trainer_core::channel::{ChannelConfig, ReceiptAck, UnmatchedPolicy, WaitLimit};
use trainer_core::profile::{
    PROFILE_COUNT, ProfileBank, ProfileRanges, STAGE_COUNT, StageRange, ThresholdProfile,
};
use trainer_core::sequencer::{
    CompletionPolicy, DEFAULT_SHORT_PULL, SequencerConfig, StopPolicy,
};

use crate::error::EmulatorError;

/// Port the firmware listens on.
pub const DEFAULT_PORT: u16 = 4210;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EmulatorConfig {
    pub network: NetworkConfig,
    pub channel: ChannelSection,
    pub sequencer: SequencerSection,
    pub profiles: ProfilesSection,
    pub simulation: SimulationConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkConfig {
    pub bind: SocketAddr,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReceiptAckMode {
    #[default]
    Always,
    DispatchOnly,
}

impl From<ReceiptAckMode> for ReceiptAck {
    fn from(mode: ReceiptAckMode) -> Self {
        match mode {
            ReceiptAckMode::Always => ReceiptAck::Always,
            ReceiptAckMode::DispatchOnly => ReceiptAck::DispatchOnly,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnmatchedMode {
    #[default]
    Discard,
    DeferTopLevel,
}

impl From<UnmatchedMode> for UnmatchedPolicy {
    fn from(mode: UnmatchedMode) -> Self {
        match mode {
            UnmatchedMode::Discard => UnmatchedPolicy::Discard,
            UnmatchedMode::DeferTopLevel => UnmatchedPolicy::DeferTopLevel,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChannelSection {
    pub poll_interval_ms: u64,
    pub receipt_ack: ReceiptAckMode,
    pub unmatched: UnmatchedMode,
}

impl Default for ChannelSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: 10,
            receipt_ack: ReceiptAckMode::default(),
            unmatched: UnmatchedMode::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompletionMode {
    #[default]
    ReturnToIdle,
    StayArmed,
}

impl From<CompletionMode> for CompletionPolicy {
    fn from(mode: CompletionMode) -> Self {
        match mode {
            CompletionMode::ReturnToIdle => CompletionPolicy::ReturnToIdle,
            CompletionMode::StayArmed => CompletionPolicy::StayArmed,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopMode {
    #[default]
    LockOnly,
    LockAndEnd,
}

impl From<StopMode> for StopPolicy {
    fn from(mode: StopMode) -> Self {
        match mode {
            StopMode::LockOnly => StopPolicy::LockOnly,
            StopMode::LockAndEnd => StopPolicy::LockAndEnd,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SequencerSection {
    pub short_pull_cm: f32,
    /// Absent means waits never time out.
    pub wait_timeout_ms: Option<u64>,
    pub completion: CompletionMode,
    pub stop: StopMode,
}

impl Default for SequencerSection {
    fn default() -> Self {
        Self {
            short_pull_cm: DEFAULT_SHORT_PULL,
            wait_timeout_ms: None,
            completion: CompletionMode::default(),
            stop: StopMode::default(),
        }
    }
}

/// Where the profile bank comes from.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProfilesSection {
    /// Per-stage `[low, high)` generation ranges.
    pub ranges: Option<[[u16; 2]; STAGE_COUNT]>,
    /// Explicit bank; must hold exactly ten profiles. Wins over `ranges`.
    pub fixed: Option<Vec<[f32; STAGE_COUNT]>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    pub tick_interval_ms: u64,
    /// Constant withdrawal speed applied while the brake allows it.
    pub pull_rate_cm_per_s: f32,
    /// Seeds profile generation and selection; entropy when absent.
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 10,
            pull_rate_cm_per_s: 0.0,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    #[must_use]
    pub const fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub level: LogLevel,
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub bind: Option<SocketAddr>,
    pub pull_rate: Option<f32>,
    pub seed: Option<u64>,
    pub log_level: Option<LogLevel>,
}

impl EmulatorConfig {
    /// Reads and parses `path`.
    pub fn load(path: &Path) -> Result<Self, EmulatorError> {
        let text = fs::read_to_string(path).map_err(|source| EmulatorError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text).map_err(|source| EmulatorError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn apply(&mut self, overrides: &Overrides) {
        if let Some(bind) = overrides.bind {
            self.network.bind = bind;
        }
        if let Some(rate) = overrides.pull_rate {
            self.simulation.pull_rate_cm_per_s = rate;
        }
        if let Some(seed) = overrides.seed {
            self.simulation.seed = Some(seed);
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
    }

    #[must_use]
    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            poll_interval: Duration::from_millis(self.channel.poll_interval_ms),
            receipt_ack: self.channel.receipt_ack.into(),
            unmatched: self.channel.unmatched.into(),
        }
    }

    pub fn sequencer_config(&self) -> Result<SequencerConfig, EmulatorError> {
        let short_pull = self.sequencer.short_pull_cm;
        if !short_pull.is_finite() || short_pull < 0.0 {
            return Err(EmulatorError::InvalidConfig(format!(
                "short_pull_cm must be a non-negative number, got {short_pull}"
            )));
        }

        let wait_limit = self
            .sequencer
            .wait_timeout_ms
            .map_or(WaitLimit::Unbounded, |ms| {
                WaitLimit::Within(Duration::from_millis(ms))
            });

        Ok(SequencerConfig {
            short_pull,
            wait_limit,
            completion: self.sequencer.completion.into(),
            stop: self.sequencer.stop.into(),
            ranges: self.profile_ranges()?,
        })
    }

    pub fn profile_ranges(&self) -> Result<ProfileRanges, EmulatorError> {
        let Some(bounds) = self.profiles.ranges else {
            return Ok(ProfileRanges::DEFAULT);
        };

        let [pain1, pain2, high_damp, low_damp] = bounds.map(|[low, high]| {
            StageRange::new(low, high).ok_or_else(|| {
                EmulatorError::InvalidConfig(format!("profile range [{low}, {high}) is empty"))
            })
        });
        Ok(ProfileRanges::new([pain1?, pain2?, high_damp?, low_damp?]))
    }

    /// Builds the profile bank, drawing from `rng` unless a fixed bank is configured.
    pub fn profile_bank<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<ProfileBank, EmulatorError> {
        let Some(fixed) = &self.profiles.fixed else {
            return Ok(ProfileBank::generate(&self.profile_ranges()?, rng));
        };

        let thresholds: [[f32; STAGE_COUNT]; PROFILE_COUNT] =
            fixed.as_slice().try_into().map_err(|_| {
                EmulatorError::InvalidConfig(format!(
                    "fixed bank needs {PROFILE_COUNT} profiles, got {}",
                    fixed.len()
                ))
            })?;
        Ok(ProfileBank::from_profiles(
            thresholds.map(ThresholdProfile::new),
        ))
    }

    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.simulation.tick_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use trainer_core::profile::Stage;

    use super::*;

    #[test]
    fn empty_file_matches_firmware_defaults() {
        let config = EmulatorConfig::parse("").unwrap();
        assert_eq!(config, EmulatorConfig::default());
        assert_eq!(config.network.bind.port(), DEFAULT_PORT);
        assert_eq!(config.channel_config(), ChannelConfig::default());
        assert_eq!(config.sequencer_config().unwrap(), SequencerConfig::default());
    }

    #[test]
    fn sections_map_onto_core_types() {
        let config = EmulatorConfig::parse(
            r#"
            [network]
            bind = "127.0.0.1:5000"

            [channel]
            poll_interval_ms = 5
            receipt_ack = "dispatch-only"
            unmatched = "defer-top-level"

            [sequencer]
            short_pull_cm = 1.5
            wait_timeout_ms = 2000
            completion = "stay-armed"
            stop = "lock-and-end"

            [profiles]
            ranges = [[1, 2], [2, 3], [3, 4], [4, 5]]

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();

        let channel = config.channel_config();
        assert_eq!(channel.poll_interval, Duration::from_millis(5));
        assert_eq!(channel.receipt_ack, ReceiptAck::DispatchOnly);
        assert_eq!(channel.unmatched, UnmatchedPolicy::DeferTopLevel);

        let sequencer = config.sequencer_config().unwrap();
        assert_eq!(sequencer.short_pull.to_bits(), 1.5_f32.to_bits());
        assert_eq!(
            sequencer.wait_limit,
            WaitLimit::Within(Duration::from_secs(2))
        );
        assert_eq!(sequencer.completion, CompletionPolicy::StayArmed);
        assert_eq!(sequencer.stop, StopPolicy::LockAndEnd);
        assert_eq!(sequencer.ranges.range(Stage::LowDamp), StageRange::new(4, 5).unwrap());
        assert_eq!(config.logging.level, LogLevel::Debug);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(EmulatorConfig::parse("[network]\nport = 1\n").is_err());
    }

    #[test]
    fn empty_ranges_are_invalid() {
        let config =
            EmulatorConfig::parse("[profiles]\nranges = [[5, 5], [15, 25], [25, 35], [35, 45]]\n")
                .unwrap();
        assert!(matches!(
            config.sequencer_config(),
            Err(EmulatorError::InvalidConfig(_))
        ));
    }

    #[test]
    fn fixed_bank_requires_ten_profiles() {
        let mut rng = StdRng::seed_from_u64(0);
        let short = EmulatorConfig::parse("[profiles]\nfixed = [[1.0, 2.0, 3.0, 4.0]]\n").unwrap();
        assert!(short.profile_bank(&mut rng).is_err());

        let rows = vec!["[10.0, 20.0, 30.0, 40.0]"; PROFILE_COUNT].join(", ");
        let full = EmulatorConfig::parse(&format!("[profiles]\nfixed = [{rows}]\n")).unwrap();
        let bank = full.profile_bank(&mut rng).unwrap();
        let expected = [10.0_f32, 20.0, 30.0, 40.0].map(f32::to_bits);
        assert!(
            bank.iter()
                .all(|profile| profile.thresholds().map(f32::to_bits) == expected)
        );
    }

    #[test]
    fn overrides_win_over_the_file() {
        let mut config = EmulatorConfig::parse("[simulation]\nseed = 1\n").unwrap();
        config.apply(&Overrides {
            bind: Some("127.0.0.1:9999".parse().unwrap()),
            pull_rate: Some(3.0),
            seed: Some(2),
            log_level: Some(LogLevel::Warn),
        });

        assert_eq!(config.network.bind.port(), 9999);
        assert_eq!(config.simulation.pull_rate_cm_per_s.to_bits(), 3.0_f32.to_bits());
        assert_eq!(config.simulation.seed, Some(2));
        assert_eq!(config.logging.level, LogLevel::Warn);
    }

    #[test]
    fn negative_short_pull_is_invalid() {
        let config = EmulatorConfig::parse("[sequencer]\nshort_pull_cm = -1.0\n").unwrap();
        assert!(config.sequencer_config().is_err());
    }
}
