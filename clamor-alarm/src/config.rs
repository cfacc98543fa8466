//! Daemon configuration.
//!
//! Every setting has a default; `CLAMOR_*` environment variables override
//! them at startup. A malformed value is a startup error rather than a
//! silent fallback.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, bail};

/// Where the noise gate reads loudness from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::Display)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum CaptureBackend {
    /// Default input device (requires the `hardware-audio` feature).
    Microphone,

    /// Constant loud input, for trying the daemon without a microphone.
    Simulated,

    /// No capture at all; the gate never opens.
    Disabled,
}

#[derive(Debug, Clone)]
pub struct NoiseGateConfig {
    /// How long noise must last, without a quiet sample, before the
    /// silence action unlocks.
    pub required: Duration,

    /// Time between loudness samples.
    pub sample_interval: Duration,

    /// Loudness above which a sample counts as noise, on the 0--255
    /// byte-magnitude scale produced by
    /// [`LoudnessAnalyser`](crate::audio::LoudnessAnalyser).
    pub loudness_threshold: f32,
}

impl NoiseGateConfig {
    /// Number of consecutive loud samples needed to open the gate, or
    /// `None` when it is zero or does not fit a `u32`.
    pub fn tick_count(&self) -> Option<u32> {
        let interval = self.sample_interval.as_nanos().max(1);
        let ticks = self.required.as_nanos().div_ceil(interval);
        u32::try_from(ticks).ok().filter(|&ticks| ticks > 0)
    }

    /// Number of consecutive loud samples needed to open the gate.
    ///
    /// Never less than one. Values that [`tick_count`](Self::tick_count)
    /// rejects saturate rather than wrap; [`Config`] refuses them at
    /// startup.
    pub fn required_ticks(&self) -> u32 {
        if self.required.is_zero() {
            return 1;
        }
        self.tick_count().unwrap_or(u32::MAX)
    }
}

impl Default for NoiseGateConfig {
    fn default() -> Self {
        Self {
            required: Duration::from_secs(5),
            sample_interval: Duration::from_secs(1),
            loudness_threshold: 30.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the persisted alarm slot.
    pub data_dir: PathBuf,

    /// Address the HTTP API listens on.
    pub api_listen: SocketAddr,

    /// How often the scheduler looks for due alarms. Finer polling makes
    /// alarms start closer to their instant at the cost of wakeups.
    pub poll_interval: Duration,

    /// Sound played on loop while an alarm rings.
    pub sound_asset: PathBuf,

    pub capture_backend: CaptureBackend,

    pub noise_gate: NoiseGateConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            api_listen: SocketAddr::from(([127, 0, 0, 1], 7786)),
            poll_interval: Duration::from_secs(5),
            sound_asset: PathBuf::from("assets/sounds/siren.mp3"),
            capture_backend: CaptureBackend::Microphone,
            noise_gate: NoiseGateConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from defaults plus whatever `lookup` returns for
    /// each `CLAMOR_*` key.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Some(dir) = lookup("CLAMOR_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(addr) = parse(&lookup, "CLAMOR_API_LISTEN")? {
            config.api_listen = addr;
        }
        if let Some(secs) = parse::<u64>(&lookup, "CLAMOR_POLL_SECS")? {
            config.poll_interval = Duration::from_secs(secs);
        }
        if let Some(sound) = lookup("CLAMOR_SOUND") {
            config.sound_asset = PathBuf::from(sound);
        }
        if let Some(backend) = parse(&lookup, "CLAMOR_CAPTURE")? {
            config.capture_backend = backend;
        }
        if let Some(secs) = parse::<u64>(&lookup, "CLAMOR_NOISE_SECS")? {
            config.noise_gate.required = Duration::from_secs(secs);
        }
        if let Some(millis) = parse::<u64>(&lookup, "CLAMOR_SAMPLE_MILLIS")? {
            config.noise_gate.sample_interval = Duration::from_millis(millis);
        }
        if let Some(threshold) = parse::<f32>(&lookup, "CLAMOR_NOISE_THRESHOLD")? {
            config.noise_gate.loudness_threshold = threshold;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.poll_interval.is_zero() {
            bail!("poll interval must be positive");
        }
        if self.noise_gate.sample_interval.is_zero() {
            bail!("noise sample interval must be positive");
        }
        if self.noise_gate.required.is_zero() {
            bail!("required noise duration must be positive");
        }
        if self.noise_gate.tick_count().is_none() {
            bail!("required noise duration spans too many samples");
        }
        if !self.noise_gate.loudness_threshold.is_finite() {
            bail!("noise threshold must be a finite number");
        }
        Ok(())
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("invalid value for {key}: {raw:?}"))
        })
        .transpose()
}
