//! Audio boundaries: microphone capture for the noise gate and looping
//! playback of the alarm sound.
//!
//! Hardware backends (cpal for capture, rodio for playback) are only
//! compiled with the `hardware-audio` feature. Without it the daemon
//! still runs, ringing silently and reporting the microphone as missing.

mod analyser;
mod capture;
#[cfg(feature = "hardware-audio")]
mod microphone;
mod playback;
#[cfg(feature = "hardware-audio")]
mod speaker;

use std::sync::Arc;

use crate::config::{CaptureBackend, NoiseGateConfig};
#[cfg(not(feature = "hardware-audio"))]
use crate::tracing::prelude::*;

pub use analyser::{AnalyserConfig, LoudnessAnalyser};
pub use capture::{
    CaptureDevice, CaptureStream, PermissionError, ScriptedCapture, UnavailableCapture,
};
#[cfg(feature = "hardware-audio")]
pub use microphone::MicrophoneCapture;
pub use playback::{PlaybackError, Player, SilentPlayer};
#[cfg(feature = "hardware-audio")]
pub use speaker::SpeakerPlayer;

/// Build the capture device selected in the configuration.
pub fn capture_device(backend: CaptureBackend, gate: &NoiseGateConfig) -> Arc<dyn CaptureDevice> {
    match backend {
        CaptureBackend::Microphone => microphone(),
        CaptureBackend::Simulated => Arc::new(ScriptedCapture::constant(
            gate.loudness_threshold + 1.0,
        )),
        CaptureBackend::Disabled => Arc::new(UnavailableCapture),
    }
}

/// The player for the alarm sound on this build.
pub fn default_player() -> Box<dyn Player> {
    #[cfg(feature = "hardware-audio")]
    {
        Box::new(SpeakerPlayer::new())
    }
    #[cfg(not(feature = "hardware-audio"))]
    {
        Box::new(SilentPlayer::new())
    }
}

#[cfg(feature = "hardware-audio")]
fn microphone() -> Arc<dyn CaptureDevice> {
    Arc::new(MicrophoneCapture)
}

#[cfg(not(feature = "hardware-audio"))]
fn microphone() -> Arc<dyn CaptureDevice> {
    warn!("Built without hardware-audio; microphone capture is unavailable");
    Arc::new(UnavailableCapture)
}
