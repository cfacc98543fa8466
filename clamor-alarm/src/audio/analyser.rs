//! Loudness metric for captured audio.
//!
//! The gate threshold is expressed on the scale a browser analyser node
//! reports frequency data in: per-bin magnitudes in decibels mapped
//! linearly onto 0--255 between a floor and a ceiling. The loudness of a
//! frame is the mean of those bytes over all bins, so broadband noise
//! (voices, clapping, a fan held to the mic) scores high while a faint
//! tone barely registers.

use std::f32::consts::PI;
use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

#[derive(Debug, Clone)]
pub struct AnalyserConfig {
    /// Samples per analysis frame. Must be a power of two.
    pub fft_size: usize,

    /// Weight of the previous frame in each bin (0 = no smoothing).
    pub smoothing: f32,

    /// Magnitude mapped to 0.
    pub min_db: f32,

    /// Magnitude mapped to 255.
    pub max_db: f32,
}

impl Default for AnalyserConfig {
    fn default() -> Self {
        Self {
            fft_size: 512,
            smoothing: 0.8,
            min_db: -100.0,
            max_db: -30.0,
        }
    }
}

pub struct LoudnessAnalyser {
    config: AnalyserConfig,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    smoothed: Vec<f32>,
    frame: Vec<Complex<f32>>,
}

impl LoudnessAnalyser {
    pub fn new(config: AnalyserConfig) -> Self {
        let n = config.fft_size;
        let fft = FftPlanner::new().plan_fft_forward(n);

        Self {
            fft,
            window: blackman(n),
            smoothed: vec![0.0; n / 2],
            frame: vec![Complex::new(0.0, 0.0); n],
            config,
        }
    }

    pub fn fft_size(&self) -> usize {
        self.config.fft_size
    }

    /// Loudness of the newest `fft_size` samples of `samples` (mono,
    /// -1.0..1.0). Shorter input is zero-padded at the front.
    pub fn loudness(&mut self, samples: &[f32]) -> f32 {
        let n = self.config.fft_size;
        let recent = &samples[samples.len().saturating_sub(n)..];
        let pad = n - recent.len();

        for (i, slot) in self.frame.iter_mut().enumerate() {
            let sample = if i < pad { 0.0 } else { recent[i - pad] };
            *slot = Complex::new(sample * self.window[i], 0.0);
        }
        self.fft.process(&mut self.frame);

        let tau = self.config.smoothing;
        let scale = 255.0 / (self.config.max_db - self.config.min_db);
        let mut total = 0.0;

        for (bin, smoothed) in self.frame.iter().zip(self.smoothed.iter_mut()) {
            let magnitude = bin.norm() / n as f32;
            *smoothed = tau * *smoothed + (1.0 - tau) * magnitude;

            if *smoothed > 0.0 {
                let db = 20.0 * smoothed.log10();
                total += ((db - self.config.min_db) * scale).clamp(0.0, 255.0).floor();
            }
        }

        total / self.smoothed.len() as f32
    }
}

impl Default for LoudnessAnalyser {
    fn default() -> Self {
        Self::new(AnalyserConfig::default())
    }
}

fn blackman(n: usize) -> Vec<f32> {
    const A0: f32 = 0.42;
    const A1: f32 = 0.5;
    const A2: f32 = 0.08;

    (0..n)
        .map(|i| {
            let x = i as f32 / n as f32;
            A0 - A1 * (2.0 * PI * x).cos() + A2 * (4.0 * PI * x).cos()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic white noise in -amplitude..amplitude.
    fn noise(len: usize, amplitude: f32) -> Vec<f32> {
        let mut state: u32 = 0x1234_5678;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                let unit = (state >> 8) as f32 / (1u32 << 24) as f32;
                (unit * 2.0 - 1.0) * amplitude
            })
            .collect()
    }

    fn unsmoothed() -> LoudnessAnalyser {
        LoudnessAnalyser::new(AnalyserConfig {
            smoothing: 0.0,
            ..Default::default()
        })
    }

    #[test]
    fn silence_is_zero() {
        let mut analyser = unsmoothed();
        assert_eq!(analyser.loudness(&[0.0; 512]), 0.0);
    }

    #[test]
    fn loud_noise_clears_default_threshold() {
        let mut analyser = unsmoothed();
        let loudness = analyser.loudness(&noise(512, 0.5));
        assert!(loudness > 30.0, "loudness {loudness}");
        assert!(loudness <= 255.0);
    }

    #[test]
    fn faint_noise_stays_below_default_threshold() {
        let mut analyser = unsmoothed();
        let loudness = analyser.loudness(&noise(512, 0.0005));
        assert!(loudness < 30.0, "loudness {loudness}");
    }

    #[test]
    fn louder_input_scores_higher() {
        let mut analyser = unsmoothed();
        let quiet = analyser.loudness(&noise(512, 0.01));
        let loud = analyser.loudness(&noise(512, 0.5));
        assert!(loud > quiet);
    }

    #[test]
    fn uses_only_the_newest_frame() {
        let mut analyser = unsmoothed();
        let mut samples = noise(1024, 0.5);
        samples[512..].fill(0.0);

        assert_eq!(analyser.loudness(&samples), 0.0);
    }

    #[test]
    fn short_input_is_padded() {
        let mut analyser = unsmoothed();
        assert!(analyser.loudness(&noise(100, 0.5)) > 0.0);
        assert_eq!(analyser.loudness(&[]), 0.0);
    }

    #[test]
    fn smoothing_carries_energy_into_following_frames() {
        let mut analyser = LoudnessAnalyser::default();
        analyser.loudness(&noise(512, 0.5));

        assert!(analyser.loudness(&[0.0; 512]) > 0.0);
    }
}
