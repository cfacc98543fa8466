//! Alarm sound playback boundary.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::tracing::prelude::*;

#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("Sound asset {0} not found")]
    AssetMissing(PathBuf),

    #[error("Audio output failed: {0}")]
    Output(String),
}

/// Loops a single sound until stopped.
pub trait Player: Send {
    /// Start playing `asset` from the beginning, repeating forever.
    fn start_loop(&mut self, asset: &Path) -> Result<(), PlaybackError>;

    /// Stop playback. The next `start_loop` starts from the beginning.
    fn stop(&mut self);
}

/// Player for builds without audio output: logs instead of playing.
///
/// Clones share the playing flag, so a caller can hand one to the ring
/// controller and watch it through another.
#[derive(Debug, Clone, Default)]
pub struct SilentPlayer {
    playing: Arc<AtomicBool>,
}

impl SilentPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }
}

impl Player for SilentPlayer {
    fn start_loop(&mut self, asset: &Path) -> Result<(), PlaybackError> {
        info!(asset = %asset.display(), "No audio output; ringing silently");
        self.playing.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) {
        self.playing.store(false, Ordering::SeqCst);
    }
}
