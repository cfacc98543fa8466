//! Capture device boundary.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

/// Why a capture stream could not be opened.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PermissionError {
    #[error("Microphone access denied: {0}")]
    Denied(String),

    #[error("No microphone available")]
    NoDevice,

    #[error("Microphone is already in use")]
    Busy,
}

/// A source of live audio input.
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    /// Request an input stream.
    ///
    /// May wait indefinitely, e.g. for the user to grant access, so
    /// callers should be prepared to cancel it.
    async fn open(&self) -> Result<Box<dyn CaptureStream>, PermissionError>;
}

/// An open input stream.
///
/// Dropping it asks the device to release without waiting for it;
/// [`close`](Self::close) resolves once the device is actually free.
pub trait CaptureStream: Send + 'static {
    /// Loudness of the most recent audio, on the 0--255 scale of
    /// [`LoudnessAnalyser`](super::LoudnessAnalyser).
    fn loudness(&mut self) -> f32;

    /// Release the device without blocking the calling task.
    fn close(self: Box<Self>) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(async move { drop(self) })
    }
}

/// A capture device that never opens.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableCapture;

#[async_trait]
impl CaptureDevice for UnavailableCapture {
    async fn open(&self) -> Result<Box<dyn CaptureStream>, PermissionError> {
        Err(PermissionError::NoDevice)
    }
}

/// Capture device that replays a fixed loudness script.
///
/// Each opened stream starts at the top of the script and repeats the
/// last value once it runs out (an empty script reads as silence). Only
/// one stream may be open at a time, like a real exclusive device; a
/// second `open` fails with [`PermissionError::Busy`]. Clones share the
/// same device.
#[derive(Debug, Clone)]
pub struct ScriptedCapture {
    inner: Arc<ScriptedInner>,
}

#[derive(Debug)]
struct ScriptedInner {
    script: Vec<f32>,
    refusal: Option<PermissionError>,
    open: AtomicBool,
    opens: AtomicUsize,
}

impl ScriptedCapture {
    pub fn new(script: impl Into<Vec<f32>>) -> Self {
        Self::build(script.into(), None)
    }

    /// Every sample reads `loudness`.
    pub fn constant(loudness: f32) -> Self {
        Self::new(vec![loudness])
    }

    /// A device whose every `open` fails with `error`.
    pub fn refusing(error: PermissionError) -> Self {
        Self::build(Vec::new(), Some(error))
    }

    fn build(script: Vec<f32>, refusal: Option<PermissionError>) -> Self {
        Self {
            inner: Arc::new(ScriptedInner {
                script,
                refusal,
                open: AtomicBool::new(false),
                opens: AtomicUsize::new(0),
            }),
        }
    }

    /// Whether a stream is currently holding the device.
    pub fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::SeqCst)
    }

    /// Number of streams successfully opened so far.
    pub fn open_count(&self) -> usize {
        self.inner.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CaptureDevice for ScriptedCapture {
    async fn open(&self) -> Result<Box<dyn CaptureStream>, PermissionError> {
        if let Some(error) = &self.inner.refusal {
            return Err(error.clone());
        }
        if self.inner.open.swap(true, Ordering::SeqCst) {
            return Err(PermissionError::Busy);
        }
        self.inner.opens.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(ScriptedStream {
            device: self.inner.clone(),
            position: 0,
        }))
    }
}

struct ScriptedStream {
    device: Arc<ScriptedInner>,
    position: usize,
}

impl CaptureStream for ScriptedStream {
    fn loudness(&mut self) -> f32 {
        let script = &self.device.script;
        let Some(last) = script.len().checked_sub(1) else {
            return 0.0;
        };
        let value = script[self.position.min(last)];
        self.position += 1;
        value
    }
}

impl Drop for ScriptedStream {
    fn drop(&mut self) {
        self.device.open.store(false, Ordering::SeqCst);
    }
}
