//! Microphone capture through cpal.
//!
//! cpal streams are not `Send`, so each open stream lives on its own
//! thread. The thread owns the stream until told to stop; the handle
//! handed to the noise gate only holds the shared sample buffer and the
//! stop channel. Joining the thread happens on tokio's blocking pool so
//! device teardown never stalls the runtime.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, StreamConfig};
use parking_lot::Mutex;
use tokio::sync::oneshot;

use super::analyser::LoudnessAnalyser;
use super::capture::{CaptureDevice, CaptureStream, PermissionError};
use crate::tracing::prelude::*;

/// Mono samples kept for analysis (a few analysis frames' worth).
const BUFFER_CAPACITY: usize = 4096;

/// The system's default input device.
#[derive(Debug, Clone, Copy, Default)]
pub struct MicrophoneCapture;

#[async_trait]
impl CaptureDevice for MicrophoneCapture {
    async fn open(&self) -> Result<Box<dyn CaptureStream>, PermissionError> {
        let buffer = Arc::new(Mutex::new(SampleBuffer::new(BUFFER_CAPACITY)));
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = mpsc::channel();

        let thread = thread::Builder::new()
            .name("mic-capture".to_string())
            .spawn({
                let buffer = buffer.clone();
                move || run_capture_thread(buffer, ready_tx, stop_rx)
            })
            .map_err(|e| PermissionError::Denied(format!("capture thread: {e}")))?;

        match ready_rx.await {
            Ok(Ok(())) => Ok(Box::new(MicrophoneStream {
                buffer,
                analyser: LoudnessAnalyser::default(),
                stop_tx,
                thread: Some(thread),
            })),
            Ok(Err(e)) => {
                join_capture_thread(thread).await;
                Err(e)
            }
            Err(_) => Err(PermissionError::Denied(
                "capture thread exited before the stream started".to_string(),
            )),
        }
    }
}

struct MicrophoneStream {
    buffer: Arc<Mutex<SampleBuffer>>,
    analyser: LoudnessAnalyser,
    stop_tx: mpsc::Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl MicrophoneStream {
    fn request_stop(&mut self) -> Option<JoinHandle<()>> {
        let _ = self.stop_tx.send(());
        self.thread.take()
    }
}

impl CaptureStream for MicrophoneStream {
    fn loudness(&mut self) -> f32 {
        // Copy out under the lock; the FFT runs without holding it so the
        // audio callback is never blocked on analysis.
        let samples = self.buffer.lock().latest(self.analyser.fft_size());
        self.analyser.loudness(&samples)
    }

    fn close(mut self: Box<Self>) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        let thread = self.request_stop();
        Box::pin(async move {
            if let Some(thread) = thread {
                join_capture_thread(thread).await;
            }
            debug!("Microphone released");
        })
    }
}

impl Drop for MicrophoneStream {
    fn drop(&mut self) {
        // The thread drops the cpal stream on its own once it sees the stop.
        if self.request_stop().is_some() {
            debug!("Microphone release requested");
        }
    }
}

async fn join_capture_thread(thread: JoinHandle<()>) {
    match tokio::task::spawn_blocking(move || thread.join()).await {
        Ok(Ok(())) => {}
        Ok(Err(_)) => error!("Capture thread panicked"),
        Err(e) => warn!(error = %e, "Could not wait for capture thread"),
    }
}

fn run_capture_thread(
    buffer: Arc<Mutex<SampleBuffer>>,
    ready_tx: oneshot::Sender<Result<(), PermissionError>>,
    stop_rx: mpsc::Receiver<()>,
) {
    let stream = match start_input(buffer) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };
    let _ = ready_tx.send(Ok(()));

    // Either an explicit stop or the handle being dropped ends capture.
    let _ = stop_rx.recv();
    drop(stream);
}

fn start_input(buffer: Arc<Mutex<SampleBuffer>>) -> Result<cpal::Stream, PermissionError> {
    let device = cpal::default_host()
        .default_input_device()
        .ok_or(PermissionError::NoDevice)?;

    let config = device
        .default_input_config()
        .map_err(|e| PermissionError::Denied(e.to_string()))?;
    let channels = config.channels() as usize;

    info!(
        device = %device.name().unwrap_or_else(|_| "unknown".to_string()),
        sample_rate = config.sample_rate().0,
        channels,
        "Opening microphone"
    );

    let stream = match config.sample_format() {
        SampleFormat::F32 => build_stream::<f32>(&device, &config.into(), buffer, channels),
        SampleFormat::I16 => build_stream::<i16>(&device, &config.into(), buffer, channels),
        SampleFormat::U16 => build_stream::<u16>(&device, &config.into(), buffer, channels),
        other => {
            return Err(PermissionError::Denied(format!(
                "unsupported sample format {other:?}"
            )));
        }
    }
    .map_err(|e| PermissionError::Denied(e.to_string()))?;

    stream
        .play()
        .map_err(|e| PermissionError::Denied(e.to_string()))?;

    Ok(stream)
}

fn build_stream<T: cpal::Sample + cpal::SizedSample>(
    device: &Device,
    config: &StreamConfig,
    buffer: Arc<Mutex<SampleBuffer>>,
    channels: usize,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    f32: cpal::FromSample<T>,
{
    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            let mono: Vec<f32> = data
                .chunks(channels)
                .map(|frame| {
                    let sum: f32 = frame
                        .iter()
                        .map(|s| <f32 as cpal::Sample>::from_sample(*s))
                        .sum();
                    sum / channels as f32
                })
                .collect();
            buffer.lock().push(&mono);
        },
        |err| {
            error!(error = %err, "Microphone stream error");
        },
        None,
    )
}

/// Fixed-size circular buffer of the most recent samples.
struct SampleBuffer {
    samples: Vec<f32>,
    write_pos: usize,
}

impl SampleBuffer {
    fn new(capacity: usize) -> Self {
        Self {
            samples: vec![0.0; capacity],
            write_pos: 0,
        }
    }

    fn push(&mut self, data: &[f32]) {
        let capacity = self.samples.len();
        for &sample in data {
            self.samples[self.write_pos] = sample;
            self.write_pos = (self.write_pos + 1) % capacity;
        }
    }

    /// The newest `count` samples, oldest first.
    fn latest(&self, count: usize) -> Vec<f32> {
        let capacity = self.samples.len();
        let count = count.min(capacity);
        let start = (self.write_pos + capacity - count) % capacity;

        (0..count)
            .map(|i| self.samples[(start + i) % capacity])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use super::*;

    /// A stream whose capture thread takes `teardown` to exit after the
    /// stop request. Returns the flag it sets once it has exited.
    fn slow_stream(teardown: Duration) -> (MicrophoneStream, Arc<AtomicBool>) {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let exited = Arc::new(AtomicBool::new(false));
        let thread = thread::spawn({
            let exited = exited.clone();
            move || {
                let _ = stop_rx.recv();
                thread::sleep(teardown);
                exited.store(true, Ordering::SeqCst);
            }
        });
        let stream = MicrophoneStream {
            buffer: Arc::new(Mutex::new(SampleBuffer::new(16))),
            analyser: LoudnessAnalyser::default(),
            stop_tx,
            thread: Some(thread),
        };
        (stream, exited)
    }

    #[tokio::test]
    async fn drop_does_not_wait_for_capture_thread() {
        let (stream, exited) = slow_stream(Duration::from_millis(200));

        drop(stream);

        assert!(!exited.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn close_resolves_after_capture_thread_exits() {
        let (stream, exited) = slow_stream(Duration::from_millis(20));

        Box::new(stream).close().await;

        assert!(exited.load(Ordering::SeqCst));
    }

    #[test]
    fn latest_returns_recent_samples_in_order() {
        let mut buffer = SampleBuffer::new(8);
        buffer.push(&[1.0, 2.0, 3.0, 4.0]);

        assert_eq!(buffer.latest(3), vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn wraps_and_preserves_time_order() {
        let mut buffer = SampleBuffer::new(5);
        buffer.push(&[1.0, 2.0, 3.0]);
        buffer.push(&[4.0, 5.0, 6.0]);

        assert_eq!(buffer.latest(5), vec![2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn caps_count_to_capacity() {
        let mut buffer = SampleBuffer::new(4);
        buffer.push(&[1.0, 2.0, 3.0, 4.0]);

        assert_eq!(buffer.latest(100), vec![1.0, 2.0, 3.0, 4.0]);
    }
}
