//! Speaker playback through rodio.
//!
//! rodio's output stream is not `Send`, so a dedicated thread owns it and
//! takes commands over a channel, the same arrangement the microphone
//! uses. Commands are fire-and-forget: decoding and opening the output
//! happen on that thread, and their failures are logged there.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;

use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};

use super::playback::{PlaybackError, Player};
use crate::tracing::prelude::*;

enum SpeakerCommand {
    Play(PathBuf),
    Stop,
}

pub struct SpeakerPlayer {
    /// Dropping the sender ends the thread's loop.
    command_tx: Option<mpsc::Sender<SpeakerCommand>>,
}

impl SpeakerPlayer {
    pub fn new() -> Self {
        let (command_tx, command_rx) = mpsc::channel();
        let thread = thread::Builder::new()
            .name("speaker".to_string())
            .spawn(move || run_speaker_thread(command_rx));

        match thread {
            Ok(_) => Self {
                command_tx: Some(command_tx),
            },
            Err(e) => {
                error!(error = %e, "Could not start speaker thread");
                Self { command_tx: None }
            }
        }
    }
}

impl Default for SpeakerPlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl Player for SpeakerPlayer {
    fn start_loop(&mut self, asset: &Path) -> Result<(), PlaybackError> {
        if !asset.is_file() {
            return Err(PlaybackError::AssetMissing(asset.to_path_buf()));
        }
        let command_tx = self
            .command_tx
            .as_ref()
            .ok_or_else(|| PlaybackError::Output("speaker thread not running".to_string()))?;

        command_tx
            .send(SpeakerCommand::Play(asset.to_path_buf()))
            .map_err(|_| PlaybackError::Output("speaker thread stopped".to_string()))
    }

    fn stop(&mut self) {
        if let Some(command_tx) = &self.command_tx {
            let _ = command_tx.send(SpeakerCommand::Stop);
        }
    }
}

fn run_speaker_thread(command_rx: mpsc::Receiver<SpeakerCommand>) {
    let mut output: Option<(OutputStream, OutputStreamHandle)> = None;
    let mut sink: Option<Sink> = None;

    while let Ok(command) = command_rx.recv() {
        if let Some(old) = sink.take() {
            old.stop();
        }
        if let SpeakerCommand::Play(asset) = command {
            match start_sink(&mut output, &asset) {
                Ok(started) => sink = Some(started),
                Err(e) => error!(error = %e, "Could not play alarm sound"),
            }
        }
    }
}

fn start_sink(
    output: &mut Option<(OutputStream, OutputStreamHandle)>,
    asset: &Path,
) -> Result<Sink, PlaybackError> {
    let file = File::open(asset).map_err(|_| PlaybackError::AssetMissing(asset.to_path_buf()))?;
    let source = Decoder::new(BufReader::new(file))
        .map_err(|e| PlaybackError::Output(format!("decoding {}: {e}", asset.display())))?;

    if output.is_none() {
        let opened =
            OutputStream::try_default().map_err(|e| PlaybackError::Output(e.to_string()))?;
        *output = Some(opened);
    }
    let Some((_, handle)) = output.as_ref() else {
        return Err(PlaybackError::Output("no output stream".to_string()));
    };

    let sink = Sink::try_new(handle).map_err(|e| PlaybackError::Output(e.to_string()))?;
    sink.append(source.repeat_infinite());
    debug!(asset = %asset.display(), "Alarm sound playing");
    Ok(sink)
}
