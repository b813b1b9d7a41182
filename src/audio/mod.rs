//! Full-duplex PCM pipeline over PulseAudio's simple API: recorded samples
//! are handed to the GIP session for transmission, incoming samples are
//! played back locally.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use libpulse_binding::sample::{Format, Spec};
use libpulse_binding::stream::Direction;
use libpulse_simple_binding::Simple;
use thiserror::Error;

const APPLICATION_NAME: &str = "padlink";

// From the users' perspective
const STREAM_NAME_SOURCE: &str = "output";
const STREAM_NAME_SINK: &str = "input";

/// 256 stereo S16LE frames per record chunk.
const RECORD_CHUNK_SIZE: usize = 256 * 4;

const STATE_RUNNING: u8 = 0;
const STATE_STOPPING: u8 = 1;

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("invalid sample specification")]
    InvalidSpec,
    #[error("audio stream is closed")]
    Closed,
}

/// One record and one playback stream at the negotiated sample rate. The
/// streams live on their own threads; recording pushes chunks into
/// `samples_read`, playback drains a channel fed by [`AudioStream::write`].
pub struct AudioStream {
    playback: Sender<Vec<u8>>,
    state: Arc<AtomicU8>,
    record_thread: Option<JoinHandle<()>>,
    playback_thread: Option<JoinHandle<()>>,
}

impl AudioStream {
    pub fn new<F>(sample_rate: u32, samples_read: F) -> Result<Self, AudioError>
    where
        F: Fn(&[u8]) + Send + 'static,
    {
        let spec = Spec {
            format: Format::S16le,
            channels: 2,
            rate: sample_rate,
        };

        if !spec.is_valid() {
            return Err(AudioError::InvalidSpec);
        }

        let state = Arc::new(AtomicU8::new(STATE_RUNNING));
        let (playback, samples) = mpsc::channel::<Vec<u8>>();

        let record_thread = {
            let state = state.clone();

            thread::spawn(move || Self::record(spec, state, samples_read))
        };

        let playback_thread = thread::spawn(move || Self::play(spec, samples));

        Ok(Self {
            playback,
            state,
            record_thread: Some(record_thread),
            playback_thread: Some(playback_thread),
        })
    }

    /// Queues samples received from the client for local playback.
    pub fn write(&self, samples: &[u8]) -> Result<(), AudioError> {
        self.playback
            .send(samples.to_vec())
            .map_err(|_| AudioError::Closed)
    }

    fn record<F>(spec: Spec, state: Arc<AtomicU8>, samples_read: F)
    where
        F: Fn(&[u8]),
    {
        let source = match Simple::new(
            None,
            APPLICATION_NAME,
            Direction::Record,
            None,
            STREAM_NAME_SOURCE,
            &spec,
            None,
            None,
        ) {
            Ok(source) => source,
            Err(e) => {
                log::error!("Failed to create audio source: {e}");

                return;
            }
        };

        let mut samples = [0u8; RECORD_CHUNK_SIZE];

        while state.load(Ordering::SeqCst) == STATE_RUNNING {
            if let Err(e) = source.read(&mut samples) {
                log::error!("Failed to read from audio source: {e}");

                break;
            }

            if state.load(Ordering::SeqCst) == STATE_RUNNING {
                samples_read(&samples);
            }
        }
    }

    fn play(spec: Spec, samples: mpsc::Receiver<Vec<u8>>) {
        let sink = match Simple::new(
            None,
            APPLICATION_NAME,
            Direction::Playback,
            None,
            STREAM_NAME_SINK,
            &spec,
            None,
            None,
        ) {
            Ok(sink) => sink,
            Err(e) => {
                log::error!("Failed to create audio sink: {e}");

                return;
            }
        };

        while let Ok(chunk) = samples.recv() {
            if let Err(e) = sink.write(&chunk) {
                log::error!("Failed to write to audio sink: {e}");

                break;
            }
        }
    }
}

impl Drop for AudioStream {
    fn drop(&mut self) {
        self.state.store(STATE_STOPPING, Ordering::SeqCst);

        // Closing the channel stops the playback thread
        let (closed, _) = mpsc::channel();
        self.playback = closed;

        if let Some(thread) = self.record_thread.take() {
            let _ = thread.join();
        }

        if let Some(thread) = self.playback_thread.take() {
            let _ = thread.join();
        }
    }
}
