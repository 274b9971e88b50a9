// File: spotcast-common/src/models/voice.rs

use std::fmt;
use std::io::{self, Read};

use crossbeam_channel::Receiver;
use tokio::sync::{mpsc, oneshot};

/// Destination of a voice connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceTarget {
    pub guild_id: u64,
    pub channel_id: u64,
}

impl VoiceTarget {
    pub fn new(guild_id: u64, channel_id: u64) -> Self {
        Self { guild_id, channel_id }
    }
}

impl fmt::Display for VoiceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "guild={} channel={}", self.guild_id, self.channel_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Ready,
    Disconnected,
    Destroyed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Ready => "ready",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Destroyed => "destroyed",
        };
        f.write_str(s)
    }
}

/// Status of a playback actor. `Idle` means the resource ended or starved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStatus {
    Buffering,
    Playing,
    Paused,
    Idle,
}

impl fmt::Display for PlaybackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PlaybackStatus::Buffering => "buffering",
            PlaybackStatus::Playing => "playing",
            PlaybackStatus::Paused => "paused",
            PlaybackStatus::Idle => "idle",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTransition<S> {
    pub old: S,
    pub new: S,
}

impl<S: fmt::Display> fmt::Display for StateTransition<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "from {} to {}", self.old, self.new)
    }
}

/// Interleaved signed 16-bit little-endian PCM, no container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub channels: u16,
    pub sample_rate: u32,
}

impl PcmFormat {
    /// What the voice transport expects: stereo at 48 kHz.
    pub const VOICE: PcmFormat = PcmFormat { channels: 2, sample_rate: 48_000 };

    pub const BYTES_PER_SAMPLE: usize = 2;

    pub fn codec(&self) -> &'static str {
        "pcm_s16le"
    }

    pub fn container(&self) -> &'static str {
        "s16le"
    }
}

impl Default for PcmFormat {
    fn default() -> Self {
        Self::VOICE
    }
}

/// Blocking byte stream fed by a capture process.
///
/// The producer pushes chunks into a bounded channel; once every sender is
/// dropped the stream reports end-of-file.
pub struct PcmStream {
    rx: Receiver<Vec<u8>>,
    chunk: Vec<u8>,
    pos: usize,
}

impl PcmStream {
    pub fn new(rx: Receiver<Vec<u8>>) -> Self {
        Self { rx, chunk: Vec::new(), pos: 0 }
    }

    /// Creates a connected sender/stream pair holding at most `capacity` chunks.
    pub fn channel(capacity: usize) -> (crossbeam_channel::Sender<Vec<u8>>, PcmStream) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (tx, PcmStream::new(rx))
    }
}

impl Read for PcmStream {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        while self.pos >= self.chunk.len() {
            match self.rx.recv() {
                Ok(chunk) => {
                    self.chunk = chunk;
                    self.pos = 0;
                }
                Err(_) => return Ok(0),
            }
        }
        let n = out.len().min(self.chunk.len() - self.pos);
        out[..n].copy_from_slice(&self.chunk[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// A capture stream bound to its playback configuration. Created fresh on
/// every (re)start; always raw PCM with inline volume.
pub struct AudioResource {
    pub stream: PcmStream,
    pub format: PcmFormat,
    pub volume: f32,
}

impl AudioResource {
    /// Raw resource at unity gain.
    pub fn raw(stream: PcmStream, format: PcmFormat) -> Self {
        Self { stream, format, volume: 1.0 }
    }
}

/// Handle to a running capture pipeline.
///
/// Owns the output stream until it is taken, a listener that yields at most
/// one error message, and the kill switch. Dropping the handle disposes it.
pub struct CaptureProcess {
    description: String,
    stream: Option<PcmStream>,
    errors: Option<mpsc::Receiver<String>>,
    kill: Option<oneshot::Sender<()>>,
}

impl CaptureProcess {
    pub fn new(
        description: impl Into<String>,
        stream: PcmStream,
        errors: mpsc::Receiver<String>,
        kill: oneshot::Sender<()>,
    ) -> Self {
        Self {
            description: description.into(),
            stream: Some(stream),
            errors: Some(errors),
            kill: Some(kill),
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn take_stream(&mut self) -> Option<PcmStream> {
        self.stream.take()
    }

    pub fn take_error_listener(&mut self) -> Option<mpsc::Receiver<String>> {
        self.errors.take()
    }

    pub fn is_disposed(&self) -> bool {
        self.kill.is_none()
    }

    /// Asks the pipeline to terminate. Idempotent.
    pub fn dispose(&mut self) {
        self.errors = None;
        self.stream = None;
        if let Some(kill) = self.kill.take() {
            let _ = kill.send(());
        }
    }
}

impl Drop for CaptureProcess {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Transport-specific control over a playing resource.
pub trait PlaybackControl: Send + Sync {
    fn stop(&self);
}

/// Drives one audio resource into a voice connection and reports its status.
pub struct PlaybackActor {
    listener: Option<mpsc::UnboundedReceiver<StateTransition<PlaybackStatus>>>,
    control: Box<dyn PlaybackControl>,
    stopped: bool,
}

impl PlaybackActor {
    pub fn new(
        listener: mpsc::UnboundedReceiver<StateTransition<PlaybackStatus>>,
        control: Box<dyn PlaybackControl>,
    ) -> Self {
        Self { listener: Some(listener), control, stopped: false }
    }

    /// The actor has a single status listener; this hands it out once.
    pub fn take_listener(&mut self) -> Option<mpsc::UnboundedReceiver<StateTransition<PlaybackStatus>>> {
        self.listener.take()
    }

    pub fn stop(&mut self) {
        self.listener = None;
        if !self.stopped {
            self.stopped = true;
            self.control.stop();
        }
    }
}

impl Drop for PlaybackActor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcm_stream_reads_across_chunks_then_eof() {
        let (tx, mut stream) = PcmStream::channel(4);
        tx.send(vec![1, 2, 3]).unwrap();
        tx.send(vec![]).unwrap();
        tx.send(vec![4, 5]).unwrap();
        drop(tx);

        let mut out = Vec::new();
        stream.read_to_end(&mut out).unwrap();
        assert_eq!(out, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn capture_dispose_fires_kill_once() {
        let (_tx, stream) = PcmStream::channel(1);
        let (_err_tx, err_rx) = mpsc::channel(1);
        let (kill_tx, mut kill_rx) = oneshot::channel();
        let mut proc = CaptureProcess::new("test", stream, err_rx, kill_tx);
        assert_eq!(proc.description(), "test");

        assert!(!proc.is_disposed());
        proc.dispose();
        proc.dispose();
        assert!(proc.is_disposed());
        assert!(proc.take_stream().is_none());
        assert!(kill_rx.try_recv().is_ok());
    }

    #[test]
    fn transition_display() {
        let t = StateTransition { old: PlaybackStatus::Playing, new: PlaybackStatus::Idle };
        assert_eq!(t.to_string(), "from playing to idle");
    }
}
