//! ffmpeg-backed capture of a system audio device.

use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{ChildStderr, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, trace, warn};

use spotcast_common::models::voice::{CaptureProcess, PcmFormat, PcmStream};
use spotcast_common::traits::CaptureSource;

use crate::Error;

/// 20 ms of 48 kHz stereo s16le.
const CHUNK_BYTES: usize = 3_840;
/// Roughly one second of audio buffered between ffmpeg and the voice driver.
const STREAM_CAPACITY: usize = 50;

#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub ffmpeg_path: String,
    /// ffmpeg input format, e.g. `dshow`, `pulse`, `avfoundation`.
    pub input_format: String,
    /// Device name as ffmpeg expects it for `input_format`.
    pub device: String,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            input_format: "dshow".to_string(),
            device: "audio=CABLE Output (VB-Audio Virtual Cable)".to_string(),
        }
    }
}

pub struct FfmpegCapture {
    settings: CaptureSettings,
}

impl FfmpegCapture {
    pub fn new(settings: CaptureSettings) -> Self {
        Self { settings }
    }

    /// Arguments for one capture run: raw PCM on stdout, nothing else.
    pub fn args(&self, format: PcmFormat) -> Vec<String> {
        vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-f".into(),
            self.settings.input_format.clone(),
            "-i".into(),
            self.settings.device.clone(),
            "-ac".into(),
            format.channels.to_string(),
            "-ar".into(),
            format.sample_rate.to_string(),
            "-acodec".into(),
            format.codec().into(),
            "-f".into(),
            format.container().into(),
            "pipe:1".into(),
        ]
    }

    /// The full invocation as it is logged on start.
    pub fn command_line(&self, format: PcmFormat) -> String {
        format!("{} {}", self.settings.ffmpeg_path, self.args(format).join(" "))
    }
}

#[async_trait]
impl CaptureSource for FfmpegCapture {
    async fn spawn(&self, format: PcmFormat) -> Result<CaptureProcess, Error> {
        let args = self.args(format);
        info!("FFmpeg started: {}", self.command_line(format));

        let mut child = Command::new(&self.settings.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::Capture(format!("failed to start {}: {}", self.settings.ffmpeg_path, e))
            })?;

        let pid = child.id();
        info!("Capture process started (pid {:?}) on '{}'", pid, self.settings.device);

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Capture("capture stdout not piped".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Capture("capture stderr not piped".into()))?;

        let (pcm_tx, stream) = PcmStream::channel(STREAM_CAPACITY);
        let (err_tx, err_rx) = mpsc::channel(1);
        let (kill_tx, kill_rx) = oneshot::channel::<()>();
        let last_stderr = Arc::new(Mutex::new(None::<String>));

        tokio::spawn(pump_stdout(stdout, pcm_tx));
        tokio::spawn(drain_stderr(stderr, last_stderr.clone()));

        tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => {
                    let message = match status {
                        Ok(status) if status.success() => None,
                        Ok(status) => {
                            let detail = last_stderr.lock().take().unwrap_or_default();
                            Some(format!("ffmpeg exited with {}: {}", status, detail))
                        }
                        Err(e) => Some(format!("failed to wait on ffmpeg: {}", e)),
                    };
                    match message {
                        Some(msg) => {
                            let _ = err_tx.send(msg).await;
                        }
                        None => debug!("Capture process {:?} finished", pid),
                    }
                }
                _ = kill_rx => {
                    if let Err(e) = child.kill().await {
                        error!("Failed to kill capture process {:?}: {}", pid, e);
                    } else {
                        debug!("Capture process {:?} killed", pid);
                    }
                }
            }
        });

        Ok(CaptureProcess::new(
            format!("{} ({})", self.settings.ffmpeg_path, self.settings.device),
            stream,
            err_rx,
            kill_tx,
        ))
    }
}

/// Moves stdout into the PCM channel. Live audio: when the consumer falls
/// behind, chunks are dropped rather than queued.
async fn pump_stdout(mut stdout: ChildStdout, tx: crossbeam_channel::Sender<Vec<u8>>) {
    let mut buf = vec![0u8; CHUNK_BYTES];
    loop {
        match stdout.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => match tx.try_send(buf[..n].to_vec()) {
                Ok(()) => {}
                Err(crossbeam_channel::TrySendError::Full(_)) => {
                    trace!("PCM consumer lagging; dropped {} bytes", n);
                }
                Err(crossbeam_channel::TrySendError::Disconnected(_)) => break,
            },
            Err(e) => {
                warn!("Reading capture output failed: {}", e);
                break;
            }
        }
    }
}

async fn drain_stderr(stderr: ChildStderr, last: Arc<Mutex<Option<String>>>) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        warn!("[ffmpeg] {}", line);
        *last.lock() = Some(line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_request_voice_pcm() {
        let capture = FfmpegCapture::new(CaptureSettings {
            ffmpeg_path: "ffmpeg".into(),
            input_format: "pulse".into(),
            device: "default".into(),
        });
        let args = capture.args(PcmFormat::VOICE).join(" ");
        assert_eq!(
            args,
            "-hide_banner -loglevel error -f pulse -i default -ac 2 -ar 48000 -acodec pcm_s16le -f s16le pipe:1"
        );
    }

    #[test]
    fn command_line_names_binary_and_device() {
        let capture = FfmpegCapture::new(CaptureSettings {
            ffmpeg_path: "/usr/bin/ffmpeg".into(),
            input_format: "dshow".into(),
            device: "audio=CABLE Output".into(),
        });
        let line = capture.command_line(PcmFormat::VOICE);
        assert!(line.starts_with("/usr/bin/ffmpeg -hide_banner "), "{line}");
        assert!(line.contains("-f dshow -i audio=CABLE Output -ac 2"), "{line}");
        assert!(line.ends_with("pipe:1"), "{line}");
    }

    #[tokio::test]
    async fn missing_binary_fails_to_spawn() {
        let capture = FfmpegCapture::new(CaptureSettings {
            ffmpeg_path: "/nonexistent/ffmpeg-binary".into(),
            ..CaptureSettings::default()
        });
        match capture.spawn(PcmFormat::VOICE).await {
            Err(Error::Capture(msg)) => assert!(msg.contains("failed to start")),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("spawn should fail"),
        }
    }
}
