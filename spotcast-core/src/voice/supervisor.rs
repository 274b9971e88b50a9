//! Keeps captured audio flowing into a voice connection.
//!
//! Each call to [`StreamSupervisor::start`] spawns one [`SupervisorSession`]
//! task that owns at most one capture/playback pairing at a time. Every event
//! for the session (capture errors, playback status, connection status,
//! destruction) is handled inside that single task, so two faults arriving
//! back to back can never start two restart chains.
//!
//! Session lifecycle:
//!
//! ```text
//! Starting -> Streaming -> Faulted -> (delay) -> Starting -> ...
//!     \___________\___________\______________________> Destroyed
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::{Receiver, UnboundedReceiver};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use spotcast_common::models::voice::{
    AudioResource, CaptureProcess, ConnectionState, PcmFormat, PlaybackActor, PlaybackStatus,
    StateTransition, VoiceTarget,
};
use spotcast_common::traits::{CaptureSource, VoiceTransport};

use crate::Error;
use crate::voice::policy::RestartPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Starting,
    Streaming,
    Faulted,
    Destroyed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionState::Starting => "starting",
            SessionState::Streaming => "streaming",
            SessionState::Faulted => "faulted",
            SessionState::Destroyed => "destroyed",
        };
        f.write_str(s)
    }
}

/// Creates streaming sessions. Cheap to share; holds no per-session state.
pub struct StreamSupervisor {
    capture: Arc<dyn CaptureSource>,
    policy: Arc<dyn RestartPolicy>,
    format: PcmFormat,
}

impl StreamSupervisor {
    pub fn new(capture: Arc<dyn CaptureSource>, policy: Arc<dyn RestartPolicy>) -> Self {
        Self { capture, policy, format: PcmFormat::VOICE }
    }

    /// Starts streaming into `connection`. The connection does not need to be
    /// ready yet. The session lives until [`SessionHandle::destroy`] is called,
    /// the handle is dropped, or the connection reports `Destroyed`.
    pub fn start(&self, connection: Arc<dyn VoiceTransport>) -> SessionHandle {
        let target = connection.target();
        let cancel = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(SessionState::Starting);
        let restarts = Arc::new(AtomicU64::new(0));

        let session = SupervisorSession {
            target,
            connection,
            capture: self.capture.clone(),
            policy: self.policy.clone(),
            format: self.format,
            cancel: cancel.clone(),
            state: state_tx,
            restarts: restarts.clone(),
            connection_listener: None,
        };
        let task = tokio::spawn(session.run());

        SessionHandle {
            target,
            cancel,
            state: state_rx,
            restarts,
            task: Some(task),
        }
    }
}

/// Owner's view of a running session. Dropping it destroys the session.
pub struct SessionHandle {
    target: VoiceTarget,
    cancel: CancellationToken,
    state: watch::Receiver<SessionState>,
    restarts: Arc<AtomicU64>,
    task: Option<JoinHandle<()>>,
}

impl SessionHandle {
    pub fn target(&self) -> VoiceTarget {
        self.target
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Completed restarts (pairings recreated after a fault).
    pub fn restarts(&self) -> u64 {
        self.restarts.load(Ordering::SeqCst)
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(|t| t.is_finished())
    }

    /// Requests destruction; a pending restart is cancelled.
    pub fn destroy(&self) {
        self.cancel.cancel();
    }

    /// Destroys the session and waits until its pairing has been disposed.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("Streaming session for {} ended abnormally: {:?}", self.target, e);
            }
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[derive(Debug)]
enum Fault {
    Capture(String),
    Start(Error),
    PlaybackIdle,
}

enum Exit {
    Fault(Fault),
    Destroyed,
}

/// One live capture process and the playback actor consuming it, with the
/// listeners registered on both.
struct Pairing {
    capture: CaptureProcess,
    player: PlaybackActor,
    capture_errors: Receiver<String>,
    player_events: UnboundedReceiver<StateTransition<PlaybackStatus>>,
}

impl Pairing {
    /// Stops playback, kills the capture process and drops both listeners.
    fn dispose(mut self) {
        self.player.stop();
        self.capture.dispose();
    }
}

struct SupervisorSession {
    target: VoiceTarget,
    connection: Arc<dyn VoiceTransport>,
    capture: Arc<dyn CaptureSource>,
    policy: Arc<dyn RestartPolicy>,
    format: PcmFormat,
    cancel: CancellationToken,
    state: watch::Sender<SessionState>,
    restarts: Arc<AtomicU64>,
    connection_listener: Option<UnboundedReceiver<StateTransition<ConnectionState>>>,
}

impl SupervisorSession {
    async fn run(mut self) {
        let target = self.target;
        let mut attempt: u32 = 0;

        loop {
            if self.cancel.is_cancelled() || self.connection.state() == ConnectionState::Destroyed {
                break;
            }

            self.set_state(SessionState::Starting);
            let exit = match self.attach().await {
                Ok(pairing) => {
                    self.set_state(SessionState::Streaming);
                    self.supervise(pairing).await
                }
                Err(e) => Exit::Fault(Fault::Start(e)),
            };

            let fault = match exit {
                Exit::Destroyed => break,
                Exit::Fault(fault) => fault,
            };

            self.set_state(SessionState::Faulted);
            match &fault {
                Fault::Capture(msg) => error!("Capture error on {}: {}", target, msg),
                Fault::Start(e) => error!("Failed to start stream on {}: {}", target, e),
                Fault::PlaybackIdle => warn!("Audio player on {} went idle", target),
            }

            attempt = attempt.saturating_add(1);
            let delay = self.policy.next_delay(attempt);
            debug!("Restart #{} for {} scheduled in {:?}", attempt, target, delay);

            if self.wait_before_restart(delay).await {
                break;
            }

            match fault {
                Fault::PlaybackIdle => info!("Restarting due to idle state..."),
                _ => info!("Attempting to restart stream..."),
            }
            self.restarts.fetch_add(1, Ordering::SeqCst);
        }

        self.connection_listener = None;
        self.set_state(SessionState::Destroyed);
        info!("Streaming session for {} destroyed", target);
    }

    /// One pass of the start sequence. Listener detachment always precedes
    /// attachment.
    async fn attach(&mut self) -> Result<Pairing, Error> {
        info!("Starting streaming on {}...", self.target);

        // Drop the listener left over from the previous pairing first, then
        // watch the connection for the whole start sequence.
        self.connection_listener = None;
        self.connection_listener = Some(self.connection.subscribe_state());

        let mut capture = self.capture.spawn(self.format).await?;
        let capture_errors = capture
            .take_error_listener()
            .ok_or_else(|| Error::Capture("capture error listener already taken".into()))?;
        let stream = capture
            .take_stream()
            .ok_or_else(|| Error::Capture("capture stream already taken".into()))?;

        let resource = AudioResource::raw(stream, self.format);
        let mut player = self.connection.play(resource).await?;
        let player_events = player
            .take_listener()
            .ok_or_else(|| Error::Voice("playback listener already taken".into()))?;
        debug!("{} now playing from {}", self.target, capture.description());

        Ok(Pairing { capture, player, capture_errors, player_events })
    }

    /// Watches a live pairing until it faults or the session is destroyed,
    /// then disposes it.
    async fn supervise(&mut self, mut pairing: Pairing) -> Exit {
        let target = self.target;
        let mut capture_open = true;

        let exit = loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => break Exit::Destroyed,

                err = pairing.capture_errors.recv(), if capture_open => match err {
                    Some(msg) => break Exit::Fault(Fault::Capture(msg)),
                    None => {
                        // Clean exit; the player will go idle once the stream drains.
                        debug!("Capture process for {} exited cleanly", target);
                        capture_open = false;
                    }
                },

                change = pairing.player_events.recv() => match change {
                    Some(change) => {
                        info!("Audio player state changed {}", change);
                        if change.new == PlaybackStatus::Idle {
                            break Exit::Fault(Fault::PlaybackIdle);
                        }
                    }
                    None => break Exit::Fault(Fault::PlaybackIdle),
                },

                change = next_connection_change(&mut self.connection_listener) => {
                    if is_destroyed(target, change) {
                        break Exit::Destroyed;
                    }
                }
            }
        };

        pairing.dispose();
        exit
    }

    /// Sleeps out the restart delay. Returns `true` when the session was
    /// destroyed in the meantime.
    async fn wait_before_restart(&mut self, delay: std::time::Duration) -> bool {
        let target = self.target;
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return true,
                change = next_connection_change(&mut self.connection_listener) => {
                    if is_destroyed(target, change) {
                        return true;
                    }
                }
                _ = &mut sleep => return false,
            }
        }
    }

    fn set_state(&self, state: SessionState) {
        let old = self.state.send_replace(state);
        if old != state {
            debug!("Session {} {} -> {}", self.target, old, state);
        }
    }
}

async fn next_connection_change(
    listener: &mut Option<UnboundedReceiver<StateTransition<ConnectionState>>>,
) -> Option<StateTransition<ConnectionState>> {
    match listener {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Logs a connection transition; reports whether the connection is gone.
fn is_destroyed(target: VoiceTarget, change: Option<StateTransition<ConnectionState>>) -> bool {
    match change {
        Some(change) => {
            info!("Connection state changed {} ({})", change, target);
            change.new == ConnectionState::Destroyed
        }
        None => {
            warn!("Connection for {} dropped its listeners", target);
            true
        }
    }
}
