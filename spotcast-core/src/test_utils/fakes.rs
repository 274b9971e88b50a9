//! In-memory stand-ins for the capture source and voice transport.
//!
//! Both keep the far end of every channel they hand out so tests can inject
//! errors or status changes and count how many listeners are still attached.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio::time::Instant;

use spotcast_common::models::voice::{
    AudioResource, CaptureProcess, ConnectionState, PcmFormat, PcmStream, PlaybackActor,
    PlaybackControl, PlaybackStatus, StateTransition, VoiceTarget,
};
use spotcast_common::traits::{CaptureSource, VoiceGateway, VoiceTransport};

use crate::Error;
use crate::voice::transport::ConnectionStateTracker;

struct FakeProcess {
    error_tx: mpsc::Sender<String>,
    kill_rx: oneshot::Receiver<()>,
    _pcm_tx: crossbeam_channel::Sender<Vec<u8>>,
    killed: bool,
}

impl FakeProcess {
    fn is_killed(&mut self) -> bool {
        if !self.killed {
            // Either an explicit kill or the handle was dropped.
            self.killed = !matches!(self.kill_rx.try_recv(), Err(oneshot::error::TryRecvError::Empty));
        }
        self.killed
    }
}

#[derive(Default)]
struct CaptureInner {
    attempts: Vec<Instant>,
    processes: Vec<FakeProcess>,
    fail_next: usize,
}

/// Capture source whose processes never produce audio on their own.
#[derive(Default)]
pub struct FakeCapture {
    inner: Mutex<CaptureInner>,
}

impl FakeCapture {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Spawn attempts, including failed ones.
    pub fn attempts(&self) -> Vec<Instant> {
        self.inner.lock().attempts.clone()
    }

    pub fn spawned(&self) -> usize {
        self.inner.lock().processes.len()
    }

    /// Processes not yet killed or dropped.
    pub fn live(&self) -> usize {
        self.inner
            .lock()
            .processes
            .iter_mut()
            .map(|p| !p.is_killed())
            .filter(|&live| live)
            .count()
    }

    /// Error listeners still attached across all processes.
    pub fn error_listeners(&self) -> usize {
        self.inner
            .lock()
            .processes
            .iter()
            .filter(|p| !p.error_tx.is_closed())
            .count()
    }

    /// Makes the next `n` spawns fail.
    pub fn fail_next_spawns(&self, n: usize) {
        self.inner.lock().fail_next = n;
    }

    /// Emits a capture error from the most recent process.
    pub fn fail_latest(&self, msg: &str) -> bool {
        let inner = self.inner.lock();
        match inner.processes.last() {
            Some(p) => p.error_tx.try_send(msg.to_string()).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl CaptureSource for FakeCapture {
    async fn spawn(&self, _format: PcmFormat) -> Result<CaptureProcess, Error> {
        let mut inner = self.inner.lock();
        inner.attempts.push(Instant::now());
        if inner.fail_next > 0 {
            inner.fail_next -= 1;
            return Err(Error::Capture("fake spawn failure".into()));
        }

        let (pcm_tx, stream) = PcmStream::channel(4);
        let (error_tx, error_rx) = mpsc::channel(1);
        let (kill_tx, kill_rx) = oneshot::channel();
        inner.processes.push(FakeProcess { error_tx, kill_rx, _pcm_tx: pcm_tx, killed: false });
        Ok(CaptureProcess::new("fake", stream, error_rx, kill_tx))
    }
}

struct FakePlayer {
    status_tx: UnboundedSender<StateTransition<PlaybackStatus>>,
    status: PlaybackStatus,
    stopped: Arc<AtomicBool>,
}

struct FakeControl {
    stopped: Arc<AtomicBool>,
}

impl PlaybackControl for FakeControl {
    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

/// Voice transport that records every `play` call.
pub struct FakeTransport {
    target: VoiceTarget,
    tracker: ConnectionStateTracker,
    players: Mutex<Vec<FakePlayer>>,
    volumes: Mutex<Vec<f32>>,
    plays: AtomicUsize,
    destroy_on_play: AtomicBool,
}

impl FakeTransport {
    pub fn new(guild_id: u64, channel_id: u64) -> Arc<Self> {
        Self::with_state(guild_id, channel_id, ConnectionState::Ready)
    }

    pub fn with_state(guild_id: u64, channel_id: u64, state: ConnectionState) -> Arc<Self> {
        Arc::new(Self {
            target: VoiceTarget::new(guild_id, channel_id),
            tracker: ConnectionStateTracker::new(state),
            players: Mutex::new(Vec::new()),
            volumes: Mutex::new(Vec::new()),
            plays: AtomicUsize::new(0),
            destroy_on_play: AtomicBool::new(false),
        })
    }

    pub fn plays(&self) -> usize {
        self.plays.load(Ordering::SeqCst)
    }

    pub fn volumes(&self) -> Vec<f32> {
        self.volumes.lock().clone()
    }

    /// Players not stopped yet.
    pub fn active_players(&self) -> usize {
        self.players
            .lock()
            .iter()
            .filter(|p| !p.stopped.load(Ordering::SeqCst))
            .count()
    }

    /// Playback listeners still attached across all players.
    pub fn playback_listeners(&self) -> usize {
        self.players
            .lock()
            .iter()
            .filter(|p| !p.status_tx.is_closed())
            .count()
    }

    pub fn connection_listeners(&self) -> usize {
        self.tracker.listener_count()
    }

    /// Moves the most recent player to `status`.
    pub fn set_latest_status(&self, status: PlaybackStatus) -> bool {
        let mut players = self.players.lock();
        let Some(player) = players.last_mut() else {
            return false;
        };
        let old = std::mem::replace(&mut player.status, status);
        old != status && player.status_tx.send(StateTransition { old, new: status }).is_ok()
    }

    pub fn set_connection_state(&self, state: ConnectionState) -> bool {
        self.tracker.transition(state)
    }

    /// The next `play` succeeds, but the connection is destroyed before it
    /// returns.
    pub fn destroy_during_next_play(&self) {
        self.destroy_on_play.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl VoiceTransport for FakeTransport {
    fn target(&self) -> VoiceTarget {
        self.target
    }

    fn state(&self) -> ConnectionState {
        self.tracker.state()
    }

    fn subscribe_state(&self) -> UnboundedReceiver<StateTransition<ConnectionState>> {
        self.tracker.subscribe()
    }

    async fn play(&self, resource: AudioResource) -> Result<PlaybackActor, Error> {
        if self.tracker.state() == ConnectionState::Destroyed {
            return Err(Error::Voice("connection destroyed".into()));
        }
        self.plays.fetch_add(1, Ordering::SeqCst);
        self.volumes.lock().push(resource.volume);

        let (status_tx, status_rx) = mpsc::unbounded_channel();
        let _ = status_tx.send(StateTransition {
            old: PlaybackStatus::Buffering,
            new: PlaybackStatus::Playing,
        });
        let stopped = Arc::new(AtomicBool::new(false));

        let mut players = self.players.lock();
        for previous in players.iter() {
            previous.stopped.store(true, Ordering::SeqCst);
        }
        players.push(FakePlayer {
            status_tx,
            status: PlaybackStatus::Playing,
            stopped: stopped.clone(),
        });
        drop(players);

        if self.destroy_on_play.swap(false, Ordering::SeqCst) {
            self.tracker.transition(ConnectionState::Destroyed);
        }

        Ok(PlaybackActor::new(status_rx, Box::new(FakeControl { stopped })))
    }
}

/// Gateway handing out [`FakeTransport`]s, one per guild.
#[derive(Default)]
pub struct FakeGateway {
    connections: Mutex<Vec<Arc<FakeTransport>>>,
    pub fail_joins: AtomicBool,
}

impl FakeGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn transport(&self, guild_id: u64) -> Option<Arc<FakeTransport>> {
        self.connections
            .lock()
            .iter()
            .find(|c| c.target.guild_id == guild_id && c.state() != ConnectionState::Destroyed)
            .cloned()
    }

    pub fn joins(&self) -> usize {
        self.connections.lock().len()
    }
}

#[async_trait]
impl VoiceGateway for FakeGateway {
    async fn join(&self, guild_id: u64, channel_id: u64) -> Result<Arc<dyn VoiceTransport>, Error> {
        if self.fail_joins.load(Ordering::SeqCst) {
            return Err(Error::Voice("join refused".into()));
        }
        if let Some(existing) = self.transport(guild_id) {
            if existing.target.channel_id == channel_id {
                return Ok(existing);
            }
            existing.set_connection_state(ConnectionState::Destroyed);
        }
        let transport = FakeTransport::new(guild_id, channel_id);
        self.connections.lock().push(transport.clone());
        Ok(transport)
    }

    async fn leave(&self, guild_id: u64) -> Result<(), Error> {
        if let Some(t) = self.transport(guild_id) {
            t.set_connection_state(ConnectionState::Destroyed);
        }
        Ok(())
    }

    fn connection(&self, guild_id: u64) -> Option<Arc<dyn VoiceTransport>> {
        self.transport(guild_id).map(|t| t as Arc<dyn VoiceTransport>)
    }
}
