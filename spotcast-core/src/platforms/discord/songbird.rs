//! songbird.rs
//!
//! Voice connections through Songbird. Each joined guild gets one
//! [`SongbirdConnection`], which reports driver connect/disconnect events as
//! [`ConnectionState`] transitions and plays raw capture PCM as live tracks.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use songbird::input::{Input, RawAdapter};
use songbird::tracks::{Track, TrackHandle};
use songbird::{Call, CoreEvent, Event, EventContext, EventHandler, Songbird, TrackEvent};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};
use twilight_model::id::Id;
use twilight_model::id::marker::{ChannelMarker, GuildMarker};

use spotcast_common::models::voice::{
    AudioResource, ConnectionState, PlaybackActor, PlaybackControl, PlaybackStatus,
    StateTransition, VoiceTarget,
};
use spotcast_common::traits::{VoiceGateway, VoiceTransport};

use crate::Error;
use crate::voice::pcm::S16ToF32Reader;
use crate::voice::transport::ConnectionStateTracker;

fn guild_id(id: u64) -> Result<Id<GuildMarker>, Error> {
    Id::new_checked(id).ok_or_else(|| Error::Voice(format!("invalid guild id {id}")))
}

fn channel_id(id: u64) -> Result<Id<ChannelMarker>, Error> {
    Id::new_checked(id).ok_or_else(|| Error::Voice(format!("invalid channel id {id}")))
}

/// Joins and leaves voice channels, one connection per guild.
pub struct SongbirdManager {
    songbird: Arc<Songbird>,
    connections: Mutex<HashMap<u64, Arc<SongbirdConnection>>>,
}

impl SongbirdManager {
    pub fn new(songbird: Arc<Songbird>) -> Self {
        Self {
            songbird,
            connections: Mutex::new(HashMap::new()),
        }
    }

    pub fn songbird(&self) -> Arc<Songbird> {
        self.songbird.clone()
    }

    /// Leaves every guild we are connected to.
    pub async fn leave_all(&self) {
        let guilds: Vec<u64> = self.connections.lock().keys().copied().collect();
        for guild in guilds {
            if let Err(e) = self.leave(guild).await {
                warn!("Failed to leave voice in guild {}: {}", guild, e);
            }
        }
    }
}

#[async_trait]
impl VoiceGateway for SongbirdManager {
    async fn join(&self, guild: u64, channel: u64) -> Result<Arc<dyn VoiceTransport>, Error> {
        let existing = self.connections.lock().get(&guild).cloned();
        if let Some(existing) = existing.filter(|c| c.state() != ConnectionState::Destroyed) {
            if existing.target.channel_id == channel {
                debug!("Reusing voice connection for guild {}", guild);
                return Ok(existing);
            }
            // Songbird moves the call; the old pairing's channel is gone.
            info!(
                "Moving from voice channel {} to {} in guild {}",
                existing.target.channel_id, channel, guild
            );
            existing.tracker.transition(ConnectionState::Destroyed);
        }

        let call = match self.songbird.join(guild_id(guild)?, channel_id(channel)?).await {
            Ok(call) => call,
            Err(e) => {
                let _ = self.songbird.remove(guild_id(guild)?).await;
                return Err(Error::Voice(format!("failed to join voice channel {channel}: {e}")));
            }
        };
        info!("Joined voice channel {} in guild {}", channel, guild);

        let connection = Arc::new(SongbirdConnection::new(VoiceTarget::new(guild, channel), call));
        connection.register_driver_events().await;
        self.connections.lock().insert(guild, connection.clone());
        Ok(connection)
    }

    async fn leave(&self, guild: u64) -> Result<(), Error> {
        let connection = self.connections.lock().remove(&guild);
        if let Some(connection) = connection {
            connection.tracker.transition(ConnectionState::Destroyed);
        }
        self.songbird
            .remove(guild_id(guild)?)
            .await
            .map_err(|e| Error::Voice(format!("failed to leave guild {guild}: {e}")))?;
        info!("Left voice in guild {}", guild);
        Ok(())
    }

    fn connection(&self, guild: u64) -> Option<Arc<dyn VoiceTransport>> {
        self.connections
            .lock()
            .get(&guild)
            .filter(|c| c.state() != ConnectionState::Destroyed)
            .map(|c| c.clone() as Arc<dyn VoiceTransport>)
    }
}

pub struct SongbirdConnection {
    target: VoiceTarget,
    call: Arc<tokio::sync::Mutex<Call>>,
    tracker: Arc<ConnectionStateTracker>,
}

impl SongbirdConnection {
    fn new(target: VoiceTarget, call: Arc<tokio::sync::Mutex<Call>>) -> Self {
        Self {
            target,
            call,
            tracker: Arc::new(ConnectionStateTracker::new(ConnectionState::Ready)),
        }
    }

    async fn register_driver_events(&self) {
        let mut call = self.call.lock().await;
        for (event, state) in [
            (CoreEvent::DriverConnect, ConnectionState::Ready),
            (CoreEvent::DriverReconnect, ConnectionState::Ready),
            (CoreEvent::DriverDisconnect, ConnectionState::Disconnected),
        ] {
            call.add_global_event(
                event.into(),
                DriverStateForwarder { tracker: self.tracker.clone(), state },
            );
        }
    }
}

#[async_trait]
impl VoiceTransport for SongbirdConnection {
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
        let AudioResource { stream, format, volume } = resource;
        let adapter = RawAdapter::new(
            S16ToF32Reader::new(stream),
            format.sample_rate,
            u32::from(format.channels),
        );
        let input: Input = adapter.into();
        let track = Track::from(input).volume(volume);

        let handle = {
            let mut call = self.call.lock().await;
            call.play_only(track)
        };

        let (tx, rx) = unbounded_channel();
        let status = Arc::new(Mutex::new(PlaybackStatus::Buffering));
        for (event, new) in [
            (TrackEvent::Preparing, PlaybackStatus::Buffering),
            (TrackEvent::Playable, PlaybackStatus::Playing),
            (TrackEvent::Play, PlaybackStatus::Playing),
            (TrackEvent::Pause, PlaybackStatus::Paused),
            (TrackEvent::End, PlaybackStatus::Idle),
            (TrackEvent::Error, PlaybackStatus::Idle),
        ] {
            let forwarder = TrackStatusForwarder { status: status.clone(), new, tx: tx.clone() };
            handle
                .add_event(Event::Track(event), forwarder)
                .map_err(|e| Error::Voice(format!("failed to watch track: {e}")))?;
        }

        Ok(PlaybackActor::new(rx, Box::new(SongbirdPlayback { handle })))
    }
}

struct SongbirdPlayback {
    handle: TrackHandle,
}

impl PlaybackControl for SongbirdPlayback {
    fn stop(&self) {
        if let Err(e) = self.handle.stop() {
            debug!("Track already stopped: {}", e);
        }
    }
}

struct DriverStateForwarder {
    tracker: Arc<ConnectionStateTracker>,
    state: ConnectionState,
}

#[async_trait]
impl EventHandler for DriverStateForwarder {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        if self.tracker.state() == ConnectionState::Destroyed {
            // The call moved on to a newer connection.
            return Some(Event::Cancel);
        }
        self.tracker.transition(self.state);
        None
    }
}

/// Reports a track status change, once per actual change.
struct TrackStatusForwarder {
    status: Arc<Mutex<PlaybackStatus>>,
    new: PlaybackStatus,
    tx: UnboundedSender<StateTransition<PlaybackStatus>>,
}

#[async_trait]
impl EventHandler for TrackStatusForwarder {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        let old = {
            let mut status = self.status.lock();
            if *status == self.new {
                return None;
            }
            std::mem::replace(&mut *status, self.new)
        };
        if self.tx.send(StateTransition { old, new: self.new }).is_err() {
            // Listener detached; nothing left to report to.
            return Some(Event::Cancel);
        }
        None
    }
}
