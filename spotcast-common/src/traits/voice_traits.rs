use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Error;
use crate::models::voice::{
    AudioResource, CaptureProcess, ConnectionState, PcmFormat, PlaybackActor, StateTransition,
    VoiceTarget,
};

/// Starts capture pipelines that turn a system audio device into PCM.
#[async_trait]
pub trait CaptureSource: Send + Sync {
    async fn spawn(&self, format: PcmFormat) -> Result<CaptureProcess, Error>;
}

/// A real-time audio connection to one voice channel.
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    fn target(&self) -> VoiceTarget;

    fn state(&self) -> ConnectionState;

    /// Registers a state-change listener. Dropping the receiver detaches it.
    fn subscribe_state(&self) -> mpsc::UnboundedReceiver<StateTransition<ConnectionState>>;

    /// Plays `resource` on a fresh playback actor subscribed to this connection,
    /// replacing whatever was playing before.
    async fn play(&self, resource: AudioResource) -> Result<PlaybackActor, Error>;
}

/// Opens and closes voice connections.
#[async_trait]
pub trait VoiceGateway: Send + Sync {
    /// Returns the guild's connection when it is already in `channel_id`.
    /// Otherwise joins `channel_id`, moving the bot and destroying the guild's
    /// previous connection.
    async fn join(&self, guild_id: u64, channel_id: u64) -> Result<Arc<dyn VoiceTransport>, Error>;

    async fn leave(&self, guild_id: u64) -> Result<(), Error>;

    fn connection(&self, guild_id: u64) -> Option<Arc<dyn VoiceTransport>>;
}
