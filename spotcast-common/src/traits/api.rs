use async_trait::async_trait;
use spotcast_spotify::Track;

use crate::error::Error;
use crate::models::discord::Reply;

/// Remote playback control over the user's streaming account.
#[async_trait]
pub trait PlaybackApi: Send + Sync {
    async fn play_uris(&self, uris: Vec<String>) -> Result<(), Error>;
    async fn resume(&self) -> Result<(), Error>;
    async fn pause(&self) -> Result<(), Error>;
    async fn skip_to_next(&self) -> Result<(), Error>;
    async fn skip_to_previous(&self) -> Result<(), Error>;
    async fn add_to_queue(&self, uri: &str) -> Result<(), Error>;
    async fn set_shuffle(&self, state: bool) -> Result<(), Error>;
    async fn get_track(&self, id: &str) -> Result<Track, Error>;
    /// Best match for a free-text query.
    async fn search_track(&self, query: &str) -> Result<Option<Track>, Error>;
    async fn currently_playing(&self) -> Result<Option<Track>, Error>;
}

/// The parts of the chat platform that commands talk to.
#[async_trait]
pub trait DiscordApi: Send + Sync {
    /// Replies to `message_id` in `channel_id`.
    async fn reply(&self, channel_id: u64, message_id: u64, reply: Reply) -> Result<(), Error>;

    /// Voice channel the user currently sits in, from the gateway cache.
    fn user_voice_channel(&self, guild_id: u64, user_id: u64) -> Option<u64>;

    /// Guild owning `channel_id`, or an error if it is not a guild voice channel.
    async fn voice_channel_guild(&self, channel_id: u64) -> Result<u64, Error>;
}
