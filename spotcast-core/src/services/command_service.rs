use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use spotcast_common::models::discord::{IncomingMessage, Reply};
use spotcast_common::traits::{DiscordApi, PlaybackApi, VoiceGateway};

use crate::Error;
use crate::services::replies;
use crate::voice::registry::SessionRegistry;

pub const DEFAULT_PREFIX: &str = ";";
pub const DEFAULT_SKIP_SETTLE: Duration = Duration::from_secs(1);

/// A prefixed chat command split into its verb and argument text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand<'a> {
    pub verb: String,
    pub args: &'a str,
}

pub fn parse_command<'a>(prefix: &str, content: &'a str) -> Option<ParsedCommand<'a>> {
    let rest = content.strip_prefix(prefix)?;
    let (verb, args) = match rest.split_once(char::is_whitespace) {
        Some((verb, args)) => (verb, args.trim()),
        None => (rest, ""),
    };
    if verb.is_empty() {
        return None;
    }
    Some(ParsedCommand { verb: verb.to_lowercase(), args })
}

/// Either a track id taken from a link/URI, or free text to search for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackRef<'a> {
    Id(&'a str),
    Query(&'a str),
}

impl TrackRef<'_> {
    pub fn parse(args: &str) -> TrackRef<'_> {
        if let Some(idx) = args.find("spotify.com/") {
            let path = &args[idx..];
            if let Some(pos) = path.find("/track/") {
                let id = path[pos + "/track/".len()..]
                    .split(['?', '/', '#', ' '])
                    .next()
                    .unwrap_or_default();
                if !id.is_empty() {
                    return TrackRef::Id(id);
                }
            }
        }
        if let Some(id) = args.strip_prefix("spotify:track:") {
            if !id.is_empty() {
                return TrackRef::Id(id);
            }
        }
        TrackRef::Query(args)
    }
}

pub fn track_uri(id: &str) -> String {
    format!("spotify:track:{id}")
}

/// Maps chat commands to voice joins and remote playback calls.
pub struct CommandRouter {
    prefix: String,
    playback: Arc<dyn PlaybackApi>,
    voice: Arc<dyn VoiceGateway>,
    discord: Arc<dyn DiscordApi>,
    registry: Arc<SessionRegistry>,
    skip_settle: Duration,
    auto_joined: AtomicBool,
}

impl CommandRouter {
    pub fn new(
        prefix: impl Into<String>,
        playback: Arc<dyn PlaybackApi>,
        voice: Arc<dyn VoiceGateway>,
        discord: Arc<dyn DiscordApi>,
        registry: Arc<SessionRegistry>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            playback,
            voice,
            discord,
            registry,
            skip_settle: DEFAULT_SKIP_SETTLE,
            auto_joined: AtomicBool::new(false),
        }
    }

    /// How long `skip` waits before asking what is playing now.
    pub fn with_skip_settle(mut self, delay: Duration) -> Self {
        self.skip_settle = delay;
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Handles one message and sends the reply, if any.
    pub async fn dispatch(&self, msg: &IncomingMessage) -> Result<(), Error> {
        if let Some(reply) = self.handle(msg).await {
            self.discord.reply(msg.channel_id, msg.message_id, reply).await?;
        }
        Ok(())
    }

    /// Computes the reply for a message. `None` for anything that is not a
    /// known command.
    pub async fn handle(&self, msg: &IncomingMessage) -> Option<Reply> {
        let cmd = parse_command(&self.prefix, &msg.content)?;
        debug!("Command '{}' from {} args='{}'", cmd.verb, msg.author_name, cmd.args);

        let reply = match cmd.verb.as_str() {
            "help" => replies::help(&self.prefix),
            "test" => Reply::text("Bot is working!"),
            "join" => self.join(msg).await,
            "play" => self.play(cmd.args).await,
            "pause" => self.simple(self.playback.pause(), "⏸️ Paused", "Could not pause").await,
            "resume" => self.simple(self.playback.resume(), "▶️ Resumed", "Could not resume").await,
            "skip" => self.skip().await,
            "previous" => {
                self.simple(
                    self.playback.skip_to_previous(),
                    "⏮️ Went back to the previous track",
                    "Could not skip",
                )
                .await
            }
            "queue" => self.queue(cmd.args).await,
            "status" => self.status(msg).await,
            "shuffle" => {
                self.simple(
                    self.playback.set_shuffle(true),
                    "🔀 Shuffle enabled",
                    "Could not enable shuffle",
                )
                .await
            }
            "unshuffle" => {
                self.simple(
                    self.playback.set_shuffle(false),
                    "➡️ Shuffle disabled",
                    "Could not disable shuffle",
                )
                .await
            }
            _ => return None,
        };
        Some(reply)
    }

    /// Joins the configured channel once per client session and starts
    /// streaming. Later calls are no-ops returning `false`.
    pub async fn auto_join(&self, channel_id: u64) -> Result<bool, Error> {
        if self
            .auto_joined
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Auto-join already done for this session");
            return Ok(false);
        }

        let guild_id = self.discord.voice_channel_guild(channel_id).await?;
        info!("Channel found, connecting to {} in guild {}...", channel_id, guild_id);
        let connection = self.voice.join(guild_id, channel_id).await?;
        self.registry.start(connection).await;
        info!("Connected to voice channel!");
        Ok(true)
    }

    async fn join(&self, msg: &IncomingMessage) -> Reply {
        let Some(guild_id) = msg.guild_id else {
            return Reply::text("❌ This command only works in a server!");
        };
        let Some(channel_id) = self.discord.user_voice_channel(guild_id, msg.author_id) else {
            return Reply::text("❌ You need to join a voice channel first!");
        };

        match self.voice.join(guild_id, channel_id).await {
            Ok(connection) => {
                self.registry.start(connection).await;
                Reply::text("✅ Connected and started streaming!")
            }
            Err(e) => {
                error!("Join failed for guild {}: {}", guild_id, e);
                replies::failure("Could not join the voice channel", e)
            }
        }
    }

    async fn play(&self, args: &str) -> Reply {
        if args.is_empty() {
            return Reply::text("❌ Please enter a link or song name!");
        }
        let result = async {
            let track = match TrackRef::parse(args) {
                TrackRef::Id(id) => {
                    self.playback.play_uris(vec![track_uri(id)]).await?;
                    self.playback.get_track(id).await?
                }
                TrackRef::Query(query) => {
                    let Some(track) = self.playback.search_track(query).await? else {
                        return Ok(None);
                    };
                    self.playback.play_uris(vec![track.uri.clone()]).await?;
                    track
                }
            };
            Ok::<_, Error>(Some(track))
        }
        .await;

        match result {
            Ok(Some(track)) => replies::now_playing(&track),
            Ok(None) => Reply::text(replies::TRACK_NOT_FOUND),
            Err(e) => remote_failure("Error", e),
        }
    }

    async fn queue(&self, args: &str) -> Reply {
        if args.is_empty() {
            return Reply::text("❌ Please enter a link or song name to add to the queue!");
        }
        let result = async {
            let track = match TrackRef::parse(args) {
                TrackRef::Id(id) => {
                    self.playback.add_to_queue(&track_uri(id)).await?;
                    self.playback.get_track(id).await?
                }
                TrackRef::Query(query) => {
                    let Some(track) = self.playback.search_track(query).await? else {
                        return Ok(None);
                    };
                    self.playback.add_to_queue(&track.uri).await?;
                    track
                }
            };
            Ok::<_, Error>(Some(track))
        }
        .await;

        match result {
            Ok(Some(track)) => replies::queued(&track),
            Ok(None) => Reply::text(replies::TRACK_NOT_FOUND),
            Err(e) => remote_failure("Error", e),
        }
    }

    async fn skip(&self) -> Reply {
        if let Err(e) = self.playback.skip_to_next().await {
            return remote_failure("Could not skip", e);
        }
        tokio::time::sleep(self.skip_settle).await;

        match self.playback.currently_playing().await {
            Ok(Some(track)) => replies::skipped_to(&track),
            Ok(None) => Reply::text("⏭️ Skipped to the next track"),
            Err(e) => {
                warn!("Skipped, but reading the current track failed: {}", e);
                Reply::text("⏭️ Skipped to the next track")
            }
        }
    }

    async fn status(&self, msg: &IncomingMessage) -> Reply {
        let Some(guild_id) = msg.guild_id else {
            return Reply::text(replies::NOT_CONNECTED);
        };
        match self.voice.connection(guild_id) {
            Some(connection) => {
                let text = match self.registry.state(guild_id).await {
                    Some(stream) => format!(
                        "Connection status: {} (stream: {})",
                        connection.state(),
                        stream
                    ),
                    None => format!("Connection status: {}", connection.state()),
                };
                Reply::text(text)
            }
            None => Reply::text(replies::NOT_CONNECTED),
        }
    }

    async fn simple<F>(&self, call: F, ok: &str, failed: &str) -> Reply
    where
        F: std::future::Future<Output = Result<(), Error>>,
    {
        match call.await {
            Ok(()) => Reply::text(ok),
            Err(e) => remote_failure(failed, e),
        }
    }
}

fn remote_failure(what: &str, err: Error) -> Reply {
    if err.is_premium_required() {
        return Reply::text(replies::PREMIUM_REQUIRED);
    }
    warn!("{}: {}", what, err);
    replies::failure(what, err)
}
