use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use songbird::Songbird;
use songbird::shards::TwilightMap;
use tokio::sync::Mutex;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use twilight_cache_inmemory::{DefaultInMemoryCache, ResourceType};
use twilight_gateway::{
    self as gateway, CloseFrame, Config, Event, EventTypeFlags, Intents, MessageSender, Shard,
    StreamExt,
};
use twilight_http::Client as HttpClient;
use twilight_http::client::ClientBuilder;
use twilight_model::channel::ChannelType;
use twilight_model::channel::message::Embed;
use twilight_model::gateway::payload::incoming::Ready as ReadyPayload;
use twilight_model::id::Id;
use twilight_model::id::marker::{ChannelMarker, GuildMarker, MessageMarker, UserMarker};
use twilight_util::builder::embed::{EmbedBuilder, EmbedFieldBuilder, EmbedFooterBuilder, ImageSource};

use crate::Error;
use crate::platforms::{ConnectionStatus, PlatformAuth, PlatformIntegration};
use spotcast_common::models::discord::{IncomingMessage, Reply, ReplyEmbed};
use spotcast_common::traits::DiscordApi;

#[derive(Debug, Clone)]
pub enum DiscordEvent {
    Ready { user_id: u64, name: String },
    Message(IncomingMessage),
}

fn id<M>(raw: u64, what: &str) -> Result<Id<M>, Error> {
    Id::new_checked(raw).ok_or_else(|| Error::Platform(format!("Invalid {what} ID: {raw}")))
}

/// Reads gateway events for one shard:
///   - feeds the cache and the voice manager
///   - forwards READY and non-bot guild messages to `tx`.
async fn shard_runner(
    mut shard: Shard,
    tx: UnboundedSender<DiscordEvent>,
    cache: Arc<DefaultInMemoryCache>,
    songbird: Arc<Songbird>,
) {
    let shard_id = shard.id().number();
    info!("(ShardRunner) Shard {shard_id} started. Listening for events.");

    while let Some(item) = shard.next_event(EventTypeFlags::all()).await {
        let event = match item {
            Ok(event) => event,
            Err(err) => {
                error!("Shard {shard_id} => error receiving event: {err:?}");
                continue;
            }
        };

        cache.update(&event);
        songbird.process(&event).await;

        match &event {
            Event::Ready(ready) => {
                let data: &ReadyPayload = ready;
                info!("Shard {shard_id} => READY as {} (ID={})", data.user.name, data.user.id);
                let _ = tx.send(DiscordEvent::Ready {
                    user_id: data.user.id.get(),
                    name: data.user.name.clone(),
                });
            }
            Event::MessageCreate(msg) => {
                if msg.author.bot {
                    trace!("Ignoring bot message from {}", msg.author.name);
                    continue;
                }
                let _ = tx.send(DiscordEvent::Message(IncomingMessage {
                    guild_id: msg.guild_id.map(|g| g.get()),
                    channel_id: msg.channel_id.get(),
                    message_id: msg.id.get(),
                    author_id: msg.author.id.get(),
                    author_name: msg.author.name.clone(),
                    content: msg.content.clone(),
                }));
            }
            _ => {
                trace!("Shard {shard_id} => unhandled event: {:?}", event.kind());
            }
        }
    }

    warn!("(ShardRunner) Shard {shard_id} event loop ended.");
}

pub fn build_embed(embed: &ReplyEmbed) -> Embed {
    let mut builder = EmbedBuilder::new();
    if let Some(title) = &embed.title {
        builder = builder.title(title);
    }
    if let Some(description) = &embed.description {
        builder = builder.description(description);
    }
    if let Some(color) = embed.color {
        builder = builder.color(color);
    }
    if let Some(url) = &embed.thumbnail_url {
        match ImageSource::url(url) {
            Ok(source) => builder = builder.thumbnail(source),
            Err(e) => debug!("Skipping thumbnail {url}: {e}"),
        }
    }
    for field in &embed.fields {
        let mut f = EmbedFieldBuilder::new(&field.name, &field.value);
        if field.inline {
            f = f.inline();
        }
        builder = builder.field(f);
    }
    if let Some(footer) = &embed.footer {
        builder = builder.footer(EmbedFooterBuilder::new(footer));
    }
    builder.build()
}

/// Gateway shards, REST client, cache and voice manager for the bot account.
pub struct DiscordPlatform {
    pub token: String,
    pub connection_status: ConnectionStatus,

    pub rx: Mutex<Option<UnboundedReceiver<DiscordEvent>>>,

    pub shard_tasks: Vec<JoinHandle<()>>,
    pub shard_senders: Vec<MessageSender>,

    pub http: Option<Arc<HttpClient>>,
    pub cache: Option<Arc<DefaultInMemoryCache>>,
    pub songbird: Option<Arc<Songbird>>,
}

impl DiscordPlatform {
    pub fn new(token: String) -> Self {
        Self {
            token,
            connection_status: ConnectionStatus::Disconnected,
            rx: Mutex::new(None),
            shard_tasks: Vec::new(),
            shard_senders: Vec::new(),
            http: None,
            cache: None,
            songbird: None,
        }
    }

    pub async fn next_event(&self) -> Option<DiscordEvent> {
        let mut guard = self.rx.lock().await;
        match guard.as_mut() {
            Some(r) => r.recv().await,
            None => None,
        }
    }

    pub fn songbird(&self) -> Option<Arc<Songbird>> {
        self.songbird.clone()
    }

    /// Asks every shard to close its gateway session. Usable through a shared
    /// reference; the shard loops end once Discord acknowledges.
    pub fn close_shards(&self) {
        for sender in &self.shard_senders {
            let _ = sender.close(CloseFrame::NORMAL);
        }
    }

    fn http(&self) -> Result<&Arc<HttpClient>, Error> {
        self.http
            .as_ref()
            .ok_or_else(|| Error::Platform("Discord is not connected".into()))
    }
}

#[async_trait]
impl PlatformAuth for DiscordPlatform {
    async fn authenticate(&mut self) -> Result<(), Error> {
        if self.token.is_empty() {
            return Err(Error::Auth("Discord token is empty".into()));
        }
        Ok(())
    }

    async fn is_authenticated(&self) -> Result<bool, Error> {
        Ok(!self.token.is_empty())
    }
}

#[async_trait]
impl PlatformIntegration for DiscordPlatform {
    async fn connect(&mut self) -> Result<(), Error> {
        if matches!(self.connection_status, ConnectionStatus::Connected) {
            info!("(DiscordPlatform) Already connected => skipping");
            return Ok(());
        }

        let (tx, rx) = unbounded_channel::<DiscordEvent>();
        {
            let mut guard = self.rx.lock().await;
            *guard = Some(rx);
        }

        let http_client = Arc::new(
            ClientBuilder::new()
                .token(self.token.clone())
                .timeout(Duration::from_secs(30))
                .build(),
        );
        self.http = Some(http_client.clone());

        let me = http_client
            .current_user()
            .await
            .map_err(|e| Error::Platform(format!("Fetching bot user failed: {e}")))?
            .model()
            .await
            .map_err(|e| Error::Platform(format!("Parsing bot user failed: {e}")))?;

        let cache = Arc::new(
            DefaultInMemoryCache::builder()
                .resource_types(ResourceType::GUILD | ResourceType::CHANNEL | ResourceType::VOICE_STATE)
                .build(),
        );
        self.cache = Some(cache.clone());

        let config = Config::new(
            self.token.clone(),
            Intents::GUILDS
                | Intents::GUILD_VOICE_STATES
                | Intents::GUILD_MESSAGES
                | Intents::MESSAGE_CONTENT,
        );

        let shards: Vec<Shard> = gateway::create_recommended(&http_client, config, |_, b| b.build())
            .await
            .map_err(|e| Error::Platform(format!("create_recommended error: {e}")))?
            .collect();

        let senders = shards
            .iter()
            .map(|s| (s.id().number().into(), s.sender()))
            .collect::<HashMap<_, _>>();
        let songbird = Arc::new(Songbird::twilight(Arc::new(TwilightMap::new(senders)), me.id));
        self.songbird = Some(songbird.clone());

        for shard in shards {
            self.shard_senders.push(shard.sender());
            let handle = tokio::spawn(shard_runner(shard, tx.clone(), cache.clone(), songbird.clone()));
            self.shard_tasks.push(handle);
        }

        self.connection_status = ConnectionStatus::Connected;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), Error> {
        self.connection_status = ConnectionStatus::Disconnected;

        self.close_shards();
        for task in &mut self.shard_tasks {
            let _ = task.await;
        }

        self.shard_senders.clear();
        self.shard_tasks.clear();

        {
            let mut guard = self.rx.lock().await;
            *guard = None;
        }

        Ok(())
    }

    async fn get_connection_status(&self) -> Result<ConnectionStatus, Error> {
        Ok(self.connection_status)
    }
}

#[async_trait]
impl DiscordApi for DiscordPlatform {
    async fn reply(&self, channel: u64, message: u64, reply: Reply) -> Result<(), Error> {
        let channel_id: Id<ChannelMarker> = id(channel, "channel")?;
        let message_id: Id<MessageMarker> = id(message, "message")?;
        let request = self.http()?.create_message(channel_id).reply(message_id);

        let result = match &reply {
            Reply::Text(text) => request.content(text).await,
            Reply::Embed(embed) => request.embeds(&[build_embed(embed)]).await,
        };
        result.map_err(|e| Error::Platform(format!("Error sending Discord reply: {e:?}")))?;
        Ok(())
    }

    fn user_voice_channel(&self, guild: u64, user: u64) -> Option<u64> {
        let cache = self.cache.as_ref()?;
        let guild_id: Id<GuildMarker> = Id::new_checked(guild)?;
        let user_id: Id<UserMarker> = Id::new_checked(user)?;
        cache
            .voice_state(user_id, guild_id)
            .map(|state| state.channel_id().get())
    }

    async fn voice_channel_guild(&self, channel: u64) -> Result<u64, Error> {
        let channel_id: Id<ChannelMarker> = id(channel, "channel")?;
        let ch = self
            .http()?
            .channel(channel_id)
            .await
            .map_err(|e| Error::Platform(format!("Error fetching channel {channel}: {e}")))?
            .model()
            .await
            .map_err(|e| Error::Platform(format!("Error parsing channel {channel}: {e}")))?;

        match (ch.kind, ch.guild_id) {
            (ChannelType::GuildVoice | ChannelType::GuildStageVoice, Some(guild)) => Ok(guild.get()),
            (kind, _) => Err(Error::Platform(format!(
                "Channel {channel} is not a guild voice channel ({kind:?})"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spotcast_common::models::discord::{EmbedField, COLOR_SPOTIFY};

    #[test]
    fn embed_conversion_keeps_fields() {
        let mut reply = ReplyEmbed::new();
        reply.title = Some("Now Playing".into());
        reply.color = Some(COLOR_SPOTIFY);
        reply.thumbnail_url = Some("https://i.scdn.co/image/cover".into());
        reply.fields.push(EmbedField::new("Artist", "Alpha, Beta"));

        let embed = build_embed(&reply);
        assert_eq!(embed.title.as_deref(), Some("Now Playing"));
        assert_eq!(embed.color, Some(COLOR_SPOTIFY));
        assert_eq!(embed.fields.len(), 1);
        assert_eq!(embed.fields[0].value, "Alpha, Beta");
        assert!(embed.thumbnail.is_some());
    }

    #[tokio::test]
    async fn lifecycle_without_gateway() {
        let mut platform = DiscordPlatform::new(String::new());
        assert!(platform.authenticate().await.is_err());
        assert!(!platform.is_authenticated().await.unwrap());

        platform.disconnect().await.unwrap();
        assert_eq!(platform.get_connection_status().await.unwrap(), ConnectionStatus::Disconnected);
        assert!(platform.next_event().await.is_none());
    }

    #[tokio::test]
    async fn reply_requires_connection() {
        let platform = DiscordPlatform::new("token".into());
        let err = platform.reply(1, 2, Reply::text("hi")).await.unwrap_err();
        assert!(matches!(err, Error::Platform(_)));
        assert_eq!(platform.user_voice_channel(1, 2), None);
    }
}
