/// Colour used for help and informational embeds.
pub const COLOR_INFO: u32 = 0x0099ff;
/// Spotify green, used for playback embeds.
pub const COLOR_SPOTIFY: u32 = 0x1DB954;

#[derive(Debug, Clone, PartialEq)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

impl EmbedField {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { name: name.into(), value: value.into(), inline: false }
    }
}

/// Platform-neutral embed; the discord runtime converts it with twilight's builders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplyEmbed {
    pub title: Option<String>,
    pub description: Option<String>,
    pub color: Option<u32>,
    pub thumbnail_url: Option<String>,
    pub fields: Vec<EmbedField>,
    pub footer: Option<String>,
}

impl ReplyEmbed {
    pub fn new() -> Self {
        Self::default()
    }
}

/// What a command answers with.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Text(String),
    Embed(ReplyEmbed),
}

impl Reply {
    pub fn text(s: impl Into<String>) -> Self {
        Reply::Text(s.into())
    }

    /// Text content, or the embed title, for logs and assertions.
    pub fn summary(&self) -> String {
        match self {
            Reply::Text(t) => t.clone(),
            Reply::Embed(e) => e.title.clone().unwrap_or_default(),
        }
    }
}

/// A guild text message addressed to the bot, stripped to what commands need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub guild_id: Option<u64>,
    pub channel_id: u64,
    pub message_id: u64,
    pub author_id: u64,
    pub author_name: String,
    pub content: String,
}
