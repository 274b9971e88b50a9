//! Reply texts and embeds for chat commands.

use spotcast_common::models::discord::{EmbedField, Reply, ReplyEmbed, COLOR_INFO, COLOR_SPOTIFY};
use spotcast_spotify::Track;

pub const PREMIUM_REQUIRED: &str = "❌ This feature requires a Spotify Premium account!";
pub const TRACK_NOT_FOUND: &str = "❌ Track not found!";
pub const NOT_CONNECTED: &str = "Not connected";

/// (usage, description) per verb, in help order.
const HELP_ENTRIES: &[(&str, &str)] = &[
    ("join", "Connect the bot to your voice channel"),
    ("play <song name or Spotify link>", "Play a track from Spotify"),
    ("pause", "Pause the current track"),
    ("resume", "Resume the paused track"),
    ("skip", "Skip to the next track"),
    ("previous", "Go back to the previous track"),
    ("queue <song name or link>", "Add a track to the queue"),
    ("status", "Check the bot's connection status"),
    ("shuffle", "Shuffle the playlist/queue"),
    ("unshuffle", "Turn shuffle off"),
];

pub fn help(prefix: &str) -> Reply {
    let mut embed = ReplyEmbed::new();
    embed.title = Some("🎵 Music Bot Commands".into());
    embed.color = Some(COLOR_INFO);
    embed.fields = HELP_ENTRIES
        .iter()
        .map(|(usage, description)| EmbedField::new(format!("`{prefix}{usage}`"), *description))
        .collect();
    Reply::Embed(embed)
}

/// "🎵 **name**\n👤 artists" as shown in playback embeds.
pub fn track_line(track: &Track) -> String {
    format!("🎵 **{}**\n👤 {}", track.name, track.artist_names())
}

fn playback_embed(title: &str, field: &str, track: &Track) -> Reply {
    let mut embed = ReplyEmbed::new();
    embed.title = Some(title.into());
    embed.color = Some(COLOR_SPOTIFY);
    embed.thumbnail_url = track.cover_url().map(str::to_string);
    embed.fields = vec![
        EmbedField::new(field, track_line(track)),
        EmbedField::new("Album", track.album.name.clone()),
    ];
    Reply::Embed(embed)
}

pub fn now_playing(track: &Track) -> Reply {
    playback_embed("▶️ Now Playing", "Track", track)
}

pub fn skipped_to(track: &Track) -> Reply {
    playback_embed("⏭️ Skipped", "Now Playing", track)
}

pub fn queued(track: &Track) -> Reply {
    Reply::text(format!(
        "✅ Added to queue: {} - {}",
        track.name,
        track.first_artist().unwrap_or("Unknown artist")
    ))
}

pub fn failure(what: &str, err: impl std::fmt::Display) -> Reply {
    Reply::text(format!("❌ {what}: {err}"))
}
