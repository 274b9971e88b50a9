//! Environment-driven settings for the bot process.

use std::path::PathBuf;
use std::time::Duration;

use spotcast_spotify::ClientCredentials;
use url::Url;

use crate::Error;
use crate::voice::capture::CaptureSettings;

pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:8888/callback";

pub const SPOTIFY_SCOPES: &[&str] = &[
    "user-read-playback-state",
    "user-modify-playback-state",
    "user-read-currently-playing",
    "streaming",
    "app-remote-control",
    "playlist-read-private",
    "playlist-modify-public",
    "playlist-modify-private",
];

#[derive(Debug, Clone)]
pub struct BotConfig {
    pub discord_token: String,
    /// Voice channel joined automatically on ready.
    pub auto_join_channel: Option<u64>,
    pub command_prefix: String,

    pub spotify: ClientCredentials,
    pub auth_code_file: PathBuf,
    pub refresh_token_file: PathBuf,
    pub token_refresh_interval: Duration,

    pub capture: CaptureSettings,
    pub restart_delay: Duration,
}

impl BotConfig {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self, Error> {
        let _ = dotenv::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &str| get(key).ok_or_else(|| Error::Config(format!("{key} is not set")));
        let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());
        let secs = |key: &str, default: u64| -> Result<Duration, Error> {
            match get(key) {
                Some(v) => v
                    .parse::<u64>()
                    .ok()
                    .filter(|n| *n > 0)
                    .map(Duration::from_secs)
                    .ok_or_else(|| Error::Config(format!("{key} must be a positive number of seconds, got '{v}'"))),
                None => Ok(Duration::from_secs(default)),
            }
        };

        let auto_join_channel = match get("DISCORD_CHANNEL_ID") {
            Some(v) => Some(
                v.parse::<u64>()
                    .ok()
                    .filter(|id| *id != 0)
                    .ok_or_else(|| Error::Config(format!("DISCORD_CHANNEL_ID is not a valid id: '{v}'")))?,
            ),
            None => None,
        };

        let redirect_uri = or("SPOTIFY_REDIRECT_URI", DEFAULT_REDIRECT_URI);
        Url::parse(&redirect_uri)
            .map_err(|e| Error::Config(format!("SPOTIFY_REDIRECT_URI '{redirect_uri}' is invalid: {e}")))?;

        let defaults = CaptureSettings::default();

        Ok(Self {
            discord_token: required("DISCORD_TOKEN")?,
            auto_join_channel,
            command_prefix: or("COMMAND_PREFIX", crate::services::command_service::DEFAULT_PREFIX),
            spotify: ClientCredentials {
                client_id: required("SPOTIFY_CLIENT_ID")?,
                client_secret: required("SPOTIFY_CLIENT_SECRET")?,
                redirect_uri,
            },
            auth_code_file: PathBuf::from(or("SPOTIFY_AUTH_CODE_FILE", "spotify-auth-code.txt")),
            refresh_token_file: PathBuf::from(or("SPOTIFY_REFRESH_TOKEN_FILE", "spotify-refresh-token.txt")),
            token_refresh_interval: secs("SPOTIFY_TOKEN_REFRESH_SECS", 3600)?,
            capture: CaptureSettings {
                ffmpeg_path: or("FFMPEG_PATH", &defaults.ffmpeg_path),
                input_format: or("CAPTURE_INPUT_FORMAT", &defaults.input_format),
                device: or("CAPTURE_DEVICE", &defaults.device),
            },
            restart_delay: secs("STREAM_RESTART_DELAY_SECS", 5)?,
        })
    }

    /// Port the local OAuth relay must listen on for the redirect URI to reach it.
    pub fn callback_port(&self) -> u16 {
        Url::parse(&self.spotify.redirect_uri)
            .ok()
            .and_then(|u| u.port_or_known_default())
            .unwrap_or(8888)
    }

    pub fn scopes(&self) -> Vec<String> {
        SPOTIFY_SCOPES.iter().map(|s| s.to_string()).collect()
    }
}

/// What the standalone OAuth relay needs; none of the bot secrets.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub auth_code_file: PathBuf,
    pub port: u16,
}

impl RelayConfig {
    pub fn from_env() -> Result<Self, Error> {
        let _ = dotenv::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let redirect_uri = get("SPOTIFY_REDIRECT_URI").unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string());
        let url = Url::parse(&redirect_uri)
            .map_err(|e| Error::Config(format!("SPOTIFY_REDIRECT_URI '{redirect_uri}' is invalid: {e}")))?;

        Ok(Self {
            auth_code_file: PathBuf::from(
                get("SPOTIFY_AUTH_CODE_FILE").unwrap_or_else(|| "spotify-auth-code.txt".to_string()),
            ),
            port: url.port_or_known_default().unwrap_or(8888),
        })
    }
}
