pub mod api;
pub mod voice_traits;

pub use api::{DiscordApi, PlaybackApi};
pub use voice_traits::{CaptureSource, VoiceGateway, VoiceTransport};
