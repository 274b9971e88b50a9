// File: spotcast-common/src/models/mod.rs
pub mod discord;
pub mod voice;

pub use discord::{EmbedField, IncomingMessage, Reply, ReplyEmbed};
pub use voice::{
    AudioResource, CaptureProcess, ConnectionState, PcmFormat, PcmStream, PlaybackActor,
    PlaybackControl, PlaybackStatus, StateTransition, VoiceTarget,
};
