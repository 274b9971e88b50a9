pub mod runtime;
pub mod songbird;

pub use runtime::{DiscordEvent, DiscordPlatform};
pub use self::songbird::{SongbirdConnection, SongbirdManager};
