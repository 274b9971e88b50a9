use std::future::Future;
use std::time::Duration;

use spotcast_common::models::discord::IncomingMessage;
use spotcast_spotify::{Album, Artist, Image, Track};

pub fn sample_track(id: &str, name: &str, artists: &[&str]) -> Track {
    Track {
        id: Some(id.to_string()),
        name: name.to_string(),
        uri: format!("spotify:track:{id}"),
        artists: artists
            .iter()
            .map(|a| Artist { id: None, name: a.to_string() })
            .collect(),
        album: Album {
            name: format!("{name} (Album)"),
            images: vec![Image {
                url: format!("https://i.scdn.co/image/{id}"),
                width: Some(640),
                height: Some(640),
            }],
        },
        duration_ms: Some(180_000),
    }
}

pub fn guild_message(content: &str) -> IncomingMessage {
    IncomingMessage {
        guild_id: Some(1),
        channel_id: 10,
        message_id: 100,
        author_id: 1000,
        author_name: "tester".to_string(),
        content: content.to_string(),
    }
}

/// Polls `cond` every 10ms until it holds or `timeout` passes. Works with a
/// paused clock, where each poll advances virtual time.
pub async fn wait_until<F>(timeout: Duration, mut cond: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Same as [`wait_until`] for async conditions.
pub async fn wait_until_async<F, Fut>(timeout: Duration, mut cond: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if cond().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
