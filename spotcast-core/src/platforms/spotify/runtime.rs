use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use spotcast_common::traits::PlaybackApi;
use spotcast_spotify::{SpotifyClient, Track};

use crate::Error;
use crate::platforms::PlatformAuth;

/// [`PlaybackApi`] over the Spotify Web API for the authorized account.
pub struct SpotifyPlayback {
    client: Arc<SpotifyClient>,
}

impl SpotifyPlayback {
    pub fn new(client: Arc<SpotifyClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> Arc<SpotifyClient> {
        self.client.clone()
    }
}

#[async_trait]
impl PlatformAuth for SpotifyPlayback {
    async fn authenticate(&mut self) -> Result<(), Error> {
        if self.client.is_authenticated().await {
            return Ok(());
        }
        self.client.refresh_access_token().await?;
        Ok(())
    }

    async fn is_authenticated(&self) -> Result<bool, Error> {
        Ok(self.client.is_authenticated().await)
    }
}

#[async_trait]
impl PlaybackApi for SpotifyPlayback {
    async fn play_uris(&self, uris: Vec<String>) -> Result<(), Error> {
        debug!("Spotify play {:?}", uris);
        Ok(self.client.play(Some(uris)).await?)
    }

    async fn resume(&self) -> Result<(), Error> {
        Ok(self.client.play(None).await?)
    }

    async fn pause(&self) -> Result<(), Error> {
        Ok(self.client.pause().await?)
    }

    async fn skip_to_next(&self) -> Result<(), Error> {
        Ok(self.client.skip_to_next().await?)
    }

    async fn skip_to_previous(&self) -> Result<(), Error> {
        Ok(self.client.skip_to_previous().await?)
    }

    async fn add_to_queue(&self, uri: &str) -> Result<(), Error> {
        Ok(self.client.add_to_queue(uri).await?)
    }

    async fn set_shuffle(&self, state: bool) -> Result<(), Error> {
        Ok(self.client.set_shuffle(state).await?)
    }

    async fn get_track(&self, id: &str) -> Result<Track, Error> {
        Ok(self.client.get_track(id).await?)
    }

    async fn search_track(&self, query: &str) -> Result<Option<Track>, Error> {
        let mut found = self.client.search_tracks(query, 1).await?;
        Ok(if found.is_empty() { None } else { Some(found.remove(0)) })
    }

    async fn currently_playing(&self) -> Result<Option<Track>, Error> {
        let playing = self.client.currently_playing().await?;
        Ok(playing.and_then(|p| p.item))
    }
}
