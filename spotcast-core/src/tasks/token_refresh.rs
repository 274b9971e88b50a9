// spotcast-core/src/tasks/token_refresh.rs

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use spotcast_spotify::SpotifyClient;

use crate::auth::token_store::RefreshTokenStore;

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(3600);

/// Spawns a background task that refreshes the Spotify access token every
/// `interval` until `shutdown` is cancelled. Failures are logged and retried
/// on the next tick. A rotated refresh token is written to `store`.
pub fn spawn_token_refresh_task(
    client: Arc<SpotifyClient>,
    store: Option<RefreshTokenStore>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("Token refresh task stopping");
                    break;
                }
                _ = ticker.tick() => {}
            }

            let previous = client.refresh_token().await;
            match client.refresh_access_token().await {
                Ok(tokens) => {
                    info!("Access token refreshed");
                    if let (Some(store), Some(new)) = (&store, tokens.refresh_token.as_deref()) {
                        if previous.as_deref() != Some(new) {
                            if let Err(e) = store.save(new).await {
                                error!("Could not persist rotated refresh token: {:?}", e);
                            }
                        }
                    }
                }
                Err(e) => error!("Could not refresh access token: {:?}", e),
            }
        }
    })
}
