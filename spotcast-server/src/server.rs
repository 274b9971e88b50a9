//! spotcast-server/src/server.rs
//!
//! Wires configuration, Spotify auth, the Discord gateway and the streaming
//! registry together, then runs the event loop until ctrl-c.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use spotcast_core::auth::{
    ensure_port_free, start_callback_server, CallbackServer, CodeMailbox, MailboxAuthHandler,
    RefreshTokenStore,
    SpotifyAuthenticator,
};
use spotcast_core::platforms::discord::{DiscordEvent, DiscordPlatform, SongbirdManager};
use spotcast_core::platforms::spotify::SpotifyPlayback;
use spotcast_core::platforms::{PlatformAuth, PlatformIntegration};
use spotcast_core::services::CommandRouter;
use spotcast_core::tasks::spawn_token_refresh_task;
use spotcast_core::voice::{FfmpegCapture, FixedDelay, SessionRegistry, StreamSupervisor};
use spotcast_core::{BotConfig, Error, RelayConfig};
use spotcast_spotify::SpotifyClient;

use crate::Args;

/// Runs only the OAuth relay until ctrl-c.
pub async fn run_callback(args: &Args) -> Result<(), Error> {
    let relay = RelayConfig::from_env()?;
    let port = args.callback_port.unwrap_or(relay.port);
    ensure_port_free(port).await?;
    let server = start_callback_server(port, CodeMailbox::new(&relay.auth_code_file)).await?;
    info!(
        "Relay writes authorization codes to {}. Press ctrl-c to stop.",
        relay.auth_code_file.display()
    );

    wait_for_ctrl_c().await;
    let _ = server.shutdown.send(());
    Ok(())
}

pub async fn run_bot(args: &Args) -> Result<(), Error> {
    let config = BotConfig::from_env()?;
    let shutdown = CancellationToken::new();

    // 1) Spotify: relay, stored token or browser flow, periodic refresh.
    let mailbox = CodeMailbox::new(&config.auth_code_file);
    let relay = if args.external_callback {
        info!("Using an external callback relay; watching {}", mailbox.path().display());
        None
    } else {
        let port = args.callback_port.unwrap_or_else(|| config.callback_port());
        ensure_port_free(port).await?;
        Some(start_callback_server(port, mailbox.clone()).await?)
    };

    let spotify = Arc::new(SpotifyClient::new(config.spotify.clone()));
    let store = RefreshTokenStore::new(&config.refresh_token_file);
    let authenticator =
        SpotifyAuthenticator::new(spotify.clone(), store.clone(), mailbox.clone(), config.scopes());
    let handler = MailboxAuthHandler::new(mailbox, !args.no_browser);
    if let Err(e) = authenticator.authenticate(&handler).await {
        error!("Spotify authentication failed: {}. Playback commands will fail until restart.", e);
    }
    stop_relay(relay);

    let refresh_task = spawn_token_refresh_task(
        spotify.clone(),
        Some(store),
        config.token_refresh_interval,
        shutdown.clone(),
    );

    // 2) Discord gateway and voice.
    let mut discord = DiscordPlatform::new(config.discord_token.clone());
    discord.authenticate().await?;
    discord.connect().await?;
    let songbird = discord
        .songbird()
        .ok_or_else(|| Error::Platform("voice manager missing after connect".into()))?;
    let discord = Arc::new(discord);
    let voice = Arc::new(SongbirdManager::new(songbird));

    // 3) Streaming and commands.
    let supervisor = StreamSupervisor::new(
        Arc::new(FfmpegCapture::new(config.capture.clone())),
        Arc::new(FixedDelay::new(config.restart_delay)),
    );
    let registry = Arc::new(SessionRegistry::new(supervisor));
    let router = Arc::new(CommandRouter::new(
        config.command_prefix.clone(),
        Arc::new(SpotifyPlayback::new(spotify)),
        voice.clone(),
        discord.clone(),
        registry.clone(),
    ));

    let result = event_loop(&config, &discord, &router).await;

    // 4) Teardown.
    info!("Shutting down...");
    shutdown.cancel();
    registry.shutdown().await;
    voice.leave_all().await;
    discord.close_shards();
    let _ = refresh_task.await;
    result
}

async fn event_loop(
    config: &BotConfig,
    discord: &Arc<DiscordPlatform>,
    router: &Arc<CommandRouter>,
) -> Result<(), Error> {
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received");
                return Ok(());
            }
            event = discord.next_event() => {
                let Some(event) = event else {
                    warn!("Discord event stream ended");
                    return Ok(());
                };
                match event {
                    DiscordEvent::Ready { user_id, name } => {
                        info!("Logged in as {} ({})", name, user_id);
                        if let Some(channel) = config.auto_join_channel {
                            router.auto_join(channel).await?;
                        }
                    }
                    DiscordEvent::Message(msg) => {
                        let router = router.clone();
                        tokio::spawn(async move {
                            if let Err(e) = router.dispatch(&msg).await {
                                error!("Reply to message {} failed: {}", msg.message_id, e);
                            }
                        });
                    }
                }
            }
        }
    }
}

fn stop_relay(relay: Option<CallbackServer>) {
    if let Some(server) = relay {
        let _ = server.shutdown.send(());
    }
}

async fn wait_for_ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Could not listen for ctrl-c: {}", e);
    }
}
