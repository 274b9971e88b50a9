// tests/registry_tests.rs

use std::sync::Arc;
use std::time::Duration;

use spotcast_common::models::voice::ConnectionState;
use spotcast_core::test_utils::{wait_until_async, FakeCapture, FakeTransport};
use spotcast_core::voice::{FixedDelay, SessionRegistry, SessionState, StreamSupervisor};

fn registry(capture: &Arc<FakeCapture>) -> SessionRegistry {
    SessionRegistry::new(StreamSupervisor::new(
        capture.clone(),
        Arc::new(FixedDelay::new(Duration::from_secs(5))),
    ))
}

async fn streaming(registry: &SessionRegistry, guild: u64) -> bool {
    wait_until_async(Duration::from_secs(60), || async move {
        registry.state(guild).await == Some(SessionState::Streaming)
    })
    .await
}

#[tokio::test(start_paused = true)]
async fn test_second_start_replaces_first_session() {
    let capture = FakeCapture::new();
    let registry = registry(&capture);
    let transport = FakeTransport::new(7, 70);

    registry.start(transport.clone()).await;
    assert!(streaming(&registry, 7).await);

    registry.start(transport.clone()).await;
    assert!(streaming(&registry, 7).await);

    assert_eq!(capture.spawned(), 2);
    assert_eq!(capture.live(), 1, "old pairing disposed before the new one started");
    assert_eq!(transport.active_players(), 1);
    assert_eq!(transport.connection_listeners(), 1);
    assert_eq!(registry.active_guilds().await, vec![7]);
}

#[tokio::test(start_paused = true)]
async fn test_sessions_are_per_guild() {
    let capture = FakeCapture::new();
    let registry = registry(&capture);

    registry.start(FakeTransport::new(1, 10)).await;
    registry.start(FakeTransport::new(2, 20)).await;
    assert!(streaming(&registry, 1).await);
    assert!(streaming(&registry, 2).await);

    let mut guilds = registry.active_guilds().await;
    guilds.sort();
    assert_eq!(guilds, vec![1, 2]);

    assert!(registry.stop(1).await);
    assert!(!registry.stop(1).await);
    assert_eq!(registry.state(1).await, None);
    assert_eq!(registry.state(2).await, Some(SessionState::Streaming));
    assert_eq!(capture.live(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_destroyed_connection_is_pruned() {
    let capture = FakeCapture::new();
    let registry = registry(&capture);
    let transport = FakeTransport::new(3, 30);

    registry.start(transport.clone()).await;
    assert!(streaming(&registry, 3).await);

    transport.set_connection_state(ConnectionState::Destroyed);
    let reg = &registry;
    assert!(
        wait_until_async(Duration::from_secs(60), || async move {
            reg.state(3).await.is_none()
        })
        .await
    );
    assert!(registry.active_guilds().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_everything() {
    let capture = FakeCapture::new();
    let registry = registry(&capture);

    registry.start(FakeTransport::new(1, 10)).await;
    registry.start(FakeTransport::new(2, 20)).await;
    assert!(streaming(&registry, 1).await);
    assert!(streaming(&registry, 2).await);

    registry.shutdown().await;
    assert_eq!(capture.live(), 0);
    assert!(registry.active_guilds().await.is_empty());
}
