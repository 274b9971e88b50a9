// tests/auth_tests.rs

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use spotcast_core::auth::{
    start_callback_server, AuthenticationHandler, AuthenticationPrompt, AuthenticationResponse,
    CodeMailbox, MailboxAuthHandler, RefreshTokenStore, SpotifyAuthenticator,
};
use spotcast_core::tasks::spawn_token_refresh_task;
use spotcast_core::test_utils::wait_until_async;
use spotcast_core::Error;
use spotcast_spotify::{ClientCredentials, SpotifyClient, TokenSet};

#[derive(Default)]
struct FakeAccounts {
    refreshes: AtomicUsize,
    exchanges: AtomicUsize,
}

async fn token_endpoint(State(accounts): State<Arc<FakeAccounts>>, body: String) -> (StatusCode, Json<Value>) {
    let params: Vec<(String, String)> = url::form_urlencoded::parse(body.as_bytes())
        .into_owned()
        .collect();
    let param = |key: &str| {
        params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .unwrap_or_default()
    };
    let rejected = || {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "invalid_grant", "error_description": "Invalid grant" })),
        )
    };

    match param("grant_type").as_str() {
        "authorization_code" if param("code") == "good" => {
            accounts.exchanges.fetch_add(1, Ordering::SeqCst);
            (
                StatusCode::OK,
                Json(json!({
                    "access_token": "access-code",
                    "token_type": "Bearer",
                    "expires_in": 3600,
                    "refresh_token": "refresh-from-code",
                    "scope": "streaming"
                })),
            )
        }
        "refresh_token" if param("refresh_token") != "revoked" => {
            let n = accounts.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
            (
                StatusCode::OK,
                Json(json!({
                    "access_token": format!("access-{n}"),
                    "token_type": "Bearer",
                    "expires_in": 3600,
                    "refresh_token": format!("rotated-{n}")
                })),
            )
        }
        _ => rejected(),
    }
}

async fn fake_accounts() -> (SocketAddr, Arc<FakeAccounts>) {
    let accounts = Arc::new(FakeAccounts::default());
    let app = Router::new()
        .route("/api/token", post(token_endpoint))
        .with_state(accounts.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, accounts)
}

fn client(addr: SocketAddr) -> Arc<SpotifyClient> {
    let credentials = ClientCredentials {
        client_id: "cid".into(),
        client_secret: "secret".into(),
        redirect_uri: "http://localhost:8888/callback".into(),
    };
    let base = format!("http://{addr}");
    Arc::new(SpotifyClient::with_base_urls(credentials, &base, &format!("{base}/v1")))
}

/// `state` query parameter of an authorize URL.
fn state_of(url: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()?
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
}

/// Answers every browser prompt with a fixed code and remembers the URLs.
/// The state is echoed from the URL unless `forged_state` is set.
struct StaticCode {
    code: Option<&'static str>,
    forged_state: Option<&'static str>,
    prompts: Mutex<Vec<String>>,
}

impl StaticCode {
    fn new(code: Option<&'static str>) -> Self {
        Self { code, forged_state: None, prompts: Mutex::new(Vec::new()) }
    }

    fn forged(code: &'static str, state: &'static str) -> Self {
        Self { forged_state: Some(state), ..Self::new(Some(code)) }
    }
}

#[async_trait]
impl AuthenticationHandler for StaticCode {
    async fn handle_prompt(&self, prompt: AuthenticationPrompt) -> Result<AuthenticationResponse, Error> {
        let mut state = None;
        if let AuthenticationPrompt::Browser { url } = prompt {
            state = state_of(&url);
            self.prompts.lock().push(url);
        }
        if let Some(forged) = self.forged_state {
            state = Some(forged.to_string());
        }
        Ok(match self.code {
            Some(code) => AuthenticationResponse::Code { code: code.to_string(), state },
            None => AuthenticationResponse::None,
        })
    }
}

/// Plays the browser: follows the redirect to the relay with the state from
/// the authorize URL, then waits on the mailbox like the bot does.
struct RelayBrowser {
    relay: SocketAddr,
    code: &'static str,
    inner: MailboxAuthHandler,
}

#[async_trait]
impl AuthenticationHandler for RelayBrowser {
    async fn handle_prompt(&self, prompt: AuthenticationPrompt) -> Result<AuthenticationResponse, Error> {
        if let AuthenticationPrompt::Browser { url } = &prompt {
            let state = state_of(url).unwrap_or_default();
            let callback = format!(
                "http://{}/callback?code={}&state={}",
                self.relay,
                self.code,
                url::form_urlencoded::byte_serialize(state.as_bytes()).collect::<String>()
            );
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                reqwest::get(callback).await.unwrap();
            });
        }
        self.inner.handle_prompt(prompt).await
    }
}

fn scopes() -> Vec<String> {
    vec!["streaming".into(), "user-modify-playback-state".into()]
}

#[tokio::test]
async fn test_callback_server_drops_code_into_mailbox() {
    let dir = tempfile::tempdir().unwrap();
    let mailbox = CodeMailbox::new(dir.path().join("code.txt"));
    let server = start_callback_server(0, mailbox.clone()).await.unwrap();
    let base = format!("http://{}/callback", server.addr);
    let http = reqwest::Client::new();

    let denied = http.get(format!("{base}?error=access_denied")).send().await.unwrap();
    assert_eq!(denied.status(), reqwest::StatusCode::BAD_REQUEST);
    assert!(!mailbox.path().exists());

    let missing = http.get(&base).send().await.unwrap();
    assert_eq!(missing.status(), reqwest::StatusCode::BAD_REQUEST);

    let ok = http.get(format!("{base}?code=abc123&state=xyz")).send().await.unwrap();
    assert_eq!(ok.status(), reqwest::StatusCode::OK);
    assert!(ok.text().await.unwrap().contains("Authentication successful!"));
    let received = mailbox.wait_for_code(Duration::from_millis(10)).await.unwrap();
    assert_eq!(received.code, "abc123");
    assert_eq!(received.state.as_deref(), Some("xyz"));

    let _ = server.shutdown.send(());
}

#[tokio::test]
async fn test_stored_refresh_token_skips_prompt() {
    let (addr, accounts) = fake_accounts().await;
    let dir = tempfile::tempdir().unwrap();
    let store = RefreshTokenStore::new(dir.path().join("refresh.txt"));
    store.save("stored").await.unwrap();

    let client = client(addr);
    let auth = SpotifyAuthenticator::new(
        client.clone(),
        store.clone(),
        CodeMailbox::new(dir.path().join("code.txt")),
        scopes(),
    );
    let handler = StaticCode::new(Some("good"));

    auth.authenticate(&handler).await.unwrap();
    assert!(handler.prompts.lock().is_empty());
    assert!(client.is_authenticated().await);
    assert_eq!(accounts.exchanges.load(Ordering::SeqCst), 0);
    assert_eq!(store.load().await.unwrap().as_deref(), Some("rotated-1"));
}

#[tokio::test]
async fn test_code_flow_without_stored_token() {
    let (addr, accounts) = fake_accounts().await;
    let dir = tempfile::tempdir().unwrap();
    let store = RefreshTokenStore::new(dir.path().join("refresh.txt"));

    let client = client(addr);
    let auth = SpotifyAuthenticator::new(
        client.clone(),
        store.clone(),
        CodeMailbox::new(dir.path().join("code.txt")),
        scopes(),
    );
    let handler = StaticCode::new(Some("good"));

    auth.authenticate(&handler).await.unwrap();
    let prompts = handler.prompts.lock().clone();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("client_id=cid"));
    assert!(prompts[0].contains("scope=streaming%20user-modify-playback-state"));
    assert!(prompts[0].contains("state="));

    assert_eq!(accounts.exchanges.load(Ordering::SeqCst), 1);
    assert_eq!(client.refresh_token().await.as_deref(), Some("refresh-from-code"));
    assert_eq!(store.load().await.unwrap().as_deref(), Some("refresh-from-code"));
}

#[tokio::test]
async fn test_revoked_token_falls_back_to_code_flow() {
    let (addr, _accounts) = fake_accounts().await;
    let dir = tempfile::tempdir().unwrap();
    let store = RefreshTokenStore::new(dir.path().join("refresh.txt"));
    store.save("revoked").await.unwrap();

    let auth = SpotifyAuthenticator::new(
        client(addr),
        store.clone(),
        CodeMailbox::new(dir.path().join("code.txt")),
        scopes(),
    );
    let handler = StaticCode::new(Some("good"));

    auth.authenticate(&handler).await.unwrap();
    assert_eq!(handler.prompts.lock().len(), 1);
    assert_eq!(store.load().await.unwrap().as_deref(), Some("refresh-from-code"));
}

#[tokio::test]
async fn test_failed_exchange_discards_mailbox() {
    let (addr, _accounts) = fake_accounts().await;
    let dir = tempfile::tempdir().unwrap();
    let mailbox = CodeMailbox::new(dir.path().join("code.txt"));
    mailbox.deliver("stale", None).await.unwrap();

    let client = client(addr);
    let auth = SpotifyAuthenticator::new(
        client.clone(),
        RefreshTokenStore::new(dir.path().join("refresh.txt")),
        mailbox.clone(),
        scopes(),
    );

    assert!(auth.authenticate(&StaticCode::new(Some("bad"))).await.is_err());
    assert!(!mailbox.path().exists());
    assert!(!client.is_authenticated().await);

    let err = auth.authenticate(&StaticCode::new(None)).await.unwrap_err();
    assert!(matches!(err, Error::Auth(_)), "{err:?}");
}

#[tokio::test]
async fn test_mismatched_state_is_refused() {
    let (addr, accounts) = fake_accounts().await;
    let dir = tempfile::tempdir().unwrap();
    let mailbox = CodeMailbox::new(dir.path().join("code.txt"));
    let store = RefreshTokenStore::new(dir.path().join("refresh.txt"));

    let client = client(addr);
    let auth = SpotifyAuthenticator::new(client.clone(), store.clone(), mailbox.clone(), scopes());

    mailbox.deliver("leftover", Some("other")).await.unwrap();
    let handler = StaticCode::forged("good", "not-the-state-we-sent");
    let err = auth.authenticate(&handler).await.unwrap_err();
    assert!(matches!(&err, Error::Auth(msg) if msg.contains("state")), "{err:?}");

    let empty = StaticCode::forged("good", "");
    assert!(matches!(auth.authenticate(&empty).await, Err(Error::Auth(_))));

    assert_eq!(accounts.exchanges.load(Ordering::SeqCst), 0);
    assert!(!client.is_authenticated().await);
    assert!(!mailbox.path().exists(), "mailbox discarded");
    assert_eq!(store.load().await.unwrap(), None);
}

#[tokio::test]
async fn test_relay_delivery_with_foreign_state_is_refused() {
    let (addr, accounts) = fake_accounts().await;
    let dir = tempfile::tempdir().unwrap();
    let mailbox = CodeMailbox::new(dir.path().join("code.txt"));
    let server = start_callback_server(0, mailbox.clone()).await.unwrap();

    let client = client(addr);
    let auth = SpotifyAuthenticator::new(
        client.clone(),
        RefreshTokenStore::new(dir.path().join("refresh.txt")),
        mailbox.clone(),
        scopes(),
    );
    let handler = MailboxAuthHandler::new(mailbox.clone(), false)
        .with_poll_interval(Duration::from_millis(10));

    // A redirect nobody asked for, carrying a valid-looking code.
    let callback = format!("http://{}/callback?code=good&state=attacker", server.addr);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        reqwest::get(callback).await.unwrap();
    });

    let result = tokio::time::timeout(Duration::from_secs(10), auth.authenticate(&handler))
        .await
        .expect("authorization finished");
    assert!(matches!(result, Err(Error::Auth(_))), "{result:?}");
    assert_eq!(accounts.exchanges.load(Ordering::SeqCst), 0);
    assert!(!client.is_authenticated().await);

    let _ = server.shutdown.send(());
}

#[tokio::test]
async fn test_mailbox_handler_waits_for_relay() {
    let (addr, _accounts) = fake_accounts().await;
    let dir = tempfile::tempdir().unwrap();
    let mailbox = CodeMailbox::new(dir.path().join("code.txt"));
    let server = start_callback_server(0, mailbox.clone()).await.unwrap();

    let client = client(addr);
    let auth = SpotifyAuthenticator::new(
        client.clone(),
        RefreshTokenStore::new(dir.path().join("refresh.txt")),
        mailbox.clone(),
        scopes(),
    );
    let handler = RelayBrowser {
        relay: server.addr,
        code: "good",
        inner: MailboxAuthHandler::new(mailbox.clone(), false)
            .with_poll_interval(Duration::from_millis(10)),
    };

    tokio::time::timeout(Duration::from_secs(10), auth.authenticate(&handler))
        .await
        .expect("authorization finished")
        .unwrap();
    assert!(client.is_authenticated().await);
    assert!(!mailbox.path().exists(), "code consumed");

    let _ = server.shutdown.send(());
}

#[tokio::test]
async fn test_refresh_task_persists_rotated_token() {
    let (addr, accounts) = fake_accounts().await;
    let dir = tempfile::tempdir().unwrap();
    let store = RefreshTokenStore::new(dir.path().join("refresh.txt"));

    let client = client(addr);
    client
        .set_tokens(TokenSet { access_token: "a".into(), refresh_token: Some("start".into()) })
        .await;

    let shutdown = CancellationToken::new();
    let task = spawn_token_refresh_task(
        client.clone(),
        Some(store.clone()),
        Duration::from_millis(50),
        shutdown.clone(),
    );

    let store_ref = &store;
    assert!(
        wait_until_async(Duration::from_secs(10), || async move {
            matches!(store_ref.load().await, Ok(Some(t)) if t.starts_with("rotated-"))
        })
        .await
    );
    assert!(accounts.refreshes.load(Ordering::SeqCst) >= 1);

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("task stopped")
        .unwrap();
}
