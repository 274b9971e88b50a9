use crate::error::Result;
use crate::{models::*, SpotifyError};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

pub const ACCOUNTS_URL: &str = "https://accounts.spotify.com";
pub const API_URL: &str = "https://api.spotify.com/v1";

/// Thin client over the Spotify accounts service and Web API.
///
/// Tokens live behind a lock so a background refresh can swap the access
/// token while commands are in flight.
pub struct SpotifyClient {
    http: Client,
    credentials: ClientCredentials,
    tokens: Arc<RwLock<Option<TokenSet>>>,
    accounts_url: String,
    api_url: String,
}

impl SpotifyClient {
    pub fn new(credentials: ClientCredentials) -> Self {
        Self::with_base_urls(credentials, ACCOUNTS_URL, API_URL)
    }

    pub fn with_base_urls(credentials: ClientCredentials, accounts_url: &str, api_url: &str) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            http,
            credentials,
            tokens: Arc::new(RwLock::new(None)),
            accounts_url: accounts_url.trim_end_matches('/').to_string(),
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    /// URL the user opens in a browser to grant the scopes.
    pub fn authorize_url(&self, scopes: &[&str], state: &str) -> String {
        format!(
            "{base}/authorize?response_type=code&client_id={cid}&redirect_uri={redir}&scope={scope}&state={st}",
            base  = self.accounts_url,
            cid   = urlencoding::encode(&self.credentials.client_id),
            redir = urlencoding::encode(&self.credentials.redirect_uri),
            scope = urlencoding::encode(&scopes.join(" ")),
            st    = urlencoding::encode(state),
        )
    }

    pub async fn set_tokens(&self, tokens: TokenSet) {
        *self.tokens.write().await = Some(tokens);
    }

    pub async fn is_authenticated(&self) -> bool {
        self.tokens.read().await.is_some()
    }

    pub async fn refresh_token(&self) -> Option<String> {
        self.tokens
            .read()
            .await
            .as_ref()
            .and_then(|t| t.refresh_token.clone())
    }

    // ------------------------------------------------------------
    // Accounts service
    // ------------------------------------------------------------

    /// Exchanges an authorization code for tokens and installs them.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenSet> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.credentials.redirect_uri.as_str()),
        ];
        let resp = self.token_request(&params).await?;
        let tokens = TokenSet {
            access_token: resp.access_token,
            refresh_token: resp.refresh_token,
        };
        self.set_tokens(tokens.clone()).await;
        info!("Spotify authorization code exchanged for tokens");
        Ok(tokens)
    }

    /// Trades the stored refresh token for a new access token. Spotify may
    /// rotate the refresh token; the old one is kept when it does not.
    pub async fn refresh_access_token(&self) -> Result<TokenSet> {
        let refresh = self
            .refresh_token()
            .await
            .ok_or_else(|| SpotifyError::Auth("no refresh token available".into()))?;
        self.refresh_with(&refresh).await
    }

    /// Same as [`refresh_access_token`](Self::refresh_access_token) but with an
    /// explicit refresh token, e.g. one loaded from disk at startup.
    pub async fn refresh_with(&self, refresh_token: &str) -> Result<TokenSet> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];
        let resp = self.token_request(&params).await?;
        let tokens = TokenSet {
            access_token: resp.access_token,
            refresh_token: resp.refresh_token.or_else(|| Some(refresh_token.to_string())),
        };
        self.set_tokens(tokens.clone()).await;
        debug!("Spotify access token refreshed");
        Ok(tokens)
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> Result<TokenResponse> {
        let basic = STANDARD.encode(format!(
            "{}:{}",
            self.credentials.client_id, self.credentials.client_secret
        ));
        let resp = self
            .http
            .post(format!("{}/api/token", self.accounts_url))
            .header("Authorization", format!("Basic {basic}"))
            .form(params)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(match SpotifyError::from_response(status.as_u16(), &body) {
                SpotifyError::Api { message, .. } => SpotifyError::Auth(message),
                other => other,
            });
        }
        Ok(serde_json::from_str(&body)?)
    }

    // ------------------------------------------------------------
    // Player
    // ------------------------------------------------------------

    /// Starts playback of `uris`, or resumes the current context when `None`.
    pub async fn play(&self, uris: Option<Vec<String>>) -> Result<()> {
        let req = self.api(Method::PUT, "/me/player/play").await?;
        let req = match uris {
            Some(uris) => req.json(&serde_json::json!({ "uris": uris })),
            None => req.body(""),
        };
        self.send(req).await.map(|_| ())
    }

    pub async fn pause(&self) -> Result<()> {
        let req = self.api(Method::PUT, "/me/player/pause").await?.body("");
        self.send(req).await.map(|_| ())
    }

    pub async fn skip_to_next(&self) -> Result<()> {
        let req = self.api(Method::POST, "/me/player/next").await?.body("");
        self.send(req).await.map(|_| ())
    }

    pub async fn skip_to_previous(&self) -> Result<()> {
        let req = self.api(Method::POST, "/me/player/previous").await?.body("");
        self.send(req).await.map(|_| ())
    }

    pub async fn add_to_queue(&self, uri: &str) -> Result<()> {
        let req = self
            .api(Method::POST, "/me/player/queue")
            .await?
            .query(&[("uri", uri)])
            .body("");
        self.send(req).await.map(|_| ())
    }

    pub async fn set_shuffle(&self, state: bool) -> Result<()> {
        let req = self
            .api(Method::PUT, "/me/player/shuffle")
            .await?
            .query(&[("state", if state { "true" } else { "false" })])
            .body("");
        self.send(req).await.map(|_| ())
    }

    /// `None` when nothing is playing (the endpoint answers 204).
    pub async fn currently_playing(&self) -> Result<Option<CurrentlyPlaying>> {
        let req = self.api(Method::GET, "/me/player/currently-playing").await?;
        self.fetch_optional(req).await
    }

    // ------------------------------------------------------------
    // Catalog
    // ------------------------------------------------------------

    pub async fn get_track(&self, id: &str) -> Result<Track> {
        let path = format!("/tracks/{}", urlencoding::encode(id));
        let req = self.api(Method::GET, &path).await?;
        self.fetch_optional(req)
            .await?
            .ok_or_else(|| SpotifyError::NotFound(format!("track {id}")))
    }

    pub async fn search_tracks(&self, query: &str, limit: u32) -> Result<Vec<Track>> {
        let limit = limit.to_string();
        let req = self
            .api(Method::GET, "/search")
            .await?
            .query(&[("q", query), ("type", "track"), ("limit", limit.as_str())]);
        let found: Option<SearchResponse> = self.fetch_optional(req).await?;
        Ok(found.map(|r| r.tracks.items).unwrap_or_default())
    }

    // ------------------------------------------------------------
    // Plumbing
    // ------------------------------------------------------------

    async fn api(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let guard = self.tokens.read().await;
        let token = guard
            .as_ref()
            .map(|t| t.access_token.clone())
            .ok_or_else(|| SpotifyError::Auth("Spotify is not authenticated".into()))?;
        Ok(self
            .http
            .request(method, format!("{}{}", self.api_url, path))
            .bearer_auth(token))
    }

    async fn send(&self, req: RequestBuilder) -> Result<Option<String>> {
        let resp = req.send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            debug!("Spotify API returned {} => {}", status, body);
            return Err(SpotifyError::from_response(status.as_u16(), &body));
        }
        if status == StatusCode::NO_CONTENT || body.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(body))
    }

    async fn fetch_optional<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<Option<T>> {
        match self.send(req).await? {
            Some(body) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }
}
