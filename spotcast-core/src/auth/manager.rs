// spotcast-core/src/auth/manager.rs
//
// Spotify account authorization: stored refresh token first, browser
// authorization-code flow as the fallback.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use spotcast_spotify::SpotifyClient;

use crate::auth::mailbox::CodeMailbox;
use crate::auth::token_store::RefreshTokenStore;
use crate::auth::{AuthenticationHandler, AuthenticationPrompt, AuthenticationResponse};
use crate::Error;

/// Opens the authorize URL (optionally) and waits for the relay to drop the
/// code into the mailbox.
pub struct MailboxAuthHandler {
    mailbox: CodeMailbox,
    open_browser: bool,
    poll: Duration,
}

impl MailboxAuthHandler {
    pub fn new(mailbox: CodeMailbox, open_browser: bool) -> Self {
        Self {
            mailbox,
            open_browser,
            poll: crate::auth::mailbox::DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll: Duration) -> Self {
        self.poll = poll;
        self
    }
}

#[async_trait]
impl AuthenticationHandler for MailboxAuthHandler {
    async fn handle_prompt(&self, prompt: AuthenticationPrompt) -> Result<AuthenticationResponse, Error> {
        let AuthenticationPrompt::Browser { url } = prompt else {
            return Ok(AuthenticationResponse::None);
        };

        println!("Open this URL to authorize Spotify:\n{}", url);
        if self.open_browser {
            if let Err(e) = open::that(&url) {
                warn!("Could not open a browser: {}", e);
            }
        }

        info!("Waiting for authorization code in {}...", self.mailbox.path().display());
        let received = self.mailbox.wait_for_code(self.poll).await?;
        Ok(AuthenticationResponse::Code { code: received.code, state: received.state })
    }
}

pub struct SpotifyAuthenticator {
    client: Arc<SpotifyClient>,
    store: RefreshTokenStore,
    mailbox: CodeMailbox,
    scopes: Vec<String>,
}

impl SpotifyAuthenticator {
    pub fn new(
        client: Arc<SpotifyClient>,
        store: RefreshTokenStore,
        mailbox: CodeMailbox,
        scopes: Vec<String>,
    ) -> Self {
        Self { client, store, mailbox, scopes }
    }

    /// Leaves `client` holding valid tokens, or returns why it could not.
    pub async fn authenticate(&self, handler: &dyn AuthenticationHandler) -> Result<(), Error> {
        match self.try_stored_token().await {
            Ok(true) => return Ok(()),
            Ok(false) => {}
            Err(e) => warn!("Stored Spotify refresh token rejected: {}", e),
        }

        let result = self.authorize(handler).await;
        if result.is_err() {
            self.mailbox.discard().await;
        }
        result
    }

    async fn try_stored_token(&self) -> Result<bool, Error> {
        let Some(token) = self.store.load().await? else {
            return Ok(false);
        };
        let tokens = self.client.refresh_with(&token).await?;
        if let Some(rotated) = tokens.refresh_token.as_deref().filter(|t| *t != token) {
            self.store.save(rotated).await?;
        }
        info!("Spotify authenticated with stored refresh token");
        Ok(true)
    }

    async fn authorize(&self, handler: &dyn AuthenticationHandler) -> Result<(), Error> {
        let scopes: Vec<&str> = self.scopes.iter().map(String::as_str).collect();
        let state = uuid::Uuid::new_v4().to_string();
        let url = self.client.authorize_url(&scopes, &state);

        let code = match handler.handle_prompt(AuthenticationPrompt::Browser { url }).await? {
            AuthenticationResponse::Code { code, state: Some(returned) } if returned == state => code,
            AuthenticationResponse::Code { state: returned, .. } => {
                warn!("Discarding authorization code with state {:?}", returned);
                return Err(Error::Auth("authorization state does not match the request".into()));
            }
            AuthenticationResponse::None => {
                return Err(Error::Auth("no authorization code was provided".into()));
            }
        };

        let tokens = self.client.exchange_code(&code).await?;
        match tokens.refresh_token.as_deref() {
            Some(refresh) => self.store.save(refresh).await?,
            None => warn!("Spotify returned no refresh token; it will not be persisted"),
        }
        info!("Spotify authentication successful!");
        Ok(())
    }
}
