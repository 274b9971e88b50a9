use async_trait::async_trait;
use crate::Error;

pub mod callback_server;
pub mod mailbox;
pub mod manager;
pub mod token_store;

pub use callback_server::{ensure_port_free, start_callback_server, CallbackServer};
pub use mailbox::{CodeMailbox, ReceivedCode};
pub use manager::{MailboxAuthHandler, SpotifyAuthenticator};
pub use token_store::RefreshTokenStore;

#[derive(Debug, Clone, PartialEq)]
pub enum AuthenticationPrompt {
    Browser { url: String },
    None,
}

#[derive(Debug)]
pub enum AuthenticationResponse {
    /// The authorization code and the `state` echoed back with it.
    Code { code: String, state: Option<String> },
    None,
}

#[async_trait]
pub trait AuthenticationHandler: Send + Sync {
    async fn handle_prompt(&self, prompt: AuthenticationPrompt) -> Result<AuthenticationResponse, Error>;
}
