//! Local OAuth redirect target. Spotify sends the browser to
//! `/callback?code=...&state=...`; both are dropped into the mailbox for
//! whichever process is waiting on them.

use std::net::SocketAddr;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use axum_server::Handle;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::Error;
use crate::auth::mailbox::CodeMailbox;

const SUCCESS_PAGE: &str = r#"<h2>Authentication successful!</h2>
<p>You can close this window now.</p>
<script>window.onload = () => window.close();</script>
"#;

/// `?code=...&state=...` on success, `?error=...` when the user declined.
#[derive(Debug, Default, Deserialize)]
pub struct RedirectParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// A running relay. Send on `shutdown` (or drop it) to stop it.
pub struct CallbackServer {
    pub addr: SocketAddr,
    pub shutdown: oneshot::Sender<()>,
}

/// Serves `GET /callback` on 127.0.0.1:`port` and drops received codes into
/// `mailbox`. Port 0 binds an ephemeral port.
pub async fn start_callback_server(port: u16, mailbox: CodeMailbox) -> Result<CallbackServer, Error> {
    let app = Router::new()
        .route("/callback", get(receive_redirect))
        .with_state(mailbox)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let handle = Handle::new();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let serve = axum_server::bind(addr)
        .handle(handle.clone())
        .serve(app.into_make_service());
    let stopper = handle.clone();
    tokio::spawn(async move {
        tokio::pin!(serve);
        tokio::select! {
            res = &mut serve => {
                if let Err(e) = res {
                    error!("OAuth relay on {} failed: {}", addr, e);
                }
                return;
            }
            _ = stop_rx => stopper.graceful_shutdown(None),
        }
        if let Err(e) = serve.await {
            error!("OAuth relay on {} failed while stopping: {}", addr, e);
        }
        info!("OAuth relay stopped");
    });

    let bound = handle
        .listening()
        .await
        .ok_or_else(|| Error::Auth(format!("OAuth relay could not bind {addr}")))?;
    info!("OAuth relay listening on http://{}/callback", bound);

    Ok(CallbackServer { addr: bound, shutdown: stop_tx })
}

async fn receive_redirect(
    State(mailbox): State<CodeMailbox>,
    Query(params): Query<RedirectParams>,
) -> (StatusCode, Html<String>) {
    if let Some(reason) = params.error {
        warn!("Spotify authorization was declined: {}", reason);
        return page(StatusCode::BAD_REQUEST, "Authorization failed", &reason);
    }

    let Some(code) = params.code.filter(|c| !c.is_empty()) else {
        return page(StatusCode::BAD_REQUEST, "No authorization code", "The redirect carried no code.");
    };

    info!("Authorization code received (state={:?})", params.state);
    match mailbox.deliver(&code, params.state.as_deref()).await {
        Ok(()) => (StatusCode::OK, Html(SUCCESS_PAGE.to_string())),
        Err(e) => {
            error!("Could not store authorization code: {}", e);
            page(StatusCode::INTERNAL_SERVER_ERROR, "Could not store the code", "Check the bot logs.")
        }
    }
}

fn page(status: StatusCode, title: &str, detail: &str) -> (StatusCode, Html<String>) {
    (status, Html(format!("<h2>{title}</h2><p>{detail}</p>")))
}

/// Fails early with a readable error when something already holds `port`.
pub async fn ensure_port_free(port: u16) -> Result<(), Error> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    TcpListener::bind(addr)
        .await
        .map(drop)
        .map_err(|e| Error::Auth(format!("Port {port} is not available for the OAuth relay: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn occupied_port_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(matches!(ensure_port_free(port).await, Err(Error::Auth(_))));
        drop(listener);
        assert!(ensure_port_free(port).await.is_ok());
    }
}
