//! Single-shot listener for the OAuth redirect.
//!
//! Imgur hands the token back in the URL fragment, which never reaches the
//! server. The GET handler therefore serves a tiny page that re-posts the
//! fragment as a form; the POST handler validates `state` and completes the
//! wait. The listener lives only for the duration of [`CallbackServer::wait`].

use anyhow::{Context, Result, anyhow};
use axum::Router;
use axum::extract::{Form, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use serde::Deserialize;
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

const CALLBACK_PAGE: &str = "<!doctype html><html lang='en'><head><meta charset='utf-8'>\
<title>backdrop-sync</title></head><body><p id='status'>Completing authorisation…</p><script>\
const params = new URLSearchParams(window.location.hash.slice(1));\
fetch(window.location.pathname, {method: 'POST', headers: {'Content-Type': 'application/x-www-form-urlencoded'}, body: params.toString()})\
.then(r => { document.getElementById('status').textContent = r.ok ? 'Authorised. You can close this tab.' : 'Authorisation failed (' + r.status + ').'; })\
.catch(e => { document.getElementById('status').textContent = 'Authorisation failed: ' + e; });\
</script></body></html>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub account_username: Option<String>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CallbackError {
    /// The `state` echoed by the provider differs from the one we issued.
    #[error("callback state does not match the issued value")]
    StateMismatch,
    #[error("callback did not carry an access token")]
    MissingToken,
}

#[derive(Debug, Deserialize)]
struct CallbackForm {
    #[serde(default)]
    state: String,
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    refresh_token: String,
    #[serde(default)]
    token_type: String,
    #[serde(default)]
    expires_in: u64,
    #[serde(default)]
    account_username: Option<String>,
}

#[derive(Clone)]
struct CallbackState {
    expected_state: Arc<str>,
    outcome: mpsc::Sender<Result<TokenGrant, CallbackError>>,
}

pub struct CallbackServer {
    listener: TcpListener,
    path: String,
}

impl CallbackServer {
    pub fn bind(addr: SocketAddr, path: impl Into<String>) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .with_context(|| format!("failed to bind callback listener on {addr}"))?;
        Ok(Self {
            listener,
            path: path.into(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Blocks until one valid callback arrives, the callback is rejected, or
    /// `timeout` elapses. The listener is closed before this returns.
    pub fn wait(self, expected_state: &str, timeout: Duration) -> Result<TokenGrant> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("failed to start callback runtime")?;
        runtime.block_on(self.serve(expected_state, timeout))
    }

    async fn serve(self, expected_state: &str, timeout: Duration) -> Result<TokenGrant> {
        self.listener.set_nonblocking(true)?;
        let listener = tokio::net::TcpListener::from_std(self.listener)?;
        let addr = listener.local_addr()?;

        let (outcome_tx, mut outcome_rx) = mpsc::channel(1);
        let state = CallbackState {
            expected_state: Arc::from(expected_state),
            outcome: outcome_tx,
        };
        let router = Router::new()
            .route(&self.path, get(serve_page).post(receive_token))
            .with_state(state);

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            axum::serve(listener, router.into_make_service())
                .with_graceful_shutdown(async {
                    let _ = stop_rx.await;
                })
                .await
        });
        info!(%addr, path = %self.path, ?timeout, "waiting for authorisation callback");

        let outcome = tokio::time::timeout(timeout, outcome_rx.recv()).await;
        let _ = stop_tx.send(());
        match tokio::time::timeout(SHUTDOWN_GRACE, server).await {
            Ok(Ok(Ok(()))) => debug!("callback listener stopped"),
            Ok(Ok(Err(err))) => warn!(error = %err, "callback listener exited with error"),
            Ok(Err(err)) => warn!(error = %err, "callback listener task failed"),
            Err(_) => warn!("callback listener did not stop within grace period"),
        }

        match outcome {
            Err(_) => Err(anyhow!(
                "timed out after {}s waiting for authorisation callback",
                timeout.as_secs_f32()
            )),
            Ok(None) => Err(anyhow!("callback listener closed without a result")),
            Ok(Some(result)) => result.map_err(Into::into),
        }
    }
}

async fn serve_page() -> Html<&'static str> {
    Html(CALLBACK_PAGE)
}

async fn receive_token(
    State(state): State<CallbackState>,
    Form(form): Form<CallbackForm>,
) -> StatusCode {
    if form.state != *state.expected_state {
        warn!("callback state mismatch; refusing token");
        let _ = state.outcome.try_send(Err(CallbackError::StateMismatch));
        return StatusCode::UNAUTHORIZED;
    }
    if form.access_token.is_empty() {
        let _ = state.outcome.try_send(Err(CallbackError::MissingToken));
        return StatusCode::BAD_REQUEST;
    }
    let grant = TokenGrant {
        access_token: form.access_token,
        refresh_token: form.refresh_token,
        token_type: form.token_type,
        expires_in: form.expires_in,
        account_username: form.account_username.filter(|name| !name.is_empty()),
    };
    let _ = state.outcome.try_send(Ok(grant));
    StatusCode::CREATED
}

#[cfg(test)]
mod tests {
    use super::{CallbackError, CallbackServer};
    use std::net::SocketAddr;
    use std::thread;
    use std::time::Duration;

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().expect("addr")
    }

    fn post_form(addr: SocketAddr, path: &str, fields: &[(&str, &str)]) -> u16 {
        let client = reqwest::blocking::Client::new();
        let url = format!("http://{addr}{path}");
        for _ in 0..50 {
            match client.post(&url).form(fields).send() {
                Ok(resp) => return resp.status().as_u16(),
                Err(_) => thread::sleep(Duration::from_millis(20)),
            }
        }
        panic!("callback server never answered");
    }

    #[test]
    fn accepts_matching_state() {
        let server = CallbackServer::bind(loopback(), "/oauthcallback").expect("bind");
        let addr = server.local_addr().expect("addr");
        let waiter = thread::spawn(move || server.wait("abc123", Duration::from_secs(10)));

        let status = post_form(
            addr,
            "/oauthcallback",
            &[
                ("state", "abc123"),
                ("access_token", "tok"),
                ("refresh_token", "ref"),
                ("token_type", "bearer"),
                ("expires_in", "3600"),
                ("account_username", "alice"),
            ],
        );
        assert_eq!(status, 201);

        let grant = waiter.join().expect("join").expect("grant");
        assert_eq!(grant.access_token, "tok");
        assert_eq!(grant.refresh_token, "ref");
        assert_eq!(grant.expires_in, 3600);
        assert_eq!(grant.account_username.as_deref(), Some("alice"));
    }

    #[test]
    fn rejects_foreign_state() {
        let server = CallbackServer::bind(loopback(), "/cb").expect("bind");
        let addr = server.local_addr().expect("addr");
        let waiter = thread::spawn(move || server.wait("expected", Duration::from_secs(10)));

        let status = post_form(addr, "/cb", &[("state", "other"), ("access_token", "tok")]);
        assert_eq!(status, 401);

        let err = waiter.join().expect("join").expect_err("mismatch");
        assert_eq!(
            err.downcast_ref::<CallbackError>(),
            Some(&CallbackError::StateMismatch)
        );
    }

    #[test]
    fn times_out_without_callback() {
        let server = CallbackServer::bind(loopback(), "/cb").expect("bind");
        let err = server
            .wait("state", Duration::from_millis(100))
            .expect_err("timeout");
        assert!(err.to_string().contains("timed out"));
    }
}
