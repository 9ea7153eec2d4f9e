//! Transient loopback listener for the authorization redirect
//!
//! Hosts a single-purpose local HTTP endpoint for exactly one authorization
//! attempt. The listener settles an associated result exactly once: the
//! first terminal event (callback received, provider error, malformed
//! request, or timeout) wins, and any later event is observed and dropped.
//! Settlement goes through a [`SettlementCell`], a guarded write-once slot
//! around a oneshot sender, which is the invariant most prone to
//! duplicate-resolution bugs and is tested directly.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use tokio::sync::oneshot;

use crate::error::{KeywardenError, Result};

/// Terminal outcome of one authorization attempt's callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// The provider redirected back with an authorization code.
    CodeReceived {
        /// One-time authorization code
        code: String,
        /// The `state` parameter echoed by the provider
        state: String,
    },
    /// The provider redirected back with an error (e.g. the user declined).
    ProviderError {
        /// The provider's `error` parameter
        error: String,
        /// The provider's optional `error_description` parameter
        description: Option<String>,
    },
    /// The callback carried neither a code nor an error.
    MalformedRequest,
    /// No terminal request arrived within the configured duration.
    TimedOut,
}

/// Write-once settlement slot shared between the HTTP handler and the
/// timeout path.
///
/// The first call to [`settle`](Self::settle) takes the inner sender and
/// delivers the outcome; every later call finds the slot empty and becomes
/// a no-op. This holds regardless of which side (request or timer) wins
/// the race.
#[derive(Clone)]
pub(crate) struct SettlementCell {
    tx: Arc<Mutex<Option<oneshot::Sender<CallbackOutcome>>>>,
}

impl SettlementCell {
    pub(crate) fn new() -> (Self, oneshot::Receiver<CallbackOutcome>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                tx: Arc::new(Mutex::new(Some(tx))),
            },
            rx,
        )
    }

    /// Attempt to settle with `outcome`. Returns `true` if this call
    /// performed the settlement, `false` if the result was already settled.
    pub(crate) fn settle(&self, outcome: CallbackOutcome) -> bool {
        let mut slot = self.tx.lock().unwrap_or_else(|p| p.into_inner());
        match slot.take() {
            // The receiver may already be gone (timeout path dropped it);
            // a failed send still counts as this cell being consumed.
            Some(tx) => {
                let _ = tx.send(outcome);
                true
            }
            None => {
                tracing::debug!("Ignoring duplicate callback settlement: {:?}", outcome);
                false
            }
        }
    }
}

/// Query parameters the provider may place on the redirect.
#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// A bound, single-use callback listener.
///
/// Created by [`bind`](Self::bind), which fails fast with
/// [`KeywardenError::ListenerBusy`] when the port is already taken (for
/// example by another in-flight authorization attempt). The listener is
/// consumed by [`wait`](Self::wait), which resolves with the single
/// settled outcome and releases the socket on every exit path.
pub struct CallbackListener {
    addr: SocketAddr,
    receiver: oneshot::Receiver<CallbackOutcome>,
    shutdown: Option<oneshot::Sender<()>>,
    server: tokio::task::JoinHandle<()>,
    timeout: Duration,
    /// Absolute deadline, armed when the listener starts serving. Work
    /// done between `bind` and `wait` (URL construction, browser launch)
    /// consumes the budget rather than extending it.
    deadline: tokio::time::Instant,
}

impl CallbackListener {
    /// Bind the listener on `127.0.0.1:{port}` and start serving. The
    /// timeout clock starts here, not in [`wait`](Self::wait).
    ///
    /// # Errors
    ///
    /// Returns [`KeywardenError::ListenerBusy`] if the port cannot be
    /// bound.
    ///
    /// # Examples
    ///
    /// ```
    /// use keywarden::auth::listener::CallbackListener;
    /// use std::time::Duration;
    ///
    /// # tokio_test::block_on(async {
    /// let listener = CallbackListener::bind(0, Duration::from_secs(1))
    ///     .await
    ///     .unwrap();
    /// assert_ne!(listener.local_addr().port(), 0);
    /// # });
    /// ```
    pub async fn bind(port: u16, timeout: Duration) -> Result<Self> {
        let (cell, receiver) = SettlementCell::new();

        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
            .await
            .map_err(|e| KeywardenError::ListenerBusy(e.to_string()))?;
        let addr = listener
            .local_addr()
            .map_err(|e| KeywardenError::ListenerBusy(e.to_string()))?;

        let app = Router::new()
            .route("/callback", get(callback_handler))
            .fallback(not_found_handler)
            .with_state(cell);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = result {
                tracing::warn!("Callback listener exited with error: {}", e);
            }
        });

        tracing::debug!("Callback listener bound on {}", addr);

        Ok(Self {
            addr,
            receiver,
            shutdown: Some(shutdown_tx),
            server,
            timeout,
            deadline: tokio::time::Instant::now() + timeout,
        })
    }

    /// The bound local address (useful when binding port 0 in tests).
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Await the single settled outcome.
    ///
    /// Resolves with [`CallbackOutcome::TimedOut`] when the deadline
    /// armed at [`bind`](Self::bind) passes first; a request settling
    /// after the timeout is a no-op inside the settlement cell. The
    /// server is shut down and the socket released before this returns,
    /// on every path.
    pub async fn wait(mut self) -> CallbackOutcome {
        let outcome = match tokio::time::timeout_at(self.deadline, &mut self.receiver).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => {
                // Server task died without settling; surface as a timeout
                // so the flow reports a retryable condition.
                tracing::warn!("Callback listener closed without settlement");
                CallbackOutcome::TimedOut
            }
            Err(_) => {
                tracing::info!(
                    "No authorization callback within {}s",
                    self.timeout.as_secs()
                );
                CallbackOutcome::TimedOut
            }
        };

        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Err(e) = (&mut self.server).await {
            tracing::warn!("Callback listener task join failed: {}", e);
        }

        outcome
    }
}

async fn callback_handler(
    State(cell): State<SettlementCell>,
    Query(params): Query<CallbackParams>,
) -> (StatusCode, Html<String>) {
    if let Some(error) = params.error {
        let description = params.error_description;
        cell.settle(CallbackOutcome::ProviderError {
            error: error.clone(),
            description: description.clone(),
        });
        return (
            StatusCode::OK,
            Html(failure_page(&error, description.as_deref())),
        );
    }

    let Some(code) = params.code else {
        cell.settle(CallbackOutcome::MalformedRequest);
        return (
            StatusCode::BAD_REQUEST,
            Html("<html><body><h1>Bad Request</h1><p>The callback carried no authorization code.</p></body></html>".to_string()),
        );
    };

    let state = params.state.unwrap_or_default();
    cell.settle(CallbackOutcome::CodeReceived { code, state });

    (
        StatusCode::OK,
        Html(
            "<html><head><title>Authorization Complete</title></head>\
             <body><h1>Authorization Complete</h1>\
             <p>You can close this window and return to the terminal.</p></body></html>"
                .to_string(),
        ),
    )
}

async fn not_found_handler() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not Found")
}

fn failure_page(error: &str, description: Option<&str>) -> String {
    let detail = description.unwrap_or("The authorization server reported an error.");
    format!(
        "<html><head><title>Authorization Failed</title></head>\
         <body><h1>Authorization Failed</h1><p>{}: {}</p>\
         <p>You can close this window.</p></body></html>",
        error, detail
    )
}
