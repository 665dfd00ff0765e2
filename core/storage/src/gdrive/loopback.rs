//! Local HTTP listener that receives the OAuth2 redirect.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Html,
    routing::get,
    Router,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use cloudbox_common::{Error, Result};

/// How long to let the success page flush once the code has arrived.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

const SUCCESS_PAGE: &str = "<html><body><h1>CloudBox</h1>\
<p>The authentication flow has completed. You may close this window.</p></body></html>";

const FAILURE_PAGE: &str = "<html><body><h1>CloudBox</h1>\
<p>The authentication flow failed. Return to the application for details.</p></body></html>";

/// One-shot receiver for the authorization code.
///
/// Bound to the loopback interface; the port is chosen by the OS when `0`
/// is requested.
pub struct LoopbackReceiver {
    listener: TcpListener,
    port: u16,
}

/// Handler state: the state value to match and the slot for the first verdict.
#[derive(Clone)]
struct CallbackState {
    expected_state: Arc<str>,
    verdict: Arc<Mutex<Option<oneshot::Sender<Result<String>>>>>,
}

impl CallbackState {
    fn deliver(&self, verdict: Result<String>) {
        let sender = self
            .verdict
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(sender) = sender {
            let _ = sender.send(verdict);
        }
    }
}

impl LoopbackReceiver {
    /// Bind the listener.
    ///
    /// # Errors
    /// - Port already in use or binding not permitted
    pub async fn bind(port: u16) -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", port)).await?;
        let port = listener.local_addr()?.port();

        tracing::debug!("OAuth callback listener bound on port {}", port);

        Ok(Self { listener, port })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Redirect URL to register with the authorization request.
    pub fn redirect_url(&self) -> String {
        format!("http://localhost:{}/", self.port)
    }

    /// Serve the redirect until the browser delivers the authorization code.
    ///
    /// Requests that carry no OAuth parameters (a favicon fetch, for
    /// instance) are answered with 404 and otherwise ignored. Connections are
    /// served concurrently, so an idle preconnect cannot hold up the callback.
    ///
    /// # Errors
    /// - The provider reported an error (e.g., the user denied consent)
    /// - The callback's `state` does not match `expected_state`
    /// - The listener stopped before a callback arrived
    pub async fn receive(self, expected_state: &str) -> Result<String> {
        let (verdict_tx, verdict_rx) = oneshot::channel();
        let state = CallbackState {
            expected_state: Arc::from(expected_state),
            verdict: Arc::new(Mutex::new(Some(verdict_tx))),
        };

        let app = Router::new()
            .route("/", get(handle_callback))
            .with_state(state);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let listener = self.listener;

        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
        });

        let verdict = verdict_rx.await.map_err(|_| {
            Error::Network("OAuth callback listener stopped before a callback arrived".to_string())
        });

        let _ = shutdown_tx.send(());
        if tokio::time::timeout(SHUTDOWN_GRACE, server).await.is_err() {
            tracing::debug!("OAuth callback listener still draining connections");
        }

        verdict?
    }
}

async fn handle_callback(
    State(state): State<CallbackState>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, Html<&'static str>) {
    match parse_callback(&params, &state.expected_state) {
        Ok(Some(code)) => {
            state.deliver(Ok(code));
            (StatusCode::OK, Html(SUCCESS_PAGE))
        }
        Ok(None) => (StatusCode::NOT_FOUND, Html("")),
        Err(e) => {
            tracing::debug!("Rejected OAuth callback: {}", e);
            state.deliver(Err(e));
            (StatusCode::BAD_REQUEST, Html(FAILURE_PAGE))
        }
    }
}

/// Extract the authorization code from the callback's query parameters.
///
/// # Returns
/// - `Ok(Some(code))` for a valid callback
/// - `Ok(None)` when the request carries neither `code` nor `error`
///
/// # Errors
/// - `error` parameter present
/// - `state` missing or different from `expected_state`
pub fn parse_callback(
    params: &HashMap<String, String>,
    expected_state: &str,
) -> Result<Option<String>> {
    if let Some(error) = params.get("error") {
        return Err(Error::Authentication(format!(
            "Authorization was not granted: {}",
            error
        )));
    }

    let Some(code) = params.get("code") else {
        return Ok(None);
    };

    if params.get("state").map(String::as_str) != Some(expected_state) {
        return Err(Error::Authentication(
            "OAuth callback state does not match the request".to_string(),
        ));
    }

    Ok(Some(code.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpStream;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_callback_code() {
        let query = params(&[("state", "xyz"), ("code", "4/0Ab"), ("scope", "drive.file")]);
        let code = parse_callback(&query, "xyz").unwrap();
        assert_eq!(code.as_deref(), Some("4/0Ab"));
    }

    #[test]
    fn test_parse_callback_without_params() {
        assert_eq!(parse_callback(&HashMap::new(), "xyz").unwrap(), None);
        assert_eq!(parse_callback(&params(&[("state", "xyz")]), "xyz").unwrap(), None);
    }

    #[test]
    fn test_parse_callback_error() {
        let query = params(&[("error", "access_denied"), ("state", "xyz")]);
        match parse_callback(&query, "xyz") {
            Err(Error::Authentication(message)) => assert!(message.contains("access_denied")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_parse_callback_state_mismatch() {
        assert!(parse_callback(&params(&[("code", "abc"), ("state", "other")]), "xyz").is_err());
        assert!(parse_callback(&params(&[("code", "abc")]), "xyz").is_err());
    }

    #[tokio::test]
    async fn test_redirect_url_uses_bound_port() {
        let receiver = LoopbackReceiver::bind(0).await.unwrap();
        assert_ne!(receiver.port(), 0);
        assert_eq!(
            receiver.redirect_url(),
            format!("http://localhost:{}/", receiver.port())
        );
    }

    async fn get_page(port: u16, target: &str) -> (reqwest::StatusCode, String) {
        let response = reqwest::Client::new()
            .get(format!("http://127.0.0.1:{}{}", port, target))
            .send()
            .await
            .unwrap();
        let status = response.status();
        (status, response.text().await.unwrap())
    }

    #[tokio::test]
    async fn test_receive_code() {
        let receiver = LoopbackReceiver::bind(0).await.unwrap();
        let port = receiver.port();
        let handle = tokio::spawn(async move { receiver.receive("state-1").await });

        let (status, _) = get_page(port, "/favicon.ico").await;
        assert_eq!(status, reqwest::StatusCode::NOT_FOUND);

        let (status, _) = get_page(port, "/").await;
        assert_eq!(status, reqwest::StatusCode::NOT_FOUND);

        let (status, body) = get_page(port, "/?code=4%2F0Ab&state=state-1").await;
        assert_eq!(status, reqwest::StatusCode::OK);
        assert!(body.contains("completed"));

        assert_eq!(handle.await.unwrap().unwrap(), "4/0Ab");
    }

    #[tokio::test]
    async fn test_receive_denied() {
        let receiver = LoopbackReceiver::bind(0).await.unwrap();
        let port = receiver.port();
        let handle = tokio::spawn(async move { receiver.receive("state-1").await });

        let (status, _) = get_page(port, "/?error=access_denied&state=state-1").await;
        assert_eq!(status, reqwest::StatusCode::BAD_REQUEST);

        assert!(matches!(
            handle.await.unwrap(),
            Err(Error::Authentication(_))
        ));
    }

    #[tokio::test]
    async fn test_idle_connection_does_not_block_callback() {
        let receiver = LoopbackReceiver::bind(0).await.unwrap();
        let port = receiver.port();
        let handle = tokio::spawn(async move { receiver.receive("state-1").await });

        // Opened like a browser preconnect: no request is ever written
        let _idle = TcpStream::connect(("127.0.0.1", port)).await.unwrap();

        let (status, _) = get_page(port, "/?code=the-code&state=state-1").await;
        assert_eq!(status, reqwest::StatusCode::OK);

        let code = tokio::time::timeout(Duration::from_secs(10), handle)
            .await
            .expect("callback delivered while an idle connection is open")
            .unwrap()
            .unwrap();
        assert_eq!(code, "the-code");
    }
}
