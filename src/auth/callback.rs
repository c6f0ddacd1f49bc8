//! OAuth2 callback listener
//!
//! A short-lived loopback HTTP server that captures the provider's redirect.
//! The serving task and the waiting caller share a single-slot handoff: the
//! first `/callback` request resolves the outcome, later requests still get a
//! friendly page but can never overwrite or block on the delivered result.
//!
//! Lifecycle: `Idle -> Listening -> {Resolved, TimedOut, Stopped}`.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;
use crate::Result;
use crate::error::Error;
use super::state::AuthorizationState;

/// Path the provider redirects to
pub const CALLBACK_PATH: &str = "/callback";

/// How long a single browser connection may take to send its request
const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on the request line, and separately on the headers that follow it
const MAX_REQUEST_LINE_BYTES: u64 = 8192;
const MAX_HEADER_BYTES: u64 = 16 * 1024;

/// Success HTML page shown after authorization
const SUCCESS_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>spotui | Authorization Successful</title>
    <style>
        body {
            background-color: #121212;
            color: #e2e8f0;
            font-family: -apple-system, system-ui, sans-serif;
            display: flex;
            justify-content: center;
            align-items: center;
            height: 100vh;
            margin: 0;
            text-align: center;
        }
        h1 { font-size: 24px; color: #1db954; }
        p { font-size: 15px; color: #94a3b8; line-height: 1.6; }
    </style>
</head>
<body>
    <div>
        <h1>Authorization Successful</h1>
        <p>spotui has been granted access.<br>You can close this window and return to your terminal.</p>
    </div>
</body>
</html>"#;

/// Failure HTML page; the terminal shows the reason
const FAILURE_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>spotui | Authorization Failed</title>
    <style>
        body {
            background-color: #121212;
            color: #e2e8f0;
            font-family: -apple-system, system-ui, sans-serif;
            display: flex;
            justify-content: center;
            align-items: center;
            height: 100vh;
            margin: 0;
            text-align: center;
        }
        h1 { font-size: 24px; color: #ef4444; }
        p { font-size: 15px; color: #94a3b8; line-height: 1.6; }
    </style>
</head>
<body>
    <div>
        <h1>Authorization Failed</h1>
        <p>Something went wrong during sign-in.<br>Check your terminal and run the login again.</p>
    </div>
</body>
</html>"#;

const NOT_FOUND_HTML: &str =
    "<!DOCTYPE html><html><body><h1>Not Found</h1><p>spotui only handles /callback.</p></body></html>";

/// Result of a single authorization redirect
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    Code(String),
    ProviderError(String),
    StateMismatch,
    MissingCode,
}

impl CallbackOutcome {
    /// Classify the callback query; `error` short-circuits, then state, then code
    pub fn from_query(url: &Url, expected: &AuthorizationState) -> Self {
        let mut code = None;
        let mut state = None;
        let mut error = None;

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "state" => state = Some(value.into_owned()),
                "error" => error = Some(value.into_owned()),
                _ => {}
            }
        }

        if let Some(err) = error.filter(|e| !e.is_empty()) {
            return CallbackOutcome::ProviderError(err);
        }
        if !expected.matches(state.as_deref()) {
            return CallbackOutcome::StateMismatch;
        }
        match code.filter(|c| !c.is_empty()) {
            Some(code) => CallbackOutcome::Code(code),
            None => CallbackOutcome::MissingCode,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            CallbackOutcome::Code(_) => "code",
            CallbackOutcome::ProviderError(_) => "provider error",
            CallbackOutcome::StateMismatch => "state mismatch",
            CallbackOutcome::MissingCode => "missing code",
        }
    }
}

/// Listener lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Idle,
    Listening,
    Resolved,
    TimedOut,
    Stopped,
}

/// Write-once slot shared by every connection handler
#[derive(Clone)]
struct OutcomeSlot(Arc<Mutex<Option<oneshot::Sender<CallbackOutcome>>>>);

impl OutcomeSlot {
    fn new(sender: oneshot::Sender<CallbackOutcome>) -> Self {
        Self(Arc::new(Mutex::new(Some(sender))))
    }

    /// Non-blocking, first caller wins; returns whether the outcome was taken
    fn deliver(&self, outcome: CallbackOutcome) -> bool {
        let sender = self
            .0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        match sender {
            Some(tx) => tx.send(outcome).is_ok(),
            None => false,
        }
    }
}

/// Loopback HTTP endpoint capturing exactly one authorization outcome
pub struct CallbackListener {
    expected_state: AuthorizationState,
    status: ListenerState,
    outcome_rx: Option<oneshot::Receiver<CallbackOutcome>>,
    error_rx: Option<mpsc::Receiver<Error>>,
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl CallbackListener {
    pub fn new(expected_state: AuthorizationState) -> Self {
        Self {
            expected_state,
            status: ListenerState::Idle,
            outcome_rx: None,
            error_rx: None,
            shutdown: CancellationToken::new(),
            task: None,
        }
    }

    pub fn state(&self) -> ListenerState {
        self.status
    }

    /// Bind `bind_addr` and serve in the background
    ///
    /// Returns the callback URL actually bound, which differs from the
    /// requested address when port 0 is used.
    pub async fn start(&mut self, bind_addr: &str) -> Result<String> {
        if self.status != ListenerState::Idle {
            return Err(Error::Listener(format!(
                "listener cannot start from state {:?}",
                self.status
            )));
        }

        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(|source| Error::ListenerStartFailed {
                addr: bind_addr.to_string(),
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| Error::ListenerStartFailed {
                addr: bind_addr.to_string(),
                source,
            })?;
        let callback_url = format!("http://{}{}", local_addr, CALLBACK_PATH);

        let (outcome_tx, outcome_rx) = oneshot::channel();
        let (error_tx, error_rx) = mpsc::channel(1);
        self.outcome_rx = Some(outcome_rx);
        self.error_rx = Some(error_rx);

        let task = tokio::spawn(serve(
            listener,
            self.expected_state.clone(),
            OutcomeSlot::new(outcome_tx),
            error_tx,
            self.shutdown.clone(),
        ));
        self.task = Some(task);
        self.status = ListenerState::Listening;

        tracing::info!("Callback listener on {}", callback_url);
        Ok(callback_url)
    }

    /// Wait for the first outcome, a transport error, the timeout, or `cancel`
    pub async fn await_outcome(
        &mut self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<CallbackOutcome> {
        if self.status != ListenerState::Listening {
            return Err(Error::Listener(format!(
                "cannot await outcome in state {:?}",
                self.status
            )));
        }
        let (Some(outcome_rx), Some(error_rx)) = (self.outcome_rx.as_mut(), self.error_rx.as_mut())
        else {
            return Err(Error::Listener("listener was never started".to_string()));
        };

        tokio::select! {
            biased;

            outcome = outcome_rx => match outcome {
                Ok(outcome) => {
                    self.status = ListenerState::Resolved;
                    Ok(outcome)
                }
                Err(_) => Err(Error::Listener("callback listener closed".to_string())),
            },
            Some(err) = error_rx.recv() => Err(err),
            _ = cancel.cancelled() => Err(Error::Cancelled),
            _ = tokio::time::sleep(timeout) => {
                self.status = ListenerState::TimedOut;
                Err(Error::Timeout(timeout))
            }
        }
    }

    /// Release the socket; safe to call repeatedly and from any state
    pub fn stop(&mut self) {
        self.shutdown.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
            tracing::debug!("Callback listener stopped");
        }
        self.status = ListenerState::Stopped;
    }
}

impl Drop for CallbackListener {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn serve(
    listener: TcpListener,
    expected_state: AuthorizationState,
    slot: OutcomeSlot,
    error_tx: mpsc::Sender<Error>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((socket, peer)) => {
                    tracing::debug!("Callback connection from {}", peer);
                    tokio::spawn(handle_connection(socket, expected_state.clone(), slot.clone()));
                }
                Err(e) => {
                    let _ = error_tx.try_send(Error::Listener(format!(
                        "failed to accept connection: {}",
                        e
                    )));
                    break;
                }
            }
        }
    }
}

async fn handle_connection(
    mut socket: TcpStream,
    expected_state: AuthorizationState,
    slot: OutcomeSlot,
) {
    let request = match tokio::time::timeout(REQUEST_READ_TIMEOUT, read_request_line(&mut socket)).await {
        Ok(Ok(Some(line))) => line,
        Ok(Ok(None)) => {
            tracing::debug!("Callback request line missing or too long");
            let _ = write_response(&mut socket, "400 Bad Request", FAILURE_HTML).await;
            return;
        }
        Ok(Err(e)) => {
            tracing::debug!("Failed to read callback request: {}", e);
            return;
        }
        Err(_) => {
            tracing::debug!("Callback request timed out");
            return;
        }
    };

    let (status, body) = match parse_request_target(&request) {
        Some(url) if url.path() == CALLBACK_PATH => {
            let outcome = CallbackOutcome::from_query(&url, &expected_state);
            let page = match outcome {
                CallbackOutcome::Code(_) => SUCCESS_HTML,
                _ => FAILURE_HTML,
            };
            let label = outcome.label();
            if slot.deliver(outcome) {
                tracing::info!("Callback received: {}", label);
            } else {
                tracing::debug!("Ignoring repeated callback ({})", label);
            }
            ("200 OK", page)
        }
        _ => ("404 Not Found", NOT_FOUND_HTML),
    };

    let _ = write_response(&mut socket, status, body).await;
}

/// Read the request line, however many TCP segments it arrives in, then drain
/// the headers. Returns `None` if the connection closes or the line exceeds
/// `MAX_REQUEST_LINE_BYTES` before a line terminator arrives.
async fn read_request_line(socket: &mut TcpStream) -> std::io::Result<Option<String>> {
    let mut reader = BufReader::new(socket);

    let mut line = String::new();
    (&mut reader)
        .take(MAX_REQUEST_LINE_BYTES)
        .read_line(&mut line)
        .await?;
    if !line.ends_with('\n') {
        return Ok(None);
    }

    let mut budget = MAX_HEADER_BYTES;
    let mut header = Vec::new();
    while budget > 0 {
        header.clear();
        let n = (&mut reader).take(budget).read_until(b'\n', &mut header).await?;
        if n == 0 || header.iter().all(u8::is_ascii_whitespace) {
            break;
        }
        budget = budget.saturating_sub(n as u64);
    }

    Ok(Some(line))
}

async fn write_response(socket: &mut TcpStream, status: &str, body: &str) -> std::io::Result<()> {
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );

    socket.write_all(response.as_bytes()).await?;
    socket.shutdown().await
}

/// Parse `GET /callback?code=xxx&state=yyy HTTP/1.1` into a URL
fn parse_request_target(request: &str) -> Option<Url> {
    let first_line = request.lines().next()?;
    let mut parts = first_line.split_whitespace();
    let method = parts.next()?;
    let target = parts.next()?;
    if method != "GET" || !target.starts_with('/') {
        return None;
    }
    Url::parse(&format!("http://localhost{}", target)).ok()
}
