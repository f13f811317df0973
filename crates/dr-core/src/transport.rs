//! Websocket session transport.
//!
//! One instance manages one connection's lifecycle on either side of the
//! relay:
//!
//! - **Operator** role: connects to the cloud relay with a `ClientVersion`
//!   header and `Auth: User <session_token>`, sends an `init` frame as soon
//!   as the connection opens, and audit-logs every frame it sends.
//! - **Gateway** role: connects to the gateway relay endpoint with
//!   `Authentication: <base64url(client_id)>`, performs no handshake send on
//!   open, and holds its private key for a higher-level authentication
//!   exchange outside this crate.
//!
//! State machine: `Idle → Connecting → Open → Closing → Idle`.  A single
//! background worker owns the socket: it performs the connect, answers
//! pings, decodes inbound text frames and dispatches them, and forwards
//! outbound frames handed over through a channel.  All decode/log/dispatch
//! work happens on the worker; the caller's thread only issues non-blocking
//! sends and connect/disconnect requests.
//!
//! A transport-level error or unsolicited close while open drives the
//! transport straight back to `Idle` from inside the worker.  That internal
//! transition and an explicit `disconnect()` may race; whichever locks the
//! shared state second finds the work already done and backs off, so a
//! handle is never closed twice.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use base64::prelude::{BASE64_URL_SAFE_NO_PAD, Engine as _};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, warn};

use dr_protocol::RelayFrame;
use dr_session_log::SessionLog;

use crate::error::TransportError;
use crate::events;

/// Bounded wait for the worker to exit on gateway teardown.  After this the
/// teardown proceeds anyway; a rare leaked task beats a hung shutdown.
const GATEWAY_JOIN_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Operator,
    Gateway,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Connecting,
    Open,
    Closing,
}

/// Connection handle and worker reference, mutated by exactly two actors:
/// the owning thread (connect/disconnect) and the worker's own error/close
/// path.  Everything goes through the one mutex.
struct Shared {
    state: State,
    outbound: Option<mpsc::UnboundedSender<Message>>,
    shutdown: Option<watch::Sender<bool>>,
    worker: Option<tokio::task::JoinHandle<()>>,
}

pub struct SessionTransport {
    role: Role,
    url: String,
    /// Operator role: short-lived session token for the `Auth` header.
    session_token: Option<String>,
    /// Gateway role: persistent client identity bytes.
    client_id: Option<Vec<u8>>,
    /// Gateway role: key material held for the higher-level auth exchange.
    /// Never transmitted by this layer.
    _private_key: Option<Vec<u8>>,
    log: Arc<SessionLog>,
    shared: Arc<Mutex<Shared>>,
}

impl SessionTransport {
    pub fn operator(
        url: impl Into<String>,
        session_token: impl Into<String>,
        log: SessionLog,
    ) -> Self {
        Self {
            role: Role::Operator,
            url: url.into(),
            session_token: Some(session_token.into()),
            client_id: None,
            _private_key: None,
            log: Arc::new(log),
            shared: Arc::new(Mutex::new(Shared {
                state: State::Idle,
                outbound: None,
                shutdown: None,
                worker: None,
            })),
        }
    }

    pub fn gateway(
        url: impl Into<String>,
        client_id: Vec<u8>,
        private_key: Option<Vec<u8>>,
        log: SessionLog,
    ) -> Self {
        Self {
            role: Role::Gateway,
            url: url.into(),
            session_token: None,
            client_id: Some(client_id),
            _private_key: private_key,
            log: Arc::new(log),
            shared: Arc::new(Mutex::new(Shared {
                state: State::Idle,
                outbound: None,
                shutdown: None,
                worker: None,
            })),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> State {
        lock(&self.shared).state
    }

    pub fn log_path(&self) -> &std::path::Path {
        self.log.path()
    }

    /// Start the connection.  Legal only from `Idle`.
    ///
    /// Spawns the background worker and returns immediately; the transition
    /// to `Open` happens on the worker once the websocket handshake
    /// completes.  Must be called from within a tokio runtime.
    pub fn connect(&self) -> Result<(), TransportError> {
        let request = self.build_request()?;
        let mut shared = lock(&self.shared);
        if shared.state != State::Idle {
            return Err(TransportError::NotIdle);
        }
        shared.state = State::Connecting;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        shared.outbound = Some(outbound_tx);
        shared.shutdown = Some(shutdown_tx);
        shared.worker = Some(tokio::spawn(run_worker(
            self.role,
            request,
            Arc::clone(&self.log),
            Arc::clone(&self.shared),
            outbound_rx,
            shutdown_rx,
        )));
        Ok(())
    }

    /// Send one frame.  Legal only while `Open`.
    pub fn send(&self, frame: &RelayFrame) -> Result<(), TransportError> {
        let json =
            serde_json::to_string(frame).map_err(|e| TransportError::Ws(e.to_string()))?;
        {
            let shared = lock(&self.shared);
            if shared.state != State::Open {
                return Err(TransportError::NotConnected);
            }
            let Some(tx) = shared.outbound.as_ref() else {
                return Err(TransportError::NotConnected);
            };
            tx.send(Message::Text(json.clone().into()))
                .map_err(|_| TransportError::NotConnected)?;
        }
        if self.role == Role::Operator {
            self.log.append(format!("Sent {json}"));
        }
        Ok(())
    }

    /// Close the connection and wait for the worker to stop.
    ///
    /// Idempotent: on an idle transport this warns and does nothing.  The
    /// wait for the worker is unbounded on the operator role and bounded by
    /// [`GATEWAY_JOIN_TIMEOUT`] on the gateway role.
    pub async fn disconnect(&self) {
        let (worker, shutdown) = {
            let mut shared = lock(&self.shared);
            if shared.state == State::Idle {
                warn!("Connection doesn't exist");
                return;
            }
            shared.state = State::Closing;
            (shared.worker.take(), shared.shutdown.take())
        };

        if let Some(tx) = shutdown {
            let _ = tx.send(true);
        }
        if let Some(handle) = worker {
            match self.role {
                Role::Operator => {
                    let _ = handle.await;
                }
                Role::Gateway => {
                    if tokio::time::timeout(GATEWAY_JOIN_TIMEOUT, handle)
                        .await
                        .is_err()
                    {
                        warn!(
                            timeout_s = GATEWAY_JOIN_TIMEOUT.as_secs(),
                            "worker did not stop in time; proceeding with teardown"
                        );
                    }
                }
            }
        }

        let mut shared = lock(&self.shared);
        shared.state = State::Idle;
        shared.outbound = None;
        shared.shutdown = None;
        shared.worker = None;
    }

    fn build_request(&self) -> Result<Request, TransportError> {
        let mut request = self.url.as_str().into_client_request().map_err(|e| {
            TransportError::Handshake(format!("invalid URL '{}': {}", self.url, e))
        })?;
        let headers = request.headers_mut();
        match self.role {
            Role::Operator => {
                headers.insert(
                    "ClientVersion",
                    header_value(crate::CLIENT_VERSION.to_owned())?,
                );
                if let Some(token) = &self.session_token {
                    headers.insert("Auth", header_value(format!("User {token}"))?);
                }
            }
            Role::Gateway => {
                if let Some(client_id) = &self.client_id {
                    headers.insert(
                        "Authentication",
                        header_value(BASE64_URL_SAFE_NO_PAD.encode(client_id))?,
                    );
                }
            }
        }
        Ok(request)
    }
}

fn header_value(
    value: String,
) -> Result<tokio_tungstenite::tungstenite::http::HeaderValue, TransportError> {
    value.parse().map_err(
        |e: tokio_tungstenite::tungstenite::http::header::InvalidHeaderValue| {
            TransportError::Handshake(format!("invalid header value: {e}"))
        },
    )
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

/// Background run loop owning the socket for one connect/disconnect cycle.
async fn run_worker(
    role: Role,
    request: Request,
    log: Arc<SessionLog>,
    shared: Arc<Mutex<Shared>>,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    mut shutdown: watch::Receiver<bool>,
) {
    let ws = match connect_async(request).await {
        Ok((ws, _response)) => ws,
        Err(e) => {
            log.append(format!("ws.listener.on_error:{e}"));
            warn!(error = %e, "relay connect failed");
            force_idle(&shared);
            return;
        }
    };

    let raced = {
        let mut s = lock(&shared);
        if s.state != State::Connecting {
            // disconnect() raced the handshake; it owns the teardown.
            true
        } else {
            s.state = State::Open;
            false
        }
    };
    if raced {
        let mut ws = ws;
        let _ = ws.close(None).await;
        return;
    }
    log.append("Connection open");

    let (mut write, mut read) = ws.split();

    if role == Role::Operator {
        if let Ok(json) = serde_json::to_string(&RelayFrame::Init) {
            if let Err(e) = write.send(Message::Text(json.into())).await {
                log.append(format!("ws.listener.on_error:{e}"));
                force_idle(&shared);
                return;
            }
            log.append("Connection initialized");
        }
    }

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    let _ = write.send(Message::Close(None)).await;
                    log.append("Connection closed");
                    return;
                }
            }
            frame = outbound.recv() => {
                match frame {
                    Some(msg) => {
                        if let Err(e) = write.send(msg).await {
                            log.append(format!("ws.listener.on_error:{e}"));
                            force_idle(&shared);
                            return;
                        }
                    }
                    // Sender cleared: teardown already in progress.
                    None => return,
                }
            }
            msg = read.next() => {
                match msg {
                    None => {
                        log.append(
                            "ws.listener.on_close: close_status_code=[None], close_msg=[None]",
                        );
                        force_idle(&shared);
                        return;
                    }
                    Some(Err(e)) => {
                        log.append(format!("ws.listener.on_error:{e}"));
                        force_idle(&shared);
                        return;
                    }
                    Some(Ok(Message::Text(text))) => handle_text(&text, &log),
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = match &frame {
                            Some(f) => (u16::from(f.code).to_string(), f.reason.to_string()),
                            None => ("None".to_owned(), "None".to_owned()),
                        };
                        log.append(format!(
                            "ws.listener.on_close: close_status_code=[{code}], close_msg=[{reason}]"
                        ));
                        force_idle(&shared);
                        return;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = write.send(Message::Pong(data)).await;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}

/// Decode and dispatch one inbound text payload.
///
/// A payload that is not a known frame is logged and skipped; malformed
/// input never terminates the session.
fn handle_text(text: &str, log: &SessionLog) {
    match serde_json::from_str::<RelayFrame>(text) {
        Ok(frame) => events::dispatch(&frame, log),
        Err(_) => match serde_json::from_str::<serde_json::Value>(text) {
            Ok(value) => log.append(format!("Event: {value}")),
            Err(_) => {
                debug!("undecodable payload, logged raw");
                log.append(format!("Raw event: {text}"));
            }
        },
    }
}

/// Internally-triggered teardown after a transport error or unsolicited
/// close.  If a `disconnect()` is already mid-flight it wins the transition;
/// this becomes a no-op.
fn force_idle(shared: &Arc<Mutex<Shared>>) {
    let mut s = lock(shared);
    if s.state == State::Closing {
        return;
    }
    s.state = State::Idle;
    s.outbound = None;
    s.shutdown = None;
    // Dropping our own join handle detaches the task; it is about to return.
    s.worker = None;
}
