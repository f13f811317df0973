// mock_relay_server: A mock websocket relay for testing session transports.
//
// Accepts connections on ws://localhost:<port>, records every text frame
// received from clients, captures the handshake headers of the most recent
// connection, and lets tests push scripted frames (or a server-side close)
// to all connected clients.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request, Response,
};
use tokio_tungstenite::tungstenite::protocol::Message;

/// Scripted server action, fanned out to every connected client.
#[derive(Debug, Clone)]
enum Directive {
    Text(String),
    Close,
}

/// A mock relay for integration testing.
///
/// Binds to port 0 (random) and exposes the actual bound address.  Each
/// test can spin up its own isolated instance.
pub struct MockRelayServer {
    addr: SocketAddr,
    received: Arc<Mutex<Vec<String>>>,
    headers: Arc<Mutex<Vec<(String, String)>>>,
    clients: Arc<AtomicUsize>,
    directives: broadcast::Sender<Directive>,
    /// Handle to the background accept loop; dropped with the server.
    _task: tokio::task::JoinHandle<()>,
}

impl MockRelayServer {
    /// Start the mock relay, binding to a random available port.
    pub async fn start() -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let received = Arc::new(Mutex::new(Vec::new()));
        let headers = Arc::new(Mutex::new(Vec::new()));
        let clients = Arc::new(AtomicUsize::new(0));
        let (directives, _) = broadcast::channel(16);

        let task = tokio::spawn(Self::accept_loop(
            listener,
            Arc::clone(&received),
            Arc::clone(&headers),
            Arc::clone(&clients),
            directives.clone(),
        ));

        Ok(Self {
            addr,
            received,
            headers,
            clients,
            directives,
            _task: task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Push a raw text frame to every connected client.
    pub fn push_text(&self, text: impl Into<String>) {
        let _ = self.directives.send(Directive::Text(text.into()));
    }

    /// Push a typed frame to every connected client.
    pub fn push_frame(&self, frame: &dr_protocol::RelayFrame) {
        if let Ok(json) = serde_json::to_string(frame) {
            self.push_text(json);
        }
    }

    /// Close every connected client from the server side.
    pub fn close_clients(&self) {
        let _ = self.directives.send(Directive::Close);
    }

    /// Text frames received from clients, in arrival order.
    pub fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }

    /// Handshake headers of the most recent connection.
    pub fn last_headers(&self) -> Vec<(String, String)> {
        self.headers.lock().unwrap().clone()
    }

    /// Value of one handshake header from the most recent connection.
    pub fn header(&self, name: &str) -> Option<String> {
        let name = name.to_ascii_lowercase();
        self.last_headers()
            .into_iter()
            .find(|(n, _)| n.to_ascii_lowercase() == name)
            .map(|(_, v)| v)
    }

    pub fn client_count(&self) -> usize {
        self.clients.load(Ordering::SeqCst)
    }

    /// Wait until at least `n` clients are connected, bounded by `timeout`.
    /// Returns false on timeout.
    pub async fn wait_for_clients(&self, n: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.client_count() < n {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        true
    }

    /// Wait until at least `n` text frames have been received, bounded by
    /// `timeout`.  Returns false on timeout.
    pub async fn wait_for_received(&self, n: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.received.lock().unwrap().len() < n {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        true
    }

    // -- internal --

    async fn accept_loop(
        listener: TcpListener,
        received: Arc<Mutex<Vec<String>>>,
        headers: Arc<Mutex<Vec<(String, String)>>>,
        clients: Arc<AtomicUsize>,
        directives: broadcast::Sender<Directive>,
    ) {
        loop {
            match listener.accept().await {
                Ok((stream, _peer)) => {
                    let received = Arc::clone(&received);
                    let headers = Arc::clone(&headers);
                    let clients = Arc::clone(&clients);
                    let rx = directives.subscribe();
                    tokio::spawn(async move {
                        Self::handle_connection(stream, received, headers, clients, rx).await;
                    });
                }
                Err(_) => break,
            }
        }
    }

    async fn handle_connection(
        stream: tokio::net::TcpStream,
        received: Arc<Mutex<Vec<String>>>,
        headers: Arc<Mutex<Vec<(String, String)>>>,
        clients: Arc<AtomicUsize>,
        mut directives: broadcast::Receiver<Directive>,
    ) {
        let header_sink = Arc::clone(&headers);
        let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            let mut captured = Vec::new();
            for (name, value) in req.headers() {
                captured.push((
                    name.as_str().to_owned(),
                    value.to_str().unwrap_or("").to_owned(),
                ));
            }
            *header_sink.lock().unwrap() = captured;
            Ok(resp)
        };

        let ws = match tokio_tungstenite::accept_hdr_async(stream, callback).await {
            Ok(ws) => ws,
            Err(_) => return,
        };
        clients.fetch_add(1, Ordering::SeqCst);
        let (mut write, mut read) = ws.split();

        loop {
            tokio::select! {
                directive = directives.recv() => {
                    match directive {
                        Ok(Directive::Text(text)) => {
                            if write.send(Message::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                        Ok(Directive::Close) => {
                            let _ = write.send(Message::Close(None)).await;
                            break;
                        }
                        Err(broadcast::error::RecvError::Lagged(_)) => {}
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
                msg = read.next() => {
                    match msg {
                        None | Some(Err(_)) => break,
                        Some(Ok(Message::Text(text))) => {
                            received.lock().unwrap().push(text.to_string());
                        }
                        Some(Ok(Message::Close(_))) => break,
                        Some(Ok(Message::Ping(data))) => {
                            let _ = write.send(Message::Pong(data)).await;
                        }
                        Some(Ok(_)) => {}
                    }
                }
            }
        }
        clients.fetch_sub(1, Ordering::SeqCst);
    }
}
