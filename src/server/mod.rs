//! Mock HTTP server lifecycle and management surface
//!
//! [`MockServer`] owns the shared state (response queue + record store),
//! binds a TCP listener and runs the accept loop. The management methods are
//! meant for the test author driving the server between requests; HTTP
//! clients only ever talk to the listener.

pub mod config;
mod conn;


pub use config::ServerConfig;

use crate::handler::{MockState, lock};
use crate::record::ExchangeRecord;
use crate::response::PredefinedResponse;
use crate::{MockError, Result};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{Instrument, error, info, warn};

/// In-process mock HTTP server.
///
/// One handler serves all methods and paths identically: it answers with the
/// next predefined response and records the exchange. See the crate-level
/// documentation for the consumption policy.
///
/// # Examples
///
/// ```no_run
/// use mocksrv::{MockServer, PredefinedResponse, ServerConfig};
///
/// #[tokio::main]
/// async fn main() -> mocksrv::Result<()> {
///     let mut server = MockServer::new(ServerConfig::default());
///     server.start().await?;
///
///     server.push_response(
///         PredefinedResponse::new(200)
///             .with_header("content-type", "application/json")
///             .with_body(r#"{"ok":true}"#),
///     );
///
///     // Point the client under test at server.base_url() ...
///
///     let _record = server.pop_record();
///     server.close().await;
///     Ok(())
/// }
/// ```
pub struct MockServer {
    config: ServerConfig,
    state: Arc<Mutex<MockState>>,
    shutdown_signal: Arc<broadcast::Sender<()>>,
    local_addr: Option<SocketAddr>,
    accept_task: Option<JoinHandle<()>>,
}

impl MockServer {
    /// Creates a new, unstarted server with the given configuration.
    pub fn new(config: ServerConfig) -> Self {
        let (shutdown_signal, _) = broadcast::channel(1);
        Self {
            config,
            state: Arc::new(Mutex::new(MockState::new())),
            shutdown_signal: Arc::new(shutdown_signal),
            local_addr: None,
            accept_task: None,
        }
    }

    /// Binds the listener and spawns the accept loop.
    pub async fn start(&mut self) -> Result<()> {
        if self.accept_task.is_some() {
            return Err(MockError::Config("server already started".to_string()));
        }

        let listener = TcpListener::bind(self.config.bind_addr).await?;
        let addr = listener.local_addr()?;
        self.local_addr = Some(addr);

        info!(address = %addr, "Mock HTTP server listening");

        let state = self.state.clone();
        let config = self.config.clone();
        let shutdown = self.shutdown_signal.clone();
        self.accept_task = Some(tokio::spawn(accept_loop(
            listener,
            state,
            config,
            shutdown,
        )));
        Ok(())
    }

    /// The address the server is listening on, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Base URL of form `http://ipaddr:port` with no trailing slash.
    pub fn base_url(&self) -> Option<String> {
        self.local_addr.map(|addr| format!("http://{addr}"))
    }

    /// Stops accepting connections and waits for in-flight exchanges to
    /// finish. Connections idle between requests are dropped.
    pub async fn close(&mut self) {
        let _ = self.shutdown_signal.send(());
        if let Some(task) = self.accept_task.take() {
            let _ = task.await;
        }
        self.local_addr = None;
        info!("Mock HTTP server stopped");
    }

    /// Stages a predefined response at the tail of the response queue.
    pub fn push_response(&self, response: PredefinedResponse) {
        lock(&self.state).responses.push(response);
    }

    /// Pops the oldest exchange record, or `None` when nothing was recorded.
    pub fn pop_record(&self) -> Option<ExchangeRecord> {
        lock(&self.state).records.pop()
    }

    /// Clears staged responses; subsequent requests get the empty 404.
    pub fn clear_responses(&self) {
        lock(&self.state).responses.clear();
    }

    /// Clears captured records without touching the response queue.
    pub fn clear_records(&self) {
        lock(&self.state).records.clear();
    }

    /// Clears both staged responses and captured records.
    pub fn clear(&self) {
        lock(&self.state).clear();
    }

    pub fn response_count(&self) -> usize {
        lock(&self.state).responses.len()
    }

    pub fn record_count(&self) -> usize {
        lock(&self.state).records.len()
    }

    /// The underlying shared state, for users building more involved test
    /// cases than the management surface covers.
    pub fn state(&self) -> Arc<Mutex<MockState>> {
        self.state.clone()
    }
}

async fn accept_loop(
    listener: TcpListener,
    state: Arc<Mutex<MockState>>,
    config: ServerConfig,
    shutdown: Arc<broadcast::Sender<()>>,
) {
    let mut shutdown_rx = shutdown.subscribe();
    let connection_count = Arc::new(AtomicUsize::new(0));
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, addr)) => {
                        let current = connection_count.load(Ordering::SeqCst);
                        if current >= config.max_connections {
                            warn!(%addr, current, limit = config.max_connections, "Connection rejected: limit reached");
                            continue;
                        }

                        connection_count.fetch_add(1, Ordering::SeqCst);
                        let new_count = connection_count.load(Ordering::SeqCst);

                        let state = state.clone();
                        let config = config.clone();
                        let connection_count = connection_count.clone();
                        let conn_shutdown = shutdown.subscribe();
                        let span = tracing::info_span!("connection", %addr, current = new_count);
                        connections.spawn(async move {
                            if let Err(e) = conn::handle_connection(stream, state, config, conn_shutdown).await {
                                error!(%addr, error = %e, "Error handling connection");
                            }
                            connection_count.fetch_sub(1, Ordering::SeqCst);
                        }.instrument(span));
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to accept connection");
                    }
                }
            }
            // Reap finished connection tasks as the server runs
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            _ = shutdown_rx.recv() => {
                info!("Received shutdown signal, stopping mock server");
                break;
            }
        }
    }

    // Each remaining connection got the shutdown signal; wait for their
    // current exchanges to finish before close() returns
    while connections.join_next().await.is_some() {}
}
