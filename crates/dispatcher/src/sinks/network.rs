//! NetworkSink - TCP broadcast to every connected listener

use contracts::{ContractError, SnapshotSink, TelemetryFrame};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::codec;

const DEFAULT_MAX_CLIENTS: usize = 8;
const DEFAULT_WRITE_TIMEOUT_MS: u64 = 500;

/// Configuration for NetworkSink
#[derive(Debug, Clone)]
pub struct NetworkSinkConfig {
    /// Listen address
    pub bind: SocketAddr,
    /// Connections beyond this are closed right after accept
    pub max_clients: usize,
    /// Per-client write deadline; slower clients are dropped
    pub write_timeout: Duration,
}

impl NetworkSinkConfig {
    /// Params: `bind` (required), `max_clients`, `write_timeout_ms`
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, String> {
        let bind_str = params
            .get("bind")
            .ok_or_else(|| "missing 'bind' parameter".to_string())?;
        let bind: SocketAddr = bind_str
            .parse()
            .map_err(|e| format!("invalid address '{}': {}", bind_str, e))?;

        let max_clients = parse_param(params, "max_clients", DEFAULT_MAX_CLIENTS)?;
        let write_timeout_ms = parse_param(params, "write_timeout_ms", DEFAULT_WRITE_TIMEOUT_MS)?;

        Ok(Self {
            bind,
            max_clients: max_clients.max(1),
            write_timeout: Duration::from_millis(write_timeout_ms),
        })
    }
}

pub(crate) fn parse_param<T: std::str::FromStr>(
    params: &HashMap<String, String>,
    key: &str,
    default: T,
) -> Result<T, String> {
    match params.get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| format!("invalid '{}' value '{}'", key, raw)),
    }
}

struct Client {
    peer: SocketAddr,
    stream: TcpStream,
}

/// Sink that writes every record to all accepted TCP clients
pub struct NetworkSink {
    name: String,
    config: NetworkSinkConfig,
    local_addr: SocketAddr,
    accepted_rx: mpsc::UnboundedReceiver<(TcpStream, SocketAddr)>,
    accept_task: Option<JoinHandle<()>>,
    clients: Vec<Client>,
}

impl NetworkSink {
    /// Bind the listener and start accepting clients
    #[instrument(name = "network_sink_new", skip(name, config))]
    pub async fn new(name: impl Into<String>, config: NetworkSinkConfig) -> std::io::Result<Self> {
        let name = name.into();
        let listener = TcpListener::bind(config.bind).await?;
        let local_addr = listener.local_addr()?;

        let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();
        let accept_task = tokio::spawn(accept_loop(listener, accepted_tx, name.clone()));

        info!(sink = %name, addr = %local_addr, "NetworkSink listening");

        Ok(Self {
            name,
            config,
            local_addr,
            accepted_rx,
            accept_task: Some(accept_task),
            clients: Vec::new(),
        })
    }

    #[instrument(name = "network_sink_from_params", skip(name, params))]
    pub async fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> Result<Self, ContractError> {
        let name = name.into();
        let config = NetworkSinkConfig::from_params(params)
            .map_err(|e| ContractError::config_validation(format!("sinks.{name}.params"), e))?;

        Self::new(name.clone(), config)
            .await
            .map_err(|e| ContractError::sink_connection(name, e.to_string()))
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    fn admit_pending(&mut self) {
        while let Ok((stream, peer)) = self.accepted_rx.try_recv() {
            if self.clients.len() >= self.config.max_clients {
                warn!(sink = %self.name, %peer, "Client limit reached, rejecting");
                continue;
            }
            if let Err(e) = stream.set_nodelay(true) {
                debug!(sink = %self.name, %peer, error = %e, "Failed to set TCP_NODELAY");
            }
            info!(sink = %self.name, %peer, "Client connected");
            self.clients.push(Client { peer, stream });
        }
    }

    /// Write one record to every client, dropping the ones that fail
    async fn broadcast(&mut self, record: &[u8]) -> usize {
        let timeout = self.config.write_timeout;
        let mut failed = Vec::new();

        for (idx, client) in self.clients.iter_mut().enumerate() {
            let outcome = tokio::time::timeout(timeout, client.stream.write_all(record)).await;
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    debug!(sink = %self.name, peer = %client.peer, error = %e, "Client write failed");
                    failed.push(idx);
                }
                Err(_) => {
                    debug!(sink = %self.name, peer = %client.peer, "Client write timed out");
                    failed.push(idx);
                }
            }
        }

        for idx in failed.iter().rev() {
            let client = self.clients.remove(*idx);
            info!(sink = %self.name, peer = %client.peer, "Client disconnected");
        }

        self.clients.len()
    }
}

async fn accept_loop(
    listener: TcpListener,
    accepted_tx: mpsc::UnboundedSender<(TcpStream, SocketAddr)>,
    name: String,
) {
    loop {
        match listener.accept().await {
            Ok(conn) => {
                if accepted_tx.send(conn).is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!(sink = %name, error = %e, "Accept failed");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

impl SnapshotSink for NetworkSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "network_sink_write",
        skip(self, frame),
        fields(sink = %self.name, seq = frame.seq)
    )]
    async fn write(&mut self, frame: &TelemetryFrame) -> Result<(), ContractError> {
        self.admit_pending();
        if self.clients.is_empty() {
            return Ok(());
        }

        let record = codec::encode_for_sink(&self.name, frame)?;
        let remaining = self.broadcast(&record).await;
        debug!(sink = %self.name, clients = remaining, bytes = record.len(), "Broadcast");
        Ok(())
    }

    #[instrument(name = "network_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        for client in &mut self.clients {
            let _ = client.stream.flush().await;
        }
        Ok(())
    }

    #[instrument(name = "network_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        if let Some(task) = self.accept_task.take() {
            task.abort();
        }
        for mut client in self.clients.drain(..) {
            let _ = client.stream.shutdown().await;
        }
        debug!(sink = %self.name, "NetworkSink closed");
        Ok(())
    }
}

impl Drop for NetworkSink {
    fn drop(&mut self) {
        if let Some(task) = self.accept_task.take() {
            task.abort();
        }
    }
}
