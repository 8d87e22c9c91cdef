//! RadioSink - short-packet notify transport over UDP
//!
//! Models a low-bandwidth characteristic: a peer subscribes by sending any
//! datagram, then receives each record split into small notifications.
//! Peers can also send `reset` (forwarded to the sampling loop) or `bye`.

use contracts::{ContractError, ControlCommand, SnapshotSink, TelemetryFrame};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::codec::{self, DEFAULT_CHUNK_SIZE};
use crate::sinks::network::parse_param;

/// Largest notification payload accepted in config
pub const MAX_CHUNK_SIZE: usize = 512;

const DEFAULT_CHUNK_DELAY_MS: u64 = 10;
const DEFAULT_MAX_SUBSCRIBERS: usize = 4;
const UNSUBSCRIBE: &str = "bye";

/// Configuration for RadioSink
#[derive(Debug, Clone)]
pub struct RadioSinkConfig {
    pub bind: SocketAddr,
    /// Notification payload size in bytes
    pub chunk_size: usize,
    /// Pause between notifications of one record
    pub chunk_delay: Duration,
    pub max_subscribers: usize,
}

impl RadioSinkConfig {
    /// Params: `bind` (required), `chunk_size` (1..=512), `chunk_delay_ms`, `max_subscribers`
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, String> {
        let bind_str = params
            .get("bind")
            .ok_or_else(|| "missing 'bind' parameter".to_string())?;
        let bind: SocketAddr = bind_str
            .parse()
            .map_err(|e| format!("invalid address '{}': {}", bind_str, e))?;

        let chunk_size = parse_param(params, "chunk_size", DEFAULT_CHUNK_SIZE)?;
        if !(1..=MAX_CHUNK_SIZE).contains(&chunk_size) {
            return Err(format!(
                "'chunk_size' must be within 1..={}, got {}",
                MAX_CHUNK_SIZE, chunk_size
            ));
        }
        let chunk_delay_ms = parse_param(params, "chunk_delay_ms", DEFAULT_CHUNK_DELAY_MS)?;
        let max_subscribers = parse_param(params, "max_subscribers", DEFAULT_MAX_SUBSCRIBERS)?;

        Ok(Self {
            bind,
            chunk_size,
            chunk_delay: Duration::from_millis(chunk_delay_ms),
            max_subscribers: max_subscribers.max(1),
        })
    }
}

#[derive(Debug)]
enum PeerEvent {
    Subscribe(SocketAddr),
    Unsubscribe(SocketAddr),
}

/// Sink that notifies subscribed UDP peers in fixed-size chunks
pub struct RadioSink {
    name: String,
    config: RadioSinkConfig,
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    events_rx: mpsc::UnboundedReceiver<PeerEvent>,
    recv_task: Option<JoinHandle<()>>,
    subscribers: Vec<SocketAddr>,
}

impl RadioSink {
    /// Bind the endpoint and start listening for peers.
    ///
    /// `control` receives commands sent by peers; `None` ignores them.
    #[instrument(name = "radio_sink_new", skip(name, config, control))]
    pub async fn new(
        name: impl Into<String>,
        config: RadioSinkConfig,
        control: Option<mpsc::Sender<ControlCommand>>,
    ) -> std::io::Result<Self> {
        let name = name.into();
        let socket = Arc::new(UdpSocket::bind(config.bind).await?);
        let local_addr = socket.local_addr()?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let recv_task = tokio::spawn(recv_loop(
            Arc::clone(&socket),
            events_tx,
            control,
            name.clone(),
        ));

        info!(
            sink = %name,
            addr = %local_addr,
            chunk_size = config.chunk_size,
            "RadioSink advertising"
        );

        Ok(Self {
            name,
            config,
            socket,
            local_addr,
            events_rx,
            recv_task: Some(recv_task),
            subscribers: Vec::new(),
        })
    }

    #[instrument(name = "radio_sink_from_params", skip(name, params, control))]
    pub async fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
        control: Option<mpsc::Sender<ControlCommand>>,
    ) -> Result<Self, ContractError> {
        let name = name.into();
        let config = RadioSinkConfig::from_params(params)
            .map_err(|e| ContractError::config_validation(format!("sinks.{name}.params"), e))?;

        Self::new(name.clone(), config, control)
            .await
            .map_err(|e| ContractError::sink_connection(name, e.to_string()))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    fn apply_peer_events(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            match event {
                PeerEvent::Subscribe(peer) => {
                    if self.subscribers.contains(&peer) {
                        continue;
                    }
                    if self.subscribers.len() >= self.config.max_subscribers {
                        warn!(sink = %self.name, %peer, "Subscriber limit reached");
                        continue;
                    }
                    info!(sink = %self.name, %peer, "Peer subscribed");
                    self.subscribers.push(peer);
                }
                PeerEvent::Unsubscribe(peer) => {
                    let before = self.subscribers.len();
                    self.subscribers.retain(|p| *p != peer);
                    if self.subscribers.len() != before {
                        info!(sink = %self.name, %peer, "Peer unsubscribed");
                    }
                }
            }
        }
    }

    async fn notify(&mut self, record: &[u8]) -> Result<usize, ContractError> {
        let mut chunks = codec::chunk_record(record, self.config.chunk_size).peekable();
        let mut sent = 0;

        while let Some(chunk) = chunks.next() {
            let mut failed = Vec::new();
            for peer in &self.subscribers {
                if let Err(e) = self.socket.send_to(chunk, peer).await {
                    debug!(sink = %self.name, %peer, error = %e, "Notify failed");
                    failed.push(*peer);
                }
            }
            if !failed.is_empty() {
                self.subscribers.retain(|p| !failed.contains(p));
                if self.subscribers.is_empty() {
                    return Err(ContractError::sink_write(
                        &self.name,
                        "all subscribers failed mid-record",
                    ));
                }
            }
            sent += 1;

            if chunks.peek().is_some() && !self.config.chunk_delay.is_zero() {
                tokio::time::sleep(self.config.chunk_delay).await;
            }
        }

        Ok(sent)
    }
}

async fn recv_loop(
    socket: Arc<UdpSocket>,
    events_tx: mpsc::UnboundedSender<PeerEvent>,
    control: Option<mpsc::Sender<ControlCommand>>,
    name: String,
) {
    let mut buf = [0u8; 256];
    loop {
        let (len, peer) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                // ICMP port-unreachable from a vanished peer surfaces here on some platforms
                debug!(sink = %name, error = %e, "Receive failed");
                tokio::time::sleep(Duration::from_millis(50)).await;
                continue;
            }
        };

        let text = String::from_utf8_lossy(&buf[..len]);
        let event = if text.trim().eq_ignore_ascii_case(UNSUBSCRIBE) {
            PeerEvent::Unsubscribe(peer)
        } else {
            if let Some(cmd) = ControlCommand::parse(&text) {
                info!(sink = %name, %peer, command = ?cmd, "Control command received");
                if let Some(tx) = &control {
                    if tx.try_send(cmd).is_err() {
                        warn!(sink = %name, "Control channel unavailable, command dropped");
                    }
                }
            }
            PeerEvent::Subscribe(peer)
        };

        if events_tx.send(event).is_err() {
            break;
        }
    }
}

impl SnapshotSink for RadioSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "radio_sink_write",
        skip(self, frame),
        fields(sink = %self.name, seq = frame.seq)
    )]
    async fn write(&mut self, frame: &TelemetryFrame) -> Result<(), ContractError> {
        self.apply_peer_events();
        if self.subscribers.is_empty() {
            return Ok(());
        }

        let record = codec::encode_for_sink(&self.name, frame)?;
        let chunks = self.notify(&record).await?;
        debug!(sink = %self.name, chunks, bytes = record.len(), "Notified");
        Ok(())
    }

    #[instrument(name = "radio_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    #[instrument(name = "radio_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        if let Some(task) = self.recv_task.take() {
            task.abort();
        }
        self.subscribers.clear();
        debug!(sink = %self.name, "RadioSink closed");
        Ok(())
    }
}

impl Drop for RadioSink {
    fn drop(&mut self) {
        if let Some(task) = self.recv_task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::RecordAssembler;
    use contracts::MetricsSnapshot;

    fn local_config(chunk_size: usize) -> RadioSinkConfig {
        RadioSinkConfig {
            bind: "127.0.0.1:0".parse().unwrap(),
            chunk_size,
            chunk_delay: Duration::from_millis(1),
            max_subscribers: 4,
        }
    }

    fn frame(steps: u32) -> TelemetryFrame {
        let metrics = MetricsSnapshot {
            step_count: steps,
            ..MetricsSnapshot::default()
        };
        TelemetryFrame::from_metrics(steps as u64, 0, metrics)
    }

    async fn wait_for_subscribers(sink: &mut RadioSink, n: usize) {
        for _ in 0..50 {
            sink.apply_peer_events();
            if sink.subscriber_count() == n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {} subscribers, have {}", n, sink.subscriber_count());
    }

    #[test]
    fn test_radio_config_parsing() {
        let mut params = HashMap::new();
        params.insert("bind".to_string(), "127.0.0.1:7000".to_string());
        let config = RadioSinkConfig::from_params(&params).unwrap();
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(config.chunk_delay, Duration::from_millis(10));

        params.insert("chunk_size".to_string(), "0".to_string());
        assert!(RadioSinkConfig::from_params(&params).is_err());
        params.insert("chunk_size".to_string(), "513".to_string());
        assert!(RadioSinkConfig::from_params(&params).is_err());
        params.insert("chunk_size".to_string(), "512".to_string());
        assert!(RadioSinkConfig::from_params(&params).is_ok());
    }

    #[tokio::test]
    async fn test_radio_without_subscribers_is_noop() {
        let mut sink = RadioSink::new("radio", local_config(20), None).await.unwrap();
        assert!(sink.write(&frame(3)).await.is_ok());
        assert_eq!(sink.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_radio_chunks_reassemble() {
        let mut sink = RadioSink::new("radio", local_config(20), None).await.unwrap();
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        peer.send_to(b"hello", sink.local_addr()).await.unwrap();
        wait_for_subscribers(&mut sink, 1).await;

        sink.write(&frame(42)).await.unwrap();

        let mut asm = RecordAssembler::new();
        let mut buf = [0u8; 64];
        let record = loop {
            let (len, _) = tokio::time::timeout(Duration::from_secs(2), peer.recv_from(&mut buf))
                .await
                .unwrap()
                .unwrap();
            assert!(len <= 20);
            if let Some(rec) = asm.push(&buf[..len]).pop() {
                break rec.unwrap();
            }
        };
        assert_eq!(record.steps, 42);
    }

    #[tokio::test]
    async fn test_radio_forwards_reset_and_bye() {
        let (control_tx, mut control_rx) = mpsc::channel(4);
        let mut sink = RadioSink::new("radio", local_config(20), Some(control_tx))
            .await
            .unwrap();
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        peer.send_to(b" RESET\n", sink.local_addr()).await.unwrap();
        let cmd = tokio::time::timeout(Duration::from_secs(2), control_rx.recv())
            .await
            .unwrap();
        assert_eq!(cmd, Some(ControlCommand::Reset));
        wait_for_subscribers(&mut sink, 1).await;

        peer.send_to(b"bye", sink.local_addr()).await.unwrap();
        wait_for_subscribers(&mut sink, 0).await;
    }
}
