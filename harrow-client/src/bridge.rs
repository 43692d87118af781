//! Remote log bridge
//!
//! Subscribes to an agent's WebSocket log stream and relays every message
//! through a bounded queue to a single consumer. When the queue is full the
//! producer waits instead of dropping lines, which in turn stops reading the
//! socket and pushes back on the agent.

use futures_util::StreamExt;
use std::future::Future;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::AgentClient;

/// Default number of lines buffered between the socket and the consumer
pub const DEFAULT_RELAY_CAPACITY: usize = 1024;

/// Opens log relays against one agent
#[derive(Debug, Clone)]
pub struct LogBridge {
    client: AgentClient,
    capacity: usize,
}

impl LogBridge {
    pub fn new(client: AgentClient) -> Self {
        Self::with_capacity(client, DEFAULT_RELAY_CAPACITY)
    }

    pub fn with_capacity(client: AgentClient, capacity: usize) -> Self {
        Self {
            client,
            capacity: capacity.max(1),
        }
    }

    /// Connects to the job's log stream in the background
    pub fn open(&self, job_id: &str) -> LogRelay {
        let url = self.client.ws_url(job_id);
        let (tx, rx) = mpsc::channel(self.capacity);
        let producer = tokio::spawn(produce(url, tx));
        LogRelay { rx, producer }
    }
}

/// Reads the socket into the queue until the agent closes it or the relay
/// is dropped. A connection or read error becomes one `[ERROR]: ...` line.
async fn produce(url: String, tx: mpsc::Sender<String>) {
    let mut socket = match connect_async(url.as_str()).await {
        Ok((socket, _)) => socket,
        Err(e) => {
            warn!("Log stream connection to {} failed: {}", url, e);
            let _ = tx.send(format!("[ERROR]: {}", e)).await;
            return;
        }
    };
    info!("Relaying log stream from {}", url);

    while let Some(message) = socket.next().await {
        let line = match message {
            Ok(Message::Text(text)) => text.as_str().to_owned(),
            Ok(Message::Binary(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                warn!("Log stream from {} failed: {}", url, e);
                let _ = tx.send(format!("[ERROR]: {}", e)).await;
                break;
            }
        };

        if tx.send(line).await.is_err() {
            break;
        }
    }

    debug!("Log stream from {} ended", url);
}

/// Consumer end of a log relay; dropping it disconnects from the agent
#[derive(Debug)]
pub struct LogRelay {
    rx: mpsc::Receiver<String>,
    producer: JoinHandle<()>,
}

impl LogRelay {
    /// Next relayed line, `None` once the agent closed the stream
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    /// Re-emits lines into `sink` until the stream ends, `sink` rejects a
    /// line, or `is_connected` reports the downstream gone. Returns how many
    /// lines were delivered.
    pub async fn forward<F, Fut, C>(&mut self, mut sink: F, is_connected: C) -> usize
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = bool>,
        C: Fn() -> bool,
    {
        let mut delivered = 0;
        while is_connected() {
            let Some(line) = self.rx.recv().await else {
                break;
            };
            if !sink(line).await {
                break;
            }
            delivered += 1;
        }
        delivered
    }
}

impl Drop for LogRelay {
    fn drop(&mut self) {
        self.producer.abort();
    }
}
