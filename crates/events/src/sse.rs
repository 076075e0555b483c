//! Multi-subscriber SSE broadcast stream.
//!
//! Framework-agnostic on purpose: this produces pre-framed
//! `text/event-stream` chunks as `String`s. The HTTP façade (axum, in
//! `crates/agent`) is responsible for writing them to a response body,
//! setting headers, and running the heartbeat ticker.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use agentsdk_domain::error::{Error, Result};
use agentsdk_domain::event::Event;

const DEFAULT_SUBSCRIBER_QUEUE: usize = 8;

/// One attached SSE client. `receiver` yields framed chunks ready to write.
pub struct Subscriber {
    pub id: String,
    pub receiver: mpsc::Receiver<String>,
}

/// Fan-out point for broadcasting events to HTTP subscribers.
pub struct SseStream {
    subscribers: Mutex<HashMap<String, mpsc::Sender<String>>>,
    pub heartbeat_interval: Duration,
}

impl SseStream {
    /// `heartbeat_interval` of zero disables heartbeats (the façade should
    /// skip its heartbeat tick entirely in that case).
    pub fn new(heartbeat_interval: Duration) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            heartbeat_interval,
        }
    }

    /// Attach a new subscriber with a bounded queue, returning its id and
    /// receiver. The façade should write `": connected\n\n"` immediately.
    pub fn attach(&self) -> Subscriber {
        let id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::channel(DEFAULT_SUBSCRIBER_QUEUE);
        self.subscribers.lock().insert(id.clone(), tx);
        Subscriber { id, receiver: rx }
    }

    pub fn detach(&self, id: &str) {
        self.subscribers.lock().remove(id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Encode `event` and fan it out to every subscriber. A subscriber whose
    /// queue is full (or already closed) is dropped — slow consumers are
    /// never allowed to back-pressure the broadcaster.
    pub fn send(&self, event: &Event) -> Result<()> {
        let frame = encode_frame(event)?;
        self.broadcast_raw(&frame);
        Ok(())
    }

    pub fn heartbeat_frame() -> String {
        format!(": heartbeat {}\n\n", chrono::Utc::now().timestamp())
    }

    /// Broadcast the synthetic `event: complete` frame the façade sends once
    /// a run's event source has finished, independent of the `stream_events`
    /// pump (used when the façade drives completion itself rather than
    /// handing this stream an upstream `Receiver<Event>`).
    pub fn send_complete(&self) {
        self.broadcast_raw("event: complete\ndata: {}\n\n");
    }

    fn broadcast_raw(&self, frame: &str) {
        let mut dead = Vec::new();
        {
            let subs = self.subscribers.lock();
            for (id, tx) in subs.iter() {
                if tx.try_send(frame.to_string()).is_err() {
                    dead.push(id.clone());
                }
            }
        }
        if !dead.is_empty() {
            let mut subs = self.subscribers.lock();
            for id in dead {
                subs.remove(&id);
            }
        }
    }

    /// Pump events from `source` into this stream until it closes (then
    /// broadcasts a synthetic `event: complete`) or `cancel` fires.
    pub async fn stream_events(
        &self,
        mut source: mpsc::Receiver<Event>,
        cancel: CancellationToken,
    ) -> Result<()> {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Canceled),
                maybe = source.recv() => {
                    match maybe {
                        Some(event) => self.send(&event)?,
                        None => {
                            self.broadcast_raw("event: complete\ndata: {}\n\n");
                            return Ok(());
                        }
                    }
                }
            }
        }
    }
}

fn encode_frame(event: &Event) -> Result<String> {
    let data = serde_json::to_string(event).map_err(Error::Json)?;
    let type_name = serde_json::to_value(event.event_type)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| "event".to_string());
    Ok(format!("id: {}\nevent: {}\ndata: {}\n\n", event.id, type_name, data))
}
