//! Typed event bus routing to {progress, control, monitor} channels.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use agentsdk_domain::bookmark::EventBookmark;
use agentsdk_domain::error::{Error, Result};
use agentsdk_domain::event::{validate_type, Channel, Event, EventType};

use crate::store::EventStore;

/// An external consumer of events for one channel. `forward` must not block
/// for long — it runs on the channel's forwarder task.
pub trait EventSink: Send + Sync {
    fn forward(&self, event: Event);
}

/// Wraps a `tokio::sync::mpsc::UnboundedSender<Event>` as a sink, the usual
/// way to hand events to another in-process consumer.
pub struct ChannelSink(pub mpsc::UnboundedSender<Event>);

impl EventSink for ChannelSink {
    fn forward(&self, event: Event) {
        let _ = self.0.send(event);
    }
}

#[derive(Clone)]
pub struct EventBusOptions {
    pub buffer_size: usize,
    pub auto_seal: HashSet<EventType>,
    pub store: Option<Arc<EventStore>>,
    pub persist_async: bool,
}

impl Default for EventBusOptions {
    fn default() -> Self {
        let mut auto_seal = HashSet::new();
        auto_seal.insert(EventType::Completion);
        auto_seal.insert(EventType::Error);
        Self {
            buffer_size: 64,
            auto_seal,
            store: None,
            persist_async: false,
        }
    }
}

struct ChannelBinding {
    sender: Mutex<Option<mpsc::Sender<Event>>>,
    forwarder: Mutex<Option<JoinHandle<()>>>,
}

impl ChannelBinding {
    fn bound(sink: Arc<dyn EventSink>, buffer: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<Event>(buffer);
        let handle = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let sink = sink.clone();
                let outcome =
                    std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| sink.forward(event)));
                if outcome.is_err() {
                    tracing::warn!("event sink panicked while forwarding; event dropped");
                }
            }
        });
        Self {
            sender: Mutex::new(Some(tx)),
            forwarder: Mutex::new(Some(handle)),
        }
    }

    fn unbound() -> Self {
        Self {
            sender: Mutex::new(None),
            forwarder: Mutex::new(None),
        }
    }
}

fn channel_index(channel: Channel) -> usize {
    match channel {
        Channel::Progress => 0,
        Channel::Control => 1,
        Channel::Monitor => 2,
    }
}

/// Routes typed events to three bounded, independently-forwarded channels.
pub struct EventBus {
    bindings: [ChannelBinding; 3],
    sealed: AtomicBool,
    counter: AtomicI64,
    store: Option<Arc<EventStore>>,
    persist_async: bool,
    auto_seal: HashSet<EventType>,
}

impl EventBus {
    pub fn new(
        progress: Option<Arc<dyn EventSink>>,
        control: Option<Arc<dyn EventSink>>,
        monitor: Option<Arc<dyn EventSink>>,
        options: EventBusOptions,
    ) -> Self {
        let buffer = options.buffer_size.max(1);
        let make = |sink: Option<Arc<dyn EventSink>>| match sink {
            Some(s) => ChannelBinding::bound(s, buffer),
            None => ChannelBinding::unbound(),
        };

        Self {
            bindings: [make(progress), make(control), make(monitor)],
            sealed: AtomicBool::new(false),
            counter: AtomicI64::new(-1),
            store: options.store,
            persist_async: options.persist_async,
            auto_seal: options.auto_seal,
        }
    }

    pub fn sealed(&self) -> bool {
        self.sealed.load(Ordering::SeqCst)
    }

    fn advance_counter(&self, seq: i64) {
        let mut cur = self.counter.load(Ordering::SeqCst);
        while seq > cur {
            match self
                .counter
                .compare_exchange(cur, seq, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => break,
                Err(observed) => cur = observed,
            }
        }
    }

    /// Normalize, bookmark, validate, and route `event`.
    pub async fn emit(&self, mut event: Event) -> Result<()> {
        event.normalize();

        if self.store.is_some() && event.bookmark.is_none() {
            let seq = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
            event.bookmark = Some(EventBookmark::new(seq, Utc::now()));
        }
        if let Some(bm) = event.bookmark {
            self.advance_counter(bm.seq);
        }

        let channel = validate_type(event.event_type)?;

        if self.sealed() {
            return Err(Error::BusSealed);
        }

        let idx = channel_index(channel);
        let sender = self.bindings[idx].sender.lock().clone();
        let Some(sender) = sender else {
            return Err(Error::UnboundChannel(format!("{channel:?}")));
        };

        sender.send(event.clone()).await.map_err(|_| Error::BusSealed)?;

        if let Some(store) = &self.store {
            if self.persist_async {
                let store = store.clone();
                let to_persist = event.clone();
                tokio::spawn(async move {
                    if let Err(e) = store.append(&to_persist) {
                        tracing::warn!(error = %e, "async event persistence failed");
                    }
                });
            } else {
                store.append(&event)?;
            }
        }

        if event.event_type.auto_seals() {
            if let Err(e) = self.seal().await {
                tracing::debug!(error = %e, "auto-seal raced with an existing seal");
            }
        }

        Ok(())
    }

    /// Seal the bus: no further `emit` succeeds; drains and closes every
    /// channel. Idempotent — a second call returns `BusSealed`.
    pub async fn seal(&self) -> Result<()> {
        if self
            .sealed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::BusSealed);
        }

        for binding in &self.bindings {
            let sender = binding.sender.lock().take();
            drop(sender);
        }
        for binding in &self.bindings {
            let handle = binding.forwarder.lock().take();
            if let Some(h) = handle {
                let _ = h.await;
            }
        }

        Ok(())
    }

    /// Requires an attached `EventStore`. Returns an unbounded receiver that
    /// first yields every event strictly after `bookmark`, in order, then is
    /// closed — no live tail is wired.
    pub fn subscribe_since(
        &self,
        bookmark: Option<EventBookmark>,
    ) -> Result<mpsc::UnboundedReceiver<Event>> {
        let store = self
            .store
            .clone()
            .ok_or_else(|| Error::Validation("subscribe_since requires an attached EventStore".into()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let history = store.read_since(bookmark)?;
        tokio::spawn(async move {
            for event in history {
                if tx.send(event).is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }
}
