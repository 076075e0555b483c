//! Event pipeline: durable store, typed bus, SSE broadcast.

pub mod bus;
pub mod sse;
pub mod store;

pub use bus::{ChannelSink, EventBus, EventBusOptions, EventSink};
pub use sse::{SseStream, Subscriber};
pub use store::EventStore;
