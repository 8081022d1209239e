//! Store and subscription hub configuration.

/// What the hub does with a subscriber whose queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backpressure {
    /// Drop the subscriber; its stream ends with `ResourceExhausted`.
    #[default]
    Disconnect,
    /// Never drop events. Queues grow without limit.
    Unbounded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Per-subscriber queue depth for `Backpressure::Disconnect`.
    pub subscriber_buffer: usize,
    pub backpressure: Backpressure,
}

impl StoreConfig {
    pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 256;

    pub fn unbounded() -> Self {
        Self {
            backpressure: Backpressure::Unbounded,
            ..Self::default()
        }
    }

    pub fn with_subscriber_buffer(mut self, subscriber_buffer: usize) -> Self {
        // tokio's bounded mpsc rejects a zero capacity
        self.subscriber_buffer = subscriber_buffer.max(1);
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            subscriber_buffer: Self::DEFAULT_SUBSCRIBER_BUFFER,
            backpressure: Backpressure::Disconnect,
        }
    }
}
