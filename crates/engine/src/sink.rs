// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Notification hooks.
//!
//! Every observable event is delivered to an [`EventSink`]. Sinks must be
//! side-effect-free from the core's point of view: delivery failures are
//! swallowed after logging, and the core never waits on a consumer.

use async_trait::async_trait;
use sf_core::Event;
use tokio::sync::mpsc;

/// Receives observable events.
#[async_trait]
pub trait EventSink: Send + Sync + 'static {
    async fn emit(&self, event: Event);
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

#[async_trait]
impl EventSink for NullSink {
    async fn emit(&self, _event: Event) {}
}

/// Forwards events into a tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<Event>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<Event>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn emit(&self, event: Event) {
        if let Err(e) = self.tx.send(event).await {
            tracing::warn!(error = %e, "event receiver dropped, notification lost");
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
mod recording {
    use super::EventSink;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use sf_core::Event;
    use std::sync::Arc;

    /// Collects every event for assertions.
    #[derive(Clone, Default)]
    pub struct RecordingSink {
        events: Arc<Mutex<Vec<Event>>>,
    }

    impl RecordingSink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn events(&self) -> Vec<Event> {
            self.events.lock().clone()
        }

        pub fn clear(&self) {
            self.events.lock().clear();
        }
    }

    #[async_trait]
    impl EventSink for RecordingSink {
        async fn emit(&self, event: Event) {
            self.events.lock().push(event);
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use recording::RecordingSink;
