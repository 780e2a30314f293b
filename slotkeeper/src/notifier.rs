//! Expiry notifications.
//!
//! Events are broadcast to every live subscriber and filtered per subscriber by
//! `context_id` on delivery. Delivery is fire-and-forget: nothing is stored, a
//! subscriber only sees events published after it subscribed, and a subscriber
//! that falls more than the channel capacity behind skips the missed events.

use futures::stream::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

use crate::reserve::ReserveExpired;

#[derive(Debug, Clone)]
pub struct ExpiryNotifier {
    tx: broadcast::Sender<ReserveExpired>,
}

impl ExpiryNotifier {
    /// Create a notifier buffering at most `capacity` undelivered events per subscriber.
    ///
    /// # Panics
    /// If `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Broadcast an event. Returns how many subscribers it was queued for.
    pub fn publish(&self, event: ReserveExpired) -> usize {
        // A send error only means nobody is listening.
        match self.tx.send(event) {
            Ok(receivers) => receivers,
            Err(broadcast::error::SendError(event)) => {
                tracing::trace!(reserve_id = %event.reserve_id, "No expiry subscribers, dropping event");
                0
            }
        }
    }

    /// Live stream of expiry events for one context.
    ///
    /// The subscription is registered before this returns, so any event published
    /// afterwards is observed. Events for other contexts are dropped.
    pub fn subscribe<T: Into<String>>(
        &self,
        context_id: T,
    ) -> impl Stream<Item = ReserveExpired> + Send + 'static + use<T> {
        let context_id = context_id.into();
        self.subscribe_all()
            .filter(move |event| futures::future::ready(event.context_id == context_id))
    }

    /// Live stream of every expiry event, regardless of context.
    pub fn subscribe_all(&self) -> impl Stream<Item = ReserveExpired> + Send + 'static + use<> {
        BroadcastStream::new(self.tx.subscribe()).filter_map(|result| async move {
            match result {
                Ok(event) => Some(event),
                Err(BroadcastStreamRecvError::Lagged(n)) => {
                    tracing::warn!(lagged_count = n, "Expiry subscriber lagged, events skipped");
                    None
                }
            }
        })
    }
}
