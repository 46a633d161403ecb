use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::Stream;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use resale_types::events::MarketEvent;

use crate::state::AppState;

/// Application-scoped publish/subscribe channel for marketplace events.
///
/// Subscribers register with [`EventBus::subscribe`] and unregister by
/// dropping the receiver.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<MarketEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self { tx }
    }

    pub fn publish(&self, event: MarketEvent) {
        // No subscribers is fine
        let delivered = self.tx.send(event).unwrap_or(0);
        debug!("Market event delivered to {} subscriber(s)", delivered);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MarketEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// GET /tickets/live: marketplace events as server-sent events.
pub async fn live_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.events.subscribe();
    debug!("Live subscriber connected ({} total)", state.events.subscriber_count());

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => match Event::default().event(event.name()).json_data(&event) {
                    Ok(sse) => yield Ok(sse),
                    Err(e) => warn!("Failed to encode market event: {}", e),
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Live subscriber lagged, skipped {} event(s)", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}
