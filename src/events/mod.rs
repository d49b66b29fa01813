use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

pub mod domain;

pub use domain::{OrderEvent, OrderEventHandler};

/// Notifications published after an order mutation has been committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    OrderCreated(i64),
    OrderPlaced(i64),
    OrderUpdated {
        order_id: i64,
        version: i32,
        description: String,
    },
    OrderFulfilled {
        order_id: i64,
        partially: bool,
    },
    OrderCanceled(i64),
    OrderCompleted(i64),
    OrderArchived(i64),
    OrderStatusOverridden {
        order_id: i64,
        payment_status: Option<String>,
        fulfillment_status: Option<String>,
    },
    PaymentCollectionCreated {
        collection_id: i64,
        order_id: i64,
    },
    PaymentCollectionDeleted {
        collection_id: i64,
        order_id: i64,
    },
    PaymentCollectionPaid {
        collection_id: i64,
        order_id: i64,
    },
    PaymentCollectionCanceled {
        collection_id: i64,
        order_id: i64,
    },
}

impl Event {
    pub fn order_id(&self) -> i64 {
        match self {
            Event::OrderCreated(id)
            | Event::OrderPlaced(id)
            | Event::OrderCanceled(id)
            | Event::OrderCompleted(id)
            | Event::OrderArchived(id) => *id,
            Event::OrderUpdated { order_id, .. }
            | Event::OrderFulfilled { order_id, .. }
            | Event::OrderStatusOverridden { order_id, .. }
            | Event::PaymentCollectionCreated { order_id, .. }
            | Event::PaymentCollectionDeleted { order_id, .. }
            | Event::PaymentCollectionPaid { order_id, .. }
            | Event::PaymentCollectionCanceled { order_id, .. } => *order_id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Publishes every event, logging delivery failures.
    ///
    /// Callers publish after their unit of work is committed, so a lost
    /// notification never rolls state back.
    pub async fn publish_all(&self, events: Vec<Event>) {
        for event in events {
            if let Err(e) = self.send(event).await {
                warn!(error = %e, "order notification dropped");
            }
        }
    }
}

/// Drains the notification channel until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        info!(order_id = event.order_id(), event = ?event, "order event");
    }

    info!("Event processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sender_delivers_in_order() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);
        sender
            .publish_all(vec![Event::OrderCanceled(1), Event::OrderArchived(1)])
            .await;

        assert_eq!(rx.recv().await, Some(Event::OrderCanceled(1)));
        assert_eq!(rx.recv().await, Some(Event::OrderArchived(1)));
    }

    #[tokio::test]
    async fn send_fails_once_receiver_is_gone() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);
        assert!(sender.send(Event::OrderCreated(3)).await.is_err());
        // publishing swallows the failure
        sender.publish_all(vec![Event::OrderCreated(3)]).await;
    }
}
