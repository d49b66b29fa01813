use std::sync::Arc;

use crate::events::EventSender;
use crate::repositories::OrderStore;

// Order lifecycle
pub mod mutation;
pub mod order_changes;
pub mod order_formatter;
pub mod order_lifecycle;

// Payment collections and the cancel cascade
pub mod payment_collections;

use mutation::MutationPipeline;
use order_lifecycle::{OrderLifecycleService, PageSettings};
use payment_collections::{PaymentCollectionCascade, PaymentCollectionService};

/// Services wired over one store and one notification channel.
#[derive(Clone)]
pub struct AppServices {
    pub orders: OrderLifecycleService,
    pub payment_collections: PaymentCollectionService,
}

impl AppServices {
    pub fn new(store: Arc<dyn OrderStore>, event_sender: EventSender, paging: PageSettings) -> Self {
        let pipeline = MutationPipeline::new(store, event_sender)
            .with_handler(Arc::new(PaymentCollectionCascade));

        Self {
            orders: OrderLifecycleService::new(pipeline.clone(), paging),
            payment_collections: PaymentCollectionService::new(pipeline),
        }
    }
}
