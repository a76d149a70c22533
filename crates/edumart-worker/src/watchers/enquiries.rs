//! Enquiry change watcher: new-enquiry fan-out and lead rollups.

use std::sync::Arc;

use futures_util::StreamExt;
use tracing::{error, info, warn};

use edumart_models::{Enquiry, RealtimeEvent, Room};
use edumart_queue::RealtimePublisher;
use edumart_store::{ChangeEvent, ChangeOperation, DocumentStore};

use crate::error::WorkerResult;

pub struct EnquiryWatcher {
    store: Arc<dyn DocumentStore>,
    publisher: Arc<dyn RealtimePublisher>,
}

impl EnquiryWatcher {
    pub fn new(store: Arc<dyn DocumentStore>, publisher: Arc<dyn RealtimePublisher>) -> Self {
        Self { store, publisher }
    }

    /// Consume the enquiry change stream until it ends.
    pub async fn run(&self) {
        info!("Enquiry watcher started");
        let mut stream = self.store.watch_enquiries();

        while let Some(event) = stream.next().await {
            let store = Arc::clone(&self.store);
            let publisher = Arc::clone(&self.publisher);
            tokio::spawn(async move {
                let document_id = event.document_id.clone();
                if let Err(e) = handle_enquiry_event(store, publisher, event).await {
                    error!(enquiry_id = %document_id, "Enquiry change handler failed: {}", e);
                }
            });
        }

        warn!("Enquiry change stream ended");
    }
}

async fn handle_enquiry_event(
    store: Arc<dyn DocumentStore>,
    publisher: Arc<dyn RealtimePublisher>,
    event: ChangeEvent<Enquiry>,
) -> WorkerResult<()> {
    // The subscription is filtered server-side to inserts; the guard
    // protects against a backend that delivers more.
    if event.operation != ChangeOperation::Insert {
        return Ok(());
    }

    let enquiry = event.document;
    let institution_id = enquiry.institution_id.clone();
    if institution_id.is_empty() {
        return Ok(());
    }

    let institution_room = Room::Institution(institution_id.clone());
    let created = RealtimeEvent::enquiry_created(enquiry);
    publisher.emit_to_room(&institution_room, &created).await?;

    if let Some(admin) = store.find_owning_admin(&institution_id).await? {
        let admin_room = Room::InstitutionAdmin(admin.clone());
        publisher.emit_to_room(&admin_room, &created).await?;

        let total_leads = store.count_leads(&admin).await?;
        publisher
            .emit_to_room(
                &admin_room,
                &RealtimeEvent::InstitutionAdminTotalLeads { total_leads },
            )
            .await?;
    }

    Ok(())
}
