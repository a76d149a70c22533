//! Course change watcher: view/comparison fan-out and admin rollups.

use std::sync::Arc;

use futures_util::StreamExt;
use tracing::{debug, error, info, warn};

use edumart_models::{Course, RealtimeEvent, Room};
use edumart_queue::RealtimePublisher;
use edumart_store::{ChangeEvent, ChangeOperation, DocumentStore};

use crate::error::WorkerResult;

pub struct CourseWatcher {
    store: Arc<dyn DocumentStore>,
    publisher: Arc<dyn RealtimePublisher>,
}

impl CourseWatcher {
    pub fn new(store: Arc<dyn DocumentStore>, publisher: Arc<dyn RealtimePublisher>) -> Self {
        Self { store, publisher }
    }

    /// Consume the course change stream until it ends (process shutdown
    /// closes the underlying subscription).
    pub async fn run(&self) {
        info!("Course watcher started");
        let mut stream = self.store.watch_courses();

        while let Some(event) = stream.next().await {
            let store = Arc::clone(&self.store);
            let publisher = Arc::clone(&self.publisher);
            tokio::spawn(async move {
                let document_id = event.document_id.clone();
                if let Err(e) = handle_course_event(store, publisher, event).await {
                    error!(course_id = %document_id, "Course change handler failed: {}", e);
                }
            });
        }

        warn!("Course change stream ended");
    }
}

/// Fan out one course mutation.
///
/// Views and comparisons are classified independently; a full replace
/// counts as both having changed (matching the tracking layer, which
/// rewrites the whole document on some paths).
async fn handle_course_event(
    store: Arc<dyn DocumentStore>,
    publisher: Arc<dyn RealtimePublisher>,
    event: ChangeEvent<Course>,
) -> WorkerResult<()> {
    let course = &event.document;
    let institution_id = &course.institution_id;
    if institution_id.is_empty() {
        debug!(course_id = %course.id, "Course without institution, skipping");
        return Ok(());
    }

    let replaced = event.operation == ChangeOperation::Replace;
    let views_changed =
        replaced || event.path_changed("courseViews") || event.path_group_changed("viewsRollups");
    let comparisons_changed = replaced
        || event.path_changed("comparisons")
        || event.path_group_changed("comparisonRollups");

    if !views_changed && !comparisons_changed {
        return Ok(());
    }

    let institution_room = Room::Institution(institution_id.clone());
    let admin_id = store.find_owning_admin(institution_id).await?;

    if views_changed {
        let update =
            RealtimeEvent::course_views_updated(institution_id, &course.id, course.course_views);
        publisher.emit_to_room(&institution_room, &update).await?;

        if let Some(admin) = &admin_id {
            let admin_room = Room::InstitutionAdmin(admin.clone());
            publisher.emit_to_room(&admin_room, &update).await?;

            // Fresh read-after-write aggregate, not a delta.
            let total_views = store.sum_course_views(admin).await?;
            publisher
                .emit_to_room(
                    &admin_room,
                    &RealtimeEvent::InstitutionAdminTotalViews { total_views },
                )
                .await?;
        }
    }

    if comparisons_changed {
        let update =
            RealtimeEvent::comparisons_updated(institution_id, &course.id, course.comparisons);
        publisher.emit_to_room(&institution_room, &update).await?;

        if let Some(admin) = &admin_id {
            let admin_room = Room::InstitutionAdmin(admin.clone());
            publisher.emit_to_room(&admin_room, &update).await?;

            let total_comparisons = store.sum_course_comparisons(admin).await?;
            publisher
                .emit_to_room(
                    &admin_room,
                    &RealtimeEvent::InstitutionAdminTotalComparisons { total_comparisons },
                )
                .await?;
        }
    }

    Ok(())
}
