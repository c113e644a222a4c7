//! Batched add and delete, with the refetch and count reporting around them.

use crate::api::{ApiError, BulkOutcome};
use crate::notify::{Notification, NotificationSink};
use crate::selection::SelectionModel;
use crate::store::SiteCollectionStore;
use crate::util::validate_bulk_urls;
use std::sync::Arc;

pub struct BulkOperationCoordinator {
    sink: Arc<dyn NotificationSink>,
}

impl BulkOperationCoordinator {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self { sink }
    }

    fn report_outcome(&self, verb: &str, outcome: BulkOutcome) {
        let message = format!(
            "{verb} {} of {} sites",
            outcome.succeeded, outcome.attempted
        );
        if outcome.is_partial() {
            self.sink.notify(Notification::info(message));
        } else {
            self.sink.notify(Notification::success(message));
        }
    }

    /// Validate, submit, refetch, then report `succeeded of attempted`.
    ///
    /// Validation failures are reported here and never reach the network.
    pub async fn add_many(
        &self,
        store: &mut SiteCollectionStore,
        urls: &[String],
    ) -> Result<BulkOutcome, ApiError> {
        let urls = match validate_bulk_urls(urls) {
            Ok(urls) => urls,
            Err(e) => {
                self.sink.notify(Notification::error(e.to_string()));
                return Err(e);
            }
        };

        let outcome = store.add_bulk(&urls).await?;
        let _ = store.fetch_all().await;
        self.report_outcome("Added", outcome);
        Ok(outcome)
    }

    /// Delete every selected site in one request.
    ///
    /// Returns `Ok(None)` without doing anything when nothing is selected.
    /// Whatever the outcome, the selection is cleared and the collection
    /// refetched. The count notification is emitted once, after the refetch.
    pub async fn delete_selected(
        &self,
        store: &mut SiteCollectionStore,
        selection: &mut SelectionModel,
    ) -> Result<Option<BulkOutcome>, ApiError> {
        if selection.is_empty() {
            return Ok(None);
        }

        let ids = selection.selected_ids();
        tracing::debug!(count = ids.len(), "Deleting selected sites");
        let result = store.delete_bulk(&ids).await;

        selection.clear();
        let _ = store.fetch_all().await;

        let outcome = result?;
        self.report_outcome("Deleted", outcome);
        Ok(Some(outcome))
    }
}
