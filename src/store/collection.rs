use crate::api::{
    ensure_success, parse_site_list, read_json, read_limited, ApiError, ApiRequest, BulkOutcome,
    RefreshOutcome, Site, MAX_RESPONSE_SIZE,
};
use crate::notify::{Notification, NotificationSink};
use crate::session::SessionManager;
use crate::store::filter::{visible_ids, FilterState};
use crate::util::validate_bulk_urls;
use std::collections::HashSet;
use std::sync::Arc;

/// The authoritative list of monitored sites and the filtered view of it.
///
/// The list is only ever replaced wholesale from a fetch. Failed calls leave
/// it as it was. Every replacement bumps [`generation`](Self::generation) so
/// dependents can tell a reload happened.
pub struct SiteCollectionStore {
    session: Arc<SessionManager>,
    sink: Arc<dyn NotificationSink>,
    sites: Vec<Site>,
    filter: FilterState,
    visible: Vec<i64>,
    generation: u64,
}

impl SiteCollectionStore {
    pub fn new(session: Arc<SessionManager>, sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            session,
            sink,
            sites: Vec::new(),
            filter: FilterState::default(),
            visible: Vec::new(),
            generation: 0,
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn sites(&self) -> &[Site] {
        &self.sites
    }

    /// Visible ids in render order. Range selection uses exactly this order.
    pub fn visible_ids(&self) -> &[i64] {
        &self.visible
    }

    pub fn visible_sites(&self) -> impl Iterator<Item = &Site> + '_ {
        let filter = self.filter;
        self.sites.iter().filter(move |site| filter.matches(site))
    }

    pub fn all_ids(&self) -> HashSet<i64> {
        self.sites.iter().map(|site| site.id).collect()
    }

    pub fn get(&self, id: i64) -> Option<&Site> {
        self.sites.iter().find(|site| site.id == id)
    }

    pub fn contains(&self, id: i64) -> bool {
        self.get(id).is_some()
    }

    pub fn is_visible(&self, id: i64) -> bool {
        self.visible.contains(&id)
    }

    pub fn filter(&self) -> FilterState {
        self.filter
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    // ========================================================================
    // Local transitions
    // ========================================================================

    pub fn set_filter(&mut self, filter: FilterState) {
        self.filter = filter;
        self.visible = visible_ids(&self.sites, filter);
        tracing::debug!(%filter, visible = self.visible.len(), "Filter changed");
    }

    /// Forget all sites and return to the unfiltered view.
    pub fn reset(&mut self) {
        self.sites.clear();
        self.visible.clear();
        self.filter = FilterState::default();
        self.generation += 1;
    }

    fn replace(&mut self, sites: Vec<Site>) {
        self.sites = sites;
        self.visible = visible_ids(&self.sites, self.filter);
        self.generation += 1;
        tracing::info!(
            count = self.sites.len(),
            visible = self.visible.len(),
            generation = self.generation,
            "Loaded sites"
        );
    }

    /// Report a failure unless the session layer already did.
    fn report(&self, err: &ApiError, context: &str) {
        match err {
            e if e.is_auth() => {}
            ApiError::Validation(message) => self.sink.notify(Notification::error(message.as_str())),
            e => {
                tracing::warn!(error = %e, context, "Site request failed");
                self.sink.notify(Notification::error(context));
            }
        }
    }

    async fn execute(&self, request: ApiRequest) -> Result<reqwest::Response, ApiError> {
        let response = self.session.authorized_request(&request).await?;
        ensure_success(response)
    }

    // ========================================================================
    // Network operations
    // ========================================================================

    /// Replace the collection with the backend's current list.
    ///
    /// A payload that is not a site sequence yields an empty collection.
    pub async fn fetch_all(&mut self) -> Result<&[Site], ApiError> {
        let loaded = self.load().await;
        match loaded {
            Ok(sites) => {
                self.replace(sites);
                Ok(&self.sites)
            }
            Err(e) => {
                self.report(&e, "Failed to load sites");
                Err(e)
            }
        }
    }

    async fn load(&self) -> Result<Vec<Site>, ApiError> {
        let response = self.execute(ApiRequest::get("api/sites")).await?;
        let bytes = read_limited(response, MAX_RESPONSE_SIZE).await?;
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            tracing::debug!(error = %e, "Site list is not JSON");
            serde_json::Value::Null
        });
        Ok(parse_site_list(&body))
    }

    /// Add one site, then refetch so the new entry carries server state.
    pub async fn add_single(&mut self, url: &str) -> Result<(), ApiError> {
        let url = url.trim();
        if url.is_empty() {
            let err = ApiError::Validation("Please enter a URL".to_string());
            self.report(&err, "Failed to add site");
            return Err(err);
        }

        let request = ApiRequest::post("api/sites").with_body(serde_json::json!({ "url": url }));
        if let Err(e) = self.execute(request).await {
            self.report(&e, "Failed to add site");
            return Err(e);
        }
        tracing::info!(url, "Added site");

        // fetch_all reports its own failure; the add itself succeeded
        let _ = self.fetch_all().await;
        Ok(())
    }

    /// Submit up to [`MAX_BULK_URLS`](crate::util::MAX_BULK_URLS) urls in
    /// one request. Does not refetch.
    pub async fn add_bulk(&mut self, urls: &[String]) -> Result<BulkOutcome, ApiError> {
        let result = async {
            let urls = validate_bulk_urls(urls)?;
            let request = ApiRequest::post("api/sites/bulk")
                .with_body(serde_json::json!({ "urls": urls }));
            read_json::<BulkOutcome>(self.execute(request).await?).await
        }
        .await;

        match result {
            Ok(outcome) => {
                tracing::info!(
                    succeeded = outcome.succeeded,
                    attempted = outcome.attempted,
                    "Bulk add finished"
                );
                Ok(outcome)
            }
            Err(e) => {
                self.report(&e, "Failed to add sites");
                Err(e)
            }
        }
    }

    /// Delete one site, then refetch.
    pub async fn delete_single(&mut self, id: i64) -> Result<(), ApiError> {
        if let Err(e) = self
            .execute(ApiRequest::delete(format!("api/sites/{id}")))
            .await
        {
            self.report(&e, "Failed to delete site");
            return Err(e);
        }
        tracing::info!(id, "Deleted site");

        let _ = self.fetch_all().await;
        Ok(())
    }

    /// Delete several sites in one request. Does not refetch.
    ///
    /// Which ids failed is not reported, only how many succeeded.
    pub async fn delete_bulk(&mut self, ids: &[i64]) -> Result<BulkOutcome, ApiError> {
        if ids.is_empty() {
            return Ok(BulkOutcome::default());
        }

        let request = ApiRequest::post("api/sites/bulk-delete")
            .with_body(serde_json::json!({ "site_ids": ids }));
        let result = async { read_json::<BulkOutcome>(self.execute(request).await?).await }.await;

        match result {
            Ok(outcome) => {
                tracing::info!(
                    succeeded = outcome.succeeded,
                    attempted = outcome.attempted,
                    "Bulk delete finished"
                );
                Ok(outcome)
            }
            Err(e) => {
                self.report(&e, "Failed to delete sites");
                Err(e)
            }
        }
    }

    /// Ask the backend to re-check every site, then pull the new statuses.
    pub async fn refresh_statuses(&mut self) -> Result<RefreshOutcome, ApiError> {
        let result = async {
            let response = self.execute(ApiRequest::post("api/sites/refresh")).await?;
            read_json::<RefreshOutcome>(response).await
        }
        .await;

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                self.report(&e, "Failed to refresh statuses");
                return Err(e);
            }
        };
        tracing::info!(
            updated = outcome.updated,
            total = outcome.total,
            "Status refresh finished"
        );

        let _ = self.fetch_all().await;
        Ok(outcome)
    }
}
