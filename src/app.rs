use crate::api::{ApiError, Site};
use crate::bulk::BulkOperationCoordinator;
use crate::notify::{Notification, NotificationSink};
use crate::selection::{HeaderState, SelectionModel};
use crate::session::{AuthError, RegisterError, SessionManager, SessionState};
use crate::store::{FilterState, SiteCollectionStore};
use crate::util::parse_url_list;
use secrecy::SecretString;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

/// Which screen the user is on. Follows the session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Login,
    Sites,
}

/// Everything the user can do on the dashboard.
#[derive(Debug, Clone)]
pub enum Action {
    /// Restore a persisted session, if any, and load sites.
    Startup,
    Login {
        username: String,
        password: SecretString,
    },
    Register {
        username: String,
        email: String,
        password: SecretString,
    },
    Logout,
    Reload,
    SetFilter(FilterState),
    /// Plain click on a row checkbox.
    Toggle(i64),
    /// Range-modified click: `checked` is the state the clicked box was set to.
    ToggleRange {
        id: i64,
        checked: bool,
    },
    SelectAll(bool),
    AddSite(String),
    /// Free text, one url per line or comma-separated.
    AddMany(String),
    DeleteSite(i64),
    DeleteSelected,
    RefreshStatuses,
    LinkTelegram,
}

/// Failure of a dispatched action. It has already been reported to the
/// notification sink by the time the caller sees it.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Register(#[from] RegisterError),
}

/// One rendered row of the site table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Row<'a> {
    pub site: &'a Site,
    pub selected: bool,
}

// ============================================================================
// Dashboard
// ============================================================================

/// Drives the store, selection and bulk coordinator from user actions.
///
/// Each action runs to completion in order: network call, state update,
/// selection reconciliation, then notification. Two actions are never
/// merged or cancelled; the same action dispatched twice sends two requests.
pub struct Dashboard {
    session: Arc<SessionManager>,
    sink: Arc<dyn NotificationSink>,
    store: SiteCollectionStore,
    selection: SelectionModel,
    bulk: BulkOperationCoordinator,
    session_state: watch::Receiver<SessionState>,
    view: View,
    /// Store generation the selection was last reconciled against.
    seen_generation: u64,
}

impl Dashboard {
    pub fn new(session: Arc<SessionManager>, sink: Arc<dyn NotificationSink>) -> Self {
        let session_state = session.subscribe();
        let view = match *session_state.borrow() {
            SessionState::LoggedIn => View::Sites,
            SessionState::LoggedOut => View::Login,
        };
        let store = SiteCollectionStore::new(session.clone(), sink.clone());
        let seen_generation = store.generation();

        Self {
            bulk: BulkOperationCoordinator::new(sink.clone()),
            session,
            sink,
            store,
            selection: SelectionModel::new(),
            session_state,
            view,
            seen_generation,
        }
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn store(&self) -> &SiteCollectionStore {
        &self.store
    }

    pub fn selection(&self) -> &SelectionModel {
        &self.selection
    }

    /// Visible sites in display order, with their checkbox state.
    pub fn rows(&self) -> Vec<Row<'_>> {
        self.store
            .visible_sites()
            .map(|site| Row {
                site,
                selected: self.selection.is_selected(site.id),
            })
            .collect()
    }

    pub fn header_state(&self) -> HeaderState {
        self.selection.header_state(self.store.visible_ids())
    }

    /// Run one action.
    pub async fn dispatch(&mut self, action: Action) -> Result<(), ActionError> {
        // A session may have expired under a previous action
        self.settle();
        let result = self.handle(action).await;
        self.settle();
        result
    }

    /// Apply pending session transitions and reconcile the selection with
    /// the latest collection.
    fn settle(&mut self) {
        if self.session_state.has_changed().unwrap_or(false) {
            let state = *self.session_state.borrow_and_update();
            match state {
                SessionState::LoggedIn => self.view = View::Sites,
                SessionState::LoggedOut => {
                    self.selection.clear();
                    self.store.reset();
                    self.view = View::Login;
                    tracing::debug!("Session ended, dashboard reset");
                }
            }
        }

        if self.store.generation() != self.seen_generation {
            self.seen_generation = self.store.generation();
            self.selection.reconcile(&self.store.all_ids());
            self.selection.clear_anchor();
        }
    }

    async fn reload(&mut self) -> Result<(), ApiError> {
        self.store.fetch_all().await?;
        Ok(())
    }

    async fn handle(&mut self, action: Action) -> Result<(), ActionError> {
        match action {
            Action::Startup => {
                if self.session.verify_session().await {
                    self.settle();
                    self.sink.notify(Notification::success("Welcome back!"));
                    self.reload().await?;
                }
            }
            Action::Login { username, password } => {
                self.session.login(&username, &password).await?;
                self.settle();
                self.reload().await?;
            }
            Action::Register {
                username,
                email,
                password,
            } => {
                self.session.register(&username, &email, &password).await?;
            }
            Action::Logout => self.session.logout(),
            Action::Reload => self.reload().await?,
            Action::SetFilter(filter) => self.store.set_filter(filter),
            Action::Toggle(id) => {
                if self.store.is_visible(id) {
                    self.selection.toggle_single(id);
                } else {
                    tracing::debug!(id, "Ignoring toggle for a hidden site");
                }
            }
            Action::ToggleRange { id, checked } => {
                if self.store.is_visible(id) {
                    self.selection
                        .toggle_range(id, checked, self.store.visible_ids());
                } else {
                    tracing::debug!(id, "Ignoring range toggle for a hidden site");
                }
            }
            Action::SelectAll(checked) => {
                self.selection.select_all(checked, self.store.visible_ids());
            }
            Action::AddSite(url) => {
                self.store.add_single(&url).await?;
                self.settle();
                self.sink.notify(Notification::success("Site added"));
            }
            Action::AddMany(text) => {
                let urls = parse_url_list(&text);
                self.bulk.add_many(&mut self.store, &urls).await?;
            }
            Action::DeleteSite(id) => {
                self.store.delete_single(id).await?;
                self.settle();
                self.sink.notify(Notification::success("Site deleted"));
            }
            Action::DeleteSelected => {
                self.bulk
                    .delete_selected(&mut self.store, &mut self.selection)
                    .await?;
            }
            Action::RefreshStatuses => {
                let outcome = self.store.refresh_statuses().await?;
                self.settle();
                if outcome.total == 0 {
                    self.sink.notify(Notification::info("No sites to refresh"));
                } else {
                    self.sink.notify(Notification::success(format!(
                        "Refreshed {} of {} sites",
                        outcome.updated, outcome.total
                    )));
                }
            }
            Action::LinkTelegram => {
                self.session.telegram_link_code().await?;
            }
        }
        Ok(())
    }
}
