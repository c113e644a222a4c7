//! Client-side controller for a site-uptime monitoring dashboard.
//!
//! - [`session`] - login, session restore and forced logout on 401
//! - [`store`] - the authoritative site list and its filtered view
//! - [`selection`] - checkbox state, range selection and the select-all tri-state
//! - [`bulk`] - batched add/delete with count reporting
//! - [`app`] - the [`Dashboard`](app::Dashboard) that wires them to user actions

pub mod api;
pub mod app;
pub mod bulk;
pub mod config;
pub mod notify;
pub mod selection;
pub mod session;
pub mod store;
pub mod util;
