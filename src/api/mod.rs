//! HTTP access to the uptime monitoring backend.
//!
//! - `client` - request description, transport and bounded body reading
//! - `types` - wire types (`Site`, bulk/refresh outcomes) and tolerant decoding
//!
//! Nothing here holds credentials; see [`crate::session`] for that.

mod client;
mod types;

pub(crate) use client::{ensure_success, read_json, read_limited};
pub use client::{ApiClient, ApiError, ApiRequest, MAX_RESPONSE_SIZE};
pub(crate) use types::{parse_site_list, ErrorBody, LoginResponse};
pub use types::{BulkOutcome, RefreshOutcome, Site, SiteStatus, TelegramLinkCode};
