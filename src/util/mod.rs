//! Input helpers shared by the store and the bulk coordinator.
//!
//! - **Bulk url lists**: turning pasted text into a deduplicated url list and
//!   enforcing the per-request cap before anything is sent
//!
//! # Examples
//!
//! ```
//! use upwatch::util::{parse_url_list, validate_bulk_urls};
//!
//! let urls = parse_url_list("https://a.example\nhttps://b.example, https://a.example");
//! assert_eq!(urls.len(), 2);
//! assert!(validate_bulk_urls(&urls).is_ok());
//! assert!(validate_bulk_urls(&[]).is_err());
//! ```

mod url_list;

pub use url_list::{parse_url_list, validate_bulk_urls, MAX_BULK_URLS};
