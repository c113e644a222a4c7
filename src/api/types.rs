use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// Site
// ============================================================================

/// Last-known uptime status of a site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SiteStatus {
    Up,
    Down,
    Unknown,
}

impl SiteStatus {
    /// Parse a status string case-insensitively.
    ///
    /// Blank input means "never checked" and yields `None`. Anything that
    /// is not exactly `UP` or `DOWN` (ignoring case) is `Unknown`, padded
    /// values included.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.trim().is_empty() {
            None
        } else if raw.eq_ignore_ascii_case("UP") {
            Some(SiteStatus::Up)
        } else if raw.eq_ignore_ascii_case("DOWN") {
            Some(SiteStatus::Down)
        } else {
            Some(SiteStatus::Unknown)
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SiteStatus::Up => "UP",
            SiteStatus::Down => "DOWN",
            SiteStatus::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for SiteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A monitored site as reported by the backend.
///
/// Only ever built from a response body; the server assigns `id`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Site {
    pub id: i64,
    pub url: String,
    #[serde(default, deserialize_with = "deserialize_status")]
    pub last_status: Option<SiteStatus>,
    #[serde(
        default,
        rename = "last_checked",
        deserialize_with = "deserialize_checked_at"
    )]
    pub last_checked_at: Option<DateTime<Utc>>,
}

impl Site {
    pub fn is_down(&self) -> bool {
        self.last_status == Some(SiteStatus::Down)
    }
}

fn deserialize_status<'de, D>(deserializer: D) -> Result<Option<SiteStatus>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(SiteStatus::parse))
}

/// Never-checked sites carry the backend's zero time (year 1); treat that,
/// and anything unparseable, as absent.
fn deserialize_checked_at<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .filter(|dt| dt.year() > 1))
}

/// Decode the list-sites payload.
///
/// Accepts `{"sites": [...]}` or a bare array. Anything else (including
/// `{"sites": null}`, which the backend sends for an empty account) is an
/// empty collection. Individual entries that fail to decode are skipped.
pub(crate) fn parse_site_list(body: &serde_json::Value) -> Vec<Site> {
    let entries = match body {
        serde_json::Value::Array(entries) => entries,
        other => match other.get("sites").and_then(serde_json::Value::as_array) {
            Some(entries) => entries,
            None => {
                if !other.get("sites").is_some_and(serde_json::Value::is_null) {
                    tracing::warn!("Site list payload is not a sequence, treating as empty");
                }
                return Vec::new();
            }
        },
    };

    entries
        .iter()
        .filter_map(|entry| match Site::deserialize(entry) {
            Ok(site) => Some(site),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed site entry");
                None
            }
        })
        .collect()
}

// ============================================================================
// Operation Results
// ============================================================================

/// Counts reported by a bulk add or bulk delete.
///
/// Partial success is a normal outcome; which items failed is not reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct BulkOutcome {
    #[serde(rename = "total", default)]
    pub attempted: usize,
    #[serde(rename = "success", default)]
    pub succeeded: usize,
}

impl BulkOutcome {
    pub fn is_partial(&self) -> bool {
        self.succeeded < self.attempted
    }
}

/// Counts reported by a status refresh. The backend omits both when the
/// account has no sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct RefreshOutcome {
    #[serde(default)]
    pub updated: usize,
    #[serde(default)]
    pub total: usize,
}

/// One-time code for linking the account to the Telegram bot.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TelegramLinkCode {
    pub code: String,
    /// Validity in seconds.
    #[serde(default)]
    pub expires_in: u64,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LoginResponse {
    pub token: String,
}

/// Error body for rejected registrations: `{"error": ..., "details": {field: msg}}`.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub details: Option<BTreeMap<String, String>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_status_parse_is_case_insensitive() {
        assert_eq!(SiteStatus::parse("DOWN"), Some(SiteStatus::Down));
        assert_eq!(SiteStatus::parse("down"), Some(SiteStatus::Down));
        assert_eq!(SiteStatus::parse(" DOWN "), Some(SiteStatus::Unknown));
        assert_eq!(SiteStatus::parse("  "), None);
        assert_eq!(SiteStatus::parse("degraded"), Some(SiteStatus::Unknown));
        assert_eq!(SiteStatus::parse(""), None);
    }

    #[test]
    fn test_site_decodes_backend_shape() {
        let site: Site = serde_json::from_value(json!({
            "id": 7,
            "url": "https://example.com",
            "user_id": 3,
            "last_status": "down",
            "last_checked": "2024-05-01T10:30:00.123456+03:00",
            "created_at": "2024-04-01T00:00:00Z"
        }))
        .unwrap();

        assert_eq!(site.id, 7);
        assert!(site.is_down());
        let checked = site.last_checked_at.unwrap();
        assert_eq!(checked.to_rfc3339(), "2024-05-01T07:30:00.123456+00:00");
    }

    #[test]
    fn test_never_checked_site_has_absent_fields() {
        let site: Site = serde_json::from_value(json!({
            "id": 1,
            "url": "https://example.com",
            "last_status": "",
            "last_checked": "0001-01-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(site.last_status, None);
        assert_eq!(site.last_checked_at, None);

        let bare: Site = serde_json::from_value(json!({"id": 2, "url": "https://a.example"})).unwrap();
        assert_eq!(bare.last_status, None);
        assert_eq!(bare.last_checked_at, None);
    }

    #[test]
    fn test_parse_site_list_envelope_and_bare_array() {
        let body = json!({"sites": [{"id": 1, "url": "https://a.example"}], "count": 1});
        assert_eq!(parse_site_list(&body).len(), 1);

        let bare = json!([{"id": 1, "url": "https://a.example"}, {"id": 2, "url": "https://b.example"}]);
        assert_eq!(parse_site_list(&bare).len(), 2);
    }

    #[test]
    fn test_parse_site_list_malformed_is_empty() {
        assert!(parse_site_list(&json!({"sites": null, "count": 0})).is_empty());
        assert!(parse_site_list(&json!({"sites": "oops"})).is_empty());
        assert!(parse_site_list(&json!({"message": "hi"})).is_empty());
        assert!(parse_site_list(&json!(42)).is_empty());
    }

    #[test]
    fn test_parse_site_list_skips_bad_entries() {
        let body = json!({"sites": [
            {"id": 1, "url": "https://a.example"},
            {"id": "not-a-number", "url": "https://b.example"},
            {"url": "https://c.example"},
            {"id": 4, "url": "https://d.example", "last_status": "UP"}
        ]});
        let ids: Vec<i64> = parse_site_list(&body).iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 4]);
    }

    #[test]
    fn test_bulk_outcome_field_names() {
        let outcome: BulkOutcome =
            serde_json::from_value(json!({"message": "done", "success": 2, "total": 3, "failed": 1}))
                .unwrap();
        assert_eq!(outcome, BulkOutcome { attempted: 3, succeeded: 2 });
        assert!(outcome.is_partial());
    }

    #[test]
    fn test_refresh_outcome_defaults_when_no_sites() {
        let outcome: RefreshOutcome =
            serde_json::from_value(json!({"message": "No sites to refresh", "count": 0})).unwrap();
        assert_eq!(outcome, RefreshOutcome::default());
    }
}
