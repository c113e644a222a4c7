use crate::api::ApiError;
use std::collections::HashSet;

/// Most urls accepted by one bulk add.
pub const MAX_BULK_URLS: usize = 50;

/// Split pasted text into candidate urls.
///
/// Entries are separated by newlines or commas, trimmed, and blank entries
/// dropped. Repeats keep their first position only.
pub fn parse_url_list(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    text.split(['\n', ','])
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter(|entry| seen.insert(*entry))
        .map(str::to_string)
        .collect()
}

/// Check a bulk-add batch before anything is sent.
///
/// # Errors
///
/// [`ApiError::Validation`] when no non-blank url remains or when more than
/// [`MAX_BULK_URLS`] do.
pub fn validate_bulk_urls(urls: &[String]) -> Result<Vec<String>, ApiError> {
    let urls: Vec<String> = urls
        .iter()
        .map(|url| url.trim())
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .collect();

    if urls.is_empty() {
        return Err(ApiError::Validation("No URLs to add".to_string()));
    }
    if urls.len() > MAX_BULK_URLS {
        return Err(ApiError::Validation(format!(
            "Too many URLs: {} given, at most {} per request",
            urls.len(),
            MAX_BULK_URLS
        )));
    }
    Ok(urls)
}
