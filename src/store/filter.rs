use crate::api::Site;
use std::fmt;

/// Which sites are visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterState {
    #[default]
    All,
    DownOnly,
}

impl FilterState {
    pub fn matches(self, site: &Site) -> bool {
        match self {
            FilterState::All => true,
            FilterState::DownOnly => site.is_down(),
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            FilterState::All => FilterState::DownOnly,
            FilterState::DownOnly => FilterState::All,
        }
    }
}

impl fmt::Display for FilterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterState::All => f.write_str("all"),
            FilterState::DownOnly => f.write_str("down only"),
        }
    }
}

/// Ids of the sites passing `filter`, in fetch order.
pub fn visible_ids(sites: &[Site], filter: FilterState) -> Vec<i64> {
    sites
        .iter()
        .filter(|site| filter.matches(site))
        .map(|site| site.id)
        .collect()
}
