use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::{sync::RwLock, time::Instant};

use crate::{location::Coordinate, prelude::*};

/// How long a fetched listing is trusted before it should be refreshed
pub const DEFAULT_CACHE_EXPIRY: Duration = Duration::from_secs(10 * 60);

const PICTURE_CROP: &str = "w=800&h=500&mode=crop";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
/// A single holiday cottage from the listing feed
pub struct Cottage {
    /// Position in the search results
    pub position: Option<u32>,
    pub code: u32,
    pub year: u32,
    pub name: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub picture_url: Option<String>,
    pub accommodation: Option<String>,
    pub bedrooms: u32,
    pub town: Option<String>,
    /// Broader area, used when no town is given
    pub location: Option<String>,
    pub max_adults: u32,
    pub max_pets: u32,
}

impl Cottage {
    pub fn coordinate(&self) -> Result<Coordinate> {
        Coordinate::new(self.latitude, self.longitude)
            .with_context(|| format!("Cottage {} has invalid coordinates", self.code))
    }

    pub fn display_town(&self) -> Option<&str> {
        self.town
            .as_deref()
            .filter(|town| !town.is_empty())
            .or(self.location.as_deref())
    }

    /// e.g. `3 Bedrooms | Cottage`
    pub fn sleeps_text(&self) -> String {
        let plural = if self.bedrooms > 1 { "s" } else { "" };
        format!(
            "{} Bedroom{plural} | {}",
            self.bedrooms,
            self.accommodation.as_deref().unwrap_or_default()
        )
    }

    /// Picture URL with the query replaced by a fixed crop size
    pub fn picture_url(&self) -> Option<String> {
        let url = self.picture_url.as_deref().filter(|url| !url.is_empty())?;
        let base = url.split_once('?').map_or(url, |(base, _)| base);
        Some(format!("{base}?{PICTURE_CROP}"))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SearchResults {
    pub cottages: Vec<Cottage>,
    /// Total matching cottages as reported by the feed, may be larger than `cottages`
    pub total: Option<u32>,
}

impl SearchResults {
    pub fn cottage_by_code(&self, code: u32) -> Option<&Cottage> {
        self.cottages.iter().find(|c| c.code == code)
    }
}

struct CacheEntry {
    results: SearchResults,
    fetched_at: Instant,
}

/// Holds the most recent [SearchResults] for a fixed amount of time
pub struct CottageCache {
    entry: RwLock<Option<CacheEntry>>,
    expiry: Duration,
}

impl Default for CottageCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_EXPIRY)
    }
}

impl CottageCache {
    pub fn new(expiry: Duration) -> Self {
        Self {
            entry: RwLock::new(None),
            expiry,
        }
    }

    pub async fn set_search_results(&self, results: SearchResults) {
        *self.entry.write().await = Some(CacheEntry {
            results,
            fetched_at: Instant::now(),
        });
    }

    /// The cached results, even if they've expired
    pub async fn cached_search_results(&self) -> Option<SearchResults> {
        self.entry
            .read()
            .await
            .as_ref()
            .map(|entry| entry.results.clone())
    }

    pub async fn has_valid_cache(&self) -> bool {
        self.entry
            .read()
            .await
            .as_ref()
            .is_some_and(|entry| entry.fetched_at.elapsed() < self.expiry)
    }

    pub async fn cottage_by_code(&self, code: u32) -> Option<Cottage> {
        self.entry
            .read()
            .await
            .as_ref()
            .and_then(|entry| entry.results.cottage_by_code(code).cloned())
    }

    pub async fn clear(&self) {
        *self.entry.write().await = None;
    }
}
