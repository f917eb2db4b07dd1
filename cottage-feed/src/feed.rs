use std::time::Duration;

use chrono::{Days, NaiveDate, Utc};
use cottage_logic::{SearchResults, prelude::*};
use log::{info, warn};

use crate::listing::parse_listing;

const fn feed_host() -> &'static str {
    if let Some(host) = option_env!("COTTAGE_FEED_HOST") {
        host
    } else {
        "classic.co.uk"
    }
}

const fn feed_secure() -> bool {
    if let Some(secure) = option_env!("COTTAGE_FEED_SECURE") {
        const_str::eq_ignore_ascii_case!(secure, "true") || const_str::equal!(secure, "1")
    } else {
        true
    }
}

const fn feed_proto() -> &'static str {
    if feed_secure() { "https" } else { "http" }
}

const FEED_HOST: &str = feed_host();
const FEED_PROTO: &str = feed_proto();
const FEED_PATH: &str = "/feeds/resultsfeed.aspx";

/// Default feed endpoint, host and scheme can be changed at build time
pub const FEED_URL: &str = const_str::concat!(FEED_PROTO, "://", FEED_HOST, FEED_PATH);

/// Nights per stay, results per page, and the region (Cornwall) we search in
const FEED_QUERY: &str = "nday=7&rpp=20&pMin=1&pMax=2&rgn=CO";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

const BUNDLED_LISTING: &str = include_str!("../data/cottages.xml");

/// Search window used when none is given, today plus a week
pub fn default_window() -> (NaiveDate, NaiveDate) {
    let start = Utc::now().date_naive();
    let end = start.checked_add_days(Days::new(7)).unwrap_or(start);
    (start, end)
}

pub fn build_url(base_url: &str, start: NaiveDate, end: NaiveDate) -> String {
    let start = start.format("%d/%m/%y");
    let end = end.format("%d/%m/%y");
    format!("{base_url}?type=withCottages&dss={start}&des={end}&{FEED_QUERY}")
}

/// The listing shipped with the app, used when the feed can't be reached
pub fn load_bundled() -> Result<SearchResults> {
    let mut results = parse_listing(BUNDLED_LISTING).context("Bundled listing is invalid")?;
    if results.total.is_none() {
        results.total = Some(results.cottages.len() as u32);
    }
    Ok(results)
}

/// Fetches the cottage listing. Each client owns its own HTTP connection pool.
pub struct FeedClient {
    client: reqwest::Client,
    base_url: String,
}

impl FeedClient {
    pub fn new() -> Result<Self> {
        Self::with_base_url(FEED_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch the live listing for the given window
    pub async fn fetch_live(&self, start: NaiveDate, end: NaiveDate) -> Result<SearchResults> {
        let url = build_url(&self.base_url, start, end);
        let body = self
            .client
            .get(url)
            .send()
            .await
            .context("Could not send request")?
            .error_for_status()
            .context("Feed returned error")?
            .text()
            .await
            .context("Failed to read feed response")?;
        parse_listing(&body)
    }

    /// Best listing we can get: the live feed if it has anything, the bundled listing otherwise.
    /// Never fails, in the worst case the results are empty.
    pub async fn get_cottages(&self) -> SearchResults {
        let mut results = match load_bundled() {
            Ok(bundled) => {
                info!("Loaded {} cottages from bundled listing", bundled.cottages.len());
                bundled
            }
            Err(why) => {
                warn!("Error loading bundled listing: {why:?}");
                SearchResults::default()
            }
        };

        let (start, end) = default_window();
        match self.fetch_live(start, end).await {
            Ok(live) if !live.cottages.is_empty() => {
                info!("Loaded {} cottages from feed", live.cottages.len());
                results = live;
            }
            Ok(_) => {
                info!("Feed returned no cottages, using bundled listing");
            }
            Err(why) => {
                warn!("Error loading from feed, using bundled listing: {why:?}");
            }
        }

        results
    }
}
