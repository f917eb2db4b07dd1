use std::str::FromStr;

use cottage_logic::{Cottage, SearchResults, prelude::*};
use log::debug;
use serde::Deserialize;

// Layout of the feed document:
// <results>
//   <total total="42"/>
//   <cottages>
//     <cottage code="123" lat="50.1" lon="-5.1" ... />
//   </cottages>
// </results>

#[derive(Deserialize)]
struct FeedDocument {
    total: Option<FeedTotal>,
    cottages: Option<FeedCottages>,
}

#[derive(Deserialize)]
struct FeedTotal {
    #[serde(rename = "@total")]
    total: Option<String>,
}

#[derive(Deserialize)]
struct FeedCottages {
    #[serde(default, rename = "cottage")]
    cottages: Vec<FeedCottage>,
}

/// Attributes are kept as strings, the feed isn't strict about numbers
#[derive(Deserialize)]
struct FeedCottage {
    #[serde(rename = "@position")]
    position: Option<String>,
    #[serde(rename = "@code")]
    code: Option<String>,
    #[serde(rename = "@year")]
    year: Option<String>,
    #[serde(rename = "@name")]
    name: Option<String>,
    #[serde(rename = "@lat")]
    lat: Option<String>,
    #[serde(rename = "@lon")]
    lon: Option<String>,
    #[serde(rename = "@picURL")]
    picture_url: Option<String>,
    #[serde(rename = "@accom")]
    accommodation: Option<String>,
    #[serde(rename = "@bedrooms")]
    bedrooms: Option<String>,
    #[serde(rename = "@town")]
    town: Option<String>,
    #[serde(rename = "@location")]
    location: Option<String>,
    #[serde(rename = "@maxAdults")]
    max_adults: Option<String>,
    #[serde(rename = "@maxPets")]
    max_pets: Option<String>,
}

/// Missing or malformed numbers become the type's default (0)
fn number_or_default<T: FromStr + Default>(raw: Option<&str>, field: &str) -> T {
    match raw.map(str::trim) {
        None | Some("") => T::default(),
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            debug!("Ignoring malformed {field} \"{raw}\" in feed");
            T::default()
        }),
    }
}

impl From<FeedCottage> for Cottage {
    fn from(raw: FeedCottage) -> Self {
        Self {
            position: Some(number_or_default(raw.position.as_deref(), "position")),
            code: number_or_default(raw.code.as_deref(), "code"),
            year: number_or_default(raw.year.as_deref(), "year"),
            name: raw.name,
            latitude: number_or_default(raw.lat.as_deref(), "lat"),
            longitude: number_or_default(raw.lon.as_deref(), "lon"),
            picture_url: raw.picture_url,
            accommodation: raw.accommodation,
            bedrooms: number_or_default(raw.bedrooms.as_deref(), "bedrooms"),
            town: raw.town,
            location: raw.location,
            max_adults: number_or_default(raw.max_adults.as_deref(), "maxAdults"),
            max_pets: number_or_default(raw.max_pets.as_deref(), "maxPets"),
        }
    }
}

/// Parse a feed document. `total` is [None] if the feed doesn't report one.
pub fn parse_listing(xml: &str) -> Result<SearchResults> {
    let doc: FeedDocument = quick_xml::de::from_str(xml).context("Failed to parse listing XML")?;

    let cottages = doc
        .cottages
        .map(|c| c.cottages.into_iter().map(Cottage::from).collect())
        .unwrap_or_default();

    let total = doc
        .total
        .and_then(|t| t.total)
        .and_then(|t| t.trim().parse().ok());

    Ok(SearchResults { cottages, total })
}
