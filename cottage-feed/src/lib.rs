mod feed;
mod listing;

pub use feed::{FeedClient, build_url, default_window, load_bundled};
pub use listing::parse_listing;
