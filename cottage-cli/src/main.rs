mod simulate;

use anyhow::{anyhow, bail};
use clap::{Parser, Subcommand};
use cottage_feed::{FeedClient, load_bundled};
use cottage_logic::{
    BearingResult, Coordinate, Cottage, CottageCache, MonitorSettings, SearchResults, geodesy,
    prelude::*,
};
use log::{info, warn};
use serde::Serialize;

#[derive(Parser)]
#[command(version, about = "Find nearby holiday cottages and which way to walk to them")]
struct Cli {
    /// Override the listing feed URL
    #[arg(long, global = true)]
    feed_url: Option<String>,

    /// Only use the listing bundled with the app
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the cottages closest to a location
    Nearby {
        /// Where you are, as "lat,lon"
        #[arg(allow_hyphen_values = true)]
        from: Coordinate,
        /// How many cottages to show
        #[arg(short, long, default_value_t = 5)]
        limit: usize,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Bearing and distance between two points
    Bearing {
        /// Start, as "lat,lon"
        #[arg(allow_hyphen_values = true)]
        from: Coordinate,
        /// Destination, as "lat,lon"
        #[arg(allow_hyphen_values = true)]
        to: Coordinate,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Name the compass point for a bearing in degrees
    Compass {
        #[arg(allow_hyphen_values = true)]
        degrees: f64,
    },
    /// Simulate walking to a cottage with live bearing and compass guidance
    Simulate {
        /// Where the walk starts, as "lat,lon"
        #[arg(allow_hyphen_values = true)]
        from: Coordinate,
        /// Code of the cottage to walk to
        cottage: u32,
        /// Meters covered between fixes
        #[arg(long, default_value_t = 250.0)]
        step: f64,
        /// Give up after this many fixes
        #[arg(long, default_value_t = 200)]
        max_steps: usize,
        /// Milliseconds between location fixes
        #[arg(long, default_value_t = 500)]
        interval_ms: u64,
    },
}

#[derive(Serialize)]
struct NearbyCottage<'a> {
    code: u32,
    name: Option<&'a str>,
    town: Option<&'a str>,
    sleeps: String,
    bearing: BearingResult,
}

async fn load_listing(cli: &Cli, cache: &CottageCache) -> Result<SearchResults> {
    if cache.has_valid_cache().await {
        if let Some(results) = cache.cached_search_results().await {
            return Ok(results);
        }
    }

    let results = if cli.offline {
        load_bundled()?
    } else {
        let client = match &cli.feed_url {
            Some(url) => FeedClient::with_base_url(url.clone())?,
            None => FeedClient::new()?,
        };
        info!("Fetching listing from {}", client.base_url());
        client.get_cottages().await
    };

    cache.set_search_results(results.clone()).await;
    Ok(results)
}

fn nearest(results: &SearchResults, from: Coordinate, limit: usize) -> Vec<NearbyCottage<'_>> {
    let mut nearby = results
        .cottages
        .iter()
        .filter_map(|cottage: &Cottage| match cottage.coordinate() {
            Ok(to) => Some(NearbyCottage {
                code: cottage.code,
                name: cottage.name.as_deref(),
                town: cottage.display_town(),
                sleeps: cottage.sleeps_text(),
                bearing: BearingResult::between(from, to),
            }),
            Err(why) => {
                warn!("Skipping cottage: {why:?}");
                None
            }
        })
        .collect::<Vec<_>>();

    nearby.sort_by(|a, b| {
        a.bearing
            .distance_meters
            .total_cmp(&b.bearing.distance_meters)
    });
    nearby.truncate(limit);
    nearby
}

fn print_json(value: &impl Serialize) -> Result {
    let out = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{out}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result {
    colog::init();

    let cli = Cli::parse();
    let cache = CottageCache::default();

    match &cli.command {
        Commands::Nearby { from, limit, json } => {
            let results = load_listing(&cli, &cache).await?;
            let nearby = nearest(&results, *from, *limit);

            if *json {
                print_json(&nearby)?;
            } else {
                for n in nearby {
                    println!(
                        "{:>6}  {:<24} {:<16} {:>7.2} km  {:>5.1}° {:<3}  {}",
                        n.code,
                        n.name.unwrap_or("(unnamed)"),
                        n.town.unwrap_or(""),
                        n.bearing.distance_kilometers(),
                        n.bearing.bearing_degrees,
                        n.bearing.compass_direction,
                        n.sleeps,
                    );
                }
            }
        }
        Commands::Bearing { from, to, json } => {
            let result = BearingResult::between(*from, *to);
            if *json {
                print_json(&result)?;
            } else {
                println!(
                    "{:.1}° {} over {:.0} m",
                    result.bearing_degrees, result.compass_direction, result.distance_meters
                );
            }
        }
        Commands::Compass { degrees } => {
            if !degrees.is_finite() {
                bail!("Bearing must be a finite number");
            }
            println!("{}", geodesy::compass_direction(*degrees));
        }
        Commands::Simulate {
            from,
            cottage,
            step,
            max_steps,
            interval_ms,
        } => {
            if step.is_nan() || *step <= 0.0 {
                bail!("Step must be positive");
            }
            load_listing(&cli, &cache).await?;
            let target = cache
                .cottage_by_code(*cottage)
                .await
                .ok_or_else(|| anyhow!("No cottage with code {cottage}"))?;
            info!(
                "Walking to {} ({})",
                target.name.as_deref().unwrap_or("(unnamed)"),
                target.code
            );

            let settings = MonitorSettings {
                poll_interval_ms: *interval_ms,
                ..Default::default()
            };
            simulate::run(*from, target.coordinate()?, *step, *max_steps, settings).await?;
        }
    }

    Ok(())
}
