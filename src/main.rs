use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{
    geocode::{Geocoder, Mapbox, Offline, RateLimited},
    update::{Options, RankPolicy},
    utils::{progress_bar, LogWriter},
};

mod geocode;
mod kml;
mod locations;
mod update;
mod utils;

/// Turns a CSV of locations into a KML map, geocoding only rows that are new or changed.
#[derive(Debug, Parser)]
struct Cli {
    #[arg(long, default_value = "data/Locations.csv")]
    input: PathBuf,
    /// Preferred locations are written here, and read back on the next run
    #[arg(long, default_value = "data/life_time_locations.kml")]
    output: PathBuf,
    /// Also write "other" locations to this file. Without it they are dropped.
    #[arg(long)]
    other_output: Option<PathBuf>,
    #[arg(
        long,
        env = "MAPBOX_TOKEN",
        hide_env_values = true,
        required_unless_present = "dry_run"
    )]
    token: Option<String>,
    #[arg(long, default_value = geocode::MAPBOX_URL)]
    geocoder_url: String,
    /// Minimum time between geocoding requests
    #[arg(long, default_value_t = 1000)]
    delay_ms: u64,
    #[arg(long, value_enum, default_value_t = RankPolicy::Reuse)]
    rank_policy: RankPolicy,
    /// Don't call the geocoder or write any files
    #[arg(long)]
    dry_run: bool,
}

fn main() -> Result<()> {
    // a missing .env is fine
    let _ = dotenvy::dotenv();

    let pb = progress_bar(0);
    let log_pb = pb.clone();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(move || LogWriter::new(log_pb.clone(), std::io::stderr())),
        )
        .init();

    let cli = Cli::parse();

    // clap guarantees a token unless this is a dry run
    let mut geocoder: Box<dyn Geocoder> = match cli.token {
        Some(token) if !cli.dry_run => Box::new(RateLimited::new(
            Mapbox::new(&cli.geocoder_url, token),
            Duration::from_millis(cli.delay_ms),
        )),
        _ => Box::new(Offline),
    };

    let options = Options {
        rank_policy: cli.rank_policy,
        dry_run: cli.dry_run,
    };

    update::run(
        &cli.input,
        &cli.output,
        cli.other_output.as_deref(),
        geocoder.as_mut(),
        &options,
        &pb,
    )?;

    Ok(())
}
