use std::{collections::BTreeMap, fmt, path::Path};

use anyhow::Result;
use clap::ValueEnum;
use indicatif::ProgressBar;
use itertools::Itertools;
use tracing::{info, warn};

use crate::{
    geocode::Geocoder,
    kml::{self, ExistingLocation, Placemark},
    locations::{self, LocationRecord, Style},
};

/// Which rank label a placemark gets when it is built from prior coordinates.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum RankPolicy {
    /// Rebuild the label from the previous classification ("Preferred" or "Other").
    #[default]
    Reuse,
    /// Keep the rank text from the input row.
    Refresh,
}

pub struct Options {
    pub rank_policy: RankPolicy,
    pub dry_run: bool,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Stats {
    pub reused: usize,
    pub geocoded: usize,
    pub fallback: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} reused, {} geocoded, {} fell back to existing coordinates, {} failed, {} skipped",
            self.reused, self.geocoded, self.fallback, self.failed, self.skipped
        )
    }
}

#[derive(Debug, Default)]
pub struct Outcome {
    pub preferred: Vec<Placemark>,
    pub other: Vec<Placemark>,
    pub stats: Stats,
}

impl Outcome {
    fn push(&mut self, placemark: Placemark) {
        match placemark.style() {
            Style::Preferred => self.preferred.push(placemark),
            Style::Other => self.other.push(placemark),
        }
    }
}

/// A row is looked up again when it's new or its classification changed. Other edits (address,
/// phone, ...) keep the old coordinates.
pub fn needs_regeocode(record: &LocationRecord, existing: Option<&ExistingLocation>) -> bool {
    match existing {
        Some(x) => record.style() != x.style,
        None => true,
    }
}

fn from_existing(
    record: &LocationRecord,
    existing: &ExistingLocation,
    policy: RankPolicy,
) -> Placemark {
    let mut placemark = Placemark::new(record, existing.point);
    if policy == RankPolicy::Reuse {
        placemark.rank = existing.style.label().to_string();
    }
    placemark
}

fn changed_fields(record: &LocationRecord, existing: &ExistingLocation) -> Vec<&'static str> {
    [
        ("address", &record.address, &existing.address),
        ("region", &record.region, &existing.region),
        ("phone", &record.phone, &existing.phone),
        ("website", &record.website, &existing.website),
    ]
    .into_iter()
    .filter(|(_, a, b)| a != b)
    .map(|(name, _, _)| name)
    .collect()
}

pub fn process(
    records: &[LocationRecord],
    existing: &BTreeMap<String, ExistingLocation>,
    geocoder: &mut dyn Geocoder,
    policy: RankPolicy,
    pb: &ProgressBar,
) -> Outcome {
    let mut outcome = Outcome::default();
    let total = records.len();

    for (i, record) in records.iter().enumerate() {
        let i = i + 1;
        let name = &record.organization;
        pb.inc(1);

        if record.address.is_empty() {
            info!("[{i}/{total}] Skipping {name} - no address");
            outcome.stats.skipped += 1;
            continue;
        }

        let prior = existing.get(name);
        if let Some(prior) = prior.filter(|x| !needs_regeocode(record, Some(*x))) {
            info!("[{i}/{total}] Using existing data for: {name}");
            let changed = changed_fields(record, prior);
            if !changed.is_empty() {
                info!("  Keeping coordinates despite changed {}", changed.iter().join(", "));
            }
            outcome.push(from_existing(record, prior, policy));
            outcome.stats.reused += 1;
            continue;
        }

        let verb = if prior.is_some() { "Updating" } else { "Geocoding" };
        info!("[{i}/{total}] {verb}: {name} ({})", record.address);

        match geocoder.geocode(&record.address) {
            Some(point) => {
                let placemark = Placemark::new(record, point);
                info!(
                    "  Successfully processed as {}: {name} at ({}, {})",
                    placemark.style().label().to_uppercase(),
                    point.x(),
                    point.y()
                );
                outcome.push(placemark);
                outcome.stats.geocoded += 1;
            }
            None => {
                warn!("  Failed to geocode: {name}");
                if let Some(prior) = prior {
                    info!("  Using existing coordinates for: {name}");
                    // keep the old classification so the next run tries again
                    outcome.push(from_existing(record, prior, RankPolicy::Reuse));
                    outcome.stats.fallback += 1;
                } else {
                    outcome.stats.failed += 1;
                }
            }
        }
    }

    outcome
}

pub fn run(
    input: &Path,
    output: &Path,
    other_output: Option<&Path>,
    geocoder: &mut dyn Geocoder,
    options: &Options,
    pb: &ProgressBar,
) -> Result<Outcome> {
    let mut existing = kml::parse(output);
    if let Some(path) = other_output {
        existing.extend(kml::parse(path));
    }
    info!("Loaded {} existing locations", existing.len());

    let records = locations::read(input)?;
    info!("Found {} locations to process", records.len());

    pb.set_length(records.len() as u64);
    let outcome = process(&records, &existing, geocoder, options.rank_policy, pb);
    pb.finish_and_clear();
    info!("{}", outcome.stats);

    if options.dry_run {
        info!("Dry run, not writing {}", output.display());
        return Ok(outcome);
    }

    info!("Creating KML files...");
    kml::write(output, &outcome.preferred)?;
    info!(
        "Wrote {} preferred locations to {}",
        outcome.preferred.len(),
        output.display()
    );
    match other_output {
        Some(path) => {
            kml::write(path, &outcome.other)?;
            info!(
                "Wrote {} other locations to {}",
                outcome.other.len(),
                path.display()
            );
        }
        None if !outcome.other.is_empty() => info!(
            "{} other locations not written, pass --other-output to keep them",
            outcome.other.len()
        ),
        None => {}
    }

    Ok(outcome)
}
