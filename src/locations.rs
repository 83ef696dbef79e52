use std::{fmt, io, path::Path};

use anyhow::{bail, Context, Result};
use csv::{ReaderBuilder, Trim};
use serde::Deserialize;
use tracing::warn;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Style {
    Preferred,
    Other,
}

impl Style {
    pub fn from_rank(rank: &str) -> Self {
        if rank.to_lowercase().contains("preferred") {
            Self::Preferred
        } else {
            Self::Other
        }
    }

    /// Parses a `styleUrl` such as `#preferred`. Anything unknown is `Other`.
    pub fn from_style_url(url: &str) -> Self {
        match url.trim().trim_start_matches('#') {
            "preferred" => Self::Preferred,
            _ => Self::Other,
        }
    }

    pub fn slug(&self) -> &'static str {
        match self {
            Self::Preferred => "preferred",
            Self::Other => "other",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Preferred => "Preferred",
            Self::Other => "Other",
        }
    }
}

impl fmt::Display for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.slug())
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct LocationRecord {
    #[serde(rename = "Organization")]
    pub organization: String,
    #[serde(rename = "Address", default)]
    pub address: String,
    #[serde(rename = "Region", default)]
    pub region: String,
    #[serde(rename = "Phone", default)]
    pub phone: String,
    #[serde(rename = "Website", default)]
    pub website: String,
    #[serde(rename = "Location Rank", default)]
    pub rank: String,
}

impl LocationRecord {
    pub fn style(&self) -> Style {
        Style::from_rank(&self.rank)
    }
}

pub fn read(path: &Path) -> Result<Vec<LocationRecord>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    from_reader(file).with_context(|| format!("Failed to read {}", path.display()))
}

// the csv reader strips a leading UTF-8 BOM from the header row
pub fn from_reader(input: impl io::Read) -> Result<Vec<LocationRecord>> {
    let mut reader = ReaderBuilder::new().trim(Trim::All).from_reader(input);

    let headers = reader.headers()?;
    for required in ["Organization", "Address"] {
        if !headers.iter().any(|x| x == required) {
            bail!("Missing required column: {required}");
        }
    }

    let mut output = Vec::new();
    for (i, row) in reader.deserialize().enumerate() {
        match row {
            Ok(x) => output.push(x),
            // header is line 1
            Err(e) => warn!("Skipping unreadable row on line {}: {e}", i + 2),
        }
    }

    Ok(output)
}
