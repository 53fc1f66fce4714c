//! `settlr import`: load area boundaries or rental listings from JSON.
//!
//! Both files are JSON arrays. Entries that do not parse are skipped and
//! logged; the rest are stored.

use super::load_config;
use anyhow::Context;
use clap::Subcommand;
use serde::de::DeserializeOwned;
use settlr_core::region::{AreaBoundary, Listing};
use settlr_core::store::GeoStore;
use settlr_store::SqliteStore;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Subcommand)]
pub enum ImportKind {
    /// Area outlines: `[{"name", "aliases", "coordinates": [[lon, lat], ...]}]`
    Boundaries { file: PathBuf },

    /// Rental listings as exported by the property scrapers
    Listings { file: PathBuf },
}

#[derive(Debug, Default, PartialEq)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
}

pub async fn run(config_path: Option<&Path>, kind: ImportKind) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let store = SqliteStore::new(&config.database.url)
        .await
        .with_context(|| format!("Failed to open database {}", config.database.url))?;

    let (what, summary) = match kind {
        ImportKind::Boundaries { file } => ("boundaries", import_boundaries(&store, &read(&file)?).await?),
        ImportKind::Listings { file } => ("listings", import_listings(&store, &read(&file)?).await?),
    };
    println!(
        "Imported {} {what} into {} ({} skipped)",
        summary.imported, config.database.url, summary.skipped
    );
    Ok(())
}

fn read(file: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))
}

/// Parse every array entry as `T`, skipping the ones that don't fit.
fn entries<T: DeserializeOwned>(json: &str, what: &str) -> anyhow::Result<(Vec<T>, usize)> {
    let values: Vec<serde_json::Value> =
        serde_json::from_str(json).with_context(|| format!("Expected a JSON array of {what}"))?;
    let mut parsed = Vec::with_capacity(values.len());
    let mut skipped = 0;
    for (index, value) in values.into_iter().enumerate() {
        match serde_json::from_value(value) {
            Ok(entry) => parsed.push(entry),
            Err(e) => {
                warn!(index, error = %e, "Skipping malformed {what} entry");
                skipped += 1;
            }
        }
    }
    Ok((parsed, skipped))
}

pub async fn import_boundaries(store: &dyn GeoStore, json: &str) -> anyhow::Result<ImportSummary> {
    let (boundaries, skipped) = entries::<AreaBoundary>(json, "boundaries")?;
    for boundary in &boundaries {
        store.upsert_boundary(boundary).await?;
    }
    Ok(ImportSummary {
        imported: boundaries.len(),
        skipped,
    })
}

pub async fn import_listings(store: &dyn GeoStore, json: &str) -> anyhow::Result<ImportSummary> {
    let (listings, skipped) = entries::<Listing>(json, "listings")?;
    for listing in &listings {
        store.insert_listing(listing).await?;
    }
    Ok(ImportSummary {
        imported: listings.len(),
        skipped,
    })
}
