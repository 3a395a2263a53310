use serde::Deserialize;
use tracing::{info, warn};

use crate::engine::sentiment::{score_or_neutral, SentimentScorer};
use crate::error::AppError;
use crate::models::provider::{GeoPoint, Provider, ProviderRecord};
use crate::models::worker::Worker;

/// Rating used when no record in the batch carries one.
const FALLBACK_RATING: f64 = 3.0;

/// Turns raw directory records into providers. Records without coordinates are
/// skipped, missing ratings take the batch median, and sentiment is derived
/// once from the comments.
pub fn ingest_providers(records: Vec<ProviderRecord>, scorer: &dyn SentimentScorer) -> Vec<Provider> {
    let median = median(records.iter().filter_map(|r| r.rating).filter(|r| r.is_finite()))
        .unwrap_or(FALLBACK_RATING);

    records
        .into_iter()
        .filter_map(|record| {
            let (Some(lat), Some(lng)) = (record.lat, record.lng) else {
                warn!(provider_id = %record.id, "skipping provider without coordinates");
                return None;
            };
            let location = GeoPoint::new(lat, lng);
            if let Err(err) = location.validate() {
                warn!(provider_id = %record.id, error = %err, "skipping provider with bad coordinates");
                return None;
            }

            let rating = record
                .rating
                .filter(|r| r.is_finite())
                .unwrap_or(median)
                .clamp(1.0, 5.0);
            let sentiment = score_or_neutral(scorer, &record.comments.join(" "));

            Some(Provider {
                id: record.id,
                name: record.name,
                location,
                category: record.category,
                rating,
                comments: record.comments,
                sentiment: Some(sentiment),
            })
        })
        .collect()
}

fn median(values: impl Iterator<Item = f64>) -> Option<f64> {
    let mut values: Vec<f64> = values.collect();
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);

    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub providers: Vec<ProviderRecord>,
    #[serde(default)]
    pub workers: Vec<Worker>,
}

pub fn load_seed_file(path: &str) -> Result<SeedFile, AppError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|err| AppError::Internal(format!("failed to read seed file {path}: {err}")))?;
    let seed: SeedFile = serde_json::from_str(&raw)
        .map_err(|err| AppError::Internal(format!("invalid seed file {path}: {err}")))?;

    info!(
        path,
        providers = seed.providers.len(),
        workers = seed.workers.len(),
        "seed file loaded"
    );
    Ok(seed)
}
