use std::collections::HashSet;
use std::time::Duration;

use futures::future::join_all;

use crate::engine::sentiment::{score_or_neutral, SentimentScorer};
use crate::geo::haversine_km;
use crate::geo::routing::{road_distance_km, RoutingProvider};
use crate::models::provider::{Candidate, GeoPoint, Provider, ScoreBreakdown};

const DISTANCE_WEIGHT: f64 = 0.5;
const RATING_WEIGHT: f64 = 0.3;
const SENTIMENT_WEIGHT: f64 = 0.2;

struct RawSignals<'a> {
    provider: &'a Provider,
    distance_km: f64,
    sentiment: f64,
}

/// Ranks the pool for one query. Scores are min-max normalized within the
/// filtered pool, so they are only comparable inside a single call.
///
/// Providers outside `breakdown_type` are dropped unless none match, in which
/// case the whole pool is ranked. The result is sorted by descending score
/// (stable on ties) and deduplicated by display name.
pub fn rank(
    origin: &GeoPoint,
    breakdown_type: &str,
    pool: &[Provider],
    scorer: &dyn SentimentScorer,
) -> Vec<Candidate> {
    let mut filtered: Vec<&Provider> = pool
        .iter()
        .filter(|provider| provider.serves(breakdown_type))
        .collect();
    if filtered.is_empty() {
        filtered = pool.iter().collect();
    }

    let signals: Vec<RawSignals<'_>> = filtered
        .into_iter()
        .map(|provider| RawSignals {
            provider,
            distance_km: haversine_km(origin, &provider.location),
            sentiment: provider
                .sentiment
                .filter(|score| score.is_finite())
                .unwrap_or_else(|| score_or_neutral(scorer, &provider.comment_text())),
        })
        .collect();

    let inv_distance: Vec<f64> = signals
        .iter()
        .map(|s| inverse_distance(s.distance_km))
        .collect();
    let ratings: Vec<f64> = signals.iter().map(|s| s.provider.rating).collect();
    let sentiments: Vec<f64> = signals.iter().map(|s| s.sentiment).collect();

    let norm_distance = min_max(&inv_distance);
    let norm_rating = min_max(&ratings);
    let norm_sentiment = min_max(&sentiments);

    let mut candidates: Vec<Candidate> = signals
        .iter()
        .enumerate()
        .map(|(idx, s)| {
            let breakdown = ScoreBreakdown {
                distance_score: norm_distance[idx],
                rating_score: norm_rating[idx],
                sentiment_score: norm_sentiment[idx],
            };
            Candidate {
                provider_id: s.provider.id.clone(),
                name: s.provider.name.clone(),
                category: s.provider.category.clone(),
                location: s.provider.location,
                distance_km: s.distance_km,
                road_distance_km: None,
                rating: s.provider.rating,
                sentiment: s.sentiment,
                score: weighted_score(&breakdown),
                score_breakdown: breakdown,
            }
        })
        .collect();

    // sort_by is stable, so equal scores keep pool order.
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut seen = HashSet::new();
    candidates.retain(|candidate| seen.insert(candidate.name.clone()));
    candidates
}

pub fn weighted_score(breakdown: &ScoreBreakdown) -> f64 {
    (breakdown.distance_score * DISTANCE_WEIGHT)
        + (breakdown.rating_score * RATING_WEIGHT)
        + (breakdown.sentiment_score * SENTIMENT_WEIGHT)
}

pub fn page(ranked: Vec<Candidate>, offset: usize, limit: usize) -> Vec<Candidate> {
    ranked.into_iter().skip(offset).take(limit).collect()
}

/// Fills `road_distance_km` for an already fixed page. Lookups run
/// concurrently; each one is bounded by `wait`. Returns how many fell back to
/// the straight line.
pub async fn backfill_road_distance(
    page: &mut [Candidate],
    origin: &GeoPoint,
    routing: &dyn RoutingProvider,
    wait: Duration,
) -> usize {
    let lookups = page
        .iter()
        .map(|candidate| road_distance_km(routing, origin, &candidate.location, wait));
    let results = join_all(lookups).await;

    let mut fallbacks = 0;
    for (candidate, (km, fell_back)) in page.iter_mut().zip(results) {
        candidate.road_distance_km = Some(km);
        if fell_back {
            fallbacks += 1;
        }
    }
    fallbacks
}

fn inverse_distance(distance_km: f64) -> f64 {
    1.0 / (distance_km.max(0.0) + 1.0)
}

/// Scales to `[0, 1]`. A constant signal maps to 1.0 for every entry.
fn min_max(values: &[f64]) -> Vec<f64> {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = max - min;

    values
        .iter()
        .map(|value| {
            if span.abs() < f64::EPSILON {
                1.0
            } else {
                ((value - min) / span).clamp(0.0, 1.0)
            }
        })
        .collect()
}
