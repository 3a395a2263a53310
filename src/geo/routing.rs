//! Road distance lookups.
//!
//! Routing is an enrichment: every caller goes through [`road_distance_km`],
//! which bounds the wait and substitutes the straight-line distance on any
//! failure.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::AppError;
use crate::geo::haversine_km;
use crate::models::provider::GeoPoint;

#[async_trait]
pub trait RoutingProvider: Send + Sync {
    async fn directions(&self, origin: &GeoPoint, dest: &GeoPoint) -> Result<f64, AppError>;
}

/// Used when no routing service is configured.
pub struct StraightLine;

#[async_trait]
impl RoutingProvider for StraightLine {
    async fn directions(&self, origin: &GeoPoint, dest: &GeoPoint) -> Result<f64, AppError> {
        Ok(haversine_km(origin, dest))
    }
}

pub struct OpenRouteService {
    base_url: String,
    api_key: String,
    http_client: reqwest::Client,
}

impl OpenRouteService {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            http_client: reqwest::Client::new(),
        }
    }
}

#[derive(Deserialize)]
struct DirectionsResponse {
    features: Vec<Feature>,
}

#[derive(Deserialize)]
struct Feature {
    properties: FeatureProperties,
}

#[derive(Deserialize)]
struct FeatureProperties {
    summary: RouteSummary,
}

#[derive(Deserialize)]
struct RouteSummary {
    /// Meters. Absent when origin and destination coincide.
    #[serde(default)]
    distance: f64,
}

#[async_trait]
impl RoutingProvider for OpenRouteService {
    async fn directions(&self, origin: &GeoPoint, dest: &GeoPoint) -> Result<f64, AppError> {
        let url = format!("{}/v2/directions/driving-car", self.base_url);
        // The service takes coordinates as lon,lat.
        let start = format!("{},{}", origin.lng, origin.lat);
        let end = format!("{},{}", dest.lng, dest.lat);

        let response = self
            .http_client
            .get(&url)
            .query(&[
                ("api_key", self.api_key.as_str()),
                ("start", start.as_str()),
                ("end", end.as_str()),
            ])
            .send()
            .await
            .map_err(|err| AppError::UpstreamUnavailable(format!("routing request failed: {err}")))?;

        if !response.status().is_success() {
            return Err(AppError::UpstreamUnavailable(format!(
                "routing service returned HTTP {}",
                response.status()
            )));
        }

        let body: DirectionsResponse = response.json().await.map_err(|err| {
            AppError::UpstreamUnavailable(format!("unreadable routing response: {err}"))
        })?;

        let feature = body
            .features
            .first()
            .ok_or_else(|| AppError::UpstreamUnavailable("no route found".to_string()))?;

        Ok(feature.properties.summary.distance / 1_000.0)
    }
}

/// Road distance in km, or the haversine distance if the provider fails, is
/// too slow, or returns something unusable. Never errors. The returned flag is
/// `true` when the fallback was used.
pub async fn road_distance_km(
    provider: &dyn RoutingProvider,
    origin: &GeoPoint,
    dest: &GeoPoint,
    wait: Duration,
) -> (f64, bool) {
    match tokio::time::timeout(wait, provider.directions(origin, dest)).await {
        Ok(Ok(km)) if km.is_finite() && km >= 0.0 => {
            debug!(km, "road distance resolved");
            (km, false)
        }
        Ok(Ok(km)) => {
            warn!(km, "routing returned unusable distance; using straight line");
            (haversine_km(origin, dest), true)
        }
        Ok(Err(err)) => {
            warn!(error = %err, "routing failed; using straight line");
            (haversine_km(origin, dest), true)
        }
        Err(_) => {
            warn!(wait_ms = wait.as_millis() as u64, "routing timed out; using straight line");
            (haversine_km(origin, dest), true)
        }
    }
}
