use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(AppError::InvalidInput(format!(
                "latitude {} is outside [-90, 90]",
                self.lat
            )));
        }
        if !self.lng.is_finite() || !(-180.0..=180.0).contains(&self.lng) {
            return Err(AppError::InvalidInput(format!(
                "longitude {} is outside [-180, 180]",
                self.lng
            )));
        }
        Ok(())
    }
}

/// Raw directory entry as it arrives from the backing document store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRecord {
    pub id: String,
    pub name: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub category: String,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub comments: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
    pub id: String,
    pub name: String,
    pub location: GeoPoint,
    pub category: String,
    pub rating: f64,
    pub comments: Vec<String>,
    /// Polarity derived from `comments` at ingestion. `None` means the ranker
    /// scores the comments itself.
    pub sentiment: Option<f64>,
}

impl Provider {
    pub fn comment_text(&self) -> String {
        self.comments.join(" ")
    }

    pub fn serves(&self, category: &str) -> bool {
        self.category.to_lowercase() == category.to_lowercase()
    }
}

/// Min-max normalized signals behind a candidate's composite score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub distance_score: f64,
    pub rating_score: f64,
    pub sentiment_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub provider_id: String,
    pub name: String,
    pub category: String,
    pub location: GeoPoint,
    pub distance_km: f64,
    pub road_distance_km: Option<f64>,
    pub rating: f64,
    pub sentiment: f64,
    pub score: f64,
    pub score_breakdown: ScoreBreakdown,
}
