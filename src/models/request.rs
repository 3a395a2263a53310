use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::provider::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    Direct,
    Broadcast,
}

impl DispatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchMode::Direct => "direct",
            DispatchMode::Broadcast => "broadcast",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OfferStatus {
    Pending,
    Accepted,
    Rejected,
    Cancelled,
    Completed,
}

impl OfferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OfferStatus::Pending => "pending",
            OfferStatus::Accepted => "accepted",
            OfferStatus::Rejected => "rejected",
            OfferStatus::Cancelled => "cancelled",
            OfferStatus::Completed => "completed",
        }
    }
}

/// Request-level state, always derivable from the offers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Open,
    Settled,
    Closed,
    Fulfilled,
}

impl RequestStatus {
    pub fn derive(offers: &[Offer]) -> Self {
        let has = |status: OfferStatus| offers.iter().any(|offer| offer.status == status);

        if has(OfferStatus::Completed) {
            RequestStatus::Fulfilled
        } else if has(OfferStatus::Accepted) {
            RequestStatus::Settled
        } else if has(OfferStatus::Pending) {
            RequestStatus::Open
        } else {
            RequestStatus::Closed
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Offer {
    pub candidate_id: String,
    pub candidate_name: String,
    pub distance_km: f64,
    pub status: OfferStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Requester {
    pub name: String,
    pub phone: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VehicleInfo {
    #[serde(default)]
    pub car_model: Option<String>,
    #[serde(default)]
    pub license_plate: Option<String>,
    #[serde(default)]
    pub issue_type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchRequest {
    pub id: Uuid,
    pub requester: Requester,
    pub origin: GeoPoint,
    pub breakdown_type: String,
    #[serde(default)]
    pub vehicle: VehicleInfo,
    pub created_at: DateTime<Utc>,
    pub mode: DispatchMode,
    pub offers: Vec<Offer>,
    pub status: RequestStatus,
    #[serde(skip_serializing, default)]
    pub completion_code: Option<String>,
    pub accepted_by: Option<String>,
    pub assigned_worker: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    /// Bumped by the store on every successful update.
    #[serde(default)]
    pub version: u64,
}

impl DispatchRequest {
    pub fn offer(&self, candidate_id: &str) -> Option<&Offer> {
        self.offers
            .iter()
            .find(|offer| offer.candidate_id == candidate_id)
    }

    /// Offer whose candidate carries `name`, ignoring case.
    pub fn offer_for_name(&self, name: &str) -> Option<&Offer> {
        let wanted = name.trim().to_lowercase();
        self.offers
            .iter()
            .find(|offer| offer.candidate_name.to_lowercase() == wanted)
    }

    pub fn offer_index(&self, candidate_id: &str) -> Option<usize> {
        self.offers
            .iter()
            .position(|offer| offer.candidate_id == candidate_id)
    }

    pub fn accepted_offer(&self) -> Option<&Offer> {
        self.offers
            .iter()
            .find(|offer| offer.status == OfferStatus::Accepted)
    }

    pub fn has_pending(&self) -> bool {
        self.offers
            .iter()
            .any(|offer| offer.status == OfferStatus::Pending)
    }

    /// Replaces the offer list, applies the patch and recomputes `status`.
    /// The store owns `version`.
    pub fn apply(&mut self, offers: Vec<Offer>, patch: &RequestPatch) {
        self.offers = offers;
        if let Some(accepted_by) = &patch.accepted_by {
            self.accepted_by = Some(accepted_by.clone());
        }
        if let Some(worker) = &patch.assigned_worker {
            self.assigned_worker = Some(worker.clone());
        }
        if let Some(at) = patch.completed_at {
            self.completed_at = Some(at);
        }
        if let Some(at) = patch.cancelled_at {
            self.cancelled_at = Some(at);
        }
        self.status = RequestStatus::derive(&self.offers);
    }
}

/// Scalar fields written together with a new offer list.
#[derive(Debug, Clone, Default)]
pub struct RequestPatch {
    pub accepted_by: Option<String>,
    pub assigned_worker: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderRef {
    Id(String),
    Name(String),
}

impl std::fmt::Display for ProviderRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderRef::Id(id) => write!(f, "id {id}"),
            ProviderRef::Name(name) => write!(f, "name {name:?}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DispatchTarget {
    Direct { provider: ProviderRef },
    Broadcast,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDispatch {
    pub requester: Requester,
    pub origin: GeoPoint,
    pub breakdown_type: String,
    #[serde(default)]
    pub vehicle: VehicleInfo,
    #[serde(flatten)]
    pub target: DispatchTarget,
}

/// Creation result. The completion code goes to the requester only, here.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedDispatch {
    pub request: DispatchRequest,
    pub completion_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DailyCount {
    pub date: chrono::NaiveDate,
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub closed: usize,
}
