//! Collaborator contracts the dispatch core is written against, and the
//! in-memory adapters used by default and in tests.

pub mod ingest;
pub mod memory;

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::provider::Provider;
use crate::models::request::{DispatchRequest, Offer, OfferStatus, RequestPatch};
use crate::models::worker::{Interaction, Worker};

#[async_trait]
pub trait ProviderDirectory: Send + Sync {
    async fn list_all(&self) -> Result<Vec<Provider>, AppError>;
    async fn find_by_category(&self, category: &str) -> Result<Vec<Provider>, AppError>;
    async fn find_by_id(&self, id: &str) -> Result<Option<Provider>, AppError>;
    /// Case-insensitive exact match on the display name.
    async fn find_by_name(&self, name: &str) -> Result<Option<Provider>, AppError>;
}

#[async_trait]
pub trait WorkerDirectory: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<Worker>, AppError>;
    async fn find_by_garage(&self, garage_name: &str) -> Result<Option<Worker>, AppError>;
}

#[async_trait]
pub trait RequestStore: Send + Sync {
    async fn insert(&self, request: DispatchRequest) -> Result<Uuid, AppError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<DispatchRequest>, AppError>;
    /// Compare-and-set. Writes `offers` and `patch` only if the stored version
    /// still equals `expected_version`, then bumps the version. Returns `false`
    /// when the request is missing or was changed in between.
    async fn update_offers(
        &self,
        id: Uuid,
        expected_version: u64,
        offers: Vec<Offer>,
        patch: RequestPatch,
    ) -> Result<bool, AppError>;
    async fn query(
        &self,
        filter: RequestFilter,
        sort: SortOrder,
    ) -> Result<Vec<DispatchRequest>, AppError>;
}

/// Provider history log. Appends are best effort from the caller's side.
#[async_trait]
pub trait InteractionLog: Send + Sync {
    async fn record(&self, interaction: Interaction) -> Result<(), AppError>;
    async fn history(&self, provider_id: &str) -> Result<Vec<Interaction>, AppError>;
}

#[derive(Debug, Clone)]
pub enum RequestFilter {
    All,
    /// Requests where the candidate's offer is still pending.
    PendingFor(String),
    /// Requests the actor holds: an accepted offer, or the assigned worker on
    /// a request that is not yet fulfilled.
    SettledFor(String),
    /// Requests with a completed offer.
    Completed,
    /// Requests raised by this phone number.
    Requester(String),
    CreatedOn(NaiveDate),
}

impl RequestFilter {
    pub fn matches(&self, request: &DispatchRequest) -> bool {
        match self {
            RequestFilter::All => true,
            RequestFilter::PendingFor(candidate) => request
                .offer(candidate)
                .is_some_and(|offer| offer.status == OfferStatus::Pending),
            RequestFilter::SettledFor(actor) => {
                let holds_offer = request
                    .offer(actor)
                    .is_some_and(|offer| offer.status == OfferStatus::Accepted);
                let assigned = request.assigned_worker.as_deref() == Some(actor.as_str())
                    && request.accepted_offer().is_some();
                holds_offer || assigned
            }
            RequestFilter::Completed => request
                .offers
                .iter()
                .any(|offer| offer.status == OfferStatus::Completed),
            RequestFilter::Requester(phone) => request.requester.phone == *phone,
            RequestFilter::CreatedOn(date) => request.created_at.date_naive() == *date,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    NewestFirst,
    OldestFirst,
}

impl SortOrder {
    pub fn sort(&self, requests: &mut [DispatchRequest]) {
        match self {
            SortOrder::NewestFirst => requests.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            SortOrder::OldestFirst => requests.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
        }
    }
}
