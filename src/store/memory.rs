use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::provider::Provider;
use crate::models::request::{DispatchRequest, Offer, RequestPatch};
use crate::models::worker::{Interaction, Worker};
use crate::store::{
    InteractionLog, ProviderDirectory, RequestFilter, RequestStore, SortOrder, WorkerDirectory,
};

#[derive(Default)]
pub struct InMemoryProviderDirectory {
    providers: DashMap<String, Provider>,
}

impl InMemoryProviderDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, provider: Provider) {
        self.providers.insert(provider.id.clone(), provider);
    }
}

#[async_trait]
impl ProviderDirectory for InMemoryProviderDirectory {
    async fn list_all(&self) -> Result<Vec<Provider>, AppError> {
        let mut providers: Vec<Provider> = self
            .providers
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        // DashMap iteration order is arbitrary; ranking ties rely on a stable pool.
        providers.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(providers)
    }

    async fn find_by_category(&self, category: &str) -> Result<Vec<Provider>, AppError> {
        let mut providers = self.list_all().await?;
        providers.retain(|provider| provider.serves(category));
        Ok(providers)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Provider>, AppError> {
        Ok(self.providers.get(id).map(|entry| entry.value().clone()))
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Provider>, AppError> {
        let wanted = name.trim().to_lowercase();
        Ok(self
            .providers
            .iter()
            .filter(|entry| entry.value().name.to_lowercase() == wanted)
            .min_by(|a, b| a.key().cmp(b.key()))
            .map(|entry| entry.value().clone()))
    }
}

#[derive(Default)]
pub struct InMemoryWorkerDirectory {
    workers: DashMap<String, Worker>,
}

impl InMemoryWorkerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, worker: Worker) {
        self.workers.insert(worker.id.clone(), worker);
    }
}

#[async_trait]
impl WorkerDirectory for InMemoryWorkerDirectory {
    async fn find_by_id(&self, id: &str) -> Result<Option<Worker>, AppError> {
        Ok(self.workers.get(id).map(|entry| entry.value().clone()))
    }

    async fn find_by_garage(&self, garage_name: &str) -> Result<Option<Worker>, AppError> {
        let wanted = garage_name.trim().to_lowercase();
        let mut matches: Vec<Worker> = self
            .workers
            .iter()
            .filter(|entry| entry.value().garage_name.to_lowercase() == wanted)
            .map(|entry| entry.value().clone())
            .collect();
        matches.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(matches.into_iter().next())
    }
}

#[derive(Default)]
pub struct InMemoryRequestStore {
    requests: DashMap<Uuid, DispatchRequest>,
}

impl InMemoryRequestStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RequestStore for InMemoryRequestStore {
    async fn insert(&self, request: DispatchRequest) -> Result<Uuid, AppError> {
        let id = request.id;
        match self.requests.entry(id) {
            Entry::Occupied(_) => {
                Err(AppError::Conflict(format!("request {id} already exists")))
            }
            Entry::Vacant(slot) => {
                slot.insert(request);
                Ok(id)
            }
        }
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<DispatchRequest>, AppError> {
        Ok(self.requests.get(&id).map(|entry| entry.value().clone()))
    }

    async fn update_offers(
        &self,
        id: Uuid,
        expected_version: u64,
        offers: Vec<Offer>,
        patch: RequestPatch,
    ) -> Result<bool, AppError> {
        // The shard write lock makes check-and-write a single step.
        let Some(mut request) = self.requests.get_mut(&id) else {
            return Ok(false);
        };
        if request.version != expected_version {
            return Ok(false);
        }

        request.apply(offers, &patch);
        request.version += 1;
        Ok(true)
    }

    async fn query(
        &self,
        filter: RequestFilter,
        sort: SortOrder,
    ) -> Result<Vec<DispatchRequest>, AppError> {
        let mut requests: Vec<DispatchRequest> = self
            .requests
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        sort.sort(&mut requests);
        Ok(requests)
    }
}

#[derive(Default)]
pub struct InMemoryInteractionLog {
    entries: DashMap<String, Vec<Interaction>>,
}

impl InMemoryInteractionLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InteractionLog for InMemoryInteractionLog {
    async fn record(&self, interaction: Interaction) -> Result<(), AppError> {
        self.entries
            .entry(interaction.provider_id.clone())
            .or_default()
            .push(interaction);
        Ok(())
    }

    async fn history(&self, provider_id: &str) -> Result<Vec<Interaction>, AppError> {
        Ok(self
            .entries
            .get(provider_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::{InMemoryProviderDirectory, InMemoryRequestStore, InMemoryWorkerDirectory};
    use crate::models::provider::{GeoPoint, Provider};
    use crate::models::request::{
        DispatchMode, DispatchRequest, Offer, OfferStatus, RequestPatch, RequestStatus, Requester,
        VehicleInfo,
    };
    use crate::models::worker::Worker;
    use crate::store::{ProviderDirectory, RequestFilter, RequestStore, SortOrder, WorkerDirectory};

    fn request(candidates: &[&str]) -> DispatchRequest {
        let offers: Vec<Offer> = candidates
            .iter()
            .map(|id| Offer {
                candidate_id: id.to_string(),
                candidate_name: id.to_string(),
                distance_km: 1.0,
                status: OfferStatus::Pending,
            })
            .collect();
        DispatchRequest {
            id: Uuid::new_v4(),
            requester: Requester {
                name: "Ravi".to_string(),
                phone: "9000000001".to_string(),
            },
            origin: GeoPoint::new(12.9, 77.6),
            breakdown_type: "engine".to_string(),
            vehicle: VehicleInfo::default(),
            created_at: Utc::now(),
            mode: DispatchMode::Broadcast,
            status: RequestStatus::derive(&offers),
            offers,
            completion_code: Some("1234".to_string()),
            accepted_by: None,
            assigned_worker: None,
            completed_at: None,
            cancelled_at: None,
            version: 0,
        }
    }

    #[tokio::test]
    async fn stale_version_loses_the_write() {
        let store = InMemoryRequestStore::new();
        let req = request(&["a", "b"]);
        let id = store.insert(req.clone()).await.unwrap();

        let mut accepted = req.offers.clone();
        accepted[0].status = OfferStatus::Accepted;
        accepted[1].status = OfferStatus::Cancelled;
        let patch = RequestPatch {
            accepted_by: Some("a".to_string()),
            ..RequestPatch::default()
        };

        assert!(store.update_offers(id, 0, accepted.clone(), patch.clone()).await.unwrap());
        assert!(!store.update_offers(id, 0, accepted, patch).await.unwrap());

        let stored = store.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(stored.status, RequestStatus::Settled);
        assert_eq!(stored.accepted_by.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn update_of_missing_request_reports_false() {
        let store = InMemoryRequestStore::new();
        let updated = store
            .update_offers(Uuid::new_v4(), 0, Vec::new(), RequestPatch::default())
            .await
            .unwrap();
        assert!(!updated);
    }

    #[tokio::test]
    async fn duplicate_insert_is_a_conflict() {
        let store = InMemoryRequestStore::new();
        let req = request(&["a"]);
        store.insert(req.clone()).await.unwrap();
        assert!(store.insert(req).await.is_err());
    }

    #[tokio::test]
    async fn pending_filter_only_sees_untouched_offers() {
        let store = InMemoryRequestStore::new();
        let first = request(&["a", "b"]);
        let second = request(&["b"]);
        store.insert(first.clone()).await.unwrap();
        store.insert(second).await.unwrap();

        let mut offers = first.offers.clone();
        offers[0].status = OfferStatus::Rejected;
        store
            .update_offers(first.id, 0, offers, RequestPatch::default())
            .await
            .unwrap();

        let for_a = store
            .query(RequestFilter::PendingFor("a".to_string()), SortOrder::NewestFirst)
            .await
            .unwrap();
        let for_b = store
            .query(RequestFilter::PendingFor("b".to_string()), SortOrder::NewestFirst)
            .await
            .unwrap();
        assert!(for_a.is_empty());
        assert_eq!(for_b.len(), 2);
    }

    #[tokio::test]
    async fn provider_lookup_by_name_ignores_case() {
        let directory = InMemoryProviderDirectory::new();
        directory.insert(Provider {
            id: "p1".to_string(),
            name: "Sharma Motors".to_string(),
            location: GeoPoint::new(12.9, 77.6),
            category: "engine".to_string(),
            rating: 4.0,
            comments: Vec::new(),
            sentiment: None,
        });

        let found = directory.find_by_name("sharma MOTORS").await.unwrap();
        assert_eq!(found.map(|p| p.id), Some("p1".to_string()));
        assert!(directory.find_by_name("Sharma").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_names_resolve_to_the_lowest_id() {
        let directory = InMemoryProviderDirectory::new();
        for id in ["p9", "p2", "p5"] {
            directory.insert(Provider {
                id: id.to_string(),
                name: "Sharma Motors".to_string(),
                location: GeoPoint::new(12.9, 77.6),
                category: "engine".to_string(),
                rating: 4.0,
                comments: Vec::new(),
                sentiment: None,
            });
        }

        let found = directory.find_by_name("Sharma Motors").await.unwrap();
        assert_eq!(found.map(|p| p.id), Some("p2".to_string()));
    }

    #[tokio::test]
    async fn worker_lookup_by_garage() {
        let directory = InMemoryWorkerDirectory::new();
        directory.insert(Worker {
            id: "w1".to_string(),
            name: "Amit".to_string(),
            phone: "9876543211".to_string(),
            garage_name: "Sharma Motors".to_string(),
        });

        let found = directory.find_by_garage("sharma motors").await.unwrap();
        assert_eq!(found.map(|w| w.id), Some("w1".to_string()));
        assert!(directory.find_by_garage("Other").await.unwrap().is_none());
    }
}
