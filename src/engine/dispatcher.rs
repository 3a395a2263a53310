use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::DispatchSettings;
use crate::engine::completion::generate_code;
use crate::engine::scoring::{backfill_road_distance, page, rank};
use crate::engine::sentiment::SentimentScorer;
use crate::engine::transitions::{self, Transition};
use crate::error::AppError;
use crate::geo::haversine_km;
use crate::geo::routing::RoutingProvider;
use crate::models::provider::{Candidate, GeoPoint, Provider};
use crate::models::request::{
    CreatedDispatch, DispatchMode, DispatchRequest, DispatchTarget, NewDispatch, Offer,
    OfferStatus, ProviderRef, RequestStatus,
};
use crate::models::worker::Interaction;
use crate::observability::metrics::Metrics;
use crate::store::{InteractionLog, ProviderDirectory, RequestStore, WorkerDirectory};

/// Attempts per transition before giving up on a contended request.
const MAX_COMMIT_ATTEMPTS: usize = 16;

pub struct Collaborators {
    pub providers: Arc<dyn ProviderDirectory>,
    pub requests: Arc<dyn RequestStore>,
    pub workers: Arc<dyn WorkerDirectory>,
    pub history: Arc<dyn InteractionLog>,
    pub routing: Arc<dyn RoutingProvider>,
    pub sentiment: Arc<dyn SentimentScorer>,
}

pub struct Dispatcher {
    pub(crate) providers: Arc<dyn ProviderDirectory>,
    pub(crate) requests: Arc<dyn RequestStore>,
    pub(crate) workers: Arc<dyn WorkerDirectory>,
    pub(crate) history: Arc<dyn InteractionLog>,
    routing: Arc<dyn RoutingProvider>,
    sentiment: Arc<dyn SentimentScorer>,
    settings: DispatchSettings,
    metrics: Metrics,
}

impl Dispatcher {
    pub fn new(collaborators: Collaborators, settings: DispatchSettings, metrics: Metrics) -> Self {
        Self {
            providers: collaborators.providers,
            requests: collaborators.requests,
            workers: collaborators.workers,
            history: collaborators.history,
            routing: collaborators.routing,
            sentiment: collaborators.sentiment,
            settings,
            metrics,
        }
    }

    /// Ranked page of candidates with road distance filled in for that page
    /// only.
    pub async fn recommend(
        &self,
        origin: GeoPoint,
        breakdown_type: &str,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<Vec<Candidate>, AppError> {
        origin.validate()?;
        let breakdown_type = breakdown_type.trim();
        let limit = limit.unwrap_or(self.settings.page_limit);

        let pool = self.providers.list_all().await?;
        let ranked = self.rank_pool(&origin, breakdown_type, &pool);
        let total = ranked.len();

        let mut candidates = page(ranked, offset, limit);
        let fallbacks = backfill_road_distance(
            &mut candidates,
            &origin,
            self.routing.as_ref(),
            self.settings.routing_wait,
        )
        .await;
        self.metrics.routing_fallbacks_total.inc_by(fallbacks as u64);

        debug!(
            breakdown_type,
            total,
            offset,
            returned = candidates.len(),
            "recommendations computed"
        );
        Ok(candidates)
    }

    fn rank_pool(&self, origin: &GeoPoint, breakdown_type: &str, pool: &[Provider]) -> Vec<Candidate> {
        let start = Instant::now();
        let ranked = rank(origin, breakdown_type, pool, self.sentiment.as_ref());
        self.metrics
            .ranking_latency_seconds
            .observe(start.elapsed().as_secs_f64());
        ranked
    }

    pub async fn create(&self, new: NewDispatch) -> Result<CreatedDispatch, AppError> {
        new.origin.validate()?;
        let breakdown_type = new.breakdown_type.trim().to_string();
        if breakdown_type.is_empty() {
            return Err(AppError::InvalidInput("breakdown_type is required".to_string()));
        }
        if new.requester.phone.trim().is_empty() {
            return Err(AppError::InvalidInput("requester phone is required".to_string()));
        }

        let (mode, offers) = match &new.target {
            DispatchTarget::Direct { provider } => {
                let provider = self.resolve_provider(provider).await?;
                let offer = Offer {
                    distance_km: haversine_km(&new.origin, &provider.location),
                    candidate_id: provider.id,
                    candidate_name: provider.name,
                    status: OfferStatus::Pending,
                };
                (DispatchMode::Direct, vec![offer])
            }
            DispatchTarget::Broadcast => {
                let pool = self.providers.list_all().await?;
                let offers: Vec<Offer> = self
                    .rank_pool(&new.origin, &breakdown_type, &pool)
                    .into_iter()
                    .take(self.settings.broadcast_fanout)
                    .map(|candidate| Offer {
                        candidate_id: candidate.provider_id,
                        candidate_name: candidate.name,
                        distance_km: candidate.distance_km,
                        status: OfferStatus::Pending,
                    })
                    .collect();
                if offers.is_empty() {
                    return Err(AppError::NotFound("no providers available".to_string()));
                }
                (DispatchMode::Broadcast, offers)
            }
        };

        let completion_code = generate_code();
        let request = DispatchRequest {
            id: Uuid::new_v4(),
            requester: new.requester,
            origin: new.origin,
            breakdown_type,
            vehicle: new.vehicle,
            created_at: Utc::now(),
            mode,
            status: RequestStatus::derive(&offers),
            offers,
            completion_code: Some(completion_code.clone()),
            accepted_by: None,
            assigned_worker: None,
            completed_at: None,
            cancelled_at: None,
            version: 0,
        };

        self.requests.insert(request.clone()).await?;
        self.metrics
            .dispatch_requests_total
            .with_label_values(&[mode.as_str()])
            .inc();

        info!(
            request_id = %request.id,
            mode = mode.as_str(),
            offers = request.offers.len(),
            "dispatch request created"
        );

        if mode == DispatchMode::Broadcast {
            self.schedule_expiry(request.id);
        }

        Ok(CreatedDispatch {
            request,
            completion_code,
        })
    }

    async fn resolve_provider(&self, provider: &ProviderRef) -> Result<Provider, AppError> {
        let found = match provider {
            ProviderRef::Id(id) => self.providers.find_by_id(id).await?,
            ProviderRef::Name(name) => self.providers.find_by_name(name).await?,
        };
        found.ok_or_else(|| AppError::NotFound(format!("provider with {provider} not found")))
    }

    /// Fire-once timer. The callback decides from the state it reads when it
    /// fires, never from anything captured here.
    fn schedule_expiry(&self, id: Uuid) {
        let store = Arc::clone(&self.requests);
        let metrics = self.metrics.clone();
        let delay = self.settings.broadcast_timeout;

        tokio::spawn(async move {
            sleep(delay).await;
            match expire_if_untouched(store.as_ref(), &metrics, id).await {
                Ok(true) => info!(request_id = %id, "broadcast expired without response"),
                Ok(false) => debug!(request_id = %id, "broadcast already acted on; expiry skipped"),
                Err(err) => error!(request_id = %id, error = %err, "broadcast expiry failed"),
            }
        });
    }

    pub async fn accept(&self, id: Uuid, candidate_id: &str) -> Result<DispatchRequest, AppError> {
        let request = self
            .commit_required(id, |current| transitions::accept(current, candidate_id))
            .await?;

        info!(request_id = %id, candidate_id, "offer accepted");

        let interaction = Interaction {
            provider_id: candidate_id.to_string(),
            request_id: id,
            requester_name: request.requester.name.clone(),
            breakdown_type: request.breakdown_type.clone(),
            accepted_at: Utc::now(),
        };
        if let Err(err) = self.history.record(interaction).await {
            warn!(request_id = %id, candidate_id, error = %err, "failed to append provider history");
        }

        Ok(request)
    }

    pub async fn reject(&self, id: Uuid, candidate_id: &str) -> Result<DispatchRequest, AppError> {
        let now = Utc::now();
        let request = self
            .commit_required(id, |current| transitions::reject(current, candidate_id, now))
            .await?;

        info!(
            request_id = %id,
            candidate_id,
            closed = request.status == RequestStatus::Closed,
            "offer rejected"
        );
        Ok(request)
    }

    pub async fn assign_worker(&self, id: Uuid, worker_id: &str) -> Result<DispatchRequest, AppError> {
        let worker = self
            .workers
            .find_by_id(worker_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("worker {worker_id} not found")))?;
        let garage = self
            .providers
            .find_by_name(&worker.garage_name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("garage {} not found", worker.garage_name)))?;

        // Several directory records may share the garage's name; the one that
        // matters is whichever holds an offer on this request.
        let request = self
            .commit_required(id, |current| {
                let garage_id = current
                    .offer_for_name(&worker.garage_name)
                    .map_or(garage.id.as_str(), |offer| offer.candidate_id.as_str());
                transitions::assign_worker(current, garage_id, &worker.id)
            })
            .await?;

        info!(
            request_id = %id,
            worker_id,
            garage_id = request.accepted_by.as_deref().unwrap_or_default(),
            "worker assigned"
        );
        Ok(request)
    }

    pub async fn verify_completion(
        &self,
        id: Uuid,
        code: &str,
        actor_id: &str,
    ) -> Result<DispatchRequest, AppError> {
        let now = Utc::now();
        let request = self
            .commit_required(id, |current| transitions::complete(current, actor_id, code, now))
            .await?;

        info!(request_id = %id, actor_id, "request completed");
        Ok(request)
    }

    async fn commit_required<F>(&self, id: Uuid, mut decide: F) -> Result<DispatchRequest, AppError>
    where
        F: FnMut(&DispatchRequest) -> Result<Transition, AppError> + Send,
    {
        commit(self.requests.as_ref(), &self.metrics, id, |current| {
            decide(current).map(Some)
        })
        .await?
        .ok_or_else(|| AppError::Internal(format!("transition on {id} produced no change")))
    }
}

/// Broadcast timeout body. Returns `true` if it cancelled the request.
pub async fn expire_if_untouched(
    store: &dyn RequestStore,
    metrics: &Metrics,
    id: Uuid,
) -> Result<bool, AppError> {
    let expired = commit(store, metrics, id, |current| {
        Ok(transitions::expire(current, Utc::now()))
    })
    .await?;

    if expired.is_some() {
        metrics.broadcast_expirations_total.inc();
    }
    Ok(expired.is_some())
}

/// Read, decide, compare-and-set. A lost race re-reads and decides again
/// against the new state, so a decision never rests on a stale read.
/// `Ok(None)` means the decision was to leave the request alone.
async fn commit<F>(
    store: &dyn RequestStore,
    metrics: &Metrics,
    id: Uuid,
    mut decide: F,
) -> Result<Option<DispatchRequest>, AppError>
where
    F: FnMut(&DispatchRequest) -> Result<Option<Transition>, AppError> + Send,
{
    for attempt in 0..MAX_COMMIT_ATTEMPTS {
        let current = store
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("request {id} not found")))?;

        let Some(transition) = decide(&current)? else {
            return Ok(None);
        };

        let written = store
            .update_offers(
                id,
                current.version,
                transition.offers.clone(),
                transition.patch.clone(),
            )
            .await?;

        if written {
            record_transitions(metrics, &current.offers, &transition.offers);
            let mut next = current;
            next.apply(transition.offers, &transition.patch);
            next.version += 1;
            return Ok(Some(next));
        }

        debug!(request_id = %id, attempt, "concurrent update detected; retrying");
        tokio::task::yield_now().await;
    }

    Err(AppError::Conflict(format!(
        "request {id} is being updated concurrently, retry later"
    )))
}

fn record_transitions(metrics: &Metrics, before: &[Offer], after: &[Offer]) {
    for status in [
        OfferStatus::Accepted,
        OfferStatus::Rejected,
        OfferStatus::Cancelled,
        OfferStatus::Completed,
    ] {
        let moved = before
            .iter()
            .zip(after)
            .filter(|(old, new)| old.status != new.status && new.status == status)
            .count();
        metrics.record_transition(status.as_str(), moved);
    }
}
