use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use roadside_dispatch::config::DispatchSettings;
use roadside_dispatch::engine::dispatcher::{Collaborators, Dispatcher};
use roadside_dispatch::engine::sentiment::LexiconSentiment;
use roadside_dispatch::error::AppError;
use roadside_dispatch::geo::routing::StraightLine;
use roadside_dispatch::models::provider::{GeoPoint, Provider};
use roadside_dispatch::models::request::{
    CreatedDispatch, DispatchMode, DispatchRequest, DispatchTarget, NewDispatch, OfferStatus, ProviderRef,
    RequestStatus, Requester, VehicleInfo,
};
use roadside_dispatch::models::worker::{Interaction, Worker};
use roadside_dispatch::observability::metrics::Metrics;
use roadside_dispatch::state::{AppState, InMemoryStores};
use roadside_dispatch::store::InteractionLog;
use roadside_dispatch::store::memory::{
    InMemoryProviderDirectory, InMemoryRequestStore, InMemoryWorkerDirectory,
};

const ORIGIN: GeoPoint = GeoPoint { lat: 12.9716, lng: 77.5946 };

fn settings(timeout: Duration) -> DispatchSettings {
    DispatchSettings {
        broadcast_timeout: timeout,
        ..DispatchSettings::default()
    }
}

fn provider(id: &str, name: &str, km_north: f64, category: &str, rating: f64) -> Provider {
    Provider {
        id: id.to_string(),
        name: name.to_string(),
        location: GeoPoint::new(ORIGIN.lat + (km_north / 6_371.0).to_degrees(), ORIGIN.lng),
        category: category.to_string(),
        rating,
        comments: Vec::new(),
        sentiment: None,
    }
}

fn seed(stores: &InMemoryStores) {
    stores.providers.insert(provider("g1", "Sharma Motors", 1.0, "engine", 4.6));
    stores.providers.insert(provider("g2", "City Garage", 3.0, "engine", 4.1));
    stores.providers.insert(provider("g3", "Highway Auto", 8.0, "engine", 3.2));
    stores.providers.insert(provider("g4", "Volt Battery Care", 2.0, "battery", 4.9));
    stores.workers.insert(Worker {
        id: "w1".to_string(),
        name: "Amit Patel".to_string(),
        phone: "9876543211".to_string(),
        garage_name: "Sharma Motors".to_string(),
    });
    stores.workers.insert(Worker {
        id: "w-orphan".to_string(),
        name: "Nobody".to_string(),
        phone: "9876543219".to_string(),
        garage_name: "Closed Garage".to_string(),
    });
}

fn setup(timeout: Duration) -> (Arc<AppState>, InMemoryStores) {
    let (state, stores) = AppState::in_memory(settings(timeout));
    seed(&stores);
    (Arc::new(state), stores)
}

fn new_dispatch(phone: &str, target: DispatchTarget) -> NewDispatch {
    NewDispatch {
        requester: Requester {
            name: "Ravi Kumar".to_string(),
            phone: phone.to_string(),
        },
        origin: ORIGIN,
        breakdown_type: "Engine".to_string(),
        vehicle: VehicleInfo {
            car_model: Some("Swift".to_string()),
            license_plate: Some("KA01AB1234".to_string()),
            issue_type: Some("won't start".to_string()),
            description: None,
        },
        target,
    }
}

async fn broadcast(state: &AppState) -> CreatedDispatch {
    state
        .dispatcher
        .create(new_dispatch("9000000001", DispatchTarget::Broadcast))
        .await
        .unwrap()
}

fn statuses(request: &DispatchRequest) -> Vec<(String, OfferStatus)> {
    request
        .offers
        .iter()
        .map(|o| (o.candidate_id.clone(), o.status))
        .collect()
}

#[tokio::test]
async fn broadcast_offers_go_to_ranked_category_matches() {
    let (state, _stores) = setup(Duration::from_secs(60));
    let created = broadcast(&state).await;
    let request = &created.request;

    assert_eq!(request.mode, DispatchMode::Broadcast);
    assert_eq!(request.status, RequestStatus::Open);
    let ids: Vec<&str> = request.offers.iter().map(|o| o.candidate_id.as_str()).collect();
    assert_eq!(ids, vec!["g1", "g2", "g3"]);
    assert!(request.offers.iter().all(|o| o.status == OfferStatus::Pending));
    assert_eq!(created.completion_code.len(), 4);
    assert!(created.completion_code.chars().all(|c| c.is_ascii_digit()));
}

#[tokio::test]
async fn broadcast_fanout_caps_the_offer_count() {
    let (state, stores) = AppState::in_memory(DispatchSettings {
        broadcast_fanout: 5,
        ..DispatchSettings::default()
    });
    for i in 0..8 {
        stores
            .providers
            .insert(provider(&format!("p{i}"), &format!("Garage {i}"), i as f64, "tyre", 4.0));
    }

    let created = state
        .dispatcher
        .create(new_dispatch("9000000001", DispatchTarget::Broadcast))
        .await
        .unwrap();
    assert_eq!(created.request.offers.len(), 5);
}

#[tokio::test]
async fn broadcast_with_empty_directory_is_not_found() {
    let (state, _stores) = AppState::in_memory(DispatchSettings::default());
    let err = state
        .dispatcher
        .create(new_dispatch("9000000001", DispatchTarget::Broadcast))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn invalid_origin_is_rejected() {
    let (state, _stores) = setup(Duration::from_secs(60));
    let mut new = new_dispatch("9000000001", DispatchTarget::Broadcast);
    new.origin = GeoPoint::new(123.0, 77.0);
    let err = state.dispatcher.create(new).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));
}

#[tokio::test]
async fn direct_dispatch_resolves_names_case_insensitively() {
    let (state, _stores) = setup(Duration::from_secs(60));
    let created = state
        .dispatcher
        .create(new_dispatch(
            "9000000001",
            DispatchTarget::Direct {
                provider: ProviderRef::Name("city GARAGE".to_string()),
            },
        ))
        .await
        .unwrap();

    assert_eq!(created.request.mode, DispatchMode::Direct);
    assert_eq!(created.request.offers.len(), 1);
    assert_eq!(created.request.offers[0].candidate_id, "g2");
    assert!((created.request.offers[0].distance_km - 3.0).abs() < 0.01);

    let err = state
        .dispatcher
        .create(new_dispatch(
            "9000000001",
            DispatchTarget::Direct {
                provider: ProviderRef::Name("No Such Garage".to_string()),
            },
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_accepts_produce_a_single_winner() {
    let (state, _stores) = setup(Duration::from_secs(60));

    for _ in 0..25 {
        let id = broadcast(&state).await.request.id;

        let first = {
            let state = state.clone();
            tokio::spawn(async move { state.dispatcher.accept(id, "g1").await })
        };
        let second = {
            let state = state.clone();
            tokio::spawn(async move { state.dispatcher.accept(id, "g2").await })
        };
        let (first, second) = (first.await.unwrap(), second.await.unwrap());

        let outcomes = [&first, &second];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        for outcome in outcomes {
            if let Err(err) = outcome {
                assert_eq!(err.kind(), "conflict");
            }
        }

        let request = state.dispatcher.detail(id).await.unwrap();
        let accepted = request
            .offers
            .iter()
            .filter(|o| o.status == OfferStatus::Accepted)
            .count();
        assert_eq!(accepted, 1);
        assert!(!request.has_pending());
        assert_eq!(request.status, RequestStatus::Settled);
    }
}

#[tokio::test]
async fn accept_on_unknown_request_or_candidate_is_not_found() {
    let (state, _stores) = setup(Duration::from_secs(60));
    let err = state
        .dispatcher
        .accept(uuid::Uuid::new_v4(), "g1")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let id = broadcast(&state).await.request.id;
    let err = state.dispatcher.accept(id, "g4").await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn timeout_is_a_no_op_once_someone_accepted() {
    let (state, _stores) = setup(Duration::from_millis(50));
    let id = broadcast(&state).await.request.id;

    let accepted = state.dispatcher.accept(id, "g2").await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let after = state.dispatcher.detail(id).await.unwrap();
    assert_eq!(statuses(&after), statuses(&accepted));
    assert_eq!(after.version, accepted.version);
    assert!(after.cancelled_at.is_none());
}

#[tokio::test]
async fn timeout_is_a_no_op_after_a_single_rejection() {
    let (state, _stores) = setup(Duration::from_millis(50));
    let id = broadcast(&state).await.request.id;

    state.dispatcher.reject(id, "g3").await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let after = state.dispatcher.detail(id).await.unwrap();
    assert_eq!(after.status, RequestStatus::Open);
    assert_eq!(after.offer("g1").unwrap().status, OfferStatus::Pending);
}

#[tokio::test]
async fn untouched_broadcast_is_cancelled_by_the_timeout() {
    let (state, _stores) = setup(Duration::from_millis(50));
    let id = broadcast(&state).await.request.id;

    tokio::time::sleep(Duration::from_millis(200)).await;

    let after = state.dispatcher.detail(id).await.unwrap();
    assert!(after.offers.iter().all(|o| o.status == OfferStatus::Cancelled));
    assert_eq!(after.status, RequestStatus::Closed);
    assert!(after.cancelled_at.is_some());

    let err = state.dispatcher.accept(id, "g1").await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn direct_requests_never_time_out() {
    let (state, _stores) = setup(Duration::from_millis(20));
    let created = state
        .dispatcher
        .create(new_dispatch(
            "9000000001",
            DispatchTarget::Direct {
                provider: ProviderRef::Id("g1".to_string()),
            },
        ))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(120)).await;

    let after = state.dispatcher.detail(created.request.id).await.unwrap();
    assert_eq!(after.offers[0].status, OfferStatus::Pending);
    assert_eq!(after.status, RequestStatus::Open);
}

#[tokio::test]
async fn rejections_cascade_to_a_closed_request() {
    let (state, stores) = AppState::in_memory(DispatchSettings::default());
    stores.providers.insert(provider("a", "A", 1.0, "engine", 4.0));
    stores.providers.insert(provider("b", "B", 2.0, "engine", 4.0));

    let id = state
        .dispatcher
        .create(new_dispatch("9000000001", DispatchTarget::Broadcast))
        .await
        .unwrap()
        .request
        .id;

    let after_first = state.dispatcher.reject(id, "a").await.unwrap();
    assert_eq!(after_first.status, RequestStatus::Open);

    let after_second = state.dispatcher.reject(id, "b").await.unwrap();
    assert_eq!(after_second.status, RequestStatus::Closed);
    assert!(!after_second.has_pending());
    assert!(after_second.cancelled_at.is_some());
}

#[tokio::test]
async fn direct_rejection_closes_immediately() {
    let (state, _stores) = setup(Duration::from_secs(60));
    let id = state
        .dispatcher
        .create(new_dispatch(
            "9000000001",
            DispatchTarget::Direct {
                provider: ProviderRef::Id("g3".to_string()),
            },
        ))
        .await
        .unwrap()
        .request
        .id;

    let closed = state.dispatcher.reject(id, "g3").await.unwrap();
    assert_eq!(closed.status, RequestStatus::Closed);
    assert_eq!(closed.offers[0].status, OfferStatus::Rejected);
}

#[tokio::test]
async fn completion_code_is_single_use() {
    let (state, _stores) = setup(Duration::from_secs(60));
    let created = broadcast(&state).await;
    let id = created.request.id;
    state.dispatcher.accept(id, "g1").await.unwrap();

    let err = state
        .dispatcher
        .verify_completion(id, "12a4", "g1")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));

    let err = state
        .dispatcher
        .verify_completion(id, "123", "g1")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));

    let wrong = if created.completion_code == "0000" { "1111" } else { "0000" };
    let err = state
        .dispatcher
        .verify_completion(id, wrong, "g1")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::CodeMismatch));

    let done = state
        .dispatcher
        .verify_completion(id, &created.completion_code, "g1")
        .await
        .unwrap();
    assert_eq!(done.status, RequestStatus::Fulfilled);
    assert_eq!(done.offer("g1").unwrap().status, OfferStatus::Completed);
    assert!(done.completed_at.is_some());

    let err = state
        .dispatcher
        .verify_completion(id, &created.completion_code, "g1")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AlreadyCompleted));
}

#[tokio::test]
async fn only_parties_may_complete() {
    let (state, _stores) = setup(Duration::from_secs(60));
    let created = broadcast(&state).await;
    let id = created.request.id;
    state.dispatcher.accept(id, "g1").await.unwrap();

    let err = state
        .dispatcher
        .verify_completion(id, &created.completion_code, "g2")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unauthorized(_)));
}

#[tokio::test]
async fn assigned_worker_completes_for_the_garage() {
    let (state, _stores) = setup(Duration::from_secs(60));
    let created = broadcast(&state).await;
    let id = created.request.id;

    state.dispatcher.accept(id, "g1").await.unwrap();
    let assigned = state.dispatcher.assign_worker(id, "w1").await.unwrap();
    assert_eq!(assigned.assigned_worker.as_deref(), Some("w1"));
    assert_eq!(assigned.accepted_by.as_deref(), Some("g1"));

    let settled = state.dispatcher.settled_for("w1").await.unwrap();
    assert_eq!(settled.len(), 1);

    let done = state
        .dispatcher
        .verify_completion(id, &created.completion_code, "w1")
        .await
        .unwrap();
    assert_eq!(done.status, RequestStatus::Fulfilled);
    assert!(state.dispatcher.settled_for("w1").await.unwrap().is_empty());
}

#[tokio::test]
async fn worker_assignment_lookups_fail_with_not_found() {
    let (state, _stores) = setup(Duration::from_secs(60));
    let id = broadcast(&state).await.request.id;

    let err = state.dispatcher.assign_worker(id, "ghost").await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let err = state.dispatcher.assign_worker(id, "w-orphan").await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn worker_assignment_on_open_request_settles_it() {
    let (state, _stores) = setup(Duration::from_secs(60));
    let id = broadcast(&state).await.request.id;

    let assigned = state.dispatcher.assign_worker(id, "w1").await.unwrap();
    assert_eq!(assigned.status, RequestStatus::Settled);
    assert_eq!(assigned.offer("g1").unwrap().status, OfferStatus::Accepted);
    assert_eq!(assigned.offer("g2").unwrap().status, OfferStatus::Cancelled);
}

#[tokio::test]
async fn worker_assignment_follows_the_offered_record_when_names_repeat() {
    let (state, stores) = setup(Duration::from_secs(60));
    // Sorts ahead of g1 by id but loses to it in ranking.
    stores
        .providers
        .insert(provider("a-old", "Sharma Motors", 20.0, "engine", 2.0));

    let created = broadcast(&state).await;
    let id = created.request.id;
    assert!(created.request.offer("a-old").is_none());

    state.dispatcher.accept(id, "g1").await.unwrap();
    let assigned = state.dispatcher.assign_worker(id, "w1").await.unwrap();
    assert_eq!(assigned.accepted_by.as_deref(), Some("g1"));
    assert_eq!(assigned.assigned_worker.as_deref(), Some("w1"));

    let done = state
        .dispatcher
        .verify_completion(id, &created.completion_code, "w1")
        .await
        .unwrap();
    assert_eq!(done.status, RequestStatus::Fulfilled);
}

#[tokio::test]
async fn accept_records_provider_history() {
    let (state, _stores) = setup(Duration::from_secs(60));
    let id = broadcast(&state).await.request.id;
    state.dispatcher.accept(id, "g2").await.unwrap();

    let history = state.dispatcher.provider_history("g2").await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].request_id, id);
    assert_eq!(history[0].requester_name, "Ravi Kumar");
}

struct BrokenLog;

#[async_trait]
impl InteractionLog for BrokenLog {
    async fn record(&self, _interaction: Interaction) -> Result<(), AppError> {
        Err(AppError::Internal("history collection unavailable".to_string()))
    }

    async fn history(&self, _provider_id: &str) -> Result<Vec<Interaction>, AppError> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn history_failure_does_not_fail_accept() {
    let providers = Arc::new(InMemoryProviderDirectory::new());
    providers.insert(provider("g1", "Sharma Motors", 1.0, "engine", 4.6));
    let dispatcher = Dispatcher::new(
        Collaborators {
            providers,
            requests: Arc::new(InMemoryRequestStore::new()),
            workers: Arc::new(InMemoryWorkerDirectory::new()),
            history: Arc::new(BrokenLog),
            routing: Arc::new(StraightLine),
            sentiment: Arc::new(LexiconSentiment),
        },
        DispatchSettings::default(),
        Metrics::new(),
    );

    let id = dispatcher
        .create(new_dispatch("9000000001", DispatchTarget::Broadcast))
        .await
        .unwrap()
        .request
        .id;
    let accepted = dispatcher.accept(id, "g1").await.unwrap();
    assert_eq!(accepted.status, RequestStatus::Settled);
}

#[tokio::test]
async fn read_views_follow_offer_state() {
    let (state, _stores) = setup(Duration::from_secs(60));
    let first = broadcast(&state).await;
    let second = state
        .dispatcher
        .create(new_dispatch("9000000002", DispatchTarget::Broadcast))
        .await
        .unwrap();

    assert_eq!(state.dispatcher.open_for_candidate("g1").await.unwrap().len(), 2);

    state.dispatcher.accept(first.request.id, "g1").await.unwrap();
    assert_eq!(state.dispatcher.open_for_candidate("g1").await.unwrap().len(), 1);
    assert_eq!(state.dispatcher.open_for_candidate("g2").await.unwrap().len(), 1);
    assert_eq!(state.dispatcher.settled_for("g1").await.unwrap().len(), 1);

    state
        .dispatcher
        .verify_completion(first.request.id, &first.completion_code, "g1")
        .await
        .unwrap();
    let completed = state.dispatcher.completed().await.unwrap();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].id, first.request.id);

    let today = state.dispatcher.overview_for(Utc::now()).await.unwrap();
    assert_eq!(today.total, 2);
    assert_eq!(today.completed, 1);
    assert_eq!(today.pending, 1);

    let daily = state.dispatcher.daily_counts().await.unwrap();
    assert_eq!(daily.len(), 1);
    assert_eq!(daily[0], today);

    let active = state
        .dispatcher
        .active_for_requester("9000000002")
        .await
        .unwrap();
    assert_eq!(active.map(|r| r.id), Some(second.request.id));
    assert!(state
        .dispatcher
        .active_for_requester("9000000001")
        .await
        .unwrap()
        .is_none());

    let recent = state
        .dispatcher
        .recent_for_requester("9000000001", 10)
        .await
        .unwrap();
    assert_eq!(recent.len(), 1);
}

#[tokio::test]
async fn recommendations_backfill_road_distance_for_the_page() {
    let (state, _stores) = setup(Duration::from_secs(60));
    let page = state
        .dispatcher
        .recommend(ORIGIN, "engine", 0, Some(2))
        .await
        .unwrap();

    assert_eq!(page.len(), 2);
    assert_eq!(page[0].provider_id, "g1");
    assert!(page.iter().all(|c| c.road_distance_km.is_some()));

    let rest = state
        .dispatcher
        .recommend(ORIGIN, "engine", 2, None)
        .await
        .unwrap();
    assert_eq!(rest.len(), 1);
    assert_eq!(rest[0].provider_id, "g3");
}

#[tokio::test]
async fn recommendations_trim_the_breakdown_type() {
    let (state, _stores) = setup(Duration::from_secs(60));
    let page = state
        .dispatcher
        .recommend(ORIGIN, "  engine ", 0, Some(10))
        .await
        .unwrap();

    let ids: Vec<&str> = page.iter().map(|c| c.provider_id.as_str()).collect();
    assert_eq!(ids, vec!["g1", "g2", "g3"]);
}
