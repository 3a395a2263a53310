use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::engine::dispatcher::Dispatcher;
use crate::error::AppError;
use crate::models::provider::Provider;
use crate::models::request::{DailyCount, DispatchRequest, RequestStatus};
use crate::models::worker::{Interaction, Worker};
use crate::store::{RequestFilter, SortOrder};

/// Read-only views. None of these touch offer state.
impl Dispatcher {
    pub async fn detail(&self, id: Uuid) -> Result<DispatchRequest, AppError> {
        self.requests
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("request {id} not found")))
    }

    pub async fn request_count(&self) -> Result<usize, AppError> {
        Ok(self
            .requests
            .query(RequestFilter::All, SortOrder::default())
            .await?
            .len())
    }

    pub async fn open_for_candidate(&self, candidate_id: &str) -> Result<Vec<DispatchRequest>, AppError> {
        self.requests
            .query(
                RequestFilter::PendingFor(candidate_id.to_string()),
                SortOrder::NewestFirst,
            )
            .await
    }

    pub async fn settled_for(&self, actor_id: &str) -> Result<Vec<DispatchRequest>, AppError> {
        self.requests
            .query(
                RequestFilter::SettledFor(actor_id.to_string()),
                SortOrder::NewestFirst,
            )
            .await
    }

    pub async fn completed(&self) -> Result<Vec<DispatchRequest>, AppError> {
        self.requests
            .query(RequestFilter::Completed, SortOrder::NewestFirst)
            .await
    }

    /// Per creation date, oldest first.
    pub async fn daily_counts(&self) -> Result<Vec<DailyCount>, AppError> {
        let requests = self
            .requests
            .query(RequestFilter::All, SortOrder::OldestFirst)
            .await?;

        let mut by_day: BTreeMap<NaiveDate, DailyCount> = BTreeMap::new();
        for request in &requests {
            let date = request.created_at.date_naive();
            let count = by_day.entry(date).or_insert_with(|| empty_count(date));
            tally(count, request.status);
        }
        Ok(by_day.into_values().collect())
    }

    pub async fn overview_for(&self, now: DateTime<Utc>) -> Result<DailyCount, AppError> {
        let date = now.date_naive();
        let requests = self
            .requests
            .query(RequestFilter::CreatedOn(date), SortOrder::OldestFirst)
            .await?;

        let mut count = empty_count(date);
        for request in &requests {
            tally(&mut count, request.status);
        }
        Ok(count)
    }

    /// The requester's newest request that is still open or settled.
    pub async fn active_for_requester(&self, phone: &str) -> Result<Option<DispatchRequest>, AppError> {
        let requests = self
            .requests
            .query(RequestFilter::Requester(phone.to_string()), SortOrder::NewestFirst)
            .await?;
        Ok(requests.into_iter().find(|request| {
            matches!(request.status, RequestStatus::Open | RequestStatus::Settled)
        }))
    }

    pub async fn recent_for_requester(
        &self,
        phone: &str,
        limit: usize,
    ) -> Result<Vec<DispatchRequest>, AppError> {
        let mut requests = self
            .requests
            .query(RequestFilter::Requester(phone.to_string()), SortOrder::NewestFirst)
            .await?;
        requests.truncate(limit);
        Ok(requests)
    }

    pub async fn list_providers(&self, category: Option<&str>) -> Result<Vec<Provider>, AppError> {
        match category {
            Some(category) => self.providers.find_by_category(category).await,
            None => self.providers.list_all().await,
        }
    }

    pub async fn worker_for_garage(&self, garage_name: &str) -> Result<Worker, AppError> {
        self.workers
            .find_by_garage(garage_name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("no worker for garage {garage_name}")))
    }

    pub async fn provider_history(&self, provider_id: &str) -> Result<Vec<Interaction>, AppError> {
        self.history.history(provider_id).await
    }
}

fn empty_count(date: NaiveDate) -> DailyCount {
    DailyCount {
        date,
        total: 0,
        pending: 0,
        in_progress: 0,
        completed: 0,
        closed: 0,
    }
}

fn tally(count: &mut DailyCount, status: RequestStatus) {
    count.total += 1;
    match status {
        RequestStatus::Open => count.pending += 1,
        RequestStatus::Settled => count.in_progress += 1,
        RequestStatus::Fulfilled => count.completed += 1,
        RequestStatus::Closed => count.closed += 1,
    }
}
