//! Offer state table. Every function here is pure: it inspects the current
//! request and returns the offer list and scalar fields to write, or the
//! reason the move is illegal. Persisting the result is the caller's job.

use chrono::{DateTime, Utc};

use crate::engine::completion;
use crate::error::AppError;
use crate::models::request::{DispatchMode, DispatchRequest, Offer, OfferStatus, RequestPatch};

#[derive(Debug, Clone)]
pub struct Transition {
    pub offers: Vec<Offer>,
    pub patch: RequestPatch,
}

fn offer_index(request: &DispatchRequest, candidate_id: &str) -> Result<usize, AppError> {
    request.offer_index(candidate_id).ok_or_else(|| {
        AppError::NotFound(format!(
            "candidate {candidate_id} has no offer on request {}",
            request.id
        ))
    })
}

fn cancel_pending_except(offers: &mut [Offer], keep: usize) {
    for (idx, offer) in offers.iter_mut().enumerate() {
        if idx != keep && offer.status == OfferStatus::Pending {
            offer.status = OfferStatus::Cancelled;
        }
    }
}

/// First acceptance wins; every other pending offer is cancelled with it.
pub fn accept(request: &DispatchRequest, candidate_id: &str) -> Result<Transition, AppError> {
    let idx = offer_index(request, candidate_id)?;

    if let Some(winner) = request.accepted_offer() {
        let message = if winner.candidate_id == candidate_id {
            format!("request {} is already accepted by this candidate", request.id)
        } else {
            format!("request {} is already accepted by another candidate", request.id)
        };
        return Err(AppError::Conflict(message));
    }

    let status = request.offers[idx].status;
    if status != OfferStatus::Pending {
        return Err(AppError::Conflict(format!(
            "offer for {candidate_id} is {}, not pending",
            status.as_str()
        )));
    }

    let mut offers = request.offers.clone();
    offers[idx].status = OfferStatus::Accepted;
    cancel_pending_except(&mut offers, idx);

    Ok(Transition {
        offers,
        patch: RequestPatch {
            accepted_by: Some(candidate_id.to_string()),
            ..RequestPatch::default()
        },
    })
}

/// A direct request closes on its only rejection; a broadcast one closes once
/// no offer is left pending.
pub fn reject(
    request: &DispatchRequest,
    candidate_id: &str,
    now: DateTime<Utc>,
) -> Result<Transition, AppError> {
    let idx = offer_index(request, candidate_id)?;

    let status = request.offers[idx].status;
    if status != OfferStatus::Pending {
        return Err(AppError::Conflict(format!(
            "offer for {candidate_id} is {}, not pending",
            status.as_str()
        )));
    }

    let mut offers = request.offers.clone();
    offers[idx].status = OfferStatus::Rejected;

    let closes = match request.mode {
        DispatchMode::Direct => true,
        DispatchMode::Broadcast => !offers.iter().any(|o| o.status == OfferStatus::Pending),
    };
    let mut patch = RequestPatch::default();
    if closes {
        cancel_pending_except(&mut offers, idx);
        patch.cancelled_at = Some(now);
    }

    Ok(Transition { offers, patch })
}

/// Hands the job to one of the garage's staff. Re-asserts the garage as the
/// single winner.
pub fn assign_worker(
    request: &DispatchRequest,
    garage_id: &str,
    worker_id: &str,
) -> Result<Transition, AppError> {
    let idx = offer_index(request, garage_id)?;

    if let Some(winner) = request.accepted_offer() {
        if winner.candidate_id != garage_id {
            return Err(AppError::Conflict(format!(
                "request {} is accepted by another candidate",
                request.id
            )));
        }
    }

    match request.offers[idx].status {
        OfferStatus::Pending | OfferStatus::Accepted => {}
        OfferStatus::Completed => return Err(AppError::AlreadyCompleted),
        other => {
            return Err(AppError::Conflict(format!(
                "offer for {garage_id} is {}",
                other.as_str()
            )));
        }
    }

    let mut offers = request.offers.clone();
    offers[idx].status = OfferStatus::Accepted;
    cancel_pending_except(&mut offers, idx);

    Ok(Transition {
        offers,
        patch: RequestPatch {
            accepted_by: Some(garage_id.to_string()),
            assigned_worker: Some(worker_id.to_string()),
            ..RequestPatch::default()
        },
    })
}

/// Completion gate. The actor is either the assigned worker or the holder of
/// the accepted offer. Checks run in a fixed order: party, already completed,
/// code format, code value.
pub fn complete(
    request: &DispatchRequest,
    actor_id: &str,
    code: &str,
    now: DateTime<Utc>,
) -> Result<Transition, AppError> {
    let holder = if request.assigned_worker.as_deref() == Some(actor_id) {
        request.accepted_by.as_deref()
    } else {
        Some(actor_id)
    };

    let idx = holder
        .and_then(|holder| request.offer_index(holder))
        .filter(|&idx| {
            matches!(
                request.offers[idx].status,
                OfferStatus::Accepted | OfferStatus::Completed
            )
        })
        .ok_or_else(|| {
            AppError::Unauthorized(format!("{actor_id} is not party to request {}", request.id))
        })?;

    if request.offers[idx].status == OfferStatus::Completed {
        return Err(AppError::AlreadyCompleted);
    }

    completion::check(code, request.completion_code.as_deref())?;

    let mut offers = request.offers.clone();
    offers[idx].status = OfferStatus::Completed;

    Ok(Transition {
        offers,
        patch: RequestPatch {
            completed_at: Some(now),
            ..RequestPatch::default()
        },
    })
}

/// Broadcast timeout. Only fires if nobody has touched any offer yet;
/// otherwise `None`.
pub fn expire(request: &DispatchRequest, now: DateTime<Utc>) -> Option<Transition> {
    let untouched = !request.offers.is_empty()
        && request
            .offers
            .iter()
            .all(|offer| offer.status == OfferStatus::Pending);
    if !untouched {
        return None;
    }

    let offers = request
        .offers
        .iter()
        .cloned()
        .map(|mut offer| {
            offer.status = OfferStatus::Cancelled;
            offer
        })
        .collect();

    Some(Transition {
        offers,
        patch: RequestPatch {
            cancelled_at: Some(now),
            ..RequestPatch::default()
        },
    })
}
