use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Staff member of a garage. `garage_name` is the display name of the owning
/// provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    pub id: String,
    pub name: String,
    pub phone: String,
    pub garage_name: String,
}

/// Entry in a provider's history log, written when it accepts a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub provider_id: String,
    pub request_id: Uuid,
    pub requester_name: String,
    pub breakdown_type: String,
    pub accepted_at: DateTime<Utc>,
}
