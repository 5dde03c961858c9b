use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{LoginRequest, RequestStatus, Role};

// -- JWT Claims --

/// Session claims shared by the REST middleware and the WebSocket
/// gateway. The canonical definition lives here so both crates agree on
/// the token layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Employee id (e.g. "EMP001"), not the row uuid.
    pub sub: String,
    pub name: String,
    pub role: Role,
    pub exp: usize,
}

// -- Identity (staff accounts) --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub employee_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

/// A granted session: the context object handed to every authenticated
/// call. Created on sign-in, staff bypass, or an approved login request;
/// torn down by discarding the token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub employee_id: String,
    pub name: String,
    pub role: Role,
    pub token: String,
}

// -- Employee login workflow --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmployeeLoginRequest {
    pub employee_id: String,
    pub name: String,
}

/// Outcome of an employee login attempt: staff bypass grants a session
/// immediately, everyone else waits on a pending request.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LoginOutcome {
    Granted { session: Session },
    Pending { request_id: Uuid, expires_in_secs: u64 },
}

/// Poll/exchange response for a login request. `session` is present
/// exactly when the status grants one.
#[derive(Debug, Serialize, Deserialize)]
pub struct RequestStatusResponse {
    #[serde(flatten)]
    pub request: LoginRequest,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<Session>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DecisionResponse {
    pub id: Uuid,
    pub status: RequestStatus,
}

// -- Coffee queue --

/// Display tier derived from queue length. Thresholds are policy
/// constants, not invariants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueTier {
    Free,
    Short,
    Long,
}

impl QueueTier {
    pub fn label(self) -> &'static str {
        match self {
            QueueTier::Free => "Machine is Free",
            QueueTier::Short => "Short Wait",
            QueueTier::Long => "Long Wait",
        }
    }
}

/// A waiting entry annotated with its live rank. `position` here is the
/// 1-based rank in `joined_at` order, not the stored advisory value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntryView {
    pub id: Uuid,
    pub employee_id: String,
    pub employee_name: String,
    pub position: usize,
    pub joined_at: chrono::DateTime<chrono::Utc>,
    pub estimated_wait_minutes: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QueueView {
    pub entries: Vec<QueueEntryView>,
    pub length: usize,
    pub tier: QueueTier,
    pub tier_label: String,
    pub total_wait_minutes: u64,
    /// The caller's own entry, when they are in the queue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub you: Option<QueueEntryView>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LeaveQueueResponse {
    pub removed: bool,
}

// -- Inventory & missing-item reports --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdjustQuantityRequest {
    pub delta: i64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportMissingRequest {
    pub item_name: String,
}

// -- Errors --

/// Uniform error body: a single user-displayable message.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
