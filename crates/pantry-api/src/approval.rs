//! The staff side of the login workflow, plus the auto-approval timer.
//!
//! Every terminal transition goes through the store's conditional
//! update, so a staff decision and the timer can race freely: exactly
//! one write lands, the other becomes a no-op.

use std::time::Duration;

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info};
use uuid::Uuid;

use pantry_types::api::{Claims, DecisionResponse};
use pantry_types::events::{ChangeOp, GatewayEvent, TableName};
use pantry_types::models::{LoginRequest, RequestStatus};

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;
use crate::middleware::ensure_staff;

/// All pending requests, oldest first. Staff only.
pub async fn list_pending(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    ensure_staff(&claims)?;

    let requests = blocking(move || {
        state
            .db
            .pending_login_requests()?
            .into_iter()
            .map(|row| row.into_request())
            .collect::<anyhow::Result<Vec<LoginRequest>>>()
    })
    .await?;

    Ok(Json(requests))
}

pub async fn approve(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    decide(state, id, claims, RequestStatus::Approved).await
}

pub async fn reject(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    decide(state, id, claims, RequestStatus::Rejected).await
}

enum DecideOutcome {
    Won(Box<LoginRequest>),
    AlreadyResolved,
    Missing,
}

async fn decide(
    state: AppState,
    id: Uuid,
    claims: Claims,
    status: RequestStatus,
) -> Result<Json<DecisionResponse>, ApiError> {
    ensure_staff(&claims)?;

    let outcome = {
        let state = state.clone();
        blocking(move || {
            match state.db.resolve_login_request(
                &id.to_string(),
                status.as_str(),
                Some(&claims.sub),
            )? {
                Some(row) => Ok(DecideOutcome::Won(Box::new(row.into_request()?))),
                // Lost the conditional update: distinguish a missing
                // request from an already-resolved one
                None => match state.db.get_login_request(&id.to_string())? {
                    Some(_) => Ok(DecideOutcome::AlreadyResolved),
                    None => Ok(DecideOutcome::Missing),
                },
            }
        })
        .await?
    };

    let request = match outcome {
        DecideOutcome::Won(request) => *request,
        DecideOutcome::AlreadyResolved => {
            return Err(ApiError::Conflict("request already resolved".into()));
        }
        DecideOutcome::Missing => return Err(ApiError::NotFound("login request")),
    };

    info!(
        "Login request {} for {} {} by {}",
        request.id,
        request.employee_id,
        status.as_str(),
        request.responded_by.as_deref().unwrap_or("?")
    );

    state.dispatcher.broadcast(GatewayEvent::change(
        TableName::LoginRequests,
        ChangeOp::Update,
        &request,
    ));

    Ok(Json(DecisionResponse {
        id: request.id,
        status: request.status,
    }))
}

/// Spawn the bounded-wait timer for a pending request. The task sleeps
/// for `wait` while watching the change feed; a staff decision arriving
/// first cancels it, a timeout makes it attempt the auto-approve write.
pub fn spawn_watcher(state: AppState, request_id: Uuid, wait: Duration) -> tokio::task::JoinHandle<()> {
    // Subscribe before spawning so a decision broadcast immediately
    // after this call cannot slip past the watcher
    let events = state.dispatcher.subscribe();
    tokio::spawn(watch_request(state, events, request_id, wait))
}

async fn watch_request(
    state: AppState,
    mut events: tokio::sync::broadcast::Receiver<GatewayEvent>,
    request_id: Uuid,
    wait: Duration,
) {
    let sleep = tokio::time::sleep(wait);
    tokio::pin!(sleep);
    let id_str = request_id.to_string();

    loop {
        tokio::select! {
            _ = &mut sleep => break,
            result = events.recv() => match result {
                Ok(GatewayEvent::Change {
                    table: TableName::LoginRequests,
                    op: ChangeOp::Update,
                    row,
                }) if row.get("id").and_then(|v| v.as_str()) == Some(id_str.as_str()) => {
                    // Staff decided first; cancel the countdown
                    return;
                }
                Ok(_) => {}
                // After a lag we may have missed the decision; the
                // conditional write below is a no-op in that case
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => {
                    sleep.as_mut().await;
                    break;
                }
            },
        }
    }

    auto_approve(&state, request_id).await;
}

async fn auto_approve(state: &AppState, request_id: Uuid) {
    let result = {
        let state = state.clone();
        let id = request_id.to_string();
        tokio::task::spawn_blocking(move || {
            state
                .db
                .resolve_login_request(&id, RequestStatus::AutoApproved.as_str(), None)?
                .map(|row| row.into_request())
                .transpose()
        })
        .await
    };

    match result {
        Ok(Ok(Some(request))) => {
            info!("Login request {} auto-approved after timeout", request_id);
            state.dispatcher.broadcast(GatewayEvent::change(
                TableName::LoginRequests,
                ChangeOp::Update,
                &request,
            ));
        }
        // Staff write landed first — nothing to do
        Ok(Ok(None)) => {}
        Ok(Err(e)) => error!("auto-approve write failed for {}: {:#}", request_id, e),
        Err(e) => error!("auto-approve task join error: {}", e),
    }
}

/// Time left before a request auto-approves, given the full wait.
pub fn remaining_wait(wait: Duration, requested_at: DateTime<Utc>) -> Duration {
    let elapsed = (Utc::now() - requested_at).to_std().unwrap_or_default();
    wait.saturating_sub(elapsed)
}

/// Respawn timers for requests that were pending when the server went
/// down, with the remaining wait computed from `requested_at`.
pub async fn resume_watchers(state: AppState) -> Result<usize, ApiError> {
    let pending = {
        let state = state.clone();
        blocking(move || {
            state
                .db
                .pending_login_requests()?
                .into_iter()
                .map(|row| row.into_request())
                .collect::<anyhow::Result<Vec<LoginRequest>>>()
        })
        .await?
    };

    let count = pending.len();
    for request in pending {
        let wait = remaining_wait(state.auto_approve_after, request.requested_at);
        spawn_watcher(state.clone(), request.id, wait);
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AppStateInner;
    use pantry_db::Database;
    use pantry_gateway::dispatcher::Dispatcher;
    use std::sync::Arc;

    fn test_state(auto_approve_after: Duration) -> AppState {
        let db = Database::open_in_memory().unwrap();
        Arc::new(AppStateInner {
            db,
            jwt_secret: "test-secret".into(),
            dispatcher: Dispatcher::new(),
            auto_approve_after,
        })
    }

    fn pending_request(state: &AppState, employee_id: &str) -> LoginRequest {
        state
            .db
            .create_employee(&Uuid::new_v4().to_string(), employee_id, "P", "user")
            .unwrap();
        let (row, created) = state
            .db
            .create_login_request(&Uuid::new_v4().to_string(), employee_id)
            .unwrap();
        assert!(created);
        row.into_request().unwrap()
    }

    #[tokio::test]
    async fn timeout_transitions_to_auto_approved() {
        let state = test_state(Duration::from_millis(50));
        let request = pending_request(&state, "EMP001");
        let mut events = state.dispatcher.subscribe();

        spawn_watcher(state.clone(), request.id, state.auto_approve_after);

        // The update event announces the transition
        let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("no event before timeout")
            .unwrap();
        match event {
            GatewayEvent::Change { table, op, row } => {
                assert_eq!(table, TableName::LoginRequests);
                assert_eq!(op, ChangeOp::Update);
                assert_eq!(
                    row.get("status").and_then(|v| v.as_str()),
                    Some("auto_approved")
                );
            }
            other => panic!("unexpected event: {:?}", other),
        }

        let row = state
            .db
            .get_login_request(&request.id.to_string())
            .unwrap()
            .unwrap();
        assert_eq!(row.status, "auto_approved");
        assert!(row.responded_by.is_none());
    }

    #[tokio::test]
    async fn staff_decision_cancels_the_timer() {
        let state = test_state(Duration::from_secs(60));
        let request = pending_request(&state, "EMP002");

        let handle = spawn_watcher(state.clone(), request.id, state.auto_approve_after);

        // Staff approves and broadcasts, exactly as the handler does
        let row = state
            .db
            .resolve_login_request(&request.id.to_string(), "approved", Some("STAFF001"))
            .unwrap()
            .expect("conditional update should win");
        state.dispatcher.broadcast(GatewayEvent::change(
            TableName::LoginRequests,
            ChangeOp::Update,
            &row.into_request().unwrap(),
        ));

        // The watcher exits without waiting out the 60s
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("watcher did not cancel")
            .unwrap();

        let row = state
            .db
            .get_login_request(&request.id.to_string())
            .unwrap()
            .unwrap();
        assert_eq!(row.status, "approved");
        assert_eq!(row.responded_by.as_deref(), Some("STAFF001"));
    }

    #[tokio::test]
    async fn late_timer_loses_the_race() {
        let state = test_state(Duration::from_millis(20));
        let request = pending_request(&state, "EMP003");

        // Staff resolves before the watcher even starts; the timer's
        // conditional write must be a no-op
        state
            .db
            .resolve_login_request(&request.id.to_string(), "rejected", Some("STAFF001"))
            .unwrap()
            .unwrap();

        let handle = spawn_watcher(state.clone(), request.id, state.auto_approve_after);
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();

        let row = state
            .db
            .get_login_request(&request.id.to_string())
            .unwrap()
            .unwrap();
        assert_eq!(row.status, "rejected");
    }

    #[test]
    fn remaining_wait_clamps_to_zero() {
        let wait = Duration::from_secs(30);
        let fresh = Utc::now();
        let stale = Utc::now() - chrono::Duration::seconds(45);

        assert!(remaining_wait(wait, fresh) <= wait);
        assert_eq!(remaining_wait(wait, stale), Duration::ZERO);
    }
}
