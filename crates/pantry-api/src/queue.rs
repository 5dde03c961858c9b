//! Coffee queue manager: self-enrollment into a wait line with live
//! position and wait estimates. The stored `position` is advisory; the
//! authoritative order is `joined_at` ascending, recomputed on every
//! read.

use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use uuid::Uuid;

use pantry_types::api::{Claims, LeaveQueueResponse, QueueEntryView, QueueTier, QueueView};
use pantry_types::events::{ChangeOp, GatewayEvent, TableName};
use pantry_types::models::QueueEntry;

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;

/// Average time one coffee takes, in minutes.
pub const BREW_TIME_MINUTES: u64 = 3;

/// Display tier thresholds: empty machine is free, up to two people is
/// a short wait, three or more is a long one.
pub fn tier(length: usize) -> QueueTier {
    match length {
        0 => QueueTier::Free,
        1..=2 => QueueTier::Short,
        _ => QueueTier::Long,
    }
}

/// Estimated wait for the entry at the given zero-based rank. The head
/// of the queue waits zero minutes.
pub fn estimated_wait_minutes(rank: usize) -> u64 {
    rank as u64 * BREW_TIME_MINUTES
}

fn build_view(entries: &[QueueEntry], caller: &str) -> QueueView {
    let views: Vec<QueueEntryView> = entries
        .iter()
        .enumerate()
        .map(|(rank, entry)| QueueEntryView {
            id: entry.id,
            employee_id: entry.employee_id.clone(),
            employee_name: entry.employee_name.clone(),
            position: rank + 1,
            joined_at: entry.joined_at,
            estimated_wait_minutes: estimated_wait_minutes(rank),
        })
        .collect();

    let you = views.iter().find(|v| v.employee_id == caller).cloned();
    let length = views.len();
    let tier = tier(length);

    QueueView {
        entries: views,
        length,
        tier,
        tier_label: tier.label().to_string(),
        total_wait_minutes: length as u64 * BREW_TIME_MINUTES,
        you,
    }
}

fn fetch_entries(state: &AppState) -> anyhow::Result<Vec<QueueEntry>> {
    state
        .db
        .waiting_entries()?
        .into_iter()
        .map(|row| row.into_entry())
        .collect()
}

/// The live queue, annotated for the calling employee.
pub async fn get_queue(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let entries = {
        let state = state.clone();
        blocking(move || fetch_entries(&state)).await?
    };
    Ok(Json(build_view(&entries, &claims.sub)))
}

/// Join the queue. 409 when the caller already has a waiting entry.
pub async fn join(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let (inserted, entries) = {
        let state = state.clone();
        let employee_id = claims.sub.clone();
        let employee_name = claims.name.clone();
        blocking(move || {
            let inserted = state
                .db
                .join_queue(&Uuid::new_v4().to_string(), &employee_id, &employee_name)?
                .map(|row| row.into_entry())
                .transpose()?;
            let entries = fetch_entries(&state)?;
            Ok((inserted, entries))
        })
        .await?
    };

    let Some(entry) = inserted else {
        return Err(ApiError::Conflict("already in the coffee queue".into()));
    };

    state.dispatcher.broadcast(GatewayEvent::change(
        TableName::CoffeeQueue,
        ChangeOp::Insert,
        &entry,
    ));

    Ok((StatusCode::CREATED, Json(build_view(&entries, &claims.sub))))
}

/// Leave the queue. A no-op when the caller was not waiting.
pub async fn leave(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let removed = {
        let state = state.clone();
        let employee_id = claims.sub.clone();
        blocking(move || {
            state
                .db
                .leave_queue(&employee_id)?
                .map(|row| row.into_entry())
                .transpose()
        })
        .await?
    };

    if let Some(entry) = &removed {
        state.dispatcher.broadcast(GatewayEvent::change(
            TableName::CoffeeQueue,
            ChangeOp::Delete,
            entry,
        ));
    }

    Ok(Json(LeaveQueueResponse {
        removed: removed.is_some(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pantry_types::models::QueueStatus;

    fn entry(employee_id: &str, joined_offset_secs: i64) -> QueueEntry {
        QueueEntry {
            id: Uuid::new_v4(),
            employee_id: employee_id.into(),
            employee_name: format!("Name of {}", employee_id),
            position: 0,
            status: QueueStatus::Waiting,
            joined_at: Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap()
                + chrono::Duration::seconds(joined_offset_secs),
        }
    }

    #[test]
    fn tier_boundaries() {
        assert_eq!(tier(0), QueueTier::Free);
        assert_eq!(tier(1), QueueTier::Short);
        assert_eq!(tier(2), QueueTier::Short);
        assert_eq!(tier(3), QueueTier::Long);
        assert_eq!(tier(10), QueueTier::Long);
    }

    #[test]
    fn tier_labels() {
        assert_eq!(QueueTier::Free.label(), "Machine is Free");
        assert_eq!(QueueTier::Short.label(), "Short Wait");
        assert_eq!(QueueTier::Long.label(), "Long Wait");
    }

    #[test]
    fn head_of_queue_waits_zero() {
        assert_eq!(estimated_wait_minutes(0), 0);
    }

    #[test]
    fn wait_is_monotonic_in_rank() {
        let waits: Vec<u64> = (0..6).map(estimated_wait_minutes).collect();
        assert!(waits.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(waits[3], 3 * BREW_TIME_MINUTES);
    }

    #[test]
    fn view_ranks_follow_joined_at() {
        let entries = vec![entry("EMP001", 0), entry("EMP002", 10), entry("EMP003", 20)];
        let view = build_view(&entries, "EMP002");

        assert_eq!(view.length, 3);
        assert_eq!(view.tier, QueueTier::Long);
        assert_eq!(view.total_wait_minutes, 9);

        assert_eq!(view.entries[0].position, 1);
        assert_eq!(view.entries[0].estimated_wait_minutes, 0);
        assert_eq!(view.entries[2].estimated_wait_minutes, 6);

        let you = view.you.expect("caller is in the queue");
        assert_eq!(you.employee_id, "EMP002");
        assert_eq!(you.position, 2);
        assert_eq!(you.estimated_wait_minutes, 3);
    }

    #[test]
    fn view_for_bystander_has_no_membership() {
        let entries = vec![entry("EMP001", 0)];
        let view = build_view(&entries, "EMP999");
        assert!(view.you.is_none());
        assert_eq!(view.tier, QueueTier::Short);
    }

    #[test]
    fn empty_queue_is_free() {
        let view = build_view(&[], "EMP001");
        assert_eq!(view.tier, QueueTier::Free);
        assert_eq!(view.tier_label, "Machine is Free");
        assert_eq!(view.total_wait_minutes, 0);
    }
}
