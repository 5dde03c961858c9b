//! Pantry inventory and missing-item reports. Counters are clamped at
//! zero in the store; `is_available` is always recomputed from the
//! clamped quantity, never written independently.

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use pantry_types::api::{AdjustQuantityRequest, Claims, ReportMissingRequest};
use pantry_types::events::{ChangeOp, GatewayEvent, TableName};
use pantry_types::models::{InventoryItem, MissingItemReport};

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;
use crate::middleware::ensure_staff;

/// Current stock levels, alphabetical.
pub async fn list_items(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let items = blocking(move || {
        state
            .db
            .list_inventory()?
            .into_iter()
            .map(|row| row.into_item())
            .collect::<anyhow::Result<Vec<InventoryItem>>>()
    })
    .await?;

    Ok(Json(items))
}

/// Apply a signed quantity delta. Staff only; the store clamps at zero.
pub async fn adjust(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<AdjustQuantityRequest>,
) -> Result<impl IntoResponse, ApiError> {
    ensure_staff(&claims)?;

    let item = {
        let state = state.clone();
        blocking(move || {
            state
                .db
                .adjust_quantity(&id.to_string(), req.delta)?
                .map(|row| row.into_item())
                .transpose()
        })
        .await?
        .ok_or(ApiError::NotFound("inventory item"))?
    };

    state.dispatcher.broadcast(GatewayEvent::change(
        TableName::InventoryItems,
        ChangeOp::Update,
        &item,
    ));

    Ok(Json(item))
}

/// Pending missing-item reports, newest first. Staff only.
pub async fn list_reports(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    ensure_staff(&claims)?;

    let reports = blocking(move || {
        state
            .db
            .pending_reports()?
            .into_iter()
            .map(|row| row.into_report())
            .collect::<anyhow::Result<Vec<MissingItemReport>>>()
    })
    .await?;

    Ok(Json(reports))
}

/// Report an item as missing or in need of restocking. Open to every
/// authenticated employee; the reporter comes from the session.
pub async fn create_report(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ReportMissingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let item_name = validate_item_name(&req.item_name)?;

    let report = {
        let state = state.clone();
        let reported_by = claims.sub.clone();
        blocking(move || {
            state
                .db
                .create_report(&Uuid::new_v4().to_string(), &item_name, &reported_by)?
                .into_report()
        })
        .await?
    };

    state.dispatcher.broadcast(GatewayEvent::change(
        TableName::MissingItemReports,
        ChangeOp::Insert,
        &report,
    ));

    Ok((StatusCode::CREATED, Json(report)))
}

/// Mark a report resolved. Staff only; 409 when it already was.
pub async fn resolve_report(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    ensure_staff(&claims)?;

    enum Outcome {
        Resolved(Box<MissingItemReport>),
        AlreadyResolved,
        Missing,
    }

    let outcome = {
        let state = state.clone();
        blocking(move || {
            match state.db.resolve_report(&id.to_string())? {
                Some(row) => Ok(Outcome::Resolved(Box::new(row.into_report()?))),
                // Distinguish a missing report from an already-resolved one
                None => match state.db.get_report(&id.to_string())? {
                    Some(_) => Ok(Outcome::AlreadyResolved),
                    None => Ok(Outcome::Missing),
                },
            }
        })
        .await?
    };

    let report = match outcome {
        Outcome::Resolved(report) => *report,
        Outcome::AlreadyResolved => {
            return Err(ApiError::Conflict("report already resolved".into()));
        }
        Outcome::Missing => return Err(ApiError::NotFound("report")),
    };

    state.dispatcher.broadcast(GatewayEvent::change(
        TableName::MissingItemReports,
        ChangeOp::Update,
        &report,
    ));

    Ok(Json(report))
}

fn validate_item_name(raw: &str) -> Result<String, ApiError> {
    let name = raw.trim().to_string();
    if name.is_empty() || name.len() > 100 {
        return Err(ApiError::Validation(
            "item name must be 1-100 characters".into(),
        ));
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_name_bounds() {
        assert_eq!(validate_item_name(" Milk ").unwrap(), "Milk");
        assert!(validate_item_name("").is_err());
        assert!(validate_item_name("   ").is_err());
        assert!(validate_item_name(&"x".repeat(101)).is_err());
    }
}
