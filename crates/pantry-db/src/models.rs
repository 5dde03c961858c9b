//! Database row types — these map directly to SQLite rows. Timestamps
//! are stored as SQLite text and parsed on the way out; the `into_*`
//! conversions produce the shared domain models.

use anyhow::{Result, anyhow};
use chrono::{DateTime, NaiveDateTime, Utc};
use pantry_types::models::{
    Employee, InventoryItem, LoginRequest, MissingItemReport, QueueEntry, QueueStatus,
    ReportStatus, RequestStatus, Role,
};

pub struct EmployeeRow {
    pub id: String,
    pub employee_id: String,
    pub name: String,
    pub role: String,
    pub created_at: String,
}

pub struct AccountRow {
    pub id: String,
    pub email: String,
    pub password: String,
    pub employee_id: String,
    pub created_at: String,
}

pub struct LoginRequestRow {
    pub id: String,
    pub employee_id: String,
    pub status: String,
    pub requested_at: String,
    pub responded_at: Option<String>,
    pub responded_by: Option<String>,
}

pub struct QueueEntryRow {
    pub id: String,
    pub employee_id: String,
    pub employee_name: String,
    pub position: i64,
    pub status: String,
    pub joined_at: String,
}

pub struct InventoryItemRow {
    pub id: String,
    pub item_name: String,
    pub quantity: i64,
    pub is_available: bool,
    pub last_updated: String,
}

pub struct MissingReportRow {
    pub id: String,
    pub item_name: String,
    pub reported_by: String,
    pub status: String,
    pub reported_at: String,
    pub resolved_at: Option<String>,
}

/// SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS" (optionally with a
/// fractional second) and no timezone. Parse as naive UTC, falling back
/// from RFC 3339.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    s.parse::<DateTime<Utc>>()
        .or_else(|_| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").map(|ndt| ndt.and_utc())
        })
        .map_err(|e| anyhow!("bad timestamp '{}': {}", s, e))
}

impl EmployeeRow {
    pub fn into_employee(self) -> Result<Employee> {
        Ok(Employee {
            id: self.id.parse()?,
            role: Role::parse(&self.role).ok_or_else(|| anyhow!("bad role '{}'", self.role))?,
            employee_id: self.employee_id,
            name: self.name,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

impl LoginRequestRow {
    pub fn into_request(self) -> Result<LoginRequest> {
        Ok(LoginRequest {
            id: self.id.parse()?,
            status: RequestStatus::parse(&self.status)
                .ok_or_else(|| anyhow!("bad request status '{}'", self.status))?,
            employee_id: self.employee_id,
            requested_at: parse_timestamp(&self.requested_at)?,
            responded_at: self.responded_at.as_deref().map(parse_timestamp).transpose()?,
            responded_by: self.responded_by,
        })
    }
}

impl QueueEntryRow {
    pub fn into_entry(self) -> Result<QueueEntry> {
        let status = match self.status.as_str() {
            "waiting" => QueueStatus::Waiting,
            "served" => QueueStatus::Served,
            other => return Err(anyhow!("bad queue status '{}'", other)),
        };
        Ok(QueueEntry {
            id: self.id.parse()?,
            employee_id: self.employee_id,
            employee_name: self.employee_name,
            position: self.position,
            status,
            joined_at: parse_timestamp(&self.joined_at)?,
        })
    }
}

impl InventoryItemRow {
    pub fn into_item(self) -> Result<InventoryItem> {
        Ok(InventoryItem {
            id: self.id.parse()?,
            item_name: self.item_name,
            quantity: self.quantity,
            is_available: self.is_available,
            last_updated: parse_timestamp(&self.last_updated)?,
        })
    }
}

impl MissingReportRow {
    pub fn into_report(self) -> Result<MissingItemReport> {
        let status = match self.status.as_str() {
            "pending" => ReportStatus::Pending,
            "resolved" => ReportStatus::Resolved,
            other => return Err(anyhow!("bad report status '{}'", other)),
        };
        Ok(MissingItemReport {
            id: self.id.parse()?,
            item_name: self.item_name,
            reported_by: self.reported_by,
            status,
            reported_at: parse_timestamp(&self.reported_at)?,
            resolved_at: self.resolved_at.as_deref().map(parse_timestamp).transpose()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sqlite_and_rfc3339_timestamps() {
        assert!(parse_timestamp("2025-06-01 09:30:00").is_ok());
        assert!(parse_timestamp("2025-06-01 09:30:00.123").is_ok());
        assert!(parse_timestamp("2025-06-01T09:30:00Z").is_ok());
        assert!(parse_timestamp("not a time").is_err());
    }
}
