use crate::Database;
use crate::models::{
    AccountRow, EmployeeRow, InventoryItemRow, LoginRequestRow, MissingReportRow, QueueEntryRow,
};
use anyhow::{Result, anyhow};
use rusqlite::{Connection, OptionalExtension, params};

impl Database {
    // -- Employees --

    pub fn get_employee(&self, employee_id: &str) -> Result<Option<EmployeeRow>> {
        self.with_conn(|conn| query_employee(conn, employee_id))
    }

    pub fn create_employee(&self, id: &str, employee_id: &str, name: &str, role: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO employees (id, employee_id, name, role) VALUES (?1, ?2, ?3, ?4)",
                params![id, employee_id, name, role],
            )?;
            Ok(())
        })
    }

    // -- Accounts --

    pub fn create_account(
        &self,
        id: &str,
        email: &str,
        password_hash: &str,
        employee_id: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO accounts (id, email, password, employee_id) VALUES (?1, ?2, ?3, ?4)",
                params![id, email, password_hash, employee_id],
            )?;
            Ok(())
        })
    }

    pub fn get_account_by_employee(&self, employee_id: &str) -> Result<Option<AccountRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, email, password, employee_id, created_at
                     FROM accounts WHERE employee_id = ?1",
                    [employee_id],
                    |row| {
                        Ok(AccountRow {
                            id: row.get(0)?,
                            email: row.get(1)?,
                            password: row.get(2)?,
                            employee_id: row.get(3)?,
                            created_at: row.get(4)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn get_account_by_email(&self, email: &str) -> Result<Option<AccountRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, email, password, employee_id, created_at
                     FROM accounts WHERE email = ?1",
                    [email],
                    |row| {
                        Ok(AccountRow {
                            id: row.get(0)?,
                            email: row.get(1)?,
                            password: row.get(2)?,
                            employee_id: row.get(3)?,
                            created_at: row.get(4)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    // -- Login requests --

    /// Create a pending login request, or hand back the employee's
    /// existing pending one. The bool is true when a new row was
    /// inserted. The connection mutex makes the check-and-insert atomic;
    /// the partial unique index backs it at the schema level.
    pub fn create_login_request(
        &self,
        id: &str,
        employee_id: &str,
    ) -> Result<(LoginRequestRow, bool)> {
        self.with_conn(|conn| {
            if let Some(existing) = query_pending_request_for(conn, employee_id)? {
                return Ok((existing, false));
            }
            conn.execute(
                "INSERT INTO login_requests (id, employee_id) VALUES (?1, ?2)",
                params![id, employee_id],
            )?;
            let row = query_login_request(conn, id)?
                .ok_or_else(|| anyhow!("login request vanished after insert: {}", id))?;
            Ok((row, true))
        })
    }

    pub fn get_login_request(&self, id: &str) -> Result<Option<LoginRequestRow>> {
        self.with_conn(|conn| query_login_request(conn, id))
    }

    /// All pending requests, oldest first — the staff approval panel view.
    pub fn pending_login_requests(&self) -> Result<Vec<LoginRequestRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, employee_id, status, requested_at, responded_at, responded_by
                 FROM login_requests WHERE status = 'pending'
                 ORDER BY requested_at ASC",
            )?;
            let rows = stmt
                .query_map([], map_login_request)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Conditional terminal transition: succeeds only while the request
    /// is still pending, so exactly one writer wins the
    /// approval/auto-approval race. Returns the updated row for the
    /// winner, `None` for the loser.
    pub fn resolve_login_request(
        &self,
        id: &str,
        status: &str,
        responded_by: Option<&str>,
    ) -> Result<Option<LoginRequestRow>> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE login_requests
                 SET status = ?1, responded_at = datetime('now'), responded_by = ?2
                 WHERE id = ?3 AND status = 'pending'",
                params![status, responded_by, id],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            query_login_request(conn, id)
        })
    }

    // -- Coffee queue --

    /// Append a waiting entry. Returns `None` when the employee is
    /// already waiting. The stored position (current count + 1) is
    /// advisory; display order is re-derived from `joined_at`.
    pub fn join_queue(
        &self,
        id: &str,
        employee_id: &str,
        employee_name: &str,
    ) -> Result<Option<QueueEntryRow>> {
        self.with_conn(|conn| {
            if query_waiting_entry_for(conn, employee_id)?.is_some() {
                return Ok(None);
            }
            conn.execute(
                "INSERT INTO coffee_queue (id, employee_id, employee_name, position)
                 VALUES (?1, ?2, ?3,
                         (SELECT COUNT(*) + 1 FROM coffee_queue WHERE status = 'waiting'))",
                params![id, employee_id, employee_name],
            )?;
            let row = query_queue_entry(conn, id)?
                .ok_or_else(|| anyhow!("queue entry vanished after insert: {}", id))?;
            Ok(Some(row))
        })
    }

    /// Remove the employee's waiting entry, returning it. `None` when
    /// they were not in the queue (a no-op leave).
    pub fn leave_queue(&self, employee_id: &str) -> Result<Option<QueueEntryRow>> {
        self.with_conn(|conn| {
            let Some(row) = query_waiting_entry_for(conn, employee_id)? else {
                return Ok(None);
            };
            conn.execute("DELETE FROM coffee_queue WHERE id = ?1", [&row.id])?;
            Ok(Some(row))
        })
    }

    /// The waiting list in authoritative order.
    pub fn waiting_entries(&self) -> Result<Vec<QueueEntryRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, employee_id, employee_name, position, status, joined_at
                 FROM coffee_queue WHERE status = 'waiting'
                 ORDER BY joined_at ASC",
            )?;
            let rows = stmt
                .query_map([], map_queue_entry)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Inventory --

    pub fn list_inventory(&self) -> Result<Vec<InventoryItemRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, item_name, quantity, is_available, last_updated
                 FROM inventory_items ORDER BY item_name ASC",
            )?;
            let rows = stmt
                .query_map([], map_inventory_item)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Apply a signed quantity delta, clamped at zero. `is_available`
    /// is recomputed from the clamped quantity in the same statement.
    pub fn adjust_quantity(&self, id: &str, delta: i64) -> Result<Option<InventoryItemRow>> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE inventory_items
                 SET quantity = MAX(quantity + ?1, 0),
                     is_available = MAX(quantity + ?1, 0) > 0,
                     last_updated = datetime('now')
                 WHERE id = ?2",
                params![delta, id],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            query_inventory_item(conn, id)
        })
    }

    // -- Missing-item reports --

    pub fn create_report(
        &self,
        id: &str,
        item_name: &str,
        reported_by: &str,
    ) -> Result<MissingReportRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO missing_item_reports (id, item_name, reported_by) VALUES (?1, ?2, ?3)",
                params![id, item_name, reported_by],
            )?;
            query_report(conn, id)?.ok_or_else(|| anyhow!("report vanished after insert: {}", id))
        })
    }

    pub fn get_report(&self, id: &str) -> Result<Option<MissingReportRow>> {
        self.with_conn(|conn| query_report(conn, id))
    }

    /// Pending reports, newest first — the staff restock view.
    pub fn pending_reports(&self) -> Result<Vec<MissingReportRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, item_name, reported_by, status, reported_at, resolved_at
                 FROM missing_item_reports WHERE status = 'pending'
                 ORDER BY reported_at DESC",
            )?;
            let rows = stmt
                .query_map([], map_report)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Conditional pending → resolved transition; `None` when the
    /// report was already resolved.
    pub fn resolve_report(&self, id: &str) -> Result<Option<MissingReportRow>> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE missing_item_reports
                 SET status = 'resolved', resolved_at = datetime('now')
                 WHERE id = ?1 AND status = 'pending'",
                [id],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            query_report(conn, id)
        })
    }
}

fn query_employee(conn: &Connection, employee_id: &str) -> Result<Option<EmployeeRow>> {
    let row = conn
        .query_row(
            "SELECT id, employee_id, name, role, created_at
             FROM employees WHERE employee_id = ?1",
            [employee_id],
            |row| {
                Ok(EmployeeRow {
                    id: row.get(0)?,
                    employee_id: row.get(1)?,
                    name: row.get(2)?,
                    role: row.get(3)?,
                    created_at: row.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

fn map_login_request(row: &rusqlite::Row<'_>) -> rusqlite::Result<LoginRequestRow> {
    Ok(LoginRequestRow {
        id: row.get(0)?,
        employee_id: row.get(1)?,
        status: row.get(2)?,
        requested_at: row.get(3)?,
        responded_at: row.get(4)?,
        responded_by: row.get(5)?,
    })
}

fn query_login_request(conn: &Connection, id: &str) -> Result<Option<LoginRequestRow>> {
    let row = conn
        .query_row(
            "SELECT id, employee_id, status, requested_at, responded_at, responded_by
             FROM login_requests WHERE id = ?1",
            [id],
            map_login_request,
        )
        .optional()?;
    Ok(row)
}

fn query_pending_request_for(conn: &Connection, employee_id: &str) -> Result<Option<LoginRequestRow>> {
    let row = conn
        .query_row(
            "SELECT id, employee_id, status, requested_at, responded_at, responded_by
             FROM login_requests WHERE employee_id = ?1 AND status = 'pending'",
            [employee_id],
            map_login_request,
        )
        .optional()?;
    Ok(row)
}

fn map_queue_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<QueueEntryRow> {
    Ok(QueueEntryRow {
        id: row.get(0)?,
        employee_id: row.get(1)?,
        employee_name: row.get(2)?,
        position: row.get(3)?,
        status: row.get(4)?,
        joined_at: row.get(5)?,
    })
}

fn query_queue_entry(conn: &Connection, id: &str) -> Result<Option<QueueEntryRow>> {
    let row = conn
        .query_row(
            "SELECT id, employee_id, employee_name, position, status, joined_at
             FROM coffee_queue WHERE id = ?1",
            [id],
            map_queue_entry,
        )
        .optional()?;
    Ok(row)
}

fn query_waiting_entry_for(conn: &Connection, employee_id: &str) -> Result<Option<QueueEntryRow>> {
    let row = conn
        .query_row(
            "SELECT id, employee_id, employee_name, position, status, joined_at
             FROM coffee_queue WHERE employee_id = ?1 AND status = 'waiting'",
            [employee_id],
            map_queue_entry,
        )
        .optional()?;
    Ok(row)
}

fn map_inventory_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<InventoryItemRow> {
    Ok(InventoryItemRow {
        id: row.get(0)?,
        item_name: row.get(1)?,
        quantity: row.get(2)?,
        is_available: row.get(3)?,
        last_updated: row.get(4)?,
    })
}

fn query_inventory_item(conn: &Connection, id: &str) -> Result<Option<InventoryItemRow>> {
    let row = conn
        .query_row(
            "SELECT id, item_name, quantity, is_available, last_updated
             FROM inventory_items WHERE id = ?1",
            [id],
            map_inventory_item,
        )
        .optional()?;
    Ok(row)
}

fn map_report(row: &rusqlite::Row<'_>) -> rusqlite::Result<MissingReportRow> {
    Ok(MissingReportRow {
        id: row.get(0)?,
        item_name: row.get(1)?,
        reported_by: row.get(2)?,
        status: row.get(3)?,
        reported_at: row.get(4)?,
        resolved_at: row.get(5)?,
    })
}

fn query_report(conn: &Connection, id: &str) -> Result<Option<MissingReportRow>> {
    let row = conn
        .query_row(
            "SELECT id, item_name, reported_by, status, reported_at, resolved_at
             FROM missing_item_reports WHERE id = ?1",
            [id],
            map_report,
        )
        .optional()?;
    Ok(row)
}

#[cfg(test)]
mod tests {
    use crate::Database;

    fn db_with_employee(employee_id: &str) -> Database {
        let db = Database::open_in_memory().unwrap();
        db.create_employee(
            &uuid::Uuid::new_v4().to_string(),
            employee_id,
            "Test Person",
            "user",
        )
        .unwrap();
        db
    }

    #[test]
    fn at_most_one_pending_request_per_employee() {
        let db = db_with_employee("EMP001");

        let (first, created) = db
            .create_login_request(&uuid::Uuid::new_v4().to_string(), "EMP001")
            .unwrap();
        assert!(created);

        // Second attempt hands back the same pending row
        let (second, created) = db
            .create_login_request(&uuid::Uuid::new_v4().to_string(), "EMP001")
            .unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn terminal_status_wins_once() {
        let db = db_with_employee("EMP002");
        let (req, _) = db
            .create_login_request(&uuid::Uuid::new_v4().to_string(), "EMP002")
            .unwrap();

        // Staff approval and the auto-approve timer race for the same
        // row; the conditional update lets exactly one land.
        let staff = db
            .resolve_login_request(&req.id, "approved", Some("STAFF001"))
            .unwrap();
        let timer = db.resolve_login_request(&req.id, "auto_approved", None).unwrap();

        assert!(staff.is_some());
        assert!(timer.is_none());

        let row = db.get_login_request(&req.id).unwrap().unwrap();
        assert_eq!(row.status, "approved");
        assert_eq!(row.responded_by.as_deref(), Some("STAFF001"));
    }

    #[test]
    fn one_waiting_entry_per_employee() {
        let db = db_with_employee("EMP003");

        let first = db
            .join_queue(&uuid::Uuid::new_v4().to_string(), "EMP003", "Test Person")
            .unwrap();
        assert!(first.is_some());

        let second = db
            .join_queue(&uuid::Uuid::new_v4().to_string(), "EMP003", "Test Person")
            .unwrap();
        assert!(second.is_none());

        // After leaving, joining again works
        assert!(db.leave_queue("EMP003").unwrap().is_some());
        assert!(db.leave_queue("EMP003").unwrap().is_none());
        let again = db
            .join_queue(&uuid::Uuid::new_v4().to_string(), "EMP003", "Test Person")
            .unwrap();
        assert!(again.is_some());
    }

    #[test]
    fn waiting_list_ordered_by_joined_at() {
        let db = Database::open_in_memory().unwrap();
        for (i, emp) in ["EMP010", "EMP011", "EMP012"].iter().enumerate() {
            db.create_employee(&uuid::Uuid::new_v4().to_string(), emp, "P", "user")
                .unwrap();
            // Force distinct joined_at values regardless of clock granularity
            let id = uuid::Uuid::new_v4().to_string();
            db.with_conn(|conn| {
                conn.execute(
                    "INSERT INTO coffee_queue (id, employee_id, employee_name, position, joined_at)
                     VALUES (?1, ?2, 'P', ?3, ?4)",
                    rusqlite::params![
                        id,
                        emp,
                        i as i64 + 1,
                        format!("2025-06-01 09:00:0{}.000", i)
                    ],
                )?;
                Ok(())
            })
            .unwrap();
        }

        let entries = db.waiting_entries().unwrap();
        let ids: Vec<&str> = entries.iter().map(|e| e.employee_id.as_str()).collect();
        assert_eq!(ids, ["EMP010", "EMP011", "EMP012"]);
    }

    #[test]
    fn quantity_clamps_at_zero() {
        let db = Database::open_in_memory().unwrap();
        let items = db.list_inventory().unwrap();
        let milk = items.iter().find(|i| i.item_name == "Milk").unwrap();

        let after = db.adjust_quantity(&milk.id, -100).unwrap().unwrap();
        assert_eq!(after.quantity, 0);
        assert!(!after.is_available);

        let after = db.adjust_quantity(&after.id, 3).unwrap().unwrap();
        assert_eq!(after.quantity, 3);
        assert!(after.is_available);

        assert!(db.adjust_quantity("no-such-id", 1).unwrap().is_none());
    }

    #[test]
    fn report_resolves_once() {
        let db = db_with_employee("EMP020");
        let report = db
            .create_report(&uuid::Uuid::new_v4().to_string(), "Milk", "EMP020")
            .unwrap();
        assert_eq!(report.status, "pending");

        assert!(db.resolve_report(&report.id).unwrap().is_some());
        assert!(db.resolve_report(&report.id).unwrap().is_none());
        assert!(db.pending_reports().unwrap().is_empty());
    }
}
