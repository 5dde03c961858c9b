use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS employees (
            id           TEXT PRIMARY KEY,
            employee_id  TEXT NOT NULL UNIQUE,
            name         TEXT NOT NULL,
            role         TEXT NOT NULL DEFAULT 'user'
                         CHECK (role IN ('admin', 'staff', 'user')),
            created_at   TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS accounts (
            id           TEXT PRIMARY KEY,
            email        TEXT NOT NULL UNIQUE,
            password     TEXT NOT NULL,
            employee_id  TEXT NOT NULL UNIQUE REFERENCES employees(employee_id),
            created_at   TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS login_requests (
            id            TEXT PRIMARY KEY,
            employee_id   TEXT NOT NULL REFERENCES employees(employee_id),
            status        TEXT NOT NULL DEFAULT 'pending'
                          CHECK (status IN ('pending', 'approved', 'rejected', 'auto_approved')),
            requested_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
            responded_at  TEXT,
            responded_by  TEXT
        );

        -- One pending request per employee
        CREATE UNIQUE INDEX IF NOT EXISTS idx_login_requests_pending
            ON login_requests(employee_id) WHERE status = 'pending';

        CREATE INDEX IF NOT EXISTS idx_login_requests_status
            ON login_requests(status, requested_at);

        CREATE TABLE IF NOT EXISTS coffee_queue (
            id             TEXT PRIMARY KEY,
            employee_id    TEXT NOT NULL REFERENCES employees(employee_id),
            employee_name  TEXT NOT NULL,
            position       INTEGER NOT NULL DEFAULT 0,
            status         TEXT NOT NULL DEFAULT 'waiting'
                           CHECK (status IN ('waiting', 'served')),
            joined_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
        );

        -- One waiting entry per employee
        CREATE UNIQUE INDEX IF NOT EXISTS idx_coffee_queue_waiting
            ON coffee_queue(employee_id) WHERE status = 'waiting';

        CREATE INDEX IF NOT EXISTS idx_coffee_queue_joined
            ON coffee_queue(status, joined_at);

        CREATE TABLE IF NOT EXISTS inventory_items (
            id            TEXT PRIMARY KEY,
            item_name     TEXT NOT NULL UNIQUE,
            quantity      INTEGER NOT NULL DEFAULT 0 CHECK (quantity >= 0),
            is_available  INTEGER NOT NULL DEFAULT 0,
            last_updated  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS missing_item_reports (
            id           TEXT PRIMARY KEY,
            item_name    TEXT NOT NULL,
            reported_by  TEXT NOT NULL,
            status       TEXT NOT NULL DEFAULT 'pending'
                         CHECK (status IN ('pending', 'resolved')),
            reported_at  TEXT NOT NULL DEFAULT (datetime('now')),
            resolved_at  TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_reports_pending
            ON missing_item_reports(status, reported_at);

        -- Seed the bootstrap staff identity
        INSERT OR IGNORE INTO employees (id, employee_id, name, role)
            VALUES ('00000000-0000-0000-0000-000000000001', 'STAFF001', 'Pantry Staff', 'staff');

        -- Seed the starter pantry stock
        INSERT OR IGNORE INTO inventory_items (id, item_name, quantity, is_available) VALUES
            ('00000000-0000-0000-0000-000000000101', 'Coffee Beans', 10, 1),
            ('00000000-0000-0000-0000-000000000102', 'Milk', 6, 1),
            ('00000000-0000-0000-0000-000000000103', 'Sugar', 8, 1),
            ('00000000-0000-0000-0000-000000000104', 'Tea Bags', 20, 1);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
