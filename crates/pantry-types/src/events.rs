use serde::{Deserialize, Serialize};

/// Logical tables observable through the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableName {
    LoginRequests,
    CoffeeQueue,
    InventoryItems,
    MissingItemReports,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
}

/// Events sent over the WebSocket gateway.
///
/// A `Change` carries the affected row as JSON, but observers are
/// expected to refetch the relevant result set rather than patch local
/// state from the payload — the row is a hint, the store is the truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { employee_id: String, name: String },

    /// A watched table's row was inserted, updated, or deleted
    Change {
        table: TableName,
        op: ChangeOp,
        row: serde_json::Value,
    },
}

impl GatewayEvent {
    /// Build a `Change` from any serializable row.
    pub fn change<T: Serialize>(table: TableName, op: ChangeOp, row: &T) -> Self {
        Self::Change {
            table,
            op,
            row: serde_json::to_value(row).unwrap_or(serde_json::Value::Null),
        }
    }

    /// The employee this event is scoped to, for filtered subscriptions.
    /// Login-request and queue rows are per-employee; inventory and
    /// report events are global and return `None`.
    pub fn employee_scope(&self) -> Option<&str> {
        match self {
            Self::Change {
                table: TableName::LoginRequests | TableName::CoffeeQueue,
                row,
                ..
            } => row.get("employee_id").and_then(|v| v.as_str()),
            _ => None,
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Replace this connection's subscription set. Only change events
    /// for subscribed tables are forwarded; a subscription with an
    /// `employee_id` filter narrows a table to one employee's rows.
    Subscribe { subscriptions: Vec<TableSubscription> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSubscription {
    pub table: TableName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employee_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn change_event_scope() {
        let scoped = GatewayEvent::Change {
            table: TableName::LoginRequests,
            op: ChangeOp::Update,
            row: json!({"id": "x", "employee_id": "EMP001", "status": "approved"}),
        };
        assert_eq!(scoped.employee_scope(), Some("EMP001"));

        let global = GatewayEvent::Change {
            table: TableName::InventoryItems,
            op: ChangeOp::Update,
            row: json!({"id": "y", "employee_id": "EMP001"}),
        };
        assert_eq!(global.employee_scope(), None);
    }

    #[test]
    fn command_wire_format() {
        let cmd: GatewayCommand = serde_json::from_str(
            r#"{"type":"Subscribe","data":{"subscriptions":[{"table":"coffee_queue"}]}}"#,
        )
        .unwrap();
        match cmd {
            GatewayCommand::Subscribe { subscriptions } => {
                assert_eq!(subscriptions.len(), 1);
                assert_eq!(subscriptions[0].table, TableName::CoffeeQueue);
                assert!(subscriptions[0].employee_id.is_none());
            }
            _ => panic!("wrong variant"),
        }
    }
}
