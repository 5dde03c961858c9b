use std::sync::Arc;

use tokio::sync::broadcast;

use pantry_types::events::GatewayEvent;

/// Fan-out hub for change notifications. Every mutation handler
/// broadcasts here after a successful store write; every WebSocket
/// connection (and the auto-approval timers) holds a receiver.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    broadcast_tx: broadcast::Sender<GatewayEvent>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner { broadcast_tx }),
        }
    }

    /// Subscribe to change events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Broadcast an event to all subscribers. A send with no receivers
    /// is not an error — nobody was watching.
    pub fn broadcast(&self, event: GatewayEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pantry_types::events::{ChangeOp, TableName};
    use serde_json::json;

    #[tokio::test]
    async fn broadcast_reaches_all_subscribers() {
        let dispatcher = Dispatcher::new();
        let mut rx_a = dispatcher.subscribe();
        let mut rx_b = dispatcher.subscribe();

        dispatcher.broadcast(GatewayEvent::Change {
            table: TableName::CoffeeQueue,
            op: ChangeOp::Insert,
            row: json!({"employee_id": "EMP001"}),
        });

        for rx in [&mut rx_a, &mut rx_b] {
            match rx.recv().await.unwrap() {
                GatewayEvent::Change { table, op, .. } => {
                    assert_eq!(table, TableName::CoffeeQueue);
                    assert_eq!(op, ChangeOp::Insert);
                }
                other => panic!("unexpected event: {:?}", other),
            }
        }
    }

    #[test]
    fn broadcast_without_subscribers_is_fine() {
        let dispatcher = Dispatcher::new();
        dispatcher.broadcast(GatewayEvent::Ready {
            employee_id: "EMP001".into(),
            name: "Nobody".into(),
        });
    }
}
