use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};

use pantry_types::api::Claims;
use pantry_types::events::{GatewayCommand, GatewayEvent, TableName};

use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// How long a fresh connection gets to send its Identify frame.
const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-connection subscription set: table -> optional employee filter.
type Subscriptions = Arc<std::sync::RwLock<HashMap<TableName, Option<String>>>>;

/// Handle a single WebSocket connection. The client must identify with
/// a session token, then receives change events for whatever tables it
/// subscribes to. Subscriptions die with the connection.
pub async fn handle_connection(socket: WebSocket, dispatcher: Dispatcher, jwt_secret: String) {
    let (mut sender, mut receiver) = socket.split();

    // Step 1: Wait for Identify command with the session token
    let (employee_id, name) = match wait_for_identify(&mut receiver, &jwt_secret).await {
        Some(id) => id,
        None => {
            warn!("WebSocket client failed to identify, closing");
            return;
        }
    };

    info!("{} ({}) connected to gateway", name, employee_id);

    // Step 2: Send Ready event
    let ready = GatewayEvent::Ready {
        employee_id: employee_id.clone(),
        name: name.clone(),
    };
    if sender
        .send(Message::Text(serde_json::to_string(&ready).unwrap().into()))
        .await
        .is_err()
    {
        return;
    }

    // Subscribe to change broadcasts and relay the matching ones
    let mut broadcast_rx = dispatcher.subscribe();

    // Subscription map shared between the send and recv tasks
    let subscriptions: Subscriptions = Arc::new(std::sync::RwLock::new(HashMap::new()));
    let send_subscriptions = subscriptions.clone();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward matching broadcasts -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let event = match result {
                        Ok(event) => event,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Broadcast receiver lagged by {} events", n);
                            continue;
                        }
                        Err(_) => break,
                    };

                    if !wants_event(&send_subscriptions, &event) {
                        continue;
                    }

                    let text = serde_json::to_string(&event).unwrap();
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from the client
    let name_recv = name.clone();
    let employee_id_recv = employee_id.clone();
    let recv_subscriptions = subscriptions.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(GatewayCommand::Identify { .. }) => {} // Already handled
                    Ok(GatewayCommand::Subscribe { subscriptions }) => {
                        info!(
                            "{} ({}) subscribing to {} tables",
                            name_recv,
                            employee_id_recv,
                            subscriptions.len()
                        );
                        let mut subs = recv_subscriptions
                            .write()
                            .expect("subscription lock poisoned");
                        *subs = subscriptions
                            .into_iter()
                            .map(|s| (s.table, s.employee_id))
                            .collect();
                    }
                    Err(e) => {
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            name_recv,
                            employee_id_recv,
                            e,
                            &text[..text.len().min(200)]
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!("{} ({}) disconnected from gateway", name, employee_id);
}

/// Whether this connection's subscription set matches the event. Change
/// events require a subscription to their table; an employee filter on
/// the subscription further narrows scoped tables to that employee's
/// rows. Non-change events are never broadcast.
fn wants_event(subscriptions: &Subscriptions, event: &GatewayEvent) -> bool {
    let GatewayEvent::Change { table, .. } = event else {
        return false;
    };

    let subs = subscriptions.read().expect("subscription lock poisoned");
    match subs.get(table) {
        None => false,
        Some(None) => true,
        Some(Some(filter)) => event.employee_scope() == Some(filter.as_str()),
    }
}

async fn wait_for_identify(
    receiver: &mut futures_util::stream::SplitStream<WebSocket>,
    jwt_secret: &str,
) -> Option<(String, String)> {
    use jsonwebtoken::{DecodingKey, Validation, decode};

    let timeout = tokio::time::timeout(IDENTIFY_TIMEOUT, async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(GatewayCommand::Identify { token }) =
                    serde_json::from_str::<GatewayCommand>(&text)
                {
                    let token_data = decode::<Claims>(
                        &token,
                        &DecodingKey::from_secret(jwt_secret.as_bytes()),
                        &Validation::default(),
                    )
                    .ok()?;

                    return Some((token_data.claims.sub, token_data.claims.name));
                }
            }
        }
        None
    });

    timeout.await.ok().flatten()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pantry_types::events::ChangeOp;
    use serde_json::json;

    fn subs(entries: &[(TableName, Option<&str>)]) -> Subscriptions {
        Arc::new(std::sync::RwLock::new(
            entries
                .iter()
                .map(|(t, f)| (*t, f.map(str::to_string)))
                .collect(),
        ))
    }

    fn queue_change(employee_id: &str) -> GatewayEvent {
        GatewayEvent::Change {
            table: TableName::CoffeeQueue,
            op: ChangeOp::Insert,
            row: json!({"employee_id": employee_id}),
        }
    }

    #[test]
    fn unsubscribed_tables_are_filtered() {
        let subs = subs(&[(TableName::InventoryItems, None)]);
        assert!(!wants_event(&subs, &queue_change("EMP001")));
    }

    #[test]
    fn unfiltered_subscription_sees_every_row() {
        let subs = subs(&[(TableName::CoffeeQueue, None)]);
        assert!(wants_event(&subs, &queue_change("EMP001")));
        assert!(wants_event(&subs, &queue_change("EMP002")));
    }

    #[test]
    fn employee_filter_narrows_to_own_rows() {
        let subs = subs(&[(TableName::LoginRequests, Some("EMP001"))]);

        let mine = GatewayEvent::Change {
            table: TableName::LoginRequests,
            op: ChangeOp::Update,
            row: json!({"employee_id": "EMP001", "status": "approved"}),
        };
        let theirs = GatewayEvent::Change {
            table: TableName::LoginRequests,
            op: ChangeOp::Update,
            row: json!({"employee_id": "EMP002", "status": "rejected"}),
        };

        assert!(wants_event(&subs, &mine));
        assert!(!wants_event(&subs, &theirs));
    }

    #[test]
    fn ready_events_are_not_broadcast() {
        let subs = subs(&[(TableName::CoffeeQueue, None)]);
        let ready = GatewayEvent::Ready {
            employee_id: "EMP001".into(),
            name: "P".into(),
        };
        assert!(!wants_event(&subs, &ready));
    }
}
