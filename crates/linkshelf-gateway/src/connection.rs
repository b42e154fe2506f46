use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use linkshelf_types::events::{GatewayCommand, GatewayEvent, Topic};

use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

type Subscriptions = Arc<RwLock<HashSet<Topic>>>;

/// Inbox topics are private to their recipient; reaction counts are public.
pub fn may_subscribe(user_id: Uuid, topic: &Topic) -> bool {
    match topic {
        Topic::Inbox { recipient_id } => *recipient_id == user_id,
        Topic::Reactions { .. } => true,
    }
}

/// Drive one realtime connection. The token was validated at the HTTP
/// upgrade and `user_id` is the caller's profile id.
pub async fn handle_connection(socket: WebSocket, dispatcher: Dispatcher, user_id: Uuid) {
    let (mut sender, mut receiver) = socket.split();

    let ready = GatewayEvent::Ready { user_id };
    if send_event(&mut sender, &ready).await.is_err() {
        return;
    }

    let open = dispatcher.connection_opened(user_id);
    info!("{} connected to realtime gateway ({} open)", user_id, open);

    let mut broadcast_rx = dispatcher.subscribe();

    // Per-connection topic subscriptions (shared between send and recv tasks).
    let subscriptions: Subscriptions = Arc::new(RwLock::new(HashSet::new()));
    let send_subscriptions = subscriptions.clone();

    // Replies that only concern this connection, e.g. refused subscriptions.
    let (direct_tx, mut direct_rx) = mpsc::unbounded_channel::<GatewayEvent>();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

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

                    let wanted = match send_subscriptions.read() {
                        Ok(subs) => subs.contains(&event.topic),
                        Err(_) => break,
                    };
                    if !wanted {
                        continue;
                    }

                    if send_event(&mut sender, &GatewayEvent::Change(event)).await.is_err() {
                        break;
                    }
                }
                reply = direct_rx.recv() => {
                    let Some(reply) = reply else { break };
                    if send_event(&mut sender, &reply).await.is_err() {
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
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let recv_subscriptions = subscriptions.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(text.as_str()) {
                    Ok(cmd) => {
                        if let Some(reply) = handle_command(user_id, cmd, &recv_subscriptions) {
                            let _ = direct_tx.send(reply);
                        }
                    }
                    Err(e) => {
                        warn!(
                            "{} bad command: {} -- raw: {}",
                            user_id,
                            e,
                            text.as_str().chars().take(200).collect::<String>()
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

    dispatcher.connection_closed();
    info!("{} disconnected from realtime gateway", user_id);
}

fn handle_command(
    user_id: Uuid,
    cmd: GatewayCommand,
    subscriptions: &Subscriptions,
) -> Option<GatewayEvent> {
    let Ok(mut subs) = subscriptions.write() else {
        return None;
    };
    match cmd {
        GatewayCommand::Subscribe { topic } => {
            if !may_subscribe(user_id, &topic) {
                warn!("{} refused subscription to {}", user_id, topic);
                return Some(GatewayEvent::SubscribeDenied { topic });
            }
            debug!("{} subscribed to {}", user_id, topic);
            subs.insert(topic);
            None
        }
        GatewayCommand::Unsubscribe { topic } => {
            debug!("{} unsubscribed from {}", user_id, topic);
            subs.remove(&topic);
            None
        }
    }
}

async fn send_event(
    sender: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    event: &GatewayEvent,
) -> Result<(), ()> {
    let text = serde_json::to_string(event).map_err(|e| {
        warn!("Failed to encode gateway event: {}", e);
    })?;
    sender.send(Message::Text(text.into())).await.map_err(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkshelf_types::models::ReactionTarget;

    #[test]
    fn inbox_topics_are_private() {
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();
        assert!(may_subscribe(me, &Topic::Inbox { recipient_id: me }));
        assert!(!may_subscribe(me, &Topic::Inbox { recipient_id: other }));
        assert!(may_subscribe(
            me,
            &Topic::Reactions {
                target: ReactionTarget::Category(other)
            }
        ));
    }

    #[test]
    fn subscribe_then_unsubscribe() {
        let me = Uuid::new_v4();
        let subs: Subscriptions = Arc::new(RwLock::new(HashSet::new()));
        let topic = Topic::Inbox { recipient_id: me };

        assert!(handle_command(me, GatewayCommand::Subscribe { topic }, &subs).is_none());
        assert!(subs.read().unwrap().contains(&topic));

        handle_command(me, GatewayCommand::Unsubscribe { topic }, &subs);
        assert!(subs.read().unwrap().is_empty());
    }

    #[test]
    fn foreign_inbox_subscription_is_denied() {
        let me = Uuid::new_v4();
        let subs: Subscriptions = Arc::new(RwLock::new(HashSet::new()));
        let topic = Topic::Inbox {
            recipient_id: Uuid::new_v4(),
        };
        let reply = handle_command(me, GatewayCommand::Subscribe { topic }, &subs);
        assert!(matches!(reply, Some(GatewayEvent::SubscribeDenied { .. })));
        assert!(subs.read().unwrap().is_empty());
    }
}
