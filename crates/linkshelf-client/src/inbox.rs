//! Shared-category inbox with live updates.
//!
//! Push events are treated as hints: an insert triggers a full reload, an
//! update is merged by id. A fixed-interval unread-count poll covers events
//! the push channel dropped.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use linkshelf_types::api::ShareCategoryRequest;
use linkshelf_types::events::{ChangeEvent, ChangeKind, ChangeRecord, Topic};
use linkshelf_types::models::InboxMessage;
use linkshelf_types::validation::{validate_note, validate_username};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::notifier::Notifier;
use crate::remote::Remote;

#[derive(Debug, Default)]
struct FeedState {
    messages: Vec<InboxMessage>,
    unread: u64,
    just_arrived: bool,
    arrivals: u64,
}

impl FeedState {
    fn recount(&mut self) {
        self.unread = self.messages.iter().filter(|m| !m.is_read).count() as u64;
    }
}

struct FeedInner {
    remote: Arc<dyn Remote>,
    notifier: Arc<dyn Notifier>,
    poll_interval: Duration,
    just_arrived_delay: Duration,
    state: Mutex<FeedState>,
    visibility: Notify,
    shutdown: Notify,
}

#[derive(Clone)]
pub struct InboxFeed {
    inner: Arc<FeedInner>,
}

impl InboxFeed {
    pub fn new(remote: Arc<dyn Remote>, notifier: Arc<dyn Notifier>, config: &ClientConfig) -> Self {
        Self {
            inner: Arc::new(FeedInner {
                remote,
                notifier,
                poll_interval: config.poll_interval,
                just_arrived_delay: config.just_arrived_delay,
                state: Mutex::new(FeedState::default()),
                visibility: Notify::new(),
                shutdown: Notify::new(),
            }),
        }
    }

    pub async fn messages(&self) -> Vec<InboxMessage> {
        self.inner.state.lock().await.messages.clone()
    }

    pub async fn unread_count(&self) -> u64 {
        self.inner.state.lock().await.unread
    }

    /// Set for a short while after a new share arrives.
    pub async fn just_arrived(&self) -> bool {
        self.inner.state.lock().await.just_arrived
    }

    pub async fn refresh(&self) -> Result<()> {
        let messages = self.inner.remote.list_inbox().await?;
        let mut state = self.inner.state.lock().await;
        state.messages = messages;
        state.recount();
        Ok(())
    }

    pub async fn refresh_unread_count(&self) -> Result<()> {
        let count = self.inner.remote.unread_count().await?;
        self.inner.state.lock().await.unread = count;
        Ok(())
    }

    /// Call when the app comes back to the foreground.
    pub fn visibility_regained(&self) {
        self.inner.visibility.notify_one();
    }

    /// Ends a running [`run`](Self::run) loop.
    pub fn shutdown(&self) {
        self.inner.shutdown.notify_one();
    }

    pub fn spawn(&self, recipient_id: Uuid) -> JoinHandle<()> {
        let feed = self.clone();
        tokio::spawn(async move { feed.run(recipient_id).await })
    }

    /// Listens for inbox changes and polls the unread count until
    /// [`shutdown`](Self::shutdown). Losing the push channel only leaves
    /// the poll running.
    pub async fn run(&self, recipient_id: Uuid) {
        let topic = Topic::Inbox { recipient_id };
        let mut events = match self.inner.remote.subscribe(topic).await {
            Ok(rx) => Some(rx),
            Err(e) => {
                warn!("Inbox push unavailable, polling only: {}", e);
                None
            }
        };
        if let Err(e) = self.refresh().await {
            warn!("Initial inbox load failed: {}", e);
        }

        let mut poll = tokio::time::interval(self.inner.poll_interval);
        info!("Inbox feed started for {}", recipient_id);
        loop {
            tokio::select! {
                _ = self.inner.shutdown.notified() => break,
                _ = poll.tick() => self.poll_unread().await,
                _ = self.inner.visibility.notified() => self.poll_unread().await,
                event = next_event(&mut events) => match event {
                    Some(event) => self.handle_event(event).await,
                    None => {
                        debug!("Inbox push channel closed");
                        events = None;
                    }
                },
            }
        }
        info!("Inbox feed stopped for {}", recipient_id);
    }

    async fn poll_unread(&self) {
        if let Err(e) = self.refresh_unread_count().await {
            debug!("Unread count poll failed: {}", e);
        }
    }

    pub async fn handle_event(&self, event: ChangeEvent) {
        let ChangeRecord::InboxMessage(message) = event.record else {
            return;
        };
        match event.kind {
            ChangeKind::Insert => self.on_arrival(message).await,
            ChangeKind::Update => {
                let mut state = self.inner.state.lock().await;
                match state.messages.iter_mut().find(|m| m.id == message.id) {
                    Some(slot) => *slot = message,
                    None => debug!("Update for unknown message {}", message.id),
                }
                state.recount();
            }
            ChangeKind::Delete => {
                let mut state = self.inner.state.lock().await;
                state.messages.retain(|m| m.id != message.id);
                state.recount();
            }
        }
    }

    async fn on_arrival(&self, message: InboxMessage) {
        if let Err(e) = self.refresh().await {
            warn!("Inbox reload after new share failed: {}", e);
        }

        let arrival = {
            let mut state = self.inner.state.lock().await;
            state.just_arrived = true;
            state.arrivals += 1;
            state.arrivals
        };
        let inner = self.inner.clone();
        tokio::spawn(async move {
            tokio::time::sleep(inner.just_arrived_delay).await;
            let mut state = inner.state.lock().await;
            // A later arrival restarts the timer.
            if state.arrivals == arrival {
                state.just_arrived = false;
            }
        });

        if self.inner.notifier.notifications_permitted() {
            let sender = message.sender_username.as_deref().unwrap_or("Someone");
            self.inner.notifier.notify(
                "New shared category",
                &format!("{} shared \"{}\" with you", sender, message.category_name),
            );
        }
    }

    pub async fn share_category(
        &self,
        recipient_username: &str,
        category_name: &str,
        note: Option<&str>,
    ) -> bool {
        let username = recipient_username.trim().trim_start_matches('@').to_lowercase();
        let note = note.map(str::trim).filter(|n| !n.is_empty());
        let checked = validate_username(&username).and_then(|_| note.map_or(Ok(()), validate_note));
        if let Err(e) = checked {
            self.inner.notifier.error(&e.to_string());
            return false;
        }

        let req = ShareCategoryRequest {
            recipient_username: username.clone(),
            category_name: category_name.to_string(),
            note: note.map(str::to_string),
        };
        match self.inner.remote.share_category(&req).await {
            Ok(_) => {
                self.inner
                    .notifier
                    .success(&format!("Shared \"{}\" with @{}", category_name, username));
                true
            }
            Err(e) => {
                warn!("Sharing '{}' failed: {}", category_name, e);
                self.inner.notifier.error(&e.to_string());
                false
            }
        }
    }

    pub async fn mark_as_read(&self, id: Uuid) -> bool {
        {
            let mut state = self.inner.state.lock().await;
            let Some(m) = state.messages.iter_mut().find(|m| m.id == id) else {
                return false;
            };
            if m.is_read {
                return true;
            }
            m.is_read = true;
            state.unread = state.unread.saturating_sub(1);
        }

        match self.inner.remote.mark_as_read(id).await {
            Ok(message) => {
                let mut state = self.inner.state.lock().await;
                if let Some(slot) = state.messages.iter_mut().find(|m| m.id == id) {
                    *slot = message;
                }
                true
            }
            Err(e) => {
                let mut state = self.inner.state.lock().await;
                if let Some(slot) = state.messages.iter_mut().find(|m| m.id == id) {
                    slot.is_read = false;
                }
                state.recount();
                drop(state);
                self.fail("mark as read", e);
                false
            }
        }
    }

    pub async fn mark_all_as_read(&self) -> bool {
        let previous = {
            let mut state = self.inner.state.lock().await;
            let previous = state.messages.clone();
            for m in &mut state.messages {
                m.is_read = true;
            }
            state.unread = 0;
            previous
        };

        match self.inner.remote.mark_all_as_read().await {
            Ok(n) => {
                debug!("Marked {} messages as read", n);
                true
            }
            Err(e) => {
                let mut state = self.inner.state.lock().await;
                for m in &mut state.messages {
                    if let Some(p) = previous.iter().find(|p| p.id == m.id) {
                        m.is_read = p.is_read;
                    }
                }
                state.recount();
                drop(state);
                self.fail("mark all as read", e);
                false
            }
        }
    }

    pub async fn delete_message(&self, id: Uuid) -> bool {
        let removed = {
            let mut state = self.inner.state.lock().await;
            let Some(index) = state.messages.iter().position(|m| m.id == id) else {
                return false;
            };
            let message = state.messages.remove(index);
            state.recount();
            (index, message)
        };

        match self.inner.remote.delete_message(id).await {
            Ok(()) => true,
            Err(e) => {
                let (index, message) = removed;
                let mut state = self.inner.state.lock().await;
                let index = index.min(state.messages.len());
                state.messages.insert(index, message);
                state.recount();
                drop(state);
                self.fail("delete message", e);
                false
            }
        }
    }

    fn fail(&self, action: &str, err: ClientError) {
        warn!("Failed to {}: {}", action, err);
        self.inner.notifier.error(&err.to_string());
    }
}

/// Pends forever once the push channel is gone so `select!` keeps polling.
async fn next_event(
    events: &mut Option<tokio::sync::mpsc::UnboundedReceiver<ChangeEvent>>,
) -> Option<ChangeEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
