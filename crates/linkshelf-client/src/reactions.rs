use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use linkshelf_types::events::Topic;
use linkshelf_types::models::{ReactionSummary, ReactionTarget};

use crate::notifier::Notifier;
use crate::remote::Remote;

/// What the aggregate looks like after the current user toggles `emoji`:
/// the same emoji as their existing reaction removes it, a different one
/// replaces it.
pub fn apply_toggle(current: &[ReactionSummary], emoji: &str) -> Vec<ReactionSummary> {
    let mut next = current.to_vec();
    let previous = next
        .iter()
        .find(|s| s.reacted_by_me)
        .map(|s| s.emoji.clone());

    if let Some(prev) = &previous {
        if let Some(s) = next.iter_mut().find(|s| &s.emoji == prev) {
            s.count = s.count.saturating_sub(1);
            s.reacted_by_me = false;
        }
        next.retain(|s| s.count > 0);
    }

    if previous.as_deref() != Some(emoji) {
        match next.iter_mut().find(|s| s.emoji == emoji) {
            Some(s) => {
                s.count += 1;
                s.reacted_by_me = true;
            }
            None => next.push(ReactionSummary {
                emoji: emoji.to_string(),
                count: 1,
                reacted_by_me: true,
            }),
        }
    }
    next
}

enum Listener {
    /// Reserved while the first load and the subscribe are in flight.
    Connecting,
    Running(JoinHandle<()>),
}

impl Listener {
    fn is_live(&self) -> bool {
        match self {
            Self::Connecting => true,
            Self::Running(handle) => !handle.is_finished(),
        }
    }
}

struct BoardInner {
    remote: Arc<dyn Remote>,
    notifier: Arc<dyn Notifier>,
    entries: Mutex<HashMap<ReactionTarget, Vec<ReactionSummary>>>,
    listeners: Mutex<HashMap<ReactionTarget, Listener>>,
}

impl BoardInner {
    async fn refresh(&self, target: ReactionTarget) {
        match self.remote.list_reactions(target).await {
            Ok(reactions) => {
                self.entries.lock().await.insert(target, reactions);
            }
            Err(e) => warn!("Failed to load reactions for {}: {}", target, e),
        }
    }
}

/// Reaction aggregates for whatever targets are currently on screen.
#[derive(Clone)]
pub struct ReactionBoard {
    inner: Arc<BoardInner>,
}

impl ReactionBoard {
    pub fn new(remote: Arc<dyn Remote>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            inner: Arc::new(BoardInner {
                remote,
                notifier,
                entries: Mutex::new(HashMap::new()),
                listeners: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub async fn reactions(&self, target: ReactionTarget) -> Vec<ReactionSummary> {
        self.inner
            .entries
            .lock()
            .await
            .get(&target)
            .cloned()
            .unwrap_or_default()
    }

    /// Loads the aggregate for `target` and listens for changes to it.
    /// Returns `false` when a listener already exists or is being set up.
    pub async fn ensure_subscribed(&self, target: ReactionTarget) -> bool {
        {
            let mut listeners = self.inner.listeners.lock().await;
            if listeners.get(&target).is_some_and(Listener::is_live) {
                return false;
            }
            listeners.insert(target, Listener::Connecting);
        }

        self.inner.refresh(target).await;
        let mut rx = match self.inner.remote.subscribe(Topic::Reactions { target }).await {
            Ok(rx) => rx,
            Err(e) => {
                debug!("No live reactions for {}: {}", target, e);
                let mut listeners = self.inner.listeners.lock().await;
                if matches!(listeners.get(&target), Some(Listener::Connecting)) {
                    listeners.remove(&target);
                }
                return false;
            }
        };

        let mut listeners = self.inner.listeners.lock().await;
        // Torn down while connecting.
        if !matches!(listeners.get(&target), Some(Listener::Connecting)) {
            return false;
        }
        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                debug!("Reaction {:?} on {}", event.kind, target);
                inner.refresh(target).await;
            }
            debug!("Reaction listener for {} closed", target);
        });
        listeners.insert(target, Listener::Running(handle));
        true
    }

    /// Shows the toggled state right away and replaces it with the
    /// backend's aggregate once the write lands.
    pub async fn toggle(&self, target: ReactionTarget, emoji: &str) -> bool {
        let previous = {
            let mut entries = self.inner.entries.lock().await;
            let current = entries.entry(target).or_default();
            let previous = current.clone();
            *current = apply_toggle(&previous, emoji);
            previous
        };

        match self.inner.remote.toggle_reaction(target, emoji).await {
            Ok(resp) => {
                self.inner.entries.lock().await.insert(target, resp.reactions);
                true
            }
            Err(e) => {
                warn!("Reaction toggle on {} failed: {}", target, e);
                self.inner.entries.lock().await.insert(target, previous);
                self.inner.notifier.error(&e.to_string());
                false
            }
        }
    }

    pub async fn listener_count(&self) -> usize {
        self.inner.listeners.lock().await.len()
    }

    /// Stops every listener and forgets all aggregates.
    pub async fn teardown(&self) {
        for (_, listener) in self.inner.listeners.lock().await.drain() {
            if let Listener::Running(handle) = listener {
                handle.abort();
            }
        }
        self.inner.entries.lock().await.clear();
    }
}
