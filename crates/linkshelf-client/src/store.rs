//! Bookmark and category state, cached locally and written through to the
//! backend when a user is signed in.
//!
//! Guests keep everything in [`GuestStorage`]. Signed-in users get the remote
//! store as the source of truth; local state is a cache that is rebuilt on
//! every identity change. Mutations never return errors: they log, report
//! through the [`Notifier`] and return `false`.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use linkshelf_types::api::{
    CreateBookmarkRequest, CreateCategoryRequest, UpdateBookmarkRequest, UpdateCategoryRequest,
};
use linkshelf_types::models::{Bookmark, Category};
use linkshelf_types::policy::Entitlement;
use linkshelf_types::validation::{normalize_url, validate_bookmark_name, validate_category_name};

use crate::error::{ClientError, Result};
use crate::guest::GuestStorage;
use crate::mutation::{Mutation, MutationKind, Phase};
use crate::notifier::Notifier;
use crate::remote::Remote;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalBookmark {
    /// Backend row id. Always `None` for guest data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub name: String,
    pub url: String,
}

impl LocalBookmark {
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            url: url.to_string(),
        }
    }
}

impl From<Bookmark> for LocalBookmark {
    fn from(b: Bookmark) -> Self {
        Self {
            id: Some(b.id),
            name: b.site_name,
            url: b.site_url,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    pub categories: HashMap<String, Vec<LocalBookmark>>,
    pub category_order: Vec<String>,
    pub category_emojis: HashMap<String, String>,
    pub category_public_status: HashMap<String, bool>,
}

impl StoreSnapshot {
    pub fn is_empty(&self) -> bool {
        self.category_order.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.categories.contains_key(name)
    }

    pub fn bookmark_count(&self) -> usize {
        self.categories.values().map(Vec::len).sum()
    }

    pub fn private_count(&self) -> usize {
        self.category_public_status
            .values()
            .filter(|public| !**public)
            .count()
    }

    pub fn is_public(&self, name: &str) -> bool {
        self.category_public_status
            .get(name)
            .copied()
            .unwrap_or(true)
    }

    fn insert_category(&mut self, name: &str, is_public: bool, emoji: Option<&str>) {
        self.categories.insert(name.to_string(), Vec::new());
        self.category_order.push(name.to_string());
        self.category_public_status.insert(name.to_string(), is_public);
        if let Some(e) = emoji {
            self.category_emojis.insert(name.to_string(), e.to_string());
        }
    }

    fn remove_category(&mut self, name: &str) {
        self.categories.remove(name);
        self.category_order.retain(|n| n != name);
        self.category_emojis.remove(name);
        self.category_public_status.remove(name);
    }

    /// Moves every map entry for `old` to `new`, keeping its display slot.
    fn rename_category(&mut self, old: &str, new: &str) {
        if let Some(bookmarks) = self.categories.remove(old) {
            self.categories.insert(new.to_string(), bookmarks);
        }
        if let Some(emoji) = self.category_emojis.remove(old) {
            self.category_emojis.insert(new.to_string(), emoji);
        }
        if let Some(public) = self.category_public_status.remove(old) {
            self.category_public_status.insert(new.to_string(), public);
        }
        for name in self.category_order.iter_mut().filter(|n| *n == old) {
            *name = new.to_string();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RemoteCategory {
    id: Uuid,
    order_index: i64,
}

/// Builds local state from backend rows. Categories are ordered by their
/// ordering index; bookmarks attach by category name.
fn build_snapshot(
    mut categories: Vec<Category>,
    bookmarks: Vec<Bookmark>,
) -> (StoreSnapshot, HashMap<String, RemoteCategory>) {
    categories.sort_by_key(|c| c.order_index);

    let mut snapshot = StoreSnapshot::default();
    let mut rows = HashMap::new();
    for c in &categories {
        snapshot.insert_category(&c.name, c.is_public, c.emoji.as_deref());
        rows.insert(
            c.name.clone(),
            RemoteCategory {
                id: c.id,
                order_index: c.order_index,
            },
        );
    }
    for b in bookmarks {
        match snapshot.categories.get_mut(&b.category_name) {
            Some(list) => list.push(b.into()),
            None => debug!("Dropping bookmark {} with unknown category", b.id),
        }
    }
    (snapshot, rows)
}

type Checkpoint = (StoreSnapshot, HashMap<String, RemoteCategory>);

#[derive(Default)]
struct StoreState {
    user_id: Option<Uuid>,
    entitlement: Entitlement,
    snapshot: StoreSnapshot,
    rows: HashMap<String, RemoteCategory>,
    last_mutation: Option<Mutation>,
}

impl StoreState {
    fn checkpoint(&self) -> Checkpoint {
        (self.snapshot.clone(), self.rows.clone())
    }

    fn restore(&mut self, (snapshot, rows): Checkpoint) {
        self.snapshot = snapshot;
        self.rows = rows;
    }

    fn row(&self, name: &str) -> Result<RemoteCategory> {
        self.rows
            .get(name)
            .copied()
            .ok_or_else(|| ClientError::NotFound(format!("Category '{}' not found", name)))
    }

    fn next_order_index(&self) -> i64 {
        self.rows
            .values()
            .map(|r| r.order_index + 1)
            .max()
            .unwrap_or(0)
            .max(self.snapshot.category_order.len() as i64)
    }
}

fn step(m: &mut Mutation, next: Phase) {
    if let Err(e) = m.advance(next) {
        warn!("{:?}: {}", m.kind(), e);
    }
}

pub struct BookmarkStore {
    remote: Arc<dyn Remote>,
    notifier: Arc<dyn Notifier>,
    guest: GuestStorage,
    state: Mutex<StoreState>,
}

impl BookmarkStore {
    /// Starts in guest mode with whatever the guest file holds.
    pub fn new(remote: Arc<dyn Remote>, notifier: Arc<dyn Notifier>, guest: GuestStorage) -> Self {
        let snapshot = match guest.load() {
            Ok(s) => s,
            Err(e) => {
                warn!("Starting with empty guest state: {}", e);
                StoreSnapshot::default()
            }
        };
        Self {
            remote,
            notifier,
            guest,
            state: Mutex::new(StoreState {
                snapshot,
                ..StoreState::default()
            }),
        }
    }

    pub async fn snapshot(&self) -> StoreSnapshot {
        self.state.lock().await.snapshot.clone()
    }

    pub async fn last_mutation(&self) -> Option<Mutation> {
        self.state.lock().await.last_mutation.clone()
    }

    pub async fn is_guest(&self) -> bool {
        self.state.lock().await.user_id.is_none()
    }

    pub async fn entitlement(&self) -> Entitlement {
        self.state.lock().await.entitlement
    }

    pub async fn set_entitlement(&self, entitlement: Entitlement) {
        self.state.lock().await.entitlement = entitlement;
    }

    /// Switches modes. Local state is discarded and rebuilt from the guest
    /// file or the backend.
    pub async fn set_identity(&self, user_id: Option<Uuid>) {
        {
            let mut state = self.state.lock().await;
            if state.user_id == user_id {
                return;
            }
            state.user_id = user_id;
            state.snapshot = StoreSnapshot::default();
            state.rows.clear();
        }
        if let Err(e) = self.reload().await {
            warn!("Failed to load bookmarks: {}", e);
            self.notifier.error(&e.to_string());
        }
    }

    pub async fn reload(&self) -> Result<()> {
        let user_id = self.state.lock().await.user_id;
        let Some(user_id) = user_id else {
            let snapshot = self.guest.load()?;
            self.state.lock().await.snapshot = snapshot;
            return Ok(());
        };

        let categories = self.remote.list_categories().await?;
        let bookmarks = self.remote.list_bookmarks().await?;
        let (snapshot, rows) = build_snapshot(categories, bookmarks);

        let mut state = self.state.lock().await;
        if state.user_id != Some(user_id) {
            debug!("Identity changed during reload, discarding result");
            return Ok(());
        }
        info!(
            "Loaded {} categories and {} bookmarks",
            snapshot.category_order.len(),
            snapshot.bookmark_count()
        );
        state.snapshot = snapshot;
        state.rows = rows;
        Ok(())
    }

    async fn finish(&self, m: Mutation) {
        debug!("{:?} finished as {:?}", m.kind(), m.phase());
        self.state.lock().await.last_mutation = Some(m);
    }

    fn fail(&self, m: &mut Mutation, phase: Phase, err: ClientError) -> bool {
        warn!("{:?} ended {:?}: {}", m.kind(), phase, err);
        self.notifier.error(&err.to_string());
        if let Err(e) = m.fail(phase, &err) {
            warn!("{:?}: {}", m.kind(), e);
        }
        false
    }

    /// Writes the guest file after an in-memory change, undoing the change
    /// if the write fails.
    async fn persist_guest(&self, m: &mut Mutation, previous: Checkpoint) -> bool {
        step(m, Phase::Persisting);
        let snapshot = self.state.lock().await.snapshot.clone();
        match self.guest.save(&snapshot) {
            Ok(()) => {
                step(m, Phase::Confirmed);
                true
            }
            Err(e) => {
                self.state.lock().await.restore(previous);
                self.fail(m, Phase::Reverted, e)
            }
        }
    }

    // -- Bookmarks --

    pub async fn add_bookmark(&self, name: &str, url: &str, category: Option<&str>) -> bool {
        let mut m = Mutation::begin(MutationKind::AddBookmark);
        let ok = self.add_bookmark_inner(&mut m, name, url, category).await;
        self.finish(m).await;
        ok
    }

    async fn add_bookmark_inner(
        &self,
        m: &mut Mutation,
        name: &str,
        url: &str,
        category: Option<&str>,
    ) -> bool {
        let checked = {
            let state = self.state.lock().await;
            check_new_bookmark(&state, name, url, category)
        };
        let (category, url) = match checked {
            Ok(v) => v,
            Err(e) => return self.fail(m, Phase::Rejected, e),
        };

        let user_id = self.state.lock().await.user_id;
        if user_id.is_none() {
            step(m, Phase::OptimisticApply);
            let previous = {
                let mut state = self.state.lock().await;
                let previous = state.checkpoint();
                if let Some(list) = state.snapshot.categories.get_mut(&category) {
                    list.push(LocalBookmark::new(name, &url));
                }
                previous
            };
            return self.persist_guest(m, previous).await;
        }

        step(m, Phase::Persisting);
        let req = CreateBookmarkRequest {
            category_name: category.clone(),
            site_name: name.to_string(),
            site_url: url,
        };
        match self.remote.create_bookmark(&req).await {
            Ok(bookmark) => {
                let mut state = self.state.lock().await;
                if let Some(list) = state.snapshot.categories.get_mut(&category) {
                    list.push(bookmark.into());
                }
                step(m, Phase::Confirmed);
                true
            }
            Err(e) => self.fail(m, Phase::Rejected, e),
        }
    }

    /// Removes the bookmark at `index` right away. If the backend refuses,
    /// local state is rebuilt from a fresh load.
    pub async fn delete_bookmark(&self, category: &str, index: usize) -> bool {
        let mut m = Mutation::begin(MutationKind::DeleteBookmark);
        let ok = self.delete_bookmark_inner(&mut m, category, index).await;
        self.finish(m).await;
        ok
    }

    async fn delete_bookmark_inner(&self, m: &mut Mutation, category: &str, index: usize) -> bool {
        let (removed, previous, guest) = {
            let mut state = self.state.lock().await;
            let previous = state.checkpoint();
            let guest = state.user_id.is_none();
            let Some(list) = state.snapshot.categories.get_mut(category) else {
                drop(state);
                return self.fail(m, Phase::Rejected, not_found_bookmark());
            };
            if index >= list.len() {
                drop(state);
                return self.fail(m, Phase::Rejected, not_found_bookmark());
            }
            step(m, Phase::OptimisticApply);
            (list.remove(index), previous, guest)
        };

        if guest {
            return self.persist_guest(m, previous).await;
        }

        step(m, Phase::Persisting);
        let result = match removed.id {
            Some(id) => self.remote.delete_bookmark(id).await,
            None => Err(not_found_bookmark()),
        };
        match result {
            Ok(()) => {
                step(m, Phase::Confirmed);
                true
            }
            Err(e) => {
                if let Err(reload) = self.reload().await {
                    warn!("Resync after failed delete also failed: {}", reload);
                }
                self.fail(m, Phase::Resynced, e)
            }
        }
    }

    pub async fn update_bookmark(&self, category: &str, index: usize, name: &str, url: &str) -> bool {
        let mut m = Mutation::begin(MutationKind::UpdateBookmark);
        let ok = self.update_bookmark_inner(&mut m, category, index, name, url).await;
        self.finish(m).await;
        ok
    }

    async fn update_bookmark_inner(
        &self,
        m: &mut Mutation,
        category: &str,
        index: usize,
        name: &str,
        url: &str,
    ) -> bool {
        let checked = {
            let state = self.state.lock().await;
            check_bookmark_edit(&state, category, index, name, url)
        };
        let (existing, url) = match checked {
            Ok(v) => v,
            Err(e) => return self.fail(m, Phase::Rejected, e),
        };
        let updated = LocalBookmark {
            id: existing.id,
            name: name.to_string(),
            url,
        };

        let guest = self.state.lock().await.user_id.is_none();
        if guest {
            step(m, Phase::OptimisticApply);
            let previous = {
                let mut state = self.state.lock().await;
                let previous = state.checkpoint();
                replace_bookmark(&mut state.snapshot, category, index, &existing, updated);
                previous
            };
            return self.persist_guest(m, previous).await;
        }

        let Some(id) = existing.id else {
            return self.fail(m, Phase::Rejected, not_found_bookmark());
        };
        step(m, Phase::Persisting);
        let req = UpdateBookmarkRequest {
            site_name: Some(updated.name.clone()),
            site_url: Some(updated.url.clone()),
        };
        match self.remote.update_bookmark(id, &req).await {
            Ok(bookmark) => {
                let mut state = self.state.lock().await;
                replace_bookmark(&mut state.snapshot, category, index, &existing, bookmark.into());
                step(m, Phase::Confirmed);
                true
            }
            Err(e) => self.fail(m, Phase::Rejected, e),
        }
    }

    // -- Categories --

    /// Creates `name`, or renames `editing` to `name` when editing.
    pub async fn create_or_update_category(
        &self,
        name: &str,
        editing: Option<&str>,
        is_public: bool,
        emoji: Option<&str>,
    ) -> bool {
        if let Some(old) = editing {
            return self.update_category(old, name, Some(is_public), emoji).await;
        }
        let mut m = Mutation::begin(MutationKind::CreateCategory);
        let ok = self.create_category_inner(&mut m, name, is_public, emoji).await;
        self.finish(m).await;
        ok
    }

    async fn create_category_inner(
        &self,
        m: &mut Mutation,
        name: &str,
        is_public: bool,
        emoji: Option<&str>,
    ) -> bool {
        let emoji = emoji.filter(|e| !e.is_empty());
        let checked = {
            let state = self.state.lock().await;
            check_new_category(&state, name, is_public, emoji)
        };
        if let Err(e) = checked {
            return self.fail(m, Phase::Rejected, e);
        }

        step(m, Phase::OptimisticApply);
        let (previous, guest, order_index) = {
            let mut state = self.state.lock().await;
            let previous = state.checkpoint();
            let order_index = state.next_order_index();
            state.snapshot.insert_category(name, is_public, emoji);
            (previous, state.user_id.is_none(), order_index)
        };
        if guest {
            return self.persist_guest(m, previous).await;
        }

        step(m, Phase::Persisting);
        let req = CreateCategoryRequest {
            name: name.to_string(),
            emoji: emoji.map(str::to_string),
            is_public,
            order_index,
        };
        match self.remote.create_category(&req).await {
            Ok(category) => {
                self.state.lock().await.rows.insert(
                    category.name.clone(),
                    RemoteCategory {
                        id: category.id,
                        order_index: category.order_index,
                    },
                );
                step(m, Phase::Confirmed);
                true
            }
            Err(e) => {
                self.state.lock().await.restore(previous);
                self.fail(m, Phase::Reverted, e)
            }
        }
    }

    /// Applies a rename, a visibility change and an emoji change in one
    /// write. An empty `emoji` clears it. Returns `true` without writing
    /// when nothing differs.
    pub async fn update_category(
        &self,
        old_name: &str,
        new_name: &str,
        is_public: Option<bool>,
        emoji: Option<&str>,
    ) -> bool {
        let mut m = Mutation::begin(MutationKind::UpdateCategory);
        let ok = self
            .update_category_inner(&mut m, old_name, new_name, is_public, emoji)
            .await;
        self.finish(m).await;
        ok
    }

    async fn update_category_inner(
        &self,
        m: &mut Mutation,
        old_name: &str,
        new_name: &str,
        is_public: Option<bool>,
        emoji: Option<&str>,
    ) -> bool {
        let planned = {
            let state = self.state.lock().await;
            plan_category_update(&state, old_name, new_name, is_public, emoji)
        };
        let req = match planned {
            Ok(req) => req,
            Err(e) => return self.fail(m, Phase::Rejected, e),
        };
        if req.is_empty() {
            step(m, Phase::Confirmed);
            return true;
        }
        self.apply_category_update(m, old_name, req).await
    }

    pub async fn toggle_category_visibility(&self, name: &str) -> bool {
        let mut m = Mutation::begin(MutationKind::ToggleVisibility);
        let planned = {
            let state = self.state.lock().await;
            if state.snapshot.contains(name) {
                let is_public = !state.snapshot.is_public(name);
                plan_category_update(&state, name, name, Some(is_public), None)
            } else {
                Err(not_found_category(name))
            }
        };
        let ok = match planned {
            Ok(req) => self.apply_category_update(&mut m, name, req).await,
            Err(e) => self.fail(&mut m, Phase::Rejected, e),
        };
        self.finish(m).await;
        ok
    }

    async fn apply_category_update(
        &self,
        m: &mut Mutation,
        name: &str,
        req: UpdateCategoryRequest,
    ) -> bool {
        step(m, Phase::OptimisticApply);
        let (previous, guest, row) = {
            let mut state = self.state.lock().await;
            let previous = state.checkpoint();
            let guest = state.user_id.is_none();
            let row = state.row(name);
            apply_update(&mut state, name, &req);
            (previous, guest, row)
        };
        if guest {
            return self.persist_guest(m, previous).await;
        }

        step(m, Phase::Persisting);
        let result = match row {
            Ok(row) => self.remote.update_category(row.id, &req).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(_) => {
                step(m, Phase::Confirmed);
                true
            }
            Err(e) => {
                self.state.lock().await.restore(previous);
                self.fail(m, Phase::Reverted, e)
            }
        }
    }

    /// Deletes the category with its bookmarks. Signed-in users only see the
    /// local change once the backend has confirmed both deletes.
    pub async fn delete_category(&self, name: &str) -> bool {
        let mut m = Mutation::begin(MutationKind::DeleteCategory);
        let ok = self.delete_category_inner(&mut m, name).await;
        self.finish(m).await;
        ok
    }

    async fn delete_category_inner(&self, m: &mut Mutation, name: &str) -> bool {
        let (guest, row) = {
            let state = self.state.lock().await;
            if !state.snapshot.contains(name) {
                drop(state);
                return self.fail(m, Phase::Rejected, not_found_category(name));
            }
            (state.user_id.is_none(), state.row(name))
        };

        if guest {
            step(m, Phase::OptimisticApply);
            let previous = {
                let mut state = self.state.lock().await;
                let previous = state.checkpoint();
                state.snapshot.remove_category(name);
                previous
            };
            return self.persist_guest(m, previous).await;
        }

        step(m, Phase::Persisting);
        let row = match row {
            Ok(row) => row,
            Err(e) => return self.fail(m, Phase::Rejected, e),
        };
        // Children first; the category row cannot go while bookmarks reference it.
        if let Err(e) = self.remote.delete_category_bookmarks(row.id).await {
            return self.fail(m, Phase::Rejected, e);
        }
        if let Err(e) = self.remote.delete_category(row.id).await {
            if let Err(reload) = self.reload().await {
                warn!("Resync after failed category delete also failed: {}", reload);
            }
            return self.fail(m, Phase::Resynced, e);
        }

        let mut state = self.state.lock().await;
        state.snapshot.remove_category(name);
        state.rows.remove(name);
        step(m, Phase::Confirmed);
        true
    }

    /// Moves the category at `from` to `to`. For signed-in users every
    /// category whose position changed gets its ordering index rewritten, one
    /// write at a time. A failed write is logged and the rest still go out.
    pub async fn reorder_categories(&self, from: usize, to: usize) -> bool {
        let mut m = Mutation::begin(MutationKind::Reorder);
        let ok = self.reorder_inner(&mut m, from, to).await;
        self.finish(m).await;
        ok
    }

    async fn reorder_inner(&self, m: &mut Mutation, from: usize, to: usize) -> bool {
        let (previous, guest, order) = {
            let mut state = self.state.lock().await;
            let len = state.snapshot.category_order.len();
            if from >= len || to >= len {
                drop(state);
                return self.fail(
                    m,
                    Phase::Rejected,
                    ClientError::NotFound("Category position out of range".into()),
                );
            }
            if from == to {
                drop(state);
                step(m, Phase::Confirmed);
                return true;
            }
            step(m, Phase::OptimisticApply);
            let previous = state.checkpoint();
            let moved = state.snapshot.category_order.remove(from);
            state.snapshot.category_order.insert(to, moved);
            (previous, state.user_id.is_none(), state.snapshot.category_order.clone())
        };
        if guest {
            return self.persist_guest(m, previous).await;
        }

        step(m, Phase::Persisting);
        let mut failed = 0;
        for (index, name) in order.iter().enumerate() {
            let index = index as i64;
            let row = match self.state.lock().await.row(name) {
                Ok(row) if row.order_index == index => continue,
                Ok(row) => row,
                Err(e) => {
                    warn!("Skipping reorder of '{}': {}", name, e);
                    failed += 1;
                    continue;
                }
            };
            let req = UpdateCategoryRequest {
                order_index: Some(index),
                ..UpdateCategoryRequest::default()
            };
            match self.remote.update_category(row.id, &req).await {
                Ok(_) => {
                    if let Some(r) = self.state.lock().await.rows.get_mut(name) {
                        r.order_index = index;
                    }
                }
                Err(e) => {
                    warn!("Failed to persist position of '{}': {}", name, e);
                    failed += 1;
                }
            }
        }
        if failed > 0 {
            warn!("{} category positions were not saved", failed);
        }
        step(m, Phase::Confirmed);
        true
    }

    // -- Guest migration --

    /// Pushes whatever the guest file holds into the signed-in account, then
    /// clears the guest file. Rows the account already has are skipped.
    pub async fn migrate_guest_data(&self) -> bool {
        let mut m = Mutation::begin(MutationKind::MigrateGuest);
        let ok = self.migrate_inner(&mut m).await;
        self.finish(m).await;
        ok
    }

    async fn migrate_inner(&self, m: &mut Mutation) -> bool {
        if self.state.lock().await.user_id.is_none() {
            return self.fail(m, Phase::Rejected, ClientError::Unauthorized);
        }
        let guest = match self.guest.load() {
            Ok(g) => g,
            Err(e) => return self.fail(m, Phase::Rejected, e),
        };
        if guest.is_empty() {
            step(m, Phase::Confirmed);
            return true;
        }

        step(m, Phase::Persisting);
        let mut next_index = self.state.lock().await.next_order_index();
        let mut failures = 0usize;
        for name in &guest.category_order {
            let req = CreateCategoryRequest {
                name: name.clone(),
                emoji: guest.category_emojis.get(name).cloned(),
                is_public: guest.is_public(name),
                order_index: next_index,
            };
            match self.remote.create_category(&req).await {
                Ok(_) => next_index += 1,
                Err(ClientError::Duplicate(_)) => debug!("Category '{}' already exists", name),
                Err(e) => {
                    warn!("Could not migrate category '{}': {}", name, e);
                    failures += 1;
                    continue;
                }
            }
            for b in guest.categories.get(name).into_iter().flatten() {
                let req = CreateBookmarkRequest {
                    category_name: name.clone(),
                    site_name: b.name.clone(),
                    site_url: b.url.clone(),
                };
                match self.remote.create_bookmark(&req).await {
                    Ok(_) | Err(ClientError::Duplicate(_)) => {}
                    Err(e) => {
                        warn!("Could not migrate bookmark '{}': {}", b.name, e);
                        failures += 1;
                    }
                }
            }
        }

        let reloaded = self.reload().await;
        if failures > 0 {
            let err = ClientError::Remote(format!("{} items could not be moved to your account", failures));
            return self.fail(m, Phase::Resynced, err);
        }
        if let Err(e) = self.guest.clear() {
            warn!("Guest data migrated but not cleared: {}", e);
        }
        if let Err(e) = reloaded {
            warn!("Reload after migration failed: {}", e);
        }
        info!("Migrated {} guest categories", guest.category_order.len());
        step(m, Phase::Confirmed);
        true
    }
}

fn not_found_category(name: &str) -> ClientError {
    ClientError::NotFound(format!("Category '{}' not found", name))
}

fn not_found_bookmark() -> ClientError {
    ClientError::NotFound("Bookmark not found".into())
}

fn check_emoji(state: &StoreState, emoji: Option<&str>) -> Result<()> {
    match emoji {
        Some(e) if !state.entitlement.available_emoji_set().contains(e) => Err(
            ClientError::LimitReached("This emoji is only available on premium".into()),
        ),
        _ => Ok(()),
    }
}

fn private_cap_error() -> ClientError {
    ClientError::LimitReached(
        "Free accounts can have one private category. Upgrade to premium for more.".into(),
    )
}

/// Returns the target category and the normalized URL.
fn check_new_bookmark(
    state: &StoreState,
    name: &str,
    url: &str,
    category: Option<&str>,
) -> Result<(String, String)> {
    validate_bookmark_name(name)?;
    let url = normalize_url(url)?;
    let category = category
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ClientError::NotFound("Please select a category".into()))?;
    let list = state
        .snapshot
        .categories
        .get(category)
        .ok_or_else(|| not_found_category(category))?;

    if !state
        .entitlement
        .can_create_bookmark(state.snapshot.bookmark_count())
    {
        return Err(ClientError::LimitReached(
            "Free accounts are limited to 50 bookmarks. Upgrade to premium for unlimited bookmarks."
                .into(),
        ));
    }
    if list.iter().any(|b| b.name == name && b.url == url) {
        return Err(ClientError::Duplicate(
            "This bookmark already exists in the category".into(),
        ));
    }
    Ok((category.to_string(), url))
}

fn check_bookmark_edit(
    state: &StoreState,
    category: &str,
    index: usize,
    name: &str,
    url: &str,
) -> Result<(LocalBookmark, String)> {
    let list = state
        .snapshot
        .categories
        .get(category)
        .ok_or_else(|| not_found_category(category))?;
    let existing = list.get(index).cloned().ok_or_else(not_found_bookmark)?;
    validate_bookmark_name(name)?;
    let url = normalize_url(url)?;
    let clash = list
        .iter()
        .enumerate()
        .any(|(i, b)| i != index && b.name == name && b.url == url);
    if clash {
        return Err(ClientError::Duplicate(
            "This bookmark already exists in the category".into(),
        ));
    }
    Ok((existing, url))
}

/// Replaces the entry at `index` if it is still the one the edit started from.
fn replace_bookmark(
    snapshot: &mut StoreSnapshot,
    category: &str,
    index: usize,
    expected: &LocalBookmark,
    updated: LocalBookmark,
) {
    let Some(list) = snapshot.categories.get_mut(category) else {
        return;
    };
    match list.get_mut(index) {
        Some(slot) if slot == expected => *slot = updated,
        _ => debug!("Bookmark moved during update, leaving list as is"),
    }
}

fn check_new_category(
    state: &StoreState,
    name: &str,
    is_public: bool,
    emoji: Option<&str>,
) -> Result<()> {
    validate_category_name(name)?;
    if state.snapshot.contains(name) {
        return Err(ClientError::Duplicate(format!(
            "A category named '{}' already exists",
            name
        )));
    }
    check_emoji(state, emoji)?;
    if !is_public
        && !state
            .entitlement
            .can_create_private_category(state.snapshot.private_count())
    {
        return Err(private_cap_error());
    }
    Ok(())
}

/// Works out which fields `update_category` has to write. An empty request
/// means nothing changed.
fn plan_category_update(
    state: &StoreState,
    old_name: &str,
    new_name: &str,
    is_public: Option<bool>,
    emoji: Option<&str>,
) -> Result<UpdateCategoryRequest> {
    let snapshot = &state.snapshot;
    if !snapshot.contains(old_name) {
        return Err(not_found_category(old_name));
    }
    let mut req = UpdateCategoryRequest::default();

    if new_name != old_name {
        validate_category_name(new_name)?;
        if snapshot.contains(new_name) {
            return Err(ClientError::Duplicate(format!(
                "A category named '{}' already exists",
                new_name
            )));
        }
        req.name = Some(new_name.to_string());
    }

    let was_public = snapshot.is_public(old_name);
    if let Some(public) = is_public.filter(|p| *p != was_public) {
        if !public
            && !state
                .entitlement
                .can_create_private_category(snapshot.private_count())
        {
            return Err(private_cap_error());
        }
        req.is_public = Some(public);
    }

    if let Some(e) = emoji {
        let current = snapshot.category_emojis.get(old_name).map(String::as_str);
        let wanted = Some(e).filter(|e| !e.is_empty());
        if wanted != current {
            check_emoji(state, wanted)?;
            req.emoji = Some(e.to_string());
        }
    }
    Ok(req)
}

fn apply_update(state: &mut StoreState, name: &str, req: &UpdateCategoryRequest) {
    let snapshot = &mut state.snapshot;
    if let Some(public) = req.is_public {
        snapshot.category_public_status.insert(name.to_string(), public);
    }
    if let Some(e) = &req.emoji {
        if e.is_empty() {
            snapshot.category_emojis.remove(name);
        } else {
            snapshot.category_emojis.insert(name.to_string(), e.clone());
        }
    }
    if let Some(new_name) = &req.name {
        snapshot.rename_category(name, new_name);
        if let Some(row) = state.rows.remove(name) {
            state.rows.insert(new_name.clone(), row);
        }
    }
}
