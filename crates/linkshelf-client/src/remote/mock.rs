use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;
use uuid::Uuid;

use linkshelf_types::api::{
    AuthResponse, CreateBookmarkRequest, CreateCategoryRequest, PublicProfilePage,
    ShareCategoryRequest, SubscriptionSnapshot, ToggleReactionResponse, UpdateBookmarkRequest,
    UpdateCategoryRequest, UpdateProfileRequest,
};
use linkshelf_types::events::{ChangeEvent, Topic};
use linkshelf_types::models::{
    Bookmark, Category, InboxMessage, PublicProfile, ReactionSummary, ReactionTarget,
    SharedCategoryView, SubscriptionStatus, Tier, UserProfile,
};

use super::Remote;
use crate::error::{ClientError, Result};
use crate::reactions::apply_toggle;

#[derive(Default)]
pub(crate) struct MockState {
    pub categories: Vec<Category>,
    pub bookmarks: Vec<Bookmark>,
    pub inbox: Vec<InboxMessage>,
    pub reactions: HashMap<ReactionTarget, Vec<ReactionSummary>>,
    pub profile: Option<UserProfile>,
    pub token: Option<String>,
    pub unread_override: Option<u64>,
}

/// In-memory backend. `should_fail` breaks every call; `fail_on` breaks
/// only the named operations.
pub(crate) struct MockRemote {
    pub user_id: Uuid,
    pub state: Mutex<MockState>,
    pub should_fail: AtomicBool,
    pub fail_on: Mutex<HashSet<&'static str>>,
    pub calls: Mutex<Vec<&'static str>>,
    pub subscribers: Mutex<Vec<(Topic, mpsc::UnboundedSender<ChangeEvent>)>>,
    pub profile_delay: Mutex<Option<Duration>>,
    pub mark_read_delay: Mutex<Option<Duration>>,
    pub subscribe_delay: Mutex<Option<Duration>>,
}

impl MockRemote {
    pub fn new() -> Self {
        Self {
            user_id: Uuid::new_v4(),
            state: Mutex::new(MockState::default()),
            should_fail: AtomicBool::new(false),
            fail_on: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
            subscribers: Mutex::new(Vec::new()),
            profile_delay: Mutex::new(None),
            mark_read_delay: Mutex::new(None),
            subscribe_delay: Mutex::new(None),
        }
    }

    pub fn failing() -> Self {
        let mock = Self::new();
        mock.should_fail.store(true, Ordering::SeqCst);
        mock
    }

    pub fn set_failing(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::SeqCst);
    }

    pub fn fail_on(&self, op: &'static str) {
        self.fail_on.lock().unwrap().insert(op);
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, op: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == op).count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Pushes an event to every live subscriber of its topic.
    pub fn emit(&self, event: ChangeEvent) {
        let subs = self.subscribers.lock().unwrap();
        for (topic, tx) in subs.iter() {
            if *topic == event.topic {
                let _ = tx.send(event.clone());
            }
        }
    }

    pub fn profile(&self, tier: Tier, status: SubscriptionStatus) -> UserProfile {
        UserProfile {
            id: self.user_id,
            auth_id: Uuid::new_v4(),
            email: "mock@example.com".into(),
            username: Some("mock".into()),
            display_name: None,
            bio: None,
            avatar_url: None,
            social_links: vec![],
            subscription_tier: tier,
            subscription_status: status,
            stripe_customer_id: None,
            stripe_subscription_id: None,
            subscription_end: None,
            created_at: Utc::now(),
        }
    }

    pub fn message(&self, category_name: &str) -> InboxMessage {
        InboxMessage {
            id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
            sender_username: Some("friend".into()),
            recipient_id: self.user_id,
            category_name: category_name.into(),
            category_emoji: None,
            category_is_public: true,
            note: None,
            share_token: Uuid::new_v4().simple().to_string(),
            is_read: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn guard(&self, op: &'static str) -> Result<()> {
        self.calls.lock().unwrap().push(op);
        if self.should_fail.load(Ordering::SeqCst) || self.fail_on.lock().unwrap().contains(op) {
            return Err(ClientError::Remote(format!("{} failed", op)));
        }
        Ok(())
    }

    fn auth(&self, email: &str, display_name: Option<&str>) -> AuthResponse {
        AuthResponse {
            user_id: Uuid::new_v4(),
            email: email.into(),
            display_name: display_name.map(str::to_string),
            token: "mock-token".into(),
        }
    }
}

#[async_trait]
impl Remote for MockRemote {
    fn set_token(&self, token: Option<String>) {
        self.state.lock().unwrap().token = token;
    }

    async fn sign_up(
        &self,
        email: &str,
        _password: &str,
        display_name: Option<&str>,
    ) -> Result<AuthResponse> {
        self.guard("sign_up")?;
        Ok(self.auth(email, display_name))
    }

    async fn sign_in(&self, email: &str, _password: &str) -> Result<AuthResponse> {
        self.guard("sign_in")?;
        Ok(self.auth(email, None))
    }

    async fn request_password_recovery(&self, _email: &str) -> Result<String> {
        self.guard("request_password_recovery")?;
        Ok("recovery-token".into())
    }

    async fn reset_password(&self, _recovery_token: &str, _password: &str) -> Result<AuthResponse> {
        self.guard("reset_password")?;
        Ok(self.auth("mock@example.com", None))
    }

    async fn fetch_profile(&self) -> Result<Option<UserProfile>> {
        let delay = *self.profile_delay.lock().unwrap();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        self.guard("fetch_profile")?;
        Ok(self.state.lock().unwrap().profile.clone())
    }

    async fn create_profile(&self, display_name: Option<&str>) -> Result<UserProfile> {
        self.guard("create_profile")?;
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = &state.profile {
            return Ok(existing.clone());
        }
        let mut profile = self.profile(Tier::Free, SubscriptionStatus::Inactive);
        profile.username = None;
        profile.display_name = display_name.map(str::to_string);
        state.profile = Some(profile.clone());
        Ok(profile)
    }

    async fn update_profile(&self, req: &UpdateProfileRequest) -> Result<UserProfile> {
        self.guard("update_profile")?;
        let mut state = self.state.lock().unwrap();
        let profile = state
            .profile
            .as_mut()
            .ok_or_else(|| ClientError::NotFound("Profile not found".into()))?;
        if let Some(u) = &req.username {
            profile.username = Some(u.clone());
        }
        if let Some(d) = &req.display_name {
            profile.display_name = Some(d.clone());
        }
        Ok(profile.clone())
    }

    async fn generate_username(&self) -> Result<String> {
        self.guard("generate_username")?;
        Ok("mock1234".into())
    }

    async fn public_profile(&self, _username: &str) -> Result<PublicProfilePage> {
        self.guard("public_profile")?;
        let state = self.state.lock().unwrap();
        let profile = state
            .profile
            .as_ref()
            .ok_or_else(|| ClientError::NotFound("User not found".into()))?;
        Ok(PublicProfilePage {
            profile: PublicProfile::from(profile),
            categories: vec![],
        })
    }

    async fn verify_subscription(&self) -> Result<SubscriptionSnapshot> {
        self.guard("verify_subscription")?;
        let state = self.state.lock().unwrap();
        let (tier, status) = state
            .profile
            .as_ref()
            .map(|p| (p.subscription_tier, p.subscription_status))
            .unwrap_or_default();
        Ok(SubscriptionSnapshot {
            is_premium: tier == Tier::Premium && status == SubscriptionStatus::Active,
            tier,
            status,
            subscription_end: None,
        })
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        self.guard("list_categories")?;
        let mut categories = self.state.lock().unwrap().categories.clone();
        categories.sort_by_key(|c| c.order_index);
        Ok(categories)
    }

    async fn create_category(&self, req: &CreateCategoryRequest) -> Result<Category> {
        self.guard("create_category")?;
        let mut state = self.state.lock().unwrap();
        if state.categories.iter().any(|c| c.name == req.name) {
            return Err(ClientError::Duplicate("Category already exists".into()));
        }
        let category = Category {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            name: req.name.clone(),
            emoji: req.emoji.clone(),
            order_index: req.order_index,
            is_public: req.is_public,
            created_at: Utc::now(),
        };
        state.categories.push(category.clone());
        Ok(category)
    }

    async fn update_category(&self, id: Uuid, req: &UpdateCategoryRequest) -> Result<Category> {
        self.guard("update_category")?;
        let mut state = self.state.lock().unwrap();
        let idx = state
            .categories
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| ClientError::NotFound("Category not found".into()))?;
        let old_name = state.categories[idx].name.clone();
        if let Some(name) = &req.name {
            for b in state.bookmarks.iter_mut().filter(|b| b.category_name == old_name) {
                b.category_name = name.clone();
            }
        }
        let category = &mut state.categories[idx];
        if let Some(name) = &req.name {
            category.name = name.clone();
        }
        if let Some(emoji) = &req.emoji {
            category.emoji = Some(emoji.clone()).filter(|e| !e.is_empty());
        }
        if let Some(p) = req.is_public {
            category.is_public = p;
        }
        if let Some(o) = req.order_index {
            category.order_index = o;
        }
        Ok(category.clone())
    }

    async fn delete_category(&self, id: Uuid) -> Result<()> {
        self.guard("delete_category")?;
        let mut state = self.state.lock().unwrap();
        let Some(category) = state.categories.iter().find(|c| c.id == id).cloned() else {
            return Err(ClientError::NotFound("Category not found".into()));
        };
        if state.bookmarks.iter().any(|b| b.category_name == category.name) {
            return Err(ClientError::Duplicate("Category still has bookmarks".into()));
        }
        state.categories.retain(|c| c.id != id);
        Ok(())
    }

    async fn delete_category_bookmarks(&self, id: Uuid) -> Result<usize> {
        self.guard("delete_category_bookmarks")?;
        let mut state = self.state.lock().unwrap();
        let Some(name) = state.categories.iter().find(|c| c.id == id).map(|c| c.name.clone()) else {
            return Err(ClientError::NotFound("Category not found".into()));
        };
        let before = state.bookmarks.len();
        state.bookmarks.retain(|b| b.category_name != name);
        Ok(before - state.bookmarks.len())
    }

    async fn list_bookmarks(&self) -> Result<Vec<Bookmark>> {
        self.guard("list_bookmarks")?;
        Ok(self.state.lock().unwrap().bookmarks.clone())
    }

    async fn create_bookmark(&self, req: &CreateBookmarkRequest) -> Result<Bookmark> {
        self.guard("create_bookmark")?;
        let mut state = self.state.lock().unwrap();
        if state.bookmarks.iter().any(|b| {
            b.category_name == req.category_name
                && b.site_name == req.site_name
                && b.site_url == req.site_url
        }) {
            return Err(ClientError::Duplicate("Bookmark already exists".into()));
        }
        let bookmark = Bookmark {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            category_name: req.category_name.clone(),
            site_name: req.site_name.clone(),
            site_url: req.site_url.clone(),
            created_at: Utc::now(),
        };
        state.bookmarks.push(bookmark.clone());
        Ok(bookmark)
    }

    async fn update_bookmark(&self, id: Uuid, req: &UpdateBookmarkRequest) -> Result<Bookmark> {
        self.guard("update_bookmark")?;
        let mut state = self.state.lock().unwrap();
        let bookmark = state
            .bookmarks
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or_else(|| ClientError::NotFound("Bookmark not found".into()))?;
        if let Some(n) = &req.site_name {
            bookmark.site_name = n.clone();
        }
        if let Some(u) = &req.site_url {
            bookmark.site_url = u.clone();
        }
        Ok(bookmark.clone())
    }

    async fn delete_bookmark(&self, id: Uuid) -> Result<()> {
        self.guard("delete_bookmark")?;
        self.state.lock().unwrap().bookmarks.retain(|b| b.id != id);
        Ok(())
    }

    async fn list_inbox(&self) -> Result<Vec<InboxMessage>> {
        self.guard("list_inbox")?;
        Ok(self.state.lock().unwrap().inbox.clone())
    }

    async fn unread_count(&self) -> Result<u64> {
        self.guard("unread_count")?;
        let state = self.state.lock().unwrap();
        Ok(state
            .unread_override
            .unwrap_or_else(|| state.inbox.iter().filter(|m| !m.is_read).count() as u64))
    }

    async fn share_category(&self, req: &ShareCategoryRequest) -> Result<InboxMessage> {
        self.guard("share_category")?;
        let mut message = self.message(&req.category_name);
        message.note = req.note.clone();
        Ok(message)
    }

    async fn mark_as_read(&self, id: Uuid) -> Result<InboxMessage> {
        let delay = *self.mark_read_delay.lock().unwrap();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        self.guard("mark_as_read")?;
        let mut state = self.state.lock().unwrap();
        let message = state
            .inbox
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| ClientError::NotFound("Message not found".into()))?;
        message.is_read = true;
        Ok(message.clone())
    }

    async fn mark_all_as_read(&self) -> Result<u64> {
        self.guard("mark_all_as_read")?;
        let mut state = self.state.lock().unwrap();
        let mut n = 0;
        for m in state.inbox.iter_mut().filter(|m| !m.is_read) {
            m.is_read = true;
            n += 1;
        }
        Ok(n)
    }

    async fn delete_message(&self, id: Uuid) -> Result<()> {
        self.guard("delete_message")?;
        self.state.lock().unwrap().inbox.retain(|m| m.id != id);
        Ok(())
    }

    async fn list_reactions(&self, target: ReactionTarget) -> Result<Vec<ReactionSummary>> {
        self.guard("list_reactions")?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .reactions
            .get(&target)
            .cloned()
            .unwrap_or_default())
    }

    async fn toggle_reaction(
        &self,
        target: ReactionTarget,
        emoji: &str,
    ) -> Result<ToggleReactionResponse> {
        self.guard("toggle_reaction")?;
        let mut state = self.state.lock().unwrap();
        let current = state.reactions.entry(target).or_default();
        let added = !current.iter().any(|s| s.reacted_by_me && s.emoji == emoji);
        *current = apply_toggle(current, emoji);
        Ok(ToggleReactionResponse {
            added,
            reactions: current.clone(),
        })
    }

    async fn get_shared(&self, token: &str) -> Result<SharedCategoryView> {
        self.guard("get_shared")?;
        let state = self.state.lock().unwrap();
        let message = state
            .inbox
            .iter()
            .find(|m| m.share_token == token)
            .ok_or_else(|| ClientError::NotFound("Shared category not found".into()))?;
        let category = state
            .categories
            .iter()
            .find(|c| c.name == message.category_name)
            .cloned()
            .ok_or_else(|| ClientError::NotFound("Shared category not found".into()))?;
        let profile = state
            .profile
            .as_ref()
            .ok_or_else(|| ClientError::NotFound("Shared category not found".into()))?;
        Ok(SharedCategoryView {
            sender: PublicProfile::from(profile),
            bookmarks: state
                .bookmarks
                .iter()
                .filter(|b| b.category_name == category.name)
                .cloned()
                .collect(),
            category,
            note: message.note.clone(),
        })
    }

    async fn subscribe(&self, topic: Topic) -> Result<mpsc::UnboundedReceiver<ChangeEvent>> {
        let delay = *self.subscribe_delay.lock().unwrap();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        self.guard("subscribe")?;
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().unwrap().push((topic, tx));
        Ok(rx)
    }
}
