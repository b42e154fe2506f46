pub mod http;
#[cfg(test)]
pub(crate) mod mock;

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use linkshelf_types::api::{
    AuthResponse, CreateBookmarkRequest, CreateCategoryRequest, PublicProfilePage,
    ShareCategoryRequest, SubscriptionSnapshot, ToggleReactionResponse, UpdateBookmarkRequest,
    UpdateCategoryRequest, UpdateProfileRequest,
};
use linkshelf_types::events::{ChangeEvent, Topic};
use linkshelf_types::models::{
    Bookmark, Category, InboxMessage, ReactionSummary, ReactionTarget, SharedCategoryView,
    UserProfile,
};

use crate::error::Result;

pub use http::HttpRemote;

/// Everything the client needs from the backend. Every payload is already
/// parsed into typed records by the time it crosses this trait.
#[async_trait]
pub trait Remote: Send + Sync {
    /// Session token attached to subsequent calls.
    fn set_token(&self, token: Option<String>);

    // -- Auth --
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<AuthResponse>;
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthResponse>;
    /// Returns the recovery token the reset step must present.
    async fn request_password_recovery(&self, email: &str) -> Result<String>;
    async fn reset_password(&self, recovery_token: &str, password: &str) -> Result<AuthResponse>;

    // -- Profile --
    /// `None` when the signed-in identity has no profile row yet.
    async fn fetch_profile(&self) -> Result<Option<UserProfile>>;
    async fn create_profile(&self, display_name: Option<&str>) -> Result<UserProfile>;
    async fn update_profile(&self, req: &UpdateProfileRequest) -> Result<UserProfile>;
    async fn generate_username(&self) -> Result<String>;
    async fn public_profile(&self, username: &str) -> Result<PublicProfilePage>;
    async fn verify_subscription(&self) -> Result<SubscriptionSnapshot>;

    // -- Categories --
    async fn list_categories(&self) -> Result<Vec<Category>>;
    async fn create_category(&self, req: &CreateCategoryRequest) -> Result<Category>;
    async fn update_category(&self, id: Uuid, req: &UpdateCategoryRequest) -> Result<Category>;
    async fn delete_category(&self, id: Uuid) -> Result<()>;
    async fn delete_category_bookmarks(&self, id: Uuid) -> Result<usize>;

    // -- Bookmarks --
    async fn list_bookmarks(&self) -> Result<Vec<Bookmark>>;
    async fn create_bookmark(&self, req: &CreateBookmarkRequest) -> Result<Bookmark>;
    async fn update_bookmark(&self, id: Uuid, req: &UpdateBookmarkRequest) -> Result<Bookmark>;
    async fn delete_bookmark(&self, id: Uuid) -> Result<()>;

    // -- Inbox --
    async fn list_inbox(&self) -> Result<Vec<InboxMessage>>;
    async fn unread_count(&self) -> Result<u64>;
    async fn share_category(&self, req: &ShareCategoryRequest) -> Result<InboxMessage>;
    async fn mark_as_read(&self, id: Uuid) -> Result<InboxMessage>;
    async fn mark_all_as_read(&self) -> Result<u64>;
    async fn delete_message(&self, id: Uuid) -> Result<()>;

    // -- Reactions & sharing --
    async fn list_reactions(&self, target: ReactionTarget) -> Result<Vec<ReactionSummary>>;
    async fn toggle_reaction(
        &self,
        target: ReactionTarget,
        emoji: &str,
    ) -> Result<ToggleReactionResponse>;
    async fn get_shared(&self, token: &str) -> Result<SharedCategoryView>;

    /// Change events for one topic. The channel closes when the push
    /// connection goes away; callers fall back to polling.
    async fn subscribe(&self, topic: Topic) -> Result<mpsc::UnboundedReceiver<ChangeEvent>>;
}
