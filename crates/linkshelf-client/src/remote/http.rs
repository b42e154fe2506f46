use std::sync::RwLock;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};
use uuid::Uuid;

use linkshelf_types::api::{
    AuthResponse, CreateBookmarkRequest, CreateCategoryRequest, ErrorBody,
    GenerateUsernameResponse, MarkReadResponse, PublicProfilePage, RecoverResponse,
    ShareCategoryRequest, SubscriptionSnapshot, ToggleReactionResponse, UnreadCountResponse,
    UpdateBookmarkRequest, UpdateCategoryRequest, UpdateProfileRequest,
};
use linkshelf_types::events::{ChangeEvent, GatewayCommand, GatewayEvent, Topic};
use linkshelf_types::models::{
    Bookmark, Category, InboxMessage, ReactionSummary, ReactionTarget, SharedCategoryView,
    UserProfile,
};

use super::Remote;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

/// [`Remote`] over the REST API and the realtime WebSocket.
pub struct HttpRemote {
    http: Client,
    base_url: String,
    realtime_url: String,
    token: RwLock<Option<String>>,
}

impl HttpRemote {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            http: Client::new(),
            base_url: config.base_url.clone(),
            realtime_url: config.realtime_url.clone(),
            token: RwLock::new(None),
        }
    }

    fn token(&self) -> Option<String> {
        self.token.read().ok().and_then(|t| t.clone())
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, format!("{}{}", self.base_url, path));
        match self.token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let resp = check(builder.send().await?).await?;
        Ok(resp.json::<T>().await?)
    }

    async fn send_empty(&self, builder: RequestBuilder) -> Result<()> {
        check(builder.send().await?).await?;
        Ok(())
    }
}

/// Maps error statuses onto [`ClientError`], using the server's
/// `{ "error": ... }` body as the message.
async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let message = match resp.json::<ErrorBody>().await {
        Ok(body) => body.error,
        Err(_) => status.to_string(),
    };
    Err(match status {
        StatusCode::UNAUTHORIZED => ClientError::Unauthorized,
        StatusCode::PAYMENT_REQUIRED => ClientError::LimitReached(message),
        StatusCode::NOT_FOUND => ClientError::NotFound(message),
        StatusCode::CONFLICT => ClientError::Duplicate(message),
        _ => ClientError::Remote(message),
    })
}

#[async_trait]
impl Remote for HttpRemote {
    fn set_token(&self, token: Option<String>) {
        if let Ok(mut guard) = self.token.write() {
            *guard = token;
        }
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<AuthResponse> {
        let body = json!({ "email": email, "password": password, "display_name": display_name });
        self.send(self.request(Method::POST, "/auth/register").json(&body)).await
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthResponse> {
        let body = json!({ "email": email, "password": password });
        self.send(self.request(Method::POST, "/auth/login").json(&body)).await
    }

    async fn request_password_recovery(&self, email: &str) -> Result<String> {
        let body = json!({ "email": email });
        let resp: RecoverResponse = self
            .send(self.request(Method::POST, "/auth/recover").json(&body))
            .await?;
        Ok(resp.recovery_token)
    }

    async fn reset_password(&self, recovery_token: &str, password: &str) -> Result<AuthResponse> {
        let builder = self
            .http
            .post(format!("{}/auth/password", self.base_url))
            .bearer_auth(recovery_token)
            .json(&json!({ "password": password }));
        self.send(builder).await
    }

    async fn fetch_profile(&self) -> Result<Option<UserProfile>> {
        match self.send(self.request(Method::GET, "/profile")).await {
            Ok(profile) => Ok(Some(profile)),
            Err(ClientError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create_profile(&self, display_name: Option<&str>) -> Result<UserProfile> {
        let body = json!({ "display_name": display_name });
        self.send(self.request(Method::POST, "/profile").json(&body)).await
    }

    async fn update_profile(&self, req: &UpdateProfileRequest) -> Result<UserProfile> {
        self.send(self.request(Method::PATCH, "/profile").json(req)).await
    }

    async fn generate_username(&self) -> Result<String> {
        let resp: GenerateUsernameResponse = self
            .send(self.request(Method::POST, "/rpc/generate_username"))
            .await?;
        Ok(resp.username)
    }

    async fn public_profile(&self, username: &str) -> Result<PublicProfilePage> {
        self.send(self.request(Method::GET, &format!("/users/{}", username)))
            .await
    }

    async fn verify_subscription(&self) -> Result<SubscriptionSnapshot> {
        self.send(self.request(Method::GET, "/api/subscription/verify"))
            .await
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        self.send(self.request(Method::GET, "/categories")).await
    }

    async fn create_category(&self, req: &CreateCategoryRequest) -> Result<Category> {
        self.send(self.request(Method::POST, "/categories").json(req)).await
    }

    async fn update_category(&self, id: Uuid, req: &UpdateCategoryRequest) -> Result<Category> {
        self.send(self.request(Method::PATCH, &format!("/categories/{}", id)).json(req))
            .await
    }

    async fn delete_category(&self, id: Uuid) -> Result<()> {
        self.send_empty(self.request(Method::DELETE, &format!("/categories/{}", id)))
            .await
    }

    async fn delete_category_bookmarks(&self, id: Uuid) -> Result<usize> {
        let resp: serde_json::Value = self
            .send(self.request(Method::DELETE, &format!("/categories/{}/bookmarks", id)))
            .await?;
        Ok(resp["deleted"].as_u64().unwrap_or(0) as usize)
    }

    async fn list_bookmarks(&self) -> Result<Vec<Bookmark>> {
        self.send(self.request(Method::GET, "/bookmarks")).await
    }

    async fn create_bookmark(&self, req: &CreateBookmarkRequest) -> Result<Bookmark> {
        self.send(self.request(Method::POST, "/bookmarks").json(req)).await
    }

    async fn update_bookmark(&self, id: Uuid, req: &UpdateBookmarkRequest) -> Result<Bookmark> {
        self.send(self.request(Method::PATCH, &format!("/bookmarks/{}", id)).json(req))
            .await
    }

    async fn delete_bookmark(&self, id: Uuid) -> Result<()> {
        self.send_empty(self.request(Method::DELETE, &format!("/bookmarks/{}", id)))
            .await
    }

    async fn list_inbox(&self) -> Result<Vec<InboxMessage>> {
        self.send(self.request(Method::GET, "/inbox")).await
    }

    async fn unread_count(&self) -> Result<u64> {
        let resp: UnreadCountResponse = self
            .send(self.request(Method::GET, "/inbox/unread_count"))
            .await?;
        Ok(resp.count)
    }

    async fn share_category(&self, req: &ShareCategoryRequest) -> Result<InboxMessage> {
        self.send(self.request(Method::POST, "/inbox").json(req)).await
    }

    async fn mark_as_read(&self, id: Uuid) -> Result<InboxMessage> {
        self.send(self.request(Method::POST, &format!("/inbox/{}/read", id)))
            .await
    }

    async fn mark_all_as_read(&self) -> Result<u64> {
        let resp: MarkReadResponse = self
            .send(self.request(Method::POST, "/inbox/read_all"))
            .await?;
        Ok(resp.updated)
    }

    async fn delete_message(&self, id: Uuid) -> Result<()> {
        self.send_empty(self.request(Method::DELETE, &format!("/inbox/{}", id)))
            .await
    }

    async fn list_reactions(&self, target: ReactionTarget) -> Result<Vec<ReactionSummary>> {
        let path = format!("/reactions/{}/{}", target.kind(), target.id());
        self.send(self.request(Method::GET, &path)).await
    }

    async fn toggle_reaction(
        &self,
        target: ReactionTarget,
        emoji: &str,
    ) -> Result<ToggleReactionResponse> {
        let path = format!("/reactions/{}/{}", target.kind(), target.id());
        self.send(self.request(Method::POST, &path).json(&json!({ "emoji": emoji })))
            .await
    }

    async fn get_shared(&self, token: &str) -> Result<SharedCategoryView> {
        self.send(self.request(Method::GET, &format!("/shared/{}", token)))
            .await
    }

    /// One socket per subscription. The socket closes when the receiver is
    /// dropped or the server refuses the topic.
    async fn subscribe(&self, topic: Topic) -> Result<mpsc::UnboundedReceiver<ChangeEvent>> {
        let token = self.token().ok_or(ClientError::Unauthorized)?;
        let url = format!("{}?token={}", self.realtime_url, token);
        let (mut ws, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| ClientError::Remote(format!("realtime connect failed: {}", e)))?;

        let cmd = serde_json::to_string(&GatewayCommand::Subscribe { topic })
            .map_err(|e| ClientError::Remote(e.to_string()))?;
        ws.send(Message::text(cmd))
            .await
            .map_err(|e| ClientError::Remote(e.to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    msg = ws.next() => match msg {
                        Some(Ok(Message::Text(text))) => {
                            match serde_json::from_str::<GatewayEvent>(text.as_str()) {
                                Ok(GatewayEvent::Change(event)) if event.topic == topic => {
                                    if tx.send(event).is_err() {
                                        break;
                                    }
                                }
                                Ok(GatewayEvent::SubscribeDenied { topic }) => {
                                    warn!("Subscription to {} denied", topic);
                                    break;
                                }
                                Ok(_) => {}
                                Err(e) => debug!("Ignoring realtime frame: {}", e),
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            debug!("Realtime connection for {} dropped: {}", topic, e);
                            break;
                        }
                    },
                }
            }
            let _ = ws.close(None).await;
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::net::TcpListener;

    use linkshelf_api::{AppStateInner, BillingConfig, router};
    use linkshelf_db::Database;

    use super::*;

    async fn serve() -> ClientConfig {
        let db = Database::open_in_memory().unwrap();
        let state = Arc::new(AppStateInner::new(db, "test-secret".into(), BillingConfig::default()));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });
        ClientConfig::new(&format!("http://{}", addr))
    }

    async fn signed_up(config: &ClientConfig, email: &str) -> HttpRemote {
        let remote = HttpRemote::new(config);
        let auth = remote.sign_up(email, "correct horse", None).await.unwrap();
        remote.set_token(Some(auth.token));
        remote
    }

    fn category(name: &str) -> CreateCategoryRequest {
        CreateCategoryRequest {
            name: name.into(),
            emoji: None,
            is_public: true,
            order_index: 0,
        }
    }

    #[tokio::test]
    async fn error_statuses_map_to_client_errors() {
        let config = serve().await;
        let remote = signed_up(&config, "errors@example.com").await;
        assert!(remote.fetch_profile().await.unwrap().is_some());

        let anonymous = HttpRemote::new(&config);
        assert!(matches!(
            anonymous.sign_in("errors@example.com", "wrong password").await,
            Err(ClientError::Unauthorized)
        ));
        assert!(matches!(anonymous.list_categories().await, Err(ClientError::Unauthorized)));

        remote.create_category(&category("Work")).await.unwrap();
        assert!(matches!(
            remote.create_category(&category("Work")).await,
            Err(ClientError::Duplicate(_))
        ));
        assert!(matches!(
            remote.delete_category(Uuid::new_v4()).await,
            Err(ClientError::NotFound(_))
        ));

        for i in 0..50 {
            let req = CreateBookmarkRequest {
                category_name: "Work".into(),
                site_name: format!("Site {}", i),
                site_url: format!("example{}.com", i),
            };
            remote.create_bookmark(&req).await.unwrap();
        }
        let over = CreateBookmarkRequest {
            category_name: "Work".into(),
            site_name: "One More".into(),
            site_url: "one-more.com".into(),
        };
        match remote.create_bookmark(&over).await {
            Err(ClientError::LimitReached(msg)) => assert!(msg.contains("Upgrade")),
            other => panic!("expected limit, got {:?}", other.map(|b| b.site_name)),
        }
    }

    #[tokio::test]
    async fn missing_profile_reads_as_none() {
        let config = serve().await;
        let remote = signed_up(&config, "gone@example.com").await;

        let resp = remote.request(Method::DELETE, "/profile").send().await.unwrap();
        assert!(resp.status().is_success());
        assert!(remote.fetch_profile().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn inbox_subscription_receives_shares() {
        let config = serve().await;
        let alice = signed_up(&config, "alice@example.com").await;
        let bob = signed_up(&config, "bob@example.com").await;
        let profile = bob
            .update_profile(&UpdateProfileRequest {
                username: Some("bob_reader".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        alice.create_category(&category("Reading")).await.unwrap();

        let mut rx = bob
            .subscribe(Topic::Inbox {
                recipient_id: profile.id,
            })
            .await
            .unwrap();

        // Subscribe is unacknowledged; share until an event lands.
        let share = ShareCategoryRequest {
            recipient_username: "bob_reader".into(),
            category_name: "Reading".into(),
            note: Some("enjoy".into()),
        };
        let mut received = None;
        for _ in 0..20 {
            alice.share_category(&share).await.unwrap();
            if let Ok(event) = tokio::time::timeout(Duration::from_millis(250), rx.recv()).await {
                received = event;
                break;
            }
        }
        let event = received.expect("no change event");
        assert_eq!(event.topic, Topic::Inbox { recipient_id: profile.id });
        assert_eq!(bob.list_inbox().await.unwrap()[0].note.as_deref(), Some("enjoy"));
    }

    #[tokio::test]
    async fn refused_topic_closes_the_receiver() {
        let config = serve().await;
        let remote = signed_up(&config, "nosy@example.com").await;

        let mut rx = remote
            .subscribe(Topic::Inbox {
                recipient_id: Uuid::new_v4(),
            })
            .await
            .unwrap();
        let closed = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await;
        assert!(matches!(closed, Ok(None)));
    }

    #[tokio::test]
    async fn subscribe_needs_a_token() {
        let config = serve().await;
        let remote = HttpRemote::new(&config);
        let topic = Topic::Inbox {
            recipient_id: Uuid::new_v4(),
        };
        assert!(matches!(remote.subscribe(topic).await, Err(ClientError::Unauthorized)));
    }
}
