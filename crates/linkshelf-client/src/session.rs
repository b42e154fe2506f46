//! Who is signed in, and their profile row.
//!
//! Identity is set the moment an auth event arrives; the profile is looked up
//! (or created) in the background so nothing waits on it. Construct one
//! [`Session`] at the application root and hand out clones.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use linkshelf_types::api::AuthResponse;
use linkshelf_types::models::UserProfile;
use linkshelf_types::policy::Entitlement;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::remote::Remote;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub auth_id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub token: String,
}

impl From<AuthResponse> for Identity {
    fn from(r: AuthResponse) -> Self {
        Self {
            auth_id: r.user_id,
            email: r.email,
            display_name: r.display_name,
            token: r.token,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn(Identity),
    SessionRestored(Identity),
    SignedOut,
    /// Carries the token the reset step has to present.
    PasswordRecovery(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionDirective {
    None,
    ShowPasswordReset,
}

#[derive(Debug, Default)]
struct SessionState {
    identity: Option<Identity>,
    profile: Option<UserProfile>,
    loading: bool,
    recovery_token: Option<String>,
}

struct SessionInner {
    remote: Arc<dyn Remote>,
    profile_timeout: Duration,
    state: RwLock<SessionState>,
    identity_tx: watch::Sender<Option<Identity>>,
    profile_tx: watch::Sender<Option<UserProfile>>,
    resolver: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    pub fn new(remote: Arc<dyn Remote>, config: &ClientConfig) -> Self {
        let (identity_tx, _) = watch::channel(None);
        let (profile_tx, _) = watch::channel(None);
        Self {
            inner: Arc::new(SessionInner {
                remote,
                profile_timeout: config.profile_timeout,
                state: RwLock::new(SessionState {
                    loading: true,
                    ..SessionState::default()
                }),
                identity_tx,
                profile_tx,
                resolver: Mutex::new(None),
            }),
        }
    }

    pub async fn identity(&self) -> Option<Identity> {
        self.inner.state.read().await.identity.clone()
    }

    pub async fn profile(&self) -> Option<UserProfile> {
        self.inner.state.read().await.profile.clone()
    }

    pub async fn is_loading(&self) -> bool {
        self.inner.state.read().await.loading
    }

    pub async fn is_recovering(&self) -> bool {
        self.inner.state.read().await.recovery_token.is_some()
    }

    /// Free until a profile with an active premium plan has loaded.
    pub async fn entitlement(&self) -> Entitlement {
        self.inner
            .state
            .read()
            .await
            .profile
            .as_ref()
            .map(Entitlement::from)
            .unwrap_or_default()
    }

    pub fn watch_identity(&self) -> watch::Receiver<Option<Identity>> {
        self.inner.identity_tx.subscribe()
    }

    pub fn watch_profile(&self) -> watch::Receiver<Option<UserProfile>> {
        self.inner.profile_tx.subscribe()
    }

    /// Restores a stored session, or settles as signed out.
    pub async fn init(&self, stored: Option<Identity>) {
        match stored {
            Some(identity) => {
                self.handle_auth_event(AuthEvent::SessionRestored(identity))
                    .await;
            }
            None => self.inner.state.write().await.loading = false,
        }
    }

    pub async fn teardown(&self) {
        self.abort_resolver().await;
        let mut state = self.inner.state.write().await;
        *state = SessionState::default();
        drop(state);
        self.inner.remote.set_token(None);
        self.inner.identity_tx.send_replace(None);
        self.inner.profile_tx.send_replace(None);
    }

    pub async fn handle_auth_event(&self, event: AuthEvent) -> SessionDirective {
        match event {
            AuthEvent::PasswordRecovery(token) => {
                debug!("Entering password recovery");
                self.inner.state.write().await.recovery_token = Some(token);
                SessionDirective::ShowPasswordReset
            }
            AuthEvent::SignedOut => {
                self.abort_resolver().await;
                {
                    let mut state = self.inner.state.write().await;
                    state.identity = None;
                    state.profile = None;
                    state.loading = false;
                }
                self.inner.remote.set_token(None);
                self.inner.identity_tx.send_replace(None);
                self.inner.profile_tx.send_replace(None);
                info!("Signed out");
                SessionDirective::None
            }
            AuthEvent::SignedIn(identity) | AuthEvent::SessionRestored(identity) => {
                if self.is_recovering().await {
                    debug!("Ignoring sign-in for {} during password recovery", identity.email);
                    return SessionDirective::ShowPasswordReset;
                }
                self.set_identity(identity).await;
                SessionDirective::None
            }
        }
    }

    async fn set_identity(&self, identity: Identity) {
        self.abort_resolver().await;
        self.inner.remote.set_token(Some(identity.token.clone()));
        {
            let mut state = self.inner.state.write().await;
            state.identity = Some(identity.clone());
            state.profile = None;
            state.loading = true;
        }
        self.inner.identity_tx.send_replace(Some(identity.clone()));
        self.inner.profile_tx.send_replace(None);
        info!("Signed in as {}", identity.email);

        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            let auth_id = identity.auth_id;
            let resolved = tokio::time::timeout(
                inner.profile_timeout,
                resolve_profile(inner.remote.as_ref(), &identity),
            )
            .await
            .unwrap_or(Err(ClientError::Timeout));

            let mut state = inner.state.write().await;
            if state.identity.as_ref().map(|i| i.auth_id) != Some(auth_id) {
                return;
            }
            state.loading = false;
            match resolved {
                Ok(profile) => {
                    state.profile = Some(profile.clone());
                    drop(state);
                    inner.profile_tx.send_replace(Some(profile));
                }
                Err(e) => warn!("Profile unavailable for {}: {}", identity.email, e),
            }
        });
        *self.inner.resolver.lock().await = Some(handle);
    }

    async fn abort_resolver(&self) {
        if let Some(handle) = self.inner.resolver.lock().await.take() {
            handle.abort();
        }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Identity> {
        let identity: Identity = self.inner.remote.sign_in(email, password).await?.into();
        self.handle_auth_event(AuthEvent::SignedIn(identity.clone()))
            .await;
        Ok(identity)
    }

    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<Identity> {
        let identity: Identity = self
            .inner
            .remote
            .sign_up(email, password, display_name)
            .await?
            .into();
        self.handle_auth_event(AuthEvent::SignedIn(identity.clone()))
            .await;
        Ok(identity)
    }

    pub async fn sign_out(&self) {
        self.handle_auth_event(AuthEvent::SignedOut).await;
    }

    pub async fn request_password_recovery(&self, email: &str) -> Result<SessionDirective> {
        let token = self.inner.remote.request_password_recovery(email).await?;
        Ok(self
            .handle_auth_event(AuthEvent::PasswordRecovery(token))
            .await)
    }

    /// Sets the new password and signs in with it.
    pub async fn finish_recovery(&self, new_password: &str) -> Result<Identity> {
        let token = self
            .inner
            .state
            .read()
            .await
            .recovery_token
            .clone()
            .ok_or(ClientError::Unauthorized)?;
        let identity: Identity = self
            .inner
            .remote
            .reset_password(&token, new_password)
            .await?
            .into();
        self.inner.state.write().await.recovery_token = None;
        self.handle_auth_event(AuthEvent::SignedIn(identity.clone()))
            .await;
        Ok(identity)
    }

    /// Re-reads the profile row, e.g. after a checkout redirect.
    pub async fn refresh_profile(&self) -> Result<Option<UserProfile>> {
        let profile = self.inner.remote.fetch_profile().await?;
        self.inner.state.write().await.profile = profile.clone();
        self.inner.profile_tx.send_replace(profile.clone());
        Ok(profile)
    }
}

/// Looks the profile up and creates it when missing. Safe to repeat.
async fn resolve_profile(remote: &dyn Remote, identity: &Identity) -> Result<UserProfile> {
    if let Some(profile) = remote.fetch_profile().await? {
        return Ok(profile);
    }
    debug!("Creating profile for {}", identity.email);
    remote
        .create_profile(identity.display_name.as_deref())
        .await
}

#[cfg(test)]
mod tests {
    use linkshelf_types::models::{SubscriptionStatus, Tier};

    use super::*;
    use crate::remote::mock::MockRemote;

    fn identity(token: &str) -> Identity {
        Identity {
            auth_id: Uuid::new_v4(),
            email: "reader@example.com".into(),
            display_name: Some("Reader".into()),
            token: token.into(),
        }
    }

    async fn profile_arrives(session: &Session) -> UserProfile {
        let mut rx = session.watch_profile();
        loop {
            if let Some(p) = rx.borrow_and_update().clone() {
                return p;
            }
            rx.changed().await.unwrap();
        }
    }

    #[tokio::test]
    async fn identity_is_set_before_profile_resolves() {
        let remote = Arc::new(MockRemote::new());
        let session = Session::new(remote.clone(), &ClientConfig::default());

        let directive = session
            .handle_auth_event(AuthEvent::SignedIn(identity("t1")))
            .await;
        assert_eq!(directive, SessionDirective::None);
        assert!(session.identity().await.is_some());
        assert_eq!(remote.state.lock().unwrap().token.as_deref(), Some("t1"));

        let profile = profile_arrives(&session).await;
        assert_eq!(profile.display_name.as_deref(), Some("Reader"));
        assert_eq!(remote.count("create_profile"), 1);
        assert!(!session.is_loading().await);
    }

    #[tokio::test]
    async fn existing_profile_is_not_recreated() {
        let remote = Arc::new(MockRemote::new());
        let existing = remote.profile(Tier::Premium, SubscriptionStatus::Active);
        remote.state.lock().unwrap().profile = Some(existing.clone());
        let session = Session::new(remote.clone(), &ClientConfig::default());

        session.init(Some(identity("stored"))).await;
        assert_eq!(profile_arrives(&session).await, existing);
        assert_eq!(remote.count("create_profile"), 0);
        assert!(session.entitlement().await.is_premium_active());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_profile_lookup_times_out() {
        let remote = Arc::new(MockRemote::new());
        *remote.profile_delay.lock().unwrap() = Some(Duration::from_secs(30));
        let session = Session::new(remote.clone(), &ClientConfig::default());

        session
            .handle_auth_event(AuthEvent::SessionRestored(identity("t")))
            .await;
        assert!(session.is_loading().await);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(!session.is_loading().await);
        assert!(session.profile().await.is_none());
        assert!(session.identity().await.is_some());
        assert_eq!(session.entitlement().await, Entitlement::free());
    }

    #[tokio::test]
    async fn recovery_suppresses_sign_in_until_reset() {
        let remote = Arc::new(MockRemote::new());
        let session = Session::new(remote.clone(), &ClientConfig::default());
        session.init(None).await;

        let directive = session
            .request_password_recovery("reader@example.com")
            .await
            .unwrap();
        assert_eq!(directive, SessionDirective::ShowPasswordReset);
        assert!(session.is_recovering().await);
        assert!(session.identity().await.is_none());

        let identity = session.finish_recovery("new-password").await.unwrap();
        assert!(!session.is_recovering().await);
        assert_eq!(session.identity().await, Some(identity));
        assert!(session.finish_recovery("again").await.is_err());
    }

    #[tokio::test]
    async fn restored_session_waits_for_password_reset() {
        let remote = Arc::new(MockRemote::new());
        let session = Session::new(remote.clone(), &ClientConfig::default());
        session
            .handle_auth_event(AuthEvent::PasswordRecovery("rt".into()))
            .await;

        for event in [
            AuthEvent::SessionRestored(identity("restored")),
            AuthEvent::SignedIn(identity("signed-in")),
        ] {
            let directive = session.handle_auth_event(event).await;
            assert_eq!(directive, SessionDirective::ShowPasswordReset);
        }
        assert!(session.identity().await.is_none());
        assert!(remote.state.lock().unwrap().token.is_none());
        assert_eq!(remote.count("fetch_profile"), 0);

        session.finish_recovery("new-password").await.unwrap();
        assert!(session.identity().await.is_some());
    }

    #[tokio::test]
    async fn sign_out_clears_everything() {
        let remote = Arc::new(MockRemote::new());
        let session = Session::new(remote.clone(), &ClientConfig::default());
        let mut identities = session.watch_identity();

        session.sign_in("reader@example.com", "hunter22").await.unwrap();
        profile_arrives(&session).await;
        assert!(identities.has_changed().unwrap());

        session.sign_out().await;
        assert!(session.identity().await.is_none());
        assert!(session.profile().await.is_none());
        assert!(identities.borrow_and_update().is_none());
        assert!(remote.state.lock().unwrap().token.is_none());
    }

    #[tokio::test]
    async fn failed_sign_in_leaves_session_alone() {
        let remote = Arc::new(MockRemote::failing());
        let session = Session::new(remote.clone(), &ClientConfig::default());
        session.init(None).await;

        assert!(session.sign_in("reader@example.com", "wrong").await.is_err());
        assert!(session.identity().await.is_none());
        assert!(!session.is_loading().await);
    }
}
