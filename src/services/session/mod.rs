//! Client-side session lifecycle against the hosted auth service.

pub mod client;
pub mod local_store;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, watch};
use url::Url;

use crate::auth_rs::pkce::{generate_code_challenge, generate_code_verifier, generate_state};
use crate::auth_rs::{AuthError, AuthSession, AuthUser, AuthorizeRequest, SignUpResponse, UserMetadata};
use crate::error::PlaylistError;
use crate::ports::auth::AuthClient;
use crate::services::user::UserService;
use local_store::{AUTH_REDIRECT_KEY, AUTH_STATE_KEY, LocalStore, SESSION_KEY};

/// How long a started provider sign-in stays valid.
pub const AUTH_STATE_TTL_MS: i64 = 10 * 60 * 1000;

const SPOTIFY_SCOPES: &str =
    "playlist-modify-public playlist-modify-private user-read-private user-read-email";
const GOOGLE_SCOPES: &str = "profile email";

/// Record of a provider sign-in in flight, read back by the callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthState {
    pub provider: String,
    /// Unix milliseconds
    pub timestamp: i64,
    pub redirect_path: String,
    pub origin: String,
    pub code_verifier: String,
    pub state: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderSignIn {
    /// Send the user here to continue with the provider.
    Redirect(Url),
    /// The user backed out; nothing to do.
    Cancelled,
}

/// Query parameters the provider round trip returns with.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderCallback {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl ProviderCallback {
    /// Parse the query string of a callback URL.
    pub fn from_url(url: &Url) -> Self {
        let mut callback = Self::default();
        for (key, value) in url.query_pairs() {
            let value = Some(value.into_owned());
            match key.as_ref() {
                "code" => callback.code = value,
                "state" => callback.state = value,
                "error" => callback.error = value,
                "error_description" => callback.error_description = value,
                _ => {}
            }
        }
        callback
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCallbackOutcome {
    SignedIn {
        user: AuthUser,
        redirect_path: String,
    },
    Cancelled {
        redirect_path: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignOutOutcome {
    /// Where the client should go next.
    pub home_url: String,
    pub signed_out_remotely: bool,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Callback URL registered with the auth service
    pub redirect_url: String,
    pub origin: String,
    pub home_url: String,
}

/// Owns the current session and keeps dependents informed of changes.
///
/// Create one at start-up, call [`SessionManager::init`] to restore a saved session, and
/// [`SessionManager::deauthenticate`] to tear it down.
pub struct SessionManager<A: AuthClient> {
    auth: A,
    users: Arc<UserService>,
    store: LocalStore,
    settings: SessionSettings,
    session: RwLock<Option<AuthSession>>,
    changes: watch::Sender<Option<AuthUser>>,
}

impl<A: AuthClient> SessionManager<A> {
    pub fn new(
        auth: A,
        users: Arc<UserService>,
        store: LocalStore,
        settings: SessionSettings,
    ) -> Self {
        let (changes, _) = watch::channel(None);
        Self {
            auth,
            users,
            store,
            settings,
            session: RwLock::new(None),
            changes,
        }
    }

    /// Restore the saved session, refreshing it when the access token was rejected.
    pub async fn init(&self) -> Result<Option<AuthUser>, PlaylistError> {
        let Some(saved) = self.store.get::<AuthSession>(SESSION_KEY) else {
            self.publish(None);
            return Ok(None);
        };

        let session = match self.auth.get_user(&saved.access_token).await {
            Ok(user) => AuthSession { user, ..saved },
            Err(e) if e.is_unauthorized() => {
                log::debug!("Saved access token rejected, refreshing session");
                match self.auth.refresh_session(&saved.refresh_token).await {
                    Ok(session) => session,
                    Err(e) => {
                        log::info!("Saved session could not be refreshed: {e}");
                        self.clear_session().await;
                        return Ok(None);
                    }
                }
            }
            Err(e) => return Err(e.into()),
        };

        let user = session.user.clone();
        self.set_session(session).await?;
        self.sync_profile(&user).await;
        Ok(Some(user))
    }

    /// Create an identity. The profile row is required, preferences are best-effort.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<AuthUser, PlaylistError> {
        let metadata = UserMetadata {
            full_name: Some(display_name.to_string()),
            ..Default::default()
        };
        let response = self.auth.sign_up(email, password, metadata).await?;

        let user = response.user().clone();
        if user.id.is_empty() {
            return Err(AuthError::UserCreationFailed.into());
        }

        self.users.create_profile(&user).await?;
        if let Err(e) = self.users.create_default_preferences(&user.id).await {
            log::warn!("Failed to create preferences for user {}: {}", user.id, e);
        }

        if let SignUpResponse::Session(session) = response {
            self.set_session(session).await?;
        } else {
            log::info!("Account created for {email}, awaiting email confirmation");
        }
        Ok(user)
    }

    /// Password sign-in. Auth service errors are returned unchanged.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<AuthUser, PlaylistError> {
        let session = self.auth.sign_in_with_password(email, password).await?;
        let user = session.user.clone();
        self.set_session(session).await?;
        self.sync_profile(&user).await;
        Ok(user)
    }

    /// Start a provider sign-in and return where to send the user.
    pub async fn authenticate_with_provider(
        &self,
        provider: &str,
        current_path: &str,
    ) -> Result<ProviderSignIn, PlaylistError> {
        self.clear_auth_records();

        match self.start_provider_sign_in(provider, current_path) {
            Ok(url) => Ok(ProviderSignIn::Redirect(url)),
            Err(e) => {
                self.clear_auth_records();
                match e {
                    PlaylistError::AuthProvider(err) if err.is_cancellation() => {
                        log::info!("Sign-in with {provider} cancelled");
                        Ok(ProviderSignIn::Cancelled)
                    }
                    e => Err(e),
                }
            }
        }
    }

    fn start_provider_sign_in(
        &self,
        provider: &str,
        current_path: &str,
    ) -> Result<Url, PlaylistError> {
        let redirect_path = if current_path.is_empty() || current_path.starts_with("/auth/") {
            "/".to_string()
        } else {
            current_path.to_string()
        };

        let code_verifier = generate_code_verifier();
        let state = generate_state();

        let mut redirect_to = Url::parse(&self.settings.redirect_url)
            .map_err(|e| PlaylistError::InvalidInput(format!("Invalid redirect URL: {e}")))?;
        redirect_to.query_pairs_mut().append_pair("state", &state);

        let (scopes, query_params) = provider_options(provider);
        let url = self.auth.authorize_url(AuthorizeRequest {
            provider: provider.to_string(),
            redirect_to: redirect_to.to_string(),
            scopes,
            code_challenge: generate_code_challenge(&code_verifier),
            query_params,
        })?;

        self.store.set(AUTH_REDIRECT_KEY, &redirect_path)?;
        self.store.set(
            AUTH_STATE_KEY,
            &AuthState {
                provider: provider.to_string(),
                timestamp: chrono::Utc::now().timestamp_millis(),
                redirect_path,
                origin: self.settings.origin.clone(),
                code_verifier,
                state,
            },
        )?;

        log::info!("Starting sign-in with {provider}");
        Ok(url)
    }

    /// Finish a provider sign-in from the callback's query parameters.
    pub async fn complete_provider_sign_in(
        &self,
        callback: ProviderCallback,
    ) -> Result<ProviderCallbackOutcome, PlaylistError> {
        let stored_redirect = self.store.take::<String>(AUTH_REDIRECT_KEY)?;
        let auth_state = self.store.take::<AuthState>(AUTH_STATE_KEY)?;

        let redirect_path = stored_redirect
            .or_else(|| auth_state.as_ref().map(|s| s.redirect_path.clone()))
            .unwrap_or_else(|| "/".to_string());

        if let Some(error) = &callback.error {
            let description = callback.error_description.clone().unwrap_or_default();
            let err = AuthError::Api {
                status: 400,
                code: Some(error.clone()),
                message: if description.is_empty() {
                    error.clone()
                } else {
                    description
                },
            };
            if err.is_cancellation() {
                log::info!("Provider sign-in cancelled by the user");
                return Ok(ProviderCallbackOutcome::Cancelled { redirect_path });
            }
            return Err(err.into());
        }

        let auth_state = auth_state.ok_or_else(|| {
            PlaylistError::InvalidInput("No sign-in in progress, please try again".to_string())
        })?;

        let age = chrono::Utc::now().timestamp_millis() - auth_state.timestamp;
        if !(0..=AUTH_STATE_TTL_MS).contains(&age) {
            return Err(PlaylistError::InvalidInput(
                "Sign-in request expired, please try again".to_string(),
            ));
        }

        if callback.state.as_deref() != Some(auth_state.state.as_str()) {
            return Err(PlaylistError::InvalidInput(
                "Sign-in response does not match the request".to_string(),
            ));
        }

        let code = callback.code.ok_or_else(|| {
            PlaylistError::InvalidInput("Missing authorization code".to_string())
        })?;

        let session = self
            .auth
            .exchange_code(&code, &auth_state.code_verifier)
            .await?;
        let user = session.user.clone();
        self.set_session(session).await?;
        self.sync_profile(&user).await;

        log::info!("Signed in with {}", auth_state.provider);
        Ok(ProviderCallbackOutcome::SignedIn {
            user,
            redirect_path,
        })
    }

    /// Sign out locally and remotely. Local state is always cleared.
    pub async fn deauthenticate(&self) -> SignOutOutcome {
        self.clear_auth_records();
        let session = self.session.write().await.take();
        if let Err(e) = self.store.remove(SESSION_KEY) {
            log::warn!("Failed to clear saved session: {e}");
        }
        self.publish(None);

        let signed_out_remotely = match session {
            Some(session) => match self.auth.sign_out(&session.access_token).await {
                Ok(()) => true,
                Err(e) => {
                    log::warn!("Remote sign-out failed: {e}");
                    false
                }
            },
            None => false,
        };

        SignOutOutcome {
            home_url: self.settings.home_url.clone(),
            signed_out_remotely,
        }
    }

    /// Re-read the current user from the auth service.
    pub async fn refresh_user(&self) -> Result<Option<AuthUser>, PlaylistError> {
        let Some(access_token) = self.access_token().await else {
            return Ok(None);
        };

        let user = self.auth.get_user(&access_token).await?;
        {
            let mut session = self.session.write().await;
            if let Some(session) = session.as_mut() {
                session.user = user.clone();
                self.store.set(SESSION_KEY, &*session)?;
            }
        }
        self.publish(Some(user.clone()));
        Ok(Some(user))
    }

    pub async fn current_user(&self) -> Option<AuthUser> {
        self.session.read().await.as_ref().map(|s| s.user.clone())
    }

    pub async fn access_token(&self) -> Option<String> {
        self.session
            .read()
            .await
            .as_ref()
            .map(|s| s.access_token.clone())
    }

    /// Receives the current user on every sign-in and sign-out.
    pub fn subscribe(&self) -> watch::Receiver<Option<AuthUser>> {
        self.changes.subscribe()
    }

    async fn set_session(&self, session: AuthSession) -> Result<(), PlaylistError> {
        self.store.set(SESSION_KEY, &session)?;
        let user = session.user.clone();
        *self.session.write().await = Some(session);
        self.publish(Some(user));
        Ok(())
    }

    async fn clear_session(&self) {
        *self.session.write().await = None;
        if let Err(e) = self.store.remove(SESSION_KEY) {
            log::warn!("Failed to clear saved session: {e}");
        }
        self.publish(None);
    }

    async fn sync_profile(&self, user: &AuthUser) {
        if let Err(e) = self.users.ensure_user_profile(user).await {
            log::error!("Failed to sync profile for user {}: {}", user.id, e);
        }
    }

    fn clear_auth_records(&self) {
        for key in [AUTH_REDIRECT_KEY, AUTH_STATE_KEY] {
            if let Err(e) = self.store.remove(key) {
                log::warn!("Failed to clear local record '{key}': {e}");
            }
        }
    }

    fn publish(&self, user: Option<AuthUser>) {
        self.changes.send_replace(user);
    }
}

/// Scopes and extra authorize parameters per provider.
fn provider_options(provider: &str) -> (Option<String>, Vec<(String, String)>) {
    match provider {
        "spotify" => (
            Some(SPOTIFY_SCOPES.to_string()),
            vec![("show_dialog".to_string(), "true".to_string())],
        ),
        "google" => (Some(GOOGLE_SCOPES.to_string()), vec![]),
        _ => (None, vec![]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities;
    use crate::ports::auth::MockAuthClient;
    use crate::services::user::ProfileRetry;
    use crate::test_utils::{auth_user, test_db};
    use mockall::predicate::eq;
    use sea_orm::{EntityTrait, PaginatorTrait};
    use std::time::Duration;

    fn session_for(id: &str) -> AuthSession {
        AuthSession {
            access_token: format!("access-{id}"),
            refresh_token: format!("refresh-{id}"),
            expires_at: None,
            user: auth_user(id),
        }
    }

    fn settings() -> SessionSettings {
        SessionSettings {
            redirect_url: "http://localhost:5173/auth/callback".to_string(),
            origin: "http://localhost:5173".to_string(),
            home_url: "http://localhost:5173/".to_string(),
        }
    }

    async fn manager(auth: MockAuthClient) -> (SessionManager<MockAuthClient>, Arc<crate::database::Database>) {
        manager_with_store(auth, LocalStore::in_memory()).await
    }

    async fn manager_with_store(
        auth: MockAuthClient,
        store: LocalStore,
    ) -> (SessionManager<MockAuthClient>, Arc<crate::database::Database>) {
        let db = test_db().await;
        let users = Arc::new(UserService::with_retry(
            db.clone(),
            ProfileRetry {
                max_attempts: 1,
                base_delay: Duration::from_millis(1),
            },
        ));
        (SessionManager::new(auth, users, store, settings()), db)
    }

    fn authorize_stub(auth: &mut MockAuthClient) {
        auth.expect_authorize_url().returning(|request| {
            let mut url = Url::parse("https://project.supabase.co/auth/v1/authorize").unwrap();
            url.query_pairs_mut()
                .append_pair("provider", &request.provider)
                .append_pair("scopes", request.scopes.as_deref().unwrap_or(""));
            Ok(url)
        });
    }

    #[tokio::test]
    async fn test_authenticate_publishes_user_and_creates_profile() {
        let mut auth = MockAuthClient::new();
        auth.expect_sign_in_with_password()
            .with(eq("u1@example.com"), eq("hunter2"))
            .times(1)
            .returning(|_, _| Ok(session_for("u1")));
        let (manager, db) = manager(auth).await;
        let mut changes = manager.subscribe();

        let user = manager.authenticate("u1@example.com", "hunter2").await.unwrap();

        assert_eq!(user.id, "u1");
        assert!(changes.has_changed().unwrap());
        assert_eq!(changes.borrow_and_update().as_ref().map(|u| u.id.as_str()), Some("u1"));
        assert_eq!(manager.access_token().await.as_deref(), Some("access-u1"));
        assert_eq!(entities::user::Entity::find().count(&db.conn).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_authenticate_passes_auth_error_through() {
        let mut auth = MockAuthClient::new();
        auth.expect_sign_in_with_password()
            .returning(|_, _| Err(AuthError::api(400, "Invalid login credentials")));
        let (manager, _db) = manager(auth).await;

        let err = manager.authenticate("a@b.c", "wrong").await.unwrap_err();

        assert!(matches!(err, PlaylistError::AuthProvider(_)));
        assert_eq!(err.to_string(), "Invalid login credentials");
        assert!(manager.current_user().await.is_none());
    }

    #[tokio::test]
    async fn test_register_creates_profile_and_preferences() {
        let mut auth = MockAuthClient::new();
        auth.expect_sign_up().returning(|_, _, metadata| {
            let mut user = auth_user("u1");
            user.user_metadata = metadata;
            Ok(SignUpResponse::User(user))
        });
        let (manager, db) = manager(auth).await;

        let user = manager.register("u1@example.com", "pw", "Ada").await.unwrap();

        assert_eq!(user.user_metadata.full_name.as_deref(), Some("Ada"));
        let stored = entities::user::Entity::find_by_id("u1".to_string())
            .one(&db.conn)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.full_name.as_deref(), Some("Ada"));
        assert_eq!(
            entities::user_preferences::Entity::find()
                .count(&db.conn)
                .await
                .unwrap(),
            1
        );
        // Pending email confirmation leaves the client signed out
        assert!(manager.current_user().await.is_none());
    }

    #[tokio::test]
    async fn test_provider_sign_in_persists_records() {
        let mut auth = MockAuthClient::new();
        authorize_stub(&mut auth);
        let (manager, _db) = manager(auth).await;

        let outcome = manager
            .authenticate_with_provider("spotify", "/auth/callback")
            .await
            .unwrap();

        let ProviderSignIn::Redirect(url) = outcome else {
            panic!("expected a redirect");
        };
        assert!(url.query_pairs().any(|(k, v)| k == "scopes" && v.contains("playlist-modify-public")));
        assert_eq!(
            manager.store.get::<String>(AUTH_REDIRECT_KEY).as_deref(),
            Some("/")
        );
        let state = manager.store.get::<AuthState>(AUTH_STATE_KEY).unwrap();
        assert_eq!(state.provider, "spotify");
        assert_eq!(state.origin, "http://localhost:5173");
        assert_eq!(state.code_verifier.len(), 64);
    }

    #[tokio::test]
    async fn test_provider_sign_in_keeps_current_path() {
        let mut auth = MockAuthClient::new();
        authorize_stub(&mut auth);
        let (manager, _db) = manager(auth).await;

        manager
            .authenticate_with_provider("google", "/playlists/12")
            .await
            .unwrap();

        assert_eq!(
            manager.store.get::<String>(AUTH_REDIRECT_KEY).as_deref(),
            Some("/playlists/12")
        );
    }

    #[tokio::test]
    async fn test_provider_cancellation_is_a_no_op() {
        let mut auth = MockAuthClient::new();
        auth.expect_authorize_url()
            .returning(|_| Err(AuthError::api(400, "User cancelled the request")));
        let (manager, _db) = manager(auth).await;

        let outcome = manager
            .authenticate_with_provider("spotify", "/")
            .await
            .unwrap();

        assert_eq!(outcome, ProviderSignIn::Cancelled);
        assert!(manager.store.get::<String>(AUTH_REDIRECT_KEY).is_none());
        assert!(manager.store.get::<AuthState>(AUTH_STATE_KEY).is_none());
    }

    #[tokio::test]
    async fn test_complete_provider_sign_in_exchanges_code() {
        let mut auth = MockAuthClient::new();
        authorize_stub(&mut auth);
        auth.expect_exchange_code()
            .withf(|code, verifier| code == "the-code" && verifier.len() == 64)
            .times(1)
            .returning(|_, _| Ok(session_for("u1")));
        let (manager, db) = manager(auth).await;
        manager
            .authenticate_with_provider("spotify", "/playlists")
            .await
            .unwrap();
        let state = manager.store.get::<AuthState>(AUTH_STATE_KEY).unwrap().state;

        let outcome = manager
            .complete_provider_sign_in(ProviderCallback {
                code: Some("the-code".to_string()),
                state: Some(state),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ProviderCallbackOutcome::SignedIn {
                user: auth_user("u1"),
                redirect_path: "/playlists".to_string(),
            }
        );
        assert!(manager.store.get::<AuthState>(AUTH_STATE_KEY).is_none());
        assert_eq!(entities::user::Entity::find().count(&db.conn).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_complete_provider_sign_in_rejects_expired_state() {
        let auth = MockAuthClient::new();
        let (manager, _db) = manager(auth).await;
        manager
            .store
            .set(
                AUTH_STATE_KEY,
                &AuthState {
                    provider: "spotify".to_string(),
                    timestamp: chrono::Utc::now().timestamp_millis() - AUTH_STATE_TTL_MS - 1,
                    redirect_path: "/".to_string(),
                    origin: "http://localhost:5173".to_string(),
                    code_verifier: "v".repeat(64),
                    state: "s".to_string(),
                },
            )
            .unwrap();

        let err = manager
            .complete_provider_sign_in(ProviderCallback {
                code: Some("code".to_string()),
                ..Default::default()
            })
            .await
            .unwrap_err();

        assert!(matches!(err, PlaylistError::InvalidInput(_)));
        assert!(manager.store.get::<AuthState>(AUTH_STATE_KEY).is_none());
    }

    #[tokio::test]
    async fn test_complete_provider_sign_in_requires_matching_state() {
        for state in [None, Some("forged".to_string())] {
            let mut auth = MockAuthClient::new();
            authorize_stub(&mut auth);
            auth.expect_exchange_code().never();
            let (manager, _db) = manager(auth).await;
            manager
                .authenticate_with_provider("google", "/library")
                .await
                .unwrap();

            let err = manager
                .complete_provider_sign_in(ProviderCallback {
                    code: Some("other-code".to_string()),
                    state,
                    ..Default::default()
                })
                .await
                .unwrap_err();

            assert!(matches!(err, PlaylistError::InvalidInput(_)));
            assert!(manager.current_user().await.is_none());
            assert!(manager.store.get::<AuthState>(AUTH_STATE_KEY).is_none());
        }
    }

    #[tokio::test]
    async fn test_complete_provider_sign_in_cancelled_by_provider() {
        let auth = MockAuthClient::new();
        let (manager, _db) = manager(auth).await;
        let url = Url::parse(
            "http://localhost:5173/auth/callback?error=access_denied&error_description=User+denied",
        )
        .unwrap();

        let outcome = manager
            .complete_provider_sign_in(ProviderCallback::from_url(&url))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ProviderCallbackOutcome::Cancelled {
                redirect_path: "/".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_deauthenticate_clears_state_even_when_remote_fails() {
        let mut auth = MockAuthClient::new();
        auth.expect_sign_in_with_password()
            .returning(|_, _| Ok(session_for("u1")));
        auth.expect_sign_out()
            .returning(|_| Err(AuthError::api(500, "boom")));
        let (manager, _db) = manager(auth).await;
        manager.authenticate("u1@example.com", "pw").await.unwrap();
        let changes = manager.subscribe();

        let outcome = manager.deauthenticate().await;

        assert!(!outcome.signed_out_remotely);
        assert_eq!(outcome.home_url, "http://localhost:5173/");
        assert!(manager.current_user().await.is_none());
        assert!(manager.store.get::<AuthSession>(SESSION_KEY).is_none());
        assert!(changes.borrow().is_none());
    }

    #[tokio::test]
    async fn test_init_refreshes_rejected_session() {
        let store = LocalStore::in_memory();
        store.set(SESSION_KEY, &session_for("u1")).unwrap();

        let mut auth = MockAuthClient::new();
        auth.expect_get_user()
            .with(eq("access-u1"))
            .returning(|_| Err(AuthError::api(401, "JWT expired")));
        auth.expect_refresh_session()
            .with(eq("refresh-u1"))
            .returning(|_| {
                Ok(AuthSession {
                    access_token: "access-new".to_string(),
                    ..session_for("u1")
                })
            });
        let (manager, _db) = manager_with_store(auth, store).await;

        let user = manager.init().await.unwrap();

        assert_eq!(user.map(|u| u.id).as_deref(), Some("u1"));
        assert_eq!(manager.access_token().await.as_deref(), Some("access-new"));
    }

    #[tokio::test]
    async fn test_init_without_saved_session() {
        let auth = MockAuthClient::new();
        let (manager, _db) = manager(auth).await;

        assert!(manager.init().await.unwrap().is_none());
    }
}
