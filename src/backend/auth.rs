//! Email/password sessions against the auth service.
//!
//! [`AuthClient`] owns the current [`Session`], keeps the shared
//! [`Backend`] handle's bearer token in step with it, and broadcasts
//! [`AuthEvent`]s to anyone holding an [`AuthSubscription`].

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;

use super::client::Backend;
use super::error::BackendError;
use super::types::RawProfile;
use crate::feed::{Author, UserId};

const EVENT_CAPACITY: usize = 16;

/// Change in authentication state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn(UserId),
    SignedOut,
    TokenRefreshed,
}

/// Account kind from the profile's `user_type` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UserRole {
    #[default]
    Member,
    /// May remove any post.
    Admin,
}

impl UserRole {
    fn from_user_type(user_type: Option<&str>) -> Self {
        match user_type.map(str::trim) {
            Some(t) if t.eq_ignore_ascii_case("admin") => UserRole::Admin,
            _ => UserRole::Member,
        }
    }
}

/// The viewer's own profile row.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub author: Author,
    pub role: UserRole,
}

/// A signed-in user and their tokens.
#[derive(Clone)]
pub struct Session {
    pub user_id: UserId,
    pub email: Option<String>,
    /// Profile row merged in after sign-in; `None` if it could not be read.
    pub profile: Option<Author>,
    /// `Member` unless the profile row says otherwise.
    pub role: UserRole,
    pub expires_at: Option<DateTime<Utc>>,
    access_token: Arc<SecretString>,
    refresh_token: Arc<SecretString>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("email", &self.email)
            .field("profile", &self.profile)
            .field("role", &self.role)
            .field("expires_at", &self.expires_at)
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .finish()
    }
}

impl Session {
    pub fn display_name(&self) -> &str {
        match (&self.profile, &self.email) {
            (Some(p), _) if p.name.is_some() => p.display_name(),
            (_, Some(email)) => email.as_str(),
            _ => crate::feed::post::ANONYMOUS_NAME,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    /// True when the access token expires within `margin` of `now`.
    pub fn expires_within(&self, margin: ChronoDuration, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at - now <= margin)
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    user: AuthUser,
}

#[derive(Deserialize)]
struct AuthUser {
    id: UserId,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Serialize)]
struct PasswordGrant<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct SignUpRequest<'a> {
    email: &'a str,
    password: &'a str,
    data: SignUpData<'a>,
}

#[derive(Serialize)]
struct SignUpData<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

/// Receives auth events until dropped; dropping it unsubscribes.
pub struct AuthSubscription {
    rx: broadcast::Receiver<AuthEvent>,
}

impl AuthSubscription {
    /// Next event, or `None` once the client is gone.
    ///
    /// A subscriber that falls behind skips the events it missed.
    pub async fn recv(&mut self) -> Option<AuthEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "Auth subscriber lagged, skipping events");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Sign-in state shared with a [`Backend`] handle.
#[derive(Clone)]
pub struct AuthClient {
    backend: Backend,
    session: Arc<RwLock<Option<Session>>>,
    events: broadcast::Sender<AuthEvent>,
}

impl AuthClient {
    pub fn new(backend: Backend) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            backend,
            session: Arc::new(RwLock::new(None)),
            events,
        }
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn subscribe(&self) -> AuthSubscription {
        AuthSubscription {
            rx: self.events.subscribe(),
        }
    }

    pub fn current_session(&self) -> Option<Session> {
        self.session
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// The signed-in user's id, if any.
    pub fn viewer(&self) -> Option<UserId> {
        self.current_session().map(|s| s.user_id)
    }

    pub async fn sign_in(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<Session, BackendError> {
        let body = PasswordGrant {
            email,
            password: password.expose_secret(),
        };
        let session = self.token_request("password", &body).await?;
        let session = self.with_profile(session).await;

        tracing::info!(user_id = %session.user_id, "Signed in");
        self.install(Some(session.clone()));
        self.emit(AuthEvent::SignedIn(session.user_id.clone()));
        Ok(session)
    }

    /// Create an account. Returns the session when the project signs new
    /// users in immediately, `None` when the address must be confirmed first.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &SecretString,
        name: Option<&str>,
    ) -> Result<Option<Session>, BackendError> {
        let url = self.backend.endpoint("auth/v1/signup")?;
        let request = self.backend.anon_request(Method::POST, url).json(&SignUpRequest {
            email,
            password: password.expose_secret(),
            data: SignUpData { name },
        });
        let value: serde_json::Value = self.backend.send_json(request).await?;

        if value.get("access_token").is_none() {
            tracing::info!("Sign-up pending e-mail confirmation");
            return Ok(None);
        }
        let token: TokenResponse = serde_json::from_value(value)?;
        let session = self.with_profile(session_from(token)).await;

        self.install(Some(session.clone()));
        self.emit(AuthEvent::SignedIn(session.user_id.clone()));
        Ok(Some(session))
    }

    /// End the session. Local state is cleared even when the remote call
    /// fails; the remote error is still returned.
    pub async fn sign_out(&self) -> Result<(), BackendError> {
        let had_session = self.current_session().is_some();
        let remote = match self.backend.endpoint("auth/v1/logout") {
            Ok(url) if had_session => self
                .backend
                .send(self.backend.request(Method::POST, url))
                .await
                .map(|_| ()),
            Ok(_) => Ok(()),
            Err(e) => Err(e),
        };

        if let Err(e) = &remote {
            tracing::warn!(error = %e, "Remote sign-out failed, clearing local session anyway");
        }
        self.install(None);
        self.emit(AuthEvent::SignedOut);
        remote
    }

    /// Exchange the refresh token for a new access token.
    ///
    /// A refresh token the server rejects (any 4xx) cannot recover, so the
    /// local session is cleared and [`AuthEvent::SignedOut`] is sent.
    pub async fn refresh_session(&self) -> Result<Session, BackendError> {
        let current = self
            .current_session()
            .ok_or_else(|| BackendError::HttpStatus {
                status: 401,
                message: "no session to refresh".into(),
            })?;

        let body = serde_json::json!({ "refresh_token": current.refresh_token.expose_secret() });
        let mut session = match self.token_request("refresh_token", &body).await {
            Ok(session) => session,
            Err(e) if e.is_client_error() => {
                tracing::warn!(error = %e, "Refresh token rejected, signing out locally");
                self.install(None);
                self.emit(AuthEvent::SignedOut);
                return Err(e);
            }
            Err(e) => return Err(e),
        };
        session.profile = current.profile;
        session.role = current.role;

        self.install(Some(session.clone()));
        self.emit(AuthEvent::TokenRefreshed);
        Ok(session)
    }

    async fn token_request<B: Serialize>(
        &self,
        grant_type: &str,
        body: &B,
    ) -> Result<Session, BackendError> {
        let mut url = self.backend.endpoint("auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", grant_type);
        let request = self.backend.anon_request(Method::POST, url).json(body);
        let token: TokenResponse = self.backend.send_json(request).await?;
        Ok(session_from(token))
    }

    /// Merge the profile row into a fresh session. Failure only loses the name.
    async fn with_profile(&self, mut session: Session) -> Session {
        let token = SecretString::from(session.access_token.expose_secret().to_string());
        self.backend.set_session_token(Some(token));
        match self.backend.fetch_profile(&session.user_id).await {
            Ok(Some(profile)) => {
                session.profile = Some(profile.author);
                session.role = profile.role;
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(user_id = %session.user_id, error = %e, "Could not load profile"),
        }
        session
    }

    fn install(&self, session: Option<Session>) {
        let token = session
            .as_ref()
            .map(|s| SecretString::from(s.access_token.expose_secret().to_string()));
        self.backend.set_session_token(token);
        *self
            .session
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = session;
    }

    fn emit(&self, event: AuthEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

impl Backend {
    /// The profile row for `user`, if there is one.
    pub async fn fetch_profile(&self, user: &UserId) -> Result<Option<Profile>, BackendError> {
        let filter = format!("eq.{user}");
        let url = self.rest_url(
            "profiles",
            &[
                ("select", "user_id,name,avatar_url,user_type"),
                ("user_id", filter.as_str()),
                ("limit", "1"),
            ],
        )?;
        let rows: Vec<RawProfile> = self.send_json(self.request(Method::GET, url)).await?;
        Ok(rows.into_iter().next().map(|p| Profile {
            role: UserRole::from_user_type(p.user_type.as_deref()),
            author: Author::from_profile(Some(p), Some(user.clone())),
        }))
    }
}

fn session_from(token: TokenResponse) -> Session {
    Session {
        user_id: token.user.id,
        email: token.user.email,
        profile: None,
        role: UserRole::Member,
        expires_at: token
            .expires_in
            .map(|secs| Utc::now() + ChronoDuration::seconds(secs)),
        access_token: Arc::new(SecretString::from(token.access_token)),
        refresh_token: Arc::new(SecretString::from(token.refresh_token)),
    }
}
