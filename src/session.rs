//! Client-side session lifecycle.
//!
//! [`SessionManager`] is the only writer of both the persisted session
//! ([`TokenStore`]) and the request augmentation rule
//! ([`BearerAuth`](crate::BearerAuth)); every transition updates both.
//!
//! ```rust,ignore
//! use socnet_session::{ApiClient, ApiConfig, Credentials, FileStore, SessionManager};
//!
//! let api = ApiClient::new(ApiConfig::from_env()?);
//! let (mut session, _restore_error) = SessionManager::restore(FileStore::open_default()?, api);
//!
//! if !session.is_authenticated() {
//!     match session.sign_in(&Credentials::new("alice", "secret")).await {
//!         Ok(s) => println!("hello, {}", s.profile.first_name),
//!         Err(e) => show(e.notice()),
//!     }
//! }
//! ```

use crate::api::ApiClient;
use crate::error::Error;
use crate::interceptor::Registration;
use crate::store::{KeyValueStore, TokenStore};
use crate::token::{DecodedClaims, decode_claims};
use crate::types::{BearerToken, Credentials, UserRecord};

/// Snapshot of an authenticated session.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct Session {
    pub token: BearerToken,
    pub claims: DecodedClaims,
    pub profile: UserRecord,
}

/// Owns the Anonymous/Authenticated state of one client instance.
pub struct SessionManager<S> {
    store: TokenStore<S>,
    api: ApiClient,
    claims: Option<DecodedClaims>,
    registration: Option<Registration>,
}

impl<S: KeyValueStore> SessionManager<S> {
    /// Start Anonymous, discarding anything already persisted in `store`.
    ///
    /// Use [`restore`](Self::restore) to pick up a session saved by an
    /// earlier run instead.
    #[must_use]
    pub fn new(store: S, api: ApiClient) -> Self {
        let manager = Self::anonymous(store, api);
        if let Err(e) = manager.store.clear() {
            tracing::error!(error = %e, "Failed to clear persisted session");
        }
        manager
    }

    fn anonymous(store: S, api: ApiClient) -> Self {
        Self {
            store: TokenStore::new(store),
            api,
            claims: None,
            registration: None,
        }
    }

    /// Rebuild the session persisted in `store`.
    ///
    /// A complete session re-arms request augmentation. Partial or
    /// unreadable state is cleared so the manager starts Anonymous; the
    /// reason is returned alongside the manager so callers can tell the
    /// user their session was dropped.
    pub fn restore(store: S, api: ApiClient) -> (Self, Option<Error>) {
        let mut manager = Self::anonymous(store, api);
        match manager.load_persisted() {
            Ok(Some(session)) => {
                tracing::info!(user_id = %session.claims.subject_id, "Session restored");
                manager.arm(session.token);
                manager.claims = Some(session.claims);
                (manager, None)
            }
            Ok(None) => (manager, None),
            Err(e) => {
                tracing::warn!(error = %e, "Discarding persisted session");
                if let Err(clear_err) = manager.store.clear() {
                    tracing::error!(error = %clear_err, "Failed to clear corrupt session");
                }
                (manager, Some(e))
            }
        }
    }

    fn load_persisted(&self) -> Result<Option<Session>, Error> {
        let token = self.store.get_token()?;
        let claims = self.store.get_decoded_token()?;
        let profile = self.store.get_profile()?;

        match (token, claims, profile) {
            (None, None, None) => Ok(None),
            (Some(token), stored, Some(profile)) => {
                let claims = decode_claims(token.as_str())?;
                match stored {
                    Some(stored)
                        if stored.subject_id != claims.subject_id
                            || stored.token_id != claims.token_id =>
                    {
                        return Err(Error::CorruptSession(format!(
                            "stored claims (sub {}) do not belong to stored token (sub {})",
                            stored.subject_id, claims.subject_id
                        )));
                    }
                    Some(_) => {}
                    // Claims are derived data; re-derive them if only they are missing.
                    None => self.store.set_decoded_token(&claims)?,
                }
                Ok(Some(Session {
                    token,
                    claims,
                    profile,
                }))
            }
            (token, _, profile) => Err(Error::CorruptSession(format!(
                "incomplete session (token: {}, profile: {})",
                present(token.is_some()),
                present(profile.is_some()),
            ))),
        }
    }

    /// Whether a token is persisted. Reads the store only; no network.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.get_token().is_some()
    }

    /// Establish (or replace) the session.
    ///
    /// Persists token, decoded claims and profile, then arms request
    /// augmentation with `token`. Calling it again retires the previous rule
    /// first, so only the newest token is ever sent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedToken`] if `token` cannot be decoded (nothing
    /// is written in that case), or [`Error::Storage`] if persisting fails
    /// (the store is cleared and the manager left Anonymous).
    pub fn login(&mut self, token: BearerToken, profile: UserRecord) -> Result<(), Error> {
        let claims = decode_claims(token.as_str())?;
        self.commit(token, claims, profile)
    }

    fn commit(
        &mut self,
        token: BearerToken,
        claims: DecodedClaims,
        profile: UserRecord,
    ) -> Result<(), Error> {
        let persisted = self
            .store
            .set_token(&token)
            .and_then(|()| self.store.set_decoded_token(&claims))
            .and_then(|()| self.store.set_profile(&profile));

        if let Err(e) = persisted {
            tracing::error!(error = %e, "Failed to persist session");
            self.logout();
            return Err(e);
        }

        if claims.is_expired() {
            tracing::debug!(user_id = %claims.subject_id, "Session token is already past its exp claim");
        }
        tracing::info!(user_id = %claims.subject_id, "Session established");

        self.arm(token);
        self.claims = Some(claims);
        Ok(())
    }

    /// End the session. No-op when already Anonymous.
    pub fn logout(&mut self) {
        self.disarm();
        let was_authenticated = self.claims.take().is_some();

        if let Err(e) = self.store.clear() {
            tracing::error!(error = %e, "Failed to clear persisted session");
        }
        if was_authenticated {
            tracing::info!("Session ended");
        }
    }

    /// Log in with credentials and load the user's profile.
    ///
    /// Order: the token is obtained and armed first, so the profile request
    /// is itself authenticated; only after the profile arrives is anything
    /// persisted. If either request fails or the token cannot be decoded,
    /// the store is left untouched and the manager returns to whatever state
    /// it was in before the call.
    ///
    /// # Errors
    ///
    /// [`Error::Network`] / [`Error::Api`] from either request,
    /// [`Error::MalformedToken`] if the server issued an undecodable token,
    /// or [`Error::Storage`] if persisting fails.
    pub async fn sign_in(&mut self, credentials: &Credentials) -> Result<Session, Error> {
        let response = self.api.login(credentials).await?;
        let claims = decode_claims(response.token.as_str())?;

        if claims.subject_id != response.user_id {
            tracing::warn!(
                user_id = %response.user_id,
                subject = %claims.subject_id,
                "Login response user id differs from token subject; using token subject"
            );
        }

        let previous = self
            .registration
            .as_ref()
            .and_then(|_| self.api.auth().current());
        self.arm(response.token.clone());

        let profile = match self.api.get_user_by_id(&claims.subject_id).await {
            Ok(profile) => profile,
            Err(e) => {
                self.disarm();
                if let Some(previous) = previous {
                    self.arm(previous);
                }
                return Err(e);
            }
        };

        self.commit(response.token.clone(), claims.clone(), profile.clone())?;
        Ok(Session {
            token: response.token,
            claims,
            profile,
        })
    }

    /// Revoke the token server-side, then end the local session.
    ///
    /// The local session ends even if revocation fails; the error is
    /// returned for display.
    ///
    /// # Errors
    ///
    /// [`Error::Network`] / [`Error::Api`] from the revocation request.
    pub async fn sign_out(&mut self) -> Result<(), Error> {
        if !self.is_authenticated() {
            self.logout();
            return Ok(());
        }

        let revoked = self.api.revoke().await;
        if let Err(e) = &revoked {
            tracing::warn!(error = %e, "Token revocation failed; ending local session anyway");
        }
        self.logout();
        revoked
    }

    /// Persisted token, `None` when Anonymous.
    #[must_use]
    pub fn get_token(&self) -> Option<BearerToken> {
        self.store.get_token().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to read token");
            None
        })
    }

    /// Persisted profile, `None` when Anonymous.
    #[must_use]
    pub fn get_profile(&self) -> Option<UserRecord> {
        self.store.get_profile().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to read profile");
            None
        })
    }

    /// Decoded claims of the active session.
    #[must_use]
    pub fn claims(&self) -> Option<&DecodedClaims> {
        self.claims.as_ref()
    }

    /// Full snapshot of the active session.
    #[must_use]
    pub fn session(&self) -> Option<Session> {
        Some(Session {
            token: self.get_token()?,
            claims: self.claims.clone()?,
            profile: self.get_profile()?,
        })
    }

    /// Client whose requests carry this session's token.
    #[must_use]
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    #[must_use]
    pub fn store(&self) -> &TokenStore<S> {
        &self.store
    }

    fn arm(&mut self, token: BearerToken) {
        self.disarm();
        self.registration = Some(self.api.auth().install(token));
    }

    fn disarm(&mut self) {
        if let Some(registration) = self.registration.take() {
            if !self.api.auth().eject(registration) {
                tracing::warn!("Bearer rule was already replaced outside the session manager");
            }
        }
    }
}

fn present(yes: bool) -> &'static str {
    if yes { "present" } else { "missing" }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::api::ApiConfig;
    use crate::store::{AUTH_TOKEN_KEY, MemoryStore, USER_PROFILE_KEY};
    use crate::token::tests::make_token;

    fn token_for(sub: &str) -> BearerToken {
        BearerToken::new(make_token(&serde_json::json!({
            "sub": sub,
            "jti": format!("jti-{sub}"),
            "permissions": ["read"],
            "exp": 4_000_000_000_i64,
        })))
    }

    fn profile(id: &str) -> UserRecord {
        UserRecord::new(id, "Alice", "Liddell", "1990-05-04", "Oxford", "alice")
    }

    fn manager() -> SessionManager<Arc<MemoryStore>> {
        SessionManager::new(Arc::new(MemoryStore::new()), ApiClient::new(ApiConfig::default()))
    }

    #[test]
    fn starts_anonymous() {
        let session = manager();
        assert!(!session.is_authenticated());
        assert!(session.get_token().is_none());
        assert!(session.get_profile().is_none());
        assert!(session.claims().is_none());
        assert!(session.session().is_none());
        assert!(!session.api().auth().is_armed());
    }

    #[test]
    fn login_persists_and_arms() {
        let mut session = manager();
        let token = token_for("42");
        session.login(token.clone(), profile("42")).unwrap();

        assert!(session.is_authenticated());
        assert_eq!(session.get_token(), Some(token.clone()));
        assert_eq!(session.get_profile(), Some(profile("42")));
        assert_eq!(session.claims().unwrap().subject_id.as_str(), "42");
        assert_eq!(session.api().auth().current(), Some(token));
        assert!(session.store().get_decoded_token().unwrap().is_some());
    }

    #[test]
    fn relogin_replaces_token() {
        let mut session = manager();
        session.login(token_for("1"), profile("1")).unwrap();
        session.login(token_for("2"), profile("2")).unwrap();

        assert_eq!(session.api().auth().current(), Some(token_for("2")));
        assert_eq!(session.get_token(), Some(token_for("2")));
        assert_eq!(session.claims().unwrap().subject_id.as_str(), "2");
    }

    #[test]
    fn logout_clears_everything() {
        let mut session = manager();
        session.login(token_for("42"), profile("42")).unwrap();
        session.logout();

        assert!(!session.is_authenticated());
        assert!(session.get_profile().is_none());
        assert!(session.claims().is_none());
        assert!(session.store().get_decoded_token().unwrap().is_none());
        assert!(!session.api().auth().is_armed());
    }

    #[test]
    fn logout_when_anonymous_is_noop() {
        let mut session = manager();
        session.logout();
        session.logout();
        assert!(!session.is_authenticated());
    }

    #[test]
    fn malformed_token_writes_nothing() {
        let mut session = manager();
        let err = session
            .login(BearerToken::from("not-a-jwt"), profile("42"))
            .unwrap_err();
        assert!(matches!(err, Error::MalformedToken(_)));
        assert!(!session.is_authenticated());
        assert!(session.get_profile().is_none());
        assert!(!session.api().auth().is_armed());
    }

    #[test]
    fn restore_picks_up_persisted_session() {
        let store = Arc::new(MemoryStore::new());
        {
            let mut first = SessionManager::new(store.clone(), ApiClient::new(ApiConfig::default()));
            first.login(token_for("42"), profile("42")).unwrap();
        }

        let (restored, err) =
            SessionManager::restore(store, ApiClient::new(ApiConfig::default()));
        assert!(err.is_none());
        assert!(restored.is_authenticated());
        assert_eq!(restored.api().auth().current(), Some(token_for("42")));
        let snapshot = restored.session().unwrap();
        assert_eq!(snapshot.profile, profile("42"));
        assert_eq!(snapshot.claims.subject_id.as_str(), "42");
    }

    #[test]
    fn restore_rederives_missing_claims() {
        let store = Arc::new(MemoryStore::new());
        let tokens = TokenStore::new(store.clone());
        tokens.set_token(&token_for("9")).unwrap();
        tokens.set_profile(&profile("9")).unwrap();

        let (restored, err) =
            SessionManager::restore(store, ApiClient::new(ApiConfig::default()));
        assert!(err.is_none());
        assert_eq!(restored.claims().unwrap().subject_id.as_str(), "9");
        assert!(restored.store().get_decoded_token().unwrap().is_some());
    }

    #[test]
    fn restore_rejects_token_without_profile() {
        let store = Arc::new(MemoryStore::new());
        store.set(AUTH_TOKEN_KEY, token_for("1").as_str()).unwrap();

        let (restored, err) =
            SessionManager::restore(store.clone(), ApiClient::new(ApiConfig::default()));
        assert!(matches!(err, Some(Error::CorruptSession(_))));
        assert!(!restored.is_authenticated());
        assert!(!restored.api().auth().is_armed());
        assert!(store.get(AUTH_TOKEN_KEY).unwrap().is_none());
    }

    #[test]
    fn restore_rejects_unreadable_profile() {
        let store = Arc::new(MemoryStore::new());
        store.set(AUTH_TOKEN_KEY, token_for("1").as_str()).unwrap();
        store.set(USER_PROFILE_KEY, "{oops").unwrap();

        let (restored, err) =
            SessionManager::restore(store.clone(), ApiClient::new(ApiConfig::default()));
        assert!(matches!(err, Some(Error::CorruptSession(_))));
        assert!(!restored.is_authenticated());
        assert!(store.get(USER_PROFILE_KEY).unwrap().is_none());
    }

    #[test]
    fn new_discards_persisted_session() {
        let store = Arc::new(MemoryStore::new());
        {
            let mut first = SessionManager::new(store.clone(), ApiClient::new(ApiConfig::default()));
            first.login(token_for("42"), profile("42")).unwrap();
        }

        let fresh = SessionManager::new(store.clone(), ApiClient::new(ApiConfig::default()));
        assert!(!fresh.is_authenticated());
        assert!(fresh.get_token().is_none());
        assert!(fresh.session().is_none());
        assert!(!fresh.api().auth().is_armed());
        assert!(store.get(AUTH_TOKEN_KEY).unwrap().is_none());
        assert!(store.get(USER_PROFILE_KEY).unwrap().is_none());
    }

    #[test]
    fn restore_rejects_claims_of_another_token() {
        let store = Arc::new(MemoryStore::new());
        let tokens = TokenStore::new(store.clone());
        tokens.set_token(&token_for("2")).unwrap();
        tokens
            .set_decoded_token(&decode_claims(token_for("1").as_str()).unwrap())
            .unwrap();
        tokens.set_profile(&profile("2")).unwrap();

        let (restored, err) =
            SessionManager::restore(store.clone(), ApiClient::new(ApiConfig::default()));
        assert!(matches!(err, Some(Error::CorruptSession(_))));
        assert!(!restored.is_authenticated());
        assert!(restored.claims().is_none());
        assert!(!restored.api().auth().is_armed());
        assert!(tokens.get_decoded_token().unwrap().is_none());
    }

    #[test]
    fn restore_of_empty_store_is_anonymous() {
        let (restored, err) = SessionManager::restore(
            MemoryStore::new(),
            ApiClient::new(ApiConfig::default()),
        );
        assert!(err.is_none());
        assert!(!restored.is_authenticated());
    }
}
