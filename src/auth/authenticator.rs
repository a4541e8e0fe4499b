//! Produces a usable session for a (user, scope set, token path) triple,
//! hiding whether that took a cached record, a refresh, or a full consent.

use std::path::Path;

use chrono::Utc;

use crate::auth::consent::ConsentFlow;
use crate::auth::provider::TokenEndpoint;
use crate::auth::store::{self, StoredToken};
use crate::error::AuthenticationError;
use crate::gmail::GmailClient;

/// In-memory handle over a valid credential record. Created per
/// authentication call and shared read-only by the resource clients built
/// against it; it holds nothing beyond the token itself.
#[derive(Debug, Clone)]
pub struct Session {
    token: StoredToken,
}

impl Session {
    pub(crate) fn new(token: StoredToken) -> Self {
        Self { token }
    }

    pub fn user(&self) -> &str {
        &self.token.user
    }

    pub fn access_token(&self) -> &str {
        &self.token.access_token
    }

    #[allow(dead_code)]
    pub fn token(&self) -> &StoredToken {
        &self.token
    }
}

/// Orchestrates token storage, refresh, and interactive consent.
///
/// Holds no per-user state: every call is parameterized on the user identity,
/// the requested scopes, and the token path, so distinct users stay fully
/// isolated. The two injected seams (`TokenEndpoint`, `ConsentFlow`) carry the
/// shared, read-only OAuth client configuration.
pub struct Authenticator<P, C> {
    provider: P,
    consent: C,
}

impl<P: TokenEndpoint, C: ConsentFlow> Authenticator<P, C> {
    pub fn new(provider: P, consent: C) -> Self {
        Self { provider, consent }
    }

    /// Return a valid session for `user`, loading, refreshing, or running the
    /// consent flow as needed.
    ///
    /// A provider-rejected refresh token surfaces as an error rather than
    /// silently re-consenting; the caller decides whether to fall back to
    /// [`Authenticator::reauthorize`]. The stored record is left untouched in
    /// that case.
    pub async fn authenticate(
        &self,
        user: &str,
        scopes: &[String],
        token_path: &Path,
    ) -> Result<Session, AuthenticationError> {
        let existing = store::load(token_path)?;

        if let Some(token) = existing {
            if token.is_valid(scopes, Utc::now()) {
                tracing::info!(user, "loaded existing token");
                return Ok(Session::new(token));
            }

            // Refresh cannot widen scopes; a cached record that does not
            // cover the request is treated as absent.
            if token.covers_scopes(scopes)
                && let Some(ref refresh_token) = token.refresh_token
            {
                let response = self.provider.refresh(refresh_token).await?;
                let renewed = token.renewed(response);
                store::persist(token_path, &renewed)?;
                tracing::info!(user, "token refreshed");
                return Ok(Session::new(renewed));
            }

            tracing::info!(user, "stored token unusable, starting consent flow");
        }

        self.consent_and_persist(user, scopes, token_path).await
    }

    /// Force a fresh interactive consent, ignoring any stored record. Used
    /// after the provider rejects a refresh token (revoked grant).
    pub async fn reauthorize(
        &self,
        user: &str,
        scopes: &[String],
        token_path: &Path,
    ) -> Result<Session, AuthenticationError> {
        tracing::info!(user, "reauthorizing via consent flow");
        self.consent_and_persist(user, scopes, token_path).await
    }

    async fn consent_and_persist(
        &self,
        user: &str,
        scopes: &[String],
        token_path: &Path,
    ) -> Result<Session, AuthenticationError> {
        let grant = self.consent.obtain_authorization(scopes).await?;
        let response = self.provider.exchange_code(&grant).await?;
        let token = StoredToken::from_response(user, scopes, response);
        store::persist(token_path, &token)?;
        tracing::info!(user, "new token obtained via consent flow");
        Ok(Session::new(token))
    }

    /// Build a Gmail resource client against a session. Refuses a session
    /// with an empty access token, which `authenticate` never produces.
    pub fn service(&self, session: &Session) -> Result<GmailClient, AuthenticationError> {
        if session.access_token().is_empty() {
            return Err(AuthenticationError::InvalidSession {
                user: session.user().to_string(),
            });
        }
        GmailClient::new(session).map_err(|_| AuthenticationError::InvalidSession {
            user: session.user().to_string(),
        })
    }
}
