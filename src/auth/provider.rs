//! Google OAuth2 token endpoints for the installed-app flow.
//!
//! The application's own OAuth client is described by the standard Google
//! "Desktop app" client-secret JSON file; its path comes from configuration
//! and is shared read-only across all users.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::auth::consent::ConsentGrant;
use crate::error::{ConsentError, RefreshError};

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

const HTTP_TIMEOUT_SECS: u64 = 30;

/// Token endpoints of the identity provider. The seam the Authenticator is
/// generic over, so tests can substitute a scripted stub.
pub trait TokenEndpoint {
    /// Exchange a refresh token for a new access token.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, RefreshError>;

    /// Exchange an authorization code obtained from a consent flow.
    async fn exchange_code(&self, grant: &ConsentGrant) -> Result<TokenResponse, ConsentError>;
}

/// Successful response from a token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    /// Space-separated granted scopes, when the provider reports them.
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

impl ErrorResponse {
    fn unknown() -> Self {
        Self {
            error: "unknown_error".to_string(),
            error_description: None,
        }
    }
}

/// The application's OAuth client registration, read from the Google
/// client-secret JSON file (`"installed"` key for desktop apps).
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecret {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_auth_uri() -> String {
    GOOGLE_AUTH_URL.to_string()
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URL.to_string()
}

#[derive(Debug, Deserialize)]
struct ClientSecretFile {
    installed: ClientSecret,
}

impl ClientSecret {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read client secret file: {}", path.display()))?;
        let file: ClientSecretFile = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse client secret file: {}", path.display()))?;
        Ok(file.installed)
    }
}

/// HTTP client for Google's token endpoints.
pub struct GoogleOAuth {
    client_id: String,
    client_secret: Option<String>,
    auth_uri: String,
    token_uri: String,
    http: reqwest::Client,
}

impl GoogleOAuth {
    pub fn new(secret: ClientSecret) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .context("failed to create HTTP client")?;

        Ok(Self {
            client_id: secret.client_id,
            client_secret: secret.client_secret,
            auth_uri: secret.auth_uri,
            token_uri: secret.token_uri,
            http,
        })
    }

    /// Shared parameter set for both token-endpoint grants.
    fn base_params<'a>(&'a self, grant_type: &'a str) -> Vec<(&'static str, &'a str)> {
        let mut params = vec![
            ("client_id", self.client_id.as_str()),
            ("grant_type", grant_type),
        ];
        if let Some(ref secret) = self.client_secret {
            params.push(("client_secret", secret.as_str()));
        }
        params
    }

    async fn post_token_form(
        &self,
        params: &[(&'static str, &str)],
    ) -> Result<reqwest::Response, reqwest::Error> {
        self.http.post(&self.token_uri).form(params).send().await
    }
}

impl TokenEndpoint for GoogleOAuth {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, RefreshError> {
        let mut params = self.base_params("refresh_token");
        params.push(("refresh_token", refresh_token));

        let response = self
            .post_token_form(&params)
            .await
            .map_err(RefreshError::Transport)?;

        if !response.status().is_success() {
            let error: ErrorResponse = response.json().await.unwrap_or(ErrorResponse::unknown());
            tracing::warn!(error = %error.error, "token refresh rejected");
            return Err(RefreshError::Rejected { error: error.error });
        }

        response.json().await.map_err(RefreshError::Decode)
    }

    async fn exchange_code(&self, grant: &ConsentGrant) -> Result<TokenResponse, ConsentError> {
        let mut params = self.base_params("authorization_code");
        params.push(("code", grant.code.as_str()));
        params.push(("redirect_uri", grant.redirect_uri.as_str()));
        params.push(("code_verifier", grant.pkce_verifier.as_str()));

        let response = self
            .post_token_form(&params)
            .await
            .map_err(ConsentError::Exchange)?;

        if !response.status().is_success() {
            let error: ErrorResponse = response.json().await.unwrap_or(ErrorResponse::unknown());
            let description = error.error_description.unwrap_or_default();
            tracing::warn!(error = %error.error, %description, "code exchange rejected");
            return Err(ConsentError::ExchangeRejected { error: error.error });
        }

        response.json().await.map_err(ConsentError::Exchange)
    }
}
