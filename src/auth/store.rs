//! Durable per-user token storage.
//!
//! One JSON file per user at `<token_dir>/<sanitized user>.json`. The store
//! only ever reads or writes the exact path it is given; deriving that path
//! from a user identity lives in [`token_path`].

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::provider::TokenResponse;
use crate::error::StorageError;

/// Treat tokens as expired slightly early so one that dies mid-run is
/// refreshed up front.
const EXPIRY_SKEW_SECS: i64 = 60;

/// Fallback lifetime when the provider omits `expires_in`.
const DEFAULT_LIFETIME_SECS: i64 = 3600;

/// One user's persisted authorization grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    /// User identity the grant belongs to (email address).
    pub user: String,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Scopes actually granted by the provider.
    pub scopes: Vec<String>,
    pub expiry: DateTime<Utc>,
}

impl StoredToken {
    /// Build a record from a fresh code-exchange response. The provider's
    /// granted scope list wins over the requested one when present.
    pub fn from_response(user: &str, requested_scopes: &[String], response: TokenResponse) -> Self {
        let scopes = match response.scope {
            Some(ref granted) if !granted.trim().is_empty() => granted
                .split_whitespace()
                .map(|s| s.to_string())
                .collect(),
            _ => requested_scopes.to_vec(),
        };

        Self {
            user: user.to_string(),
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            scopes,
            expiry: expiry_from(response.expires_in),
        }
    }

    /// Apply a refresh response in place of this record. The refresh token is
    /// preserved unless the provider issued a new one.
    pub fn renewed(&self, response: TokenResponse) -> Self {
        Self {
            user: self.user.clone(),
            access_token: response.access_token,
            refresh_token: response.refresh_token.or_else(|| self.refresh_token.clone()),
            scopes: self.scopes.clone(),
            expiry: expiry_from(response.expires_in),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry <= now + Duration::seconds(EXPIRY_SKEW_SECS)
    }

    /// Granted scopes cover every requested scope.
    pub fn covers_scopes(&self, requested: &[String]) -> bool {
        requested
            .iter()
            .all(|scope| self.scopes.iter().any(|granted| granted == scope))
    }

    /// Usable as-is: not expired and scopes cover the request.
    pub fn is_valid(&self, requested: &[String], now: DateTime<Utc>) -> bool {
        !self.is_expired(now) && self.covers_scopes(requested)
    }
}

fn expiry_from(expires_in: Option<u64>) -> DateTime<Utc> {
    let lifetime = expires_in
        .map(|secs| Duration::seconds(secs as i64))
        .unwrap_or_else(|| Duration::seconds(DEFAULT_LIFETIME_SECS));
    Utc::now() + lifetime
}

/// Deterministic token path for a user: `@` becomes `_at_`, path separators
/// are squashed so an identity can never escape the token directory.
pub fn token_path(token_dir: &Path, user: &str) -> PathBuf {
    let safe_user = user
        .replace('@', "_at_")
        .replace(['/', '\\', ':'], "_");
    token_dir.join(format!("{safe_user}.json"))
}

/// Load a stored token. A missing file is the normal "not yet authenticated"
/// case and returns `Ok(None)`; an unreadable or unparseable file is an error.
pub fn load(path: &Path) -> Result<Option<StoredToken>, StorageError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(StorageError::Read {
                path: path.to_path_buf(),
                source: e,
            });
        }
    };

    let token = serde_json::from_str(&content).map_err(|e| StorageError::Malformed {
        path: path.to_path_buf(),
        source: e,
    })?;

    Ok(Some(token))
}

/// Overwrite the record at `path`, creating parent directories as needed.
///
/// Writes go to a temporary file in the same directory followed by an atomic
/// rename, so a crash mid-write can never leave a corrupt token file behind.
pub fn persist(path: &Path, token: &StoredToken) -> Result<(), StorageError> {
    let write_err = |source| StorageError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(write_err)?;
    }

    let serialized = serde_json::to_string_pretty(token).map_err(|e| StorageError::Malformed {
        path: path.to_path_buf(),
        source: e,
    })?;

    let tmp_path = path.with_extension("json.tmp");
    {
        let mut file = fs::File::create(&tmp_path).map_err(write_err)?;
        file.write_all(serialized.as_bytes()).map_err(write_err)?;
        file.sync_all().map_err(write_err)?;
    }
    fs::rename(&tmp_path, path).map_err(write_err)?;

    Ok(())
}
