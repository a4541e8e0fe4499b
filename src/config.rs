use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// OAuth client and token storage settings
    pub oauth: OAuthConfig,
    /// Digest delivery settings
    pub digest: DigestConfig,
    /// AI stage configuration (OpenRouter + image API)
    #[serde(default)]
    pub ai: AiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    /// Path to the application's Google "Desktop app" client-secret JSON.
    pub client_secret_path: PathBuf,
    /// Directory holding one token file per user.
    #[serde(default = "default_token_dir")]
    pub token_dir: PathBuf,
    /// Scopes requested at authentication time.
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestConfig {
    /// From address on outgoing digests.
    pub sender: String,
    /// Where the digests are delivered.
    pub recipient: String,
    /// How many recent inbox messages to scan per run.
    #[serde(default = "default_max_messages")]
    pub max_messages: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    /// OpenRouter API key (required to enable the digest pipeline).
    #[serde(default)]
    pub api_key: Option<String>,
    /// Chat model for classification/summary/translation.
    #[serde(default = "default_model")]
    pub model: String,
    /// Image generation model.
    #[serde(default = "default_image_model")]
    pub image_model: String,
    /// Key for the image API, when different from the OpenRouter key.
    #[serde(default)]
    pub image_api_key: Option<String>,
    /// Maximum tokens per completion.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            image_model: default_image_model(),
            image_api_key: None,
            max_tokens: default_max_tokens(),
        }
    }
}

impl AiConfig {
    /// The digest pipeline only runs when a key is configured.
    pub fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }
}

fn default_token_dir() -> PathBuf {
    Config::data_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("tokens")
}

fn default_scopes() -> Vec<String> {
    vec![
        "https://www.googleapis.com/auth/gmail.readonly".to_string(),
        "https://www.googleapis.com/auth/gmail.send".to_string(),
    ]
}

fn default_max_messages() -> u32 {
    10
}

fn default_model() -> String {
    "anthropic/claude-3-haiku".to_string()
}

fn default_image_model() -> String {
    "gpt-image-1".to_string()
}

fn default_max_tokens() -> u32 {
    600
}

/// Split a comma-separated scope list, as carried by `MAILBRIEF_SCOPES`.
pub fn parse_scope_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl Config {
    pub fn config_dir() -> Result<PathBuf> {
        let dir = dirs::config_dir()
            .context("could not find config directory")?
            .join("mailbrief");
        Ok(dir)
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    pub fn data_dir() -> Result<PathBuf> {
        let dir = dirs::data_local_dir()
            .context("could not find data directory")?
            .join("mailbrief");
        Ok(dir)
    }

    pub fn log_dir() -> Result<PathBuf> {
        Ok(Self::data_dir()?.join("logs"))
    }

    pub fn image_dir() -> Result<PathBuf> {
        Ok(Self::data_dir()?.join("images"))
    }

    pub fn ledger_path() -> Result<PathBuf> {
        Ok(Self::data_dir()?.join("processed_emails.db"))
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            anyhow::bail!(
                "Configuration file not found at {}\n\
                 Please create a config file. Example:\n\n\
                 [oauth]\n\
                 client_secret_path = \"/path/to/client_secret.json\"\n\n\
                 [digest]\n\
                 sender = \"you@example.com\"\n\
                 recipient = \"digests@example.com\"\n\n\
                 [ai]\n\
                 api_key = \"sk-or-...\"",
                path.display()
            );
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;

        config.apply_env_overrides();
        Ok(config)
    }

    /// Secrets and the scope list can come from the environment instead of
    /// the config file.
    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("MAILBRIEF_OPENROUTER_API_KEY") {
            self.ai.api_key = Some(key);
        }
        if let Ok(key) = std::env::var("MAILBRIEF_IMAGE_API_KEY") {
            self.ai.image_api_key = Some(key);
        }
        if let Ok(scopes) = std::env::var("MAILBRIEF_SCOPES") {
            let parsed = parse_scope_list(&scopes);
            if !parsed.is_empty() {
                self.oauth.scopes = parsed;
            }
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        let dir = Self::config_dir()?;

        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create config directory: {}", dir.display()))?;

        let content = toml::to_string_pretty(self).context("failed to serialize config")?;

        fs::write(&path, content)
            .with_context(|| format!("failed to write config file: {}", path.display()))?;

        Ok(())
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(Self::config_dir()?)?;
        fs::create_dir_all(Self::data_dir()?)?;
        fs::create_dir_all(Self::log_dir()?)?;
        fs::create_dir_all(Self::image_dir()?)?;
        fs::create_dir_all(&self.oauth.token_dir)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            [oauth]
            client_secret_path = "/secrets/client_secret.json"
            token_dir = "/var/lib/mailbrief/tokens"
            scopes = ["read", "send"]

            [digest]
            sender = "me@example.com"
            recipient = "digests@example.com"
            max_messages = 25

            [ai]
            api_key = "sk-or-test"
            model = "anthropic/claude-3-haiku"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(
            config.oauth.client_secret_path,
            PathBuf::from("/secrets/client_secret.json")
        );
        assert_eq!(config.oauth.scopes, vec!["read", "send"]);
        assert_eq!(config.digest.max_messages, 25);
        assert_eq!(config.digest.recipient, "digests@example.com");
        assert!(config.ai.is_enabled());
    }

    #[test]
    fn test_minimal_config_gets_defaults() {
        let toml = r#"
            [oauth]
            client_secret_path = "/secrets/client_secret.json"

            [digest]
            sender = "me@example.com"
            recipient = "digests@example.com"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.oauth.scopes, default_scopes());
        assert_eq!(config.digest.max_messages, 10);
        assert!(!config.ai.is_enabled());
        assert_eq!(config.ai.model, default_model());
    }

    #[test]
    fn test_parse_scope_list() {
        assert_eq!(
            parse_scope_list("read, send ,admin"),
            vec!["read", "send", "admin"]
        );
        assert_eq!(parse_scope_list("read"), vec!["read"]);
        assert!(parse_scope_list("").is_empty());
        assert!(parse_scope_list(" , ").is_empty());
    }
}
