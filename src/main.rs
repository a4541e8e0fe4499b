mod auth;
mod config;
mod error;
mod gmail;
mod ledger;
mod maintenance;
mod pipeline;

use anyhow::{Context, Result};
use std::env;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::auth::{Authenticator, BrowserConsent, ClientSecret, GoogleOAuth, store};
use crate::config::Config;
use crate::error::AuthenticationError;
use crate::ledger::Ledger;
use crate::pipeline::ai::OpenRouterClient;
use crate::pipeline::image::ImageClient;

fn setup_logging() {
    use std::fs::OpenOptions;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,mailbrief=debug"));

    // Log to a file in the data directory; stderr is kept for user-facing output
    let log_file = Config::log_dir()
        .ok()
        .map(|dir| dir.join("mailbrief.log"))
        .and_then(|path| {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).ok()?;
            }
            OpenOptions::new().create(true).append(true).open(&path).ok()
        });

    if let Some(file) = log_file {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::sync::Mutex::new(file))
                    .with_ansi(false),
            )
            .init();
    } else {
        // Fallback to stderr if file logging fails
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn print_usage() {
    eprintln!(
        r#"mailbrief - Gmail newsletter digests

Usage: mailbrief [command]

Commands:
    (none)      Run a digest session for a user
    setup       Write the initial configuration
    help        Show this help message

Configuration file: ~/.config/mailbrief/config.toml
"#
    );
}

fn prompt(label: &str) -> Result<String> {
    print!("{label}");
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

/// Minimal shape check: one `@`, non-empty local part, dotted domain.
fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

fn prompt_email(label: &str) -> Result<String> {
    loop {
        let email = prompt(label)?;
        if is_valid_email(&email) {
            return Ok(email);
        }
        println!("Invalid email address. Please enter something like user@example.com");
    }
}

fn run_setup() -> Result<()> {
    println!("Mailbrief Setup");
    println!("===============\n");

    let config_path = Config::config_path()?;
    if config_path.exists() {
        let answer = prompt("Configuration already exists. Overwrite? [y/N]: ")?;
        if !answer.eq_ignore_ascii_case("y") {
            println!("Setup cancelled.");
            return Ok(());
        }
    }

    let client_secret_path = loop {
        let path = PathBuf::from(prompt("Path to Google client secret JSON: ")?);
        if path.is_file() {
            break path;
        }
        println!("No file at that path.");
    };

    let sender = prompt_email("Digest sender address: ")?;
    let recipient = prompt_email("Digest recipient address: ")?;

    let api_key = prompt("OpenRouter API key (empty to configure later): ")?;

    let config = Config {
        oauth: config::OAuthConfig {
            client_secret_path,
            token_dir: Config::data_dir()?.join("tokens"),
            scopes: config::parse_scope_list(
                "https://www.googleapis.com/auth/gmail.readonly,\
                 https://www.googleapis.com/auth/gmail.send",
            ),
        },
        digest: config::DigestConfig {
            sender,
            recipient,
            max_messages: 10,
        },
        ai: config::AiConfig {
            api_key: (!api_key.is_empty()).then_some(api_key),
            ..config::AiConfig::default()
        },
    };

    config.ensure_dirs()?;
    config.save()?;
    println!("Configuration saved to {}", config_path.display());
    println!("\nSetup complete! Run 'mailbrief' to start.");
    Ok(())
}

/// Authenticate one user and drain their session: profile, then the digest
/// pipeline when AI is configured.
async fn run_user_session(
    user: &str,
    config: &Config,
    authenticator: &Authenticator<GoogleOAuth, BrowserConsent>,
) -> Result<()> {
    let token_path = store::token_path(&config.oauth.token_dir, user);

    let session = match authenticator
        .authenticate(user, &config.oauth.scopes, &token_path)
        .await
    {
        // A revoked grant cannot be refreshed; the stored record is left
        // intact and we fall back to a fresh consent.
        Err(AuthenticationError::Refresh(e)) => {
            tracing::warn!(user, "refresh rejected ({e}), falling back to consent");
            println!("Stored authorization for {user} was revoked; re-authorizing.");
            authenticator
                .reauthorize(user, &config.oauth.scopes, &token_path)
                .await?
        }
        other => other?,
    };

    let gmail = authenticator.service(&session)?;
    let profile = gmail.get_profile().await?;
    tracing::info!(
        user,
        email = %profile.email_address,
        messages_total = profile.messages_total,
        "authenticated"
    );
    println!("Authenticated as {}", profile.email_address);

    let labels = gmail.list_labels().await?;
    for label in &labels.labels {
        tracing::debug!(user, id = %label.id, name = %label.name, "mailbox label");
    }

    if !config.ai.is_enabled() {
        println!("No AI API key configured; skipping the digest pipeline.");
        tracing::info!(user, "ai disabled, session ends after profile fetch");
        return Ok(());
    }

    let ledger = Ledger::open(&Config::ledger_path()?).await?;
    let ai = OpenRouterClient::new(
        config.ai.api_key.clone().unwrap_or_default(),
        config.ai.model.clone(),
        config.ai.max_tokens,
    );
    let images = ImageClient::new(
        config
            .ai
            .image_api_key
            .clone()
            .or_else(|| config.ai.api_key.clone())
            .unwrap_or_default(),
        config.ai.image_model.clone(),
    );

    let report = pipeline::run_digest(
        &gmail,
        &ledger,
        &ai,
        &images,
        &config.digest,
        &Config::image_dir()?,
    )
    .await?;

    println!(
        "Scanned {} messages: {} digests sent, {} already processed, {} not newsletters, {} failed.",
        report.scanned,
        report.sent,
        report.already_processed,
        report.not_newsletters,
        report.failed
    );
    tracing::info!(
        user,
        total_processed = ledger.processed_count().await?,
        "session complete"
    );

    Ok(())
}

async fn run() -> Result<()> {
    let config = Config::load()?;
    config.ensure_dirs()?;
    // Clear old logs before the logger opens this run's file, so the fresh
    // run's own lines survive.
    maintenance::clear_dir_files(&Config::log_dir()?)
        .context("failed to clear log directory")?;
    setup_logging();

    let secret = ClientSecret::load(&config.oauth.client_secret_path)?;
    let consent = BrowserConsent::new(&secret.client_id, &secret.auth_uri);
    let provider = GoogleOAuth::new(secret)?;
    let authenticator = Authenticator::new(provider, consent);

    // One line of input; a comma-separated list drives users in sequence.
    let input = prompt("Enter your Gmail address: ")?;
    let users: Vec<&str> = input
        .split(',')
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .collect();
    if users.is_empty() {
        anyhow::bail!("a Gmail address is required");
    }

    let mut failures = 0usize;
    for user in &users {
        if !is_valid_email(user) {
            eprintln!("Skipping invalid address: {user}");
            failures += 1;
            continue;
        }
        // One user's failure must not abort the remaining sessions.
        if let Err(e) = run_user_session(user, &config, &authenticator).await {
            let line = format!("User session failed for '{user}': {e:#}");
            tracing::error!("{line}");
            eprintln!("{line}");
            failures += 1;
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} of {} session(s) failed", users.len());
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();

    let result = match args.get(1).map(|s| s.as_str()) {
        Some("help") | Some("--help") | Some("-h") => {
            print_usage();
            Ok(())
        }
        Some("setup") => run_setup(),
        Some(cmd) => {
            eprintln!("Unknown command: {cmd}");
            print_usage();
            std::process::exit(1);
        }
        None => run().await,
    };

    if let Err(e) = result {
        let line = format!("Application failed: {e:#}");
        tracing::error!("{line}");
        eprintln!("{line}");
        std::process::exit(1);
    }
}
