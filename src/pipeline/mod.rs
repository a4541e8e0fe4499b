//! Newsletter digest pipeline: classify inbox messages, summarize, translate,
//! illustrate, and re-send as an HTML digest, recording processed ids so a
//! message is never digested twice.

pub mod ai;
pub mod formatter;
pub mod image;
pub mod prompts;
pub mod stages;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::config::DigestConfig;
use crate::gmail::GmailClient;
use crate::ledger::{Ledger, ProcessedEmail};
use crate::pipeline::ai::OpenRouterClient;
use crate::pipeline::image::ImageClient;

/// What a digest run did, for the end-of-run log line.
#[derive(Debug, Default)]
pub struct DigestReport {
    pub scanned: usize,
    pub already_processed: usize,
    pub not_newsletters: usize,
    pub sent: usize,
    pub failed: usize,
}

/// Run the digest pipeline over the most recent inbox messages.
///
/// One message's failure is logged and does not abort the rest of the run.
pub async fn run_digest(
    gmail: &GmailClient,
    ledger: &Ledger,
    ai: &OpenRouterClient,
    images: &ImageClient,
    digest: &DigestConfig,
    image_dir: &Path,
) -> Result<DigestReport> {
    let list = gmail
        .list_messages(digest.max_messages)
        .await
        .context("failed to list inbox messages")?;

    let mut report = DigestReport {
        scanned: list.messages.len(),
        ..DigestReport::default()
    };

    for message_ref in &list.messages {
        if ledger
            .is_processed(&message_ref.id)
            .await
            .context("ledger lookup failed")?
        {
            report.already_processed += 1;
            continue;
        }

        match process_message(gmail, ledger, ai, images, digest, image_dir, &message_ref.id)
            .await
        {
            Ok(true) => report.sent += 1,
            Ok(false) => report.not_newsletters += 1,
            Err(e) => {
                report.failed += 1;
                tracing::warn!(message_id = %message_ref.id, "digest failed: {e:#}");
            }
        }
    }

    tracing::info!(
        scanned = report.scanned,
        sent = report.sent,
        already_processed = report.already_processed,
        not_newsletters = report.not_newsletters,
        failed = report.failed,
        "digest run finished"
    );

    Ok(report)
}

/// Digest a single message. Returns `false` when it was not a newsletter.
async fn process_message(
    gmail: &GmailClient,
    ledger: &Ledger,
    ai: &OpenRouterClient,
    images: &ImageClient,
    digest: &DigestConfig,
    image_dir: &Path,
    message_id: &str,
) -> Result<bool> {
    let message = gmail.get_message(message_id).await?;
    let text = message
        .text()
        .ok_or_else(|| anyhow::anyhow!("message {message_id} has no readable body"))?;

    if !stages::is_newsletter(ai, &text).await? {
        tracing::debug!(message_id, "not a newsletter, skipping");
        return Ok(false);
    }

    let subject = message.subject().unwrap_or("Newsletter digest").to_string();

    let summary = stages::summarize(ai, &text).await?;
    let translated = stages::translate(ai, &summary).await?;

    let image_path = image_path_for(image_dir, message_id);
    images.generate(&translated, &image_path).await?;

    let html = formatter::format_digest(&subject, &translated, &image_path);
    gmail
        .send_message(&digest.sender, &digest.recipient, &subject, &html)
        .await?;

    ledger
        .mark_processed(&ProcessedEmail {
            message_id: message_id.to_string(),
            sender: message.sender().unwrap_or_default().to_string(),
            subject,
            date: message.date().unwrap_or_default().to_string(),
        })
        .await?;

    tracing::info!(message_id, "digest sent");
    Ok(true)
}

fn image_path_for(image_dir: &Path, message_id: &str) -> PathBuf {
    // Squash path characters so an id can never escape the image directory.
    let safe_id = message_id.replace(['/', '\\', ':', '.'], "_");
    image_dir.join(format!("{safe_id}.png"))
}
