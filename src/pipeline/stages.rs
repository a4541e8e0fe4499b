//! Text stages of the digest pipeline: classification, summarization,
//! translation. Each is a single call against the AI client.

use anyhow::Result;

use crate::pipeline::ai::OpenRouterClient;
use crate::pipeline::prompts;

/// Classify a message body as newsletter content or not.
pub async fn is_newsletter(ai: &OpenRouterClient, text: &str) -> Result<bool> {
    let answer = ai.complete(prompts::CLASSIFY_SYSTEM, text).await?;
    Ok(parse_yes_no(&answer))
}

pub async fn summarize(ai: &OpenRouterClient, text: &str) -> Result<String> {
    ai.complete(prompts::SUMMARY_SYSTEM, text).await
}

pub async fn translate(ai: &OpenRouterClient, text: &str) -> Result<String> {
    ai.complete(prompts::TRANSLATE_SYSTEM, text).await
}

/// Lenient YES/NO parsing; anything that does not clearly say yes is a no.
fn parse_yes_no(answer: &str) -> bool {
    answer
        .trim()
        .trim_matches(|c: char| !c.is_alphanumeric())
        .eq_ignore_ascii_case("yes")
}
