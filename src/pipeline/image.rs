//! Illustrative image generation: text in, PNG on disk out.

use std::path::Path;

use anyhow::{Context, Result};
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::pipeline::prompts;

const IMAGES_URL: &str = "https://api.openai.com/v1/images/generations";

#[derive(Clone)]
pub struct ImageClient {
    client: Client,
    url: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct ImageRequest {
    model: String,
    prompt: String,
    n: u32,
    size: &'static str,
    response_format: &'static str,
}

#[derive(Deserialize)]
struct ImageResponse {
    data: Vec<ImageDatum>,
}

#[derive(Deserialize)]
struct ImageDatum {
    b64_json: String,
}

impl ImageClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self::with_url(api_key, model, IMAGES_URL)
    }

    /// Point the client at a different endpoint. Tests use this to talk to a
    /// local stub server.
    pub fn with_url(api_key: String, model: String, url: &str) -> Self {
        Self {
            client: Client::new(),
            url: url.to_string(),
            api_key,
            model,
        }
    }

    /// Generate an illustration for `summary` and write it to `output_path`.
    pub async fn generate(&self, summary: &str, output_path: &Path) -> Result<()> {
        let request = ImageRequest {
            model: self.model.clone(),
            prompt: format!("{}{}", prompts::IMAGE_STYLE_PREFIX, summary),
            n: 1,
            size: "1024x1024",
            response_format: "b64_json",
        };

        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .context("failed to send image generation request")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("image API error ({}): {}", status, error_text);
        }

        let image: ImageResponse = response
            .json()
            .await
            .context("failed to parse image response")?;

        let datum = image
            .data
            .first()
            .ok_or_else(|| anyhow::anyhow!("image response contained no data"))?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&datum.b64_json)
            .context("image data was not valid base64")?;

        if let Some(parent) = output_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create image dir: {}", parent.display()))?;
        }
        std::fs::write(output_path, bytes)
            .with_context(|| format!("failed to write image: {}", output_path.display()))?;

        Ok(())
    }
}
