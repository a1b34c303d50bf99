//! LLM transport: chat calls to the OpenAI and Anthropic APIs.
//!
//! One [`LlmClient`] serves all three pipeline stages. Transport-level
//! retries (rate limits, server errors, network failures) use the same
//! backoff policy as the embedding backend and are distinct from the
//! evidence retry loop, which only ever retries on *insufficiency*.
//! A response without a parseable JSON payload is a hard error for the
//! calling stage, never a silent "insufficient".

use anyhow::{bail, Context, Result};
use std::time::Duration;

use crate::config::LlmConfig;

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
const ANTHROPIC_MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Clone)]
pub struct LlmClient {
    client: reqwest::Client,
    max_retries: u32,
    max_tokens: u32,
}

impl LlmClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            max_retries: config.max_retries,
            max_tokens: config.max_tokens,
        })
    }

    /// OpenAI chat completion. Returns the assistant message text.
    pub async fn chat_openai(
        &self,
        model: &str,
        system: &str,
        user: &str,
        temperature: f32,
    ) -> Result<String> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY not set"))?;

        let body = serde_json::json!({
            "model": model,
            "temperature": temperature,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
        });

        let json = self
            .send_with_backoff(|| {
                self.client
                    .post(OPENAI_CHAT_URL)
                    .header("Authorization", format!("Bearer {}", api_key))
                    .header("Content-Type", "application/json")
                    .json(&body)
            })
            .await?;

        json.get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|t| t.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("Chat response missing message content"))
    }

    /// Anthropic message completion. Returns the first text block.
    pub async fn chat_anthropic(&self, model: &str, system: &str, user: &str) -> Result<String> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| anyhow::anyhow!("ANTHROPIC_API_KEY not set"))?;

        let body = serde_json::json!({
            "model": model,
            "max_tokens": self.max_tokens,
            "system": system,
            "messages": [
                {"role": "user", "content": user},
            ],
        });

        let json = self
            .send_with_backoff(|| {
                self.client
                    .post(ANTHROPIC_MESSAGES_URL)
                    .header("x-api-key", api_key.clone())
                    .header("anthropic-version", ANTHROPIC_VERSION)
                    .header("Content-Type", "application/json")
                    .json(&body)
            })
            .await?;

        json.get("content")
            .and_then(|c| c.get(0))
            .and_then(|b| b.get("text"))
            .and_then(|t| t.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("Message response missing text content"))
    }

    /// Send a request with exponential backoff on 429/5xx/network errors.
    async fn send_with_backoff(
        &self,
        build: impl Fn() -> reqwest::RequestBuilder,
    ) -> Result<serde_json::Value> {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            match build().send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return response
                            .json()
                            .await
                            .with_context(|| "Failed to decode API response body");
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err =
                            Some(anyhow::anyhow!("LLM API error {}: {}", status, body_text));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    bail!("LLM API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("LLM request failed after retries")))
    }
}

/// Extract the outermost JSON object from model output.
///
/// Strips markdown code fences, then takes the span from the first `{`
/// to the last `}`. Output without a JSON object is an error: the
/// calling stage must fail loudly rather than guess.
pub fn extract_json(text: &str) -> Result<serde_json::Value> {
    let stripped = text.replace("```json", "").replace("```", "");
    let start = stripped.find('{');
    let end = stripped.rfind('}');

    let (start, end) = match (start, end) {
        (Some(s), Some(e)) if e > s => (s, e),
        _ => bail!("No JSON object found in model response:\n{}", text),
    };

    serde_json::from_str(&stripped[start..=end])
        .with_context(|| format!("Malformed JSON in model response:\n{}", text))
}
