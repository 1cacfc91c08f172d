use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{with_system, LlmProvider, Message};

pub struct OllamaProvider {
    url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(url: String, model: String) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            model,
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    stream: bool,
    format: &'static str,
    options: ChatOptions,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: Option<Message>,
    error: Option<String>,
}

fn reply_content(body: &str) -> anyhow::Result<String> {
    let parsed: ChatResponse =
        serde_json::from_str(body).context("failed to parse Ollama response")?;
    if let Some(error) = parsed.error {
        anyhow::bail!("Ollama error: {error}");
    }
    parsed
        .message
        .map(|m| m.content)
        .ok_or_else(|| anyhow::anyhow!("missing content in Ollama response"))
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    async fn chat(&self, system_prompt: &str, messages: &[Message]) -> anyhow::Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: with_system(system_prompt, messages),
            stream: false,
            format: "json",
            options: ChatOptions { temperature: 0.0 },
        };

        let resp = self
            .client
            .post(format!("{}/api/chat", self.url))
            .json(&request)
            .send()
            .await
            .context("failed to call Ollama API")?;

        let status = resp.status();
        let body = resp.text().await.context("failed to read Ollama response")?;
        if !status.is_success() {
            anyhow::bail!("Ollama API error ({status}): {body}");
        }
        reply_content(&body)
    }
}
