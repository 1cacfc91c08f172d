use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{with_system, LlmProvider, Message};

const GROQ_CHAT_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
/// Extraction replies are one small JSON object.
const MAX_REPLY_TOKENS: u32 = 256;

pub struct GroqProvider {
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl GroqProvider {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

fn reply_content(body: &str) -> anyhow::Result<String> {
    let parsed: CompletionResponse =
        serde_json::from_str(body).context("failed to parse Groq response")?;
    parsed
        .choices
        .into_iter()
        .next()
        .map(|c| c.message.content)
        .ok_or_else(|| anyhow::anyhow!("missing content in Groq response"))
}

#[async_trait]
impl LlmProvider for GroqProvider {
    async fn chat(&self, system_prompt: &str, messages: &[Message]) -> anyhow::Result<String> {
        let request = CompletionRequest {
            model: &self.model,
            messages: with_system(system_prompt, messages),
            temperature: 0.0,
            max_tokens: MAX_REPLY_TOKENS,
            response_format: ResponseFormat { kind: "json_object" },
        };

        let resp = self
            .client
            .post(GROQ_CHAT_URL)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("failed to call Groq API")?;

        let status = resp.status();
        let body = resp.text().await.context("failed to read Groq response")?;
        if !status.is_success() {
            anyhow::bail!("Groq API error ({status}): {body}");
        }
        reply_content(&body)
    }
}
