//! REST client for the Gemini `generateContent` endpoints.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::chat_api::{ChatMessage, StreamChunk};
use std::env;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

use crate::sse::SseParser;

static SHARED_HTTP: LazyLock<Client> = LazyLock::new(|| {
    Client::builder()
        .timeout(Duration::from_secs(120))
        .pool_max_idle_per_host(2)
        .build()
        .expect("failed to build HTTP client")
});

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Per-call knobs. A default config means "just the conversation".
#[derive(Debug, Clone, Default)]
pub struct RequestConfig {
    pub system_instruction: Option<String>,
    pub temperature: Option<f32>,
    pub response_mime_type: Option<String>,
    pub response_schema: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    text: String,
}

/// The endpoint accepts snake_case field names alongside camelCase.
#[derive(Debug, Serialize, Deserialize)]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiCandidatePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiCandidateContent>,
}

/// Shape of both the one-shot response and each streamed SSE event.
#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

fn build_request(messages: Vec<ChatMessage>, config: &RequestConfig) -> GeminiRequest {
    let mut system_text = config.system_instruction.clone();
    let mut contents: Vec<GeminiContent> = Vec::new();
    for m in messages {
        if m.role == "system" {
            // A system message in the conversation wins over the config.
            system_text = Some(m.content);
        } else {
            // Gemini expects roles: "user" | "model".
            // Our app uses "user" | "assistant".
            let role = match m.role.as_str() {
                "assistant" => "model",
                "user" => "user",
                other => other,
            };
            contents.push(GeminiContent {
                role: role.to_string(),
                parts: vec![GeminiPart { text: m.content }],
            });
        }
    }

    let system_instruction = system_text.map(|text| GeminiContent {
        role: "system".to_string(),
        parts: vec![GeminiPart { text }],
    });

    let generation_config = if config.temperature.is_none()
        && config.response_mime_type.is_none()
        && config.response_schema.is_none()
    {
        None
    } else {
        Some(GenerationConfig {
            temperature: config.temperature,
            response_mime_type: config.response_mime_type.clone(),
            response_schema: config.response_schema.clone(),
        })
    };

    GeminiRequest {
        contents,
        system_instruction,
        generation_config,
    }
}

/// All text parts of the first candidate, concatenated.
fn reply_text(resp: GeminiResponse) -> String {
    let mut text = String::new();
    if let Some(candidate) = resp.candidates.into_iter().next() {
        if let Some(content) = candidate.content {
            for part in content.parts {
                if let Some(t) = part.text {
                    text.push_str(&t);
                }
            }
        }
    }
    text
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    let detail: String = body.chars().take(800).collect();
    if detail.trim().is_empty() {
        return Err(anyhow!("gemini error: {}", status));
    }
    Err(anyhow!("gemini error: {}\n{}", status, detail))
}

/// Anything that can produce text for a conversation. The gateway reaches
/// models through this seam so tests can substitute scripted ones.
#[async_trait]
pub trait TextModel: Send + Sync {
    async fn generate(&self, messages: Vec<ChatMessage>, config: &RequestConfig) -> Result<String>;

    /// Deltas go out through `tx` as they arrive. An `Err` means the call
    /// failed before producing anything; trouble mid-stream is reported as
    /// a `StreamChunk::Error` followed by a clean return.
    async fn generate_stream(
        &self,
        messages: Vec<ChatMessage>,
        config: &RequestConfig,
        tx: UnboundedSender<StreamChunk>,
    ) -> Result<()>;
}

pub struct GeminiClient {
    http: Client,
    auth_token: String,
    model: String,
}

impl GeminiClient {
    pub fn new(model: &str) -> Result<Self> {
        let key = env::var("GEMINI_API_KEY").map_err(|_| anyhow!("GEMINI_API_KEY not set"))?;
        Ok(Self::with_key(model, &key))
    }

    /// Build with an explicit key, for callers that already resolved auth.
    pub fn with_key(model: &str, key: &str) -> Self {
        Self {
            http: SHARED_HTTP.clone(),
            auth_token: key.to_string(),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl TextModel for GeminiClient {
    async fn generate(&self, messages: Vec<ChatMessage>, config: &RequestConfig) -> Result<String> {
        let url = format!(
            "{}/{}:generateContent?key={}",
            API_BASE, self.model, self.auth_token
        );
        let req = build_request(messages, config);
        let resp = self.http.post(url).json(&req).send().await?;
        let resp = check_status(resp).await?;
        let body: GeminiResponse = resp.json().await?;
        Ok(reply_text(body))
    }

    async fn generate_stream(
        &self,
        messages: Vec<ChatMessage>,
        config: &RequestConfig,
        tx: UnboundedSender<StreamChunk>,
    ) -> Result<()> {
        let url = format!(
            "{}/{}:streamGenerateContent?alt=sse&key={}",
            API_BASE, self.model, self.auth_token
        );
        let req = build_request(messages, config);
        let resp = self.http.post(url).json(&req).send().await?;
        let resp = check_status(resp).await?;

        // Each SSE event carries one GeminiResponse with a text delta.
        let mut stream = resp.bytes_stream();
        let mut parser = SseParser::new();
        while let Some(chunk) = stream.next().await {
            let bytes = match chunk {
                Ok(bytes) => bytes,
                Err(e) => {
                    let _ = tx.send(StreamChunk::Error(format!("stream read error: {}", e)));
                    return Ok(());
                }
            };
            for event in parser.push(&bytes) {
                match serde_json::from_str::<GeminiResponse>(&event.data) {
                    Ok(body) => {
                        let delta = reply_text(body);
                        if !delta.is_empty() {
                            let _ = tx.send(StreamChunk::Text(delta));
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(StreamChunk::Error(format!(
                            "failed to parse stream event: {}",
                            e
                        )));
                        return Ok(());
                    }
                }
            }
        }

        let _ = tx.send(StreamChunk::Done);
        Ok(())
    }
}
