//! Fail-soft access to the chat and scaffold models.
//!
//! Callers never see transport errors. Generation falls back to a canned
//! reply, structured calls resolve to `None`, and a broken stream surfaces
//! one error chunk before resolving empty. The app stays interactive
//! whatever the network does.

use regex::Regex;
use serde_json::Value;
use shared::chat_api::{ChatMessage, StreamChunk};
use shared::scaffold::ScaffoldSpec;
use shared::settings::ModelSettings;
use std::sync::{Arc, LazyLock};
use tracing::warn;

use crate::gemini::{GeminiClient, RequestConfig, TextModel};

/// Returned by [`Gateway::generate`] when the model call fails.
pub const FALLBACK_REPLY: &str = "I apologize, but I'm having trouble connecting to my neural network right now. Please try again in a moment.";

/// Pushed once through the chunk callback when a stream fails.
pub const STREAM_ERROR_REPLY: &str = "Error generating response.";

const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are Astra, an elite AI software engineer. You help users build, debug, and understand code. Be concise, professional, and provide code blocks in markdown.";

const STREAM_SYSTEM_INSTRUCTION: &str = "You are Astra, an elite AI software engineer. Help users build full projects. When asked to code, provide high-quality code. Use markdown for code blocks.";

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\s*```[A-Za-z0-9_+\-]*\r?\n(.*?)\r?\n?```\s*$")
        .expect("failed to build code fence regex")
});

/// Models sometimes wrap a refactored file in a markdown fence even when
/// told not to. Unwrap a fence that spans the whole reply; anything else
/// passes through trimmed.
fn strip_code_fence(reply: &str) -> String {
    if let Some(captures) = CODE_FENCE.captures(reply) {
        return captures[1].to_string();
    }
    reply.trim().to_string()
}

fn conversation(prompt: &str, history: &[ChatMessage]) -> Vec<ChatMessage> {
    let mut messages = history.to_vec();
    messages.push(ChatMessage {
        role: "user".to_string(),
        content: prompt.to_string(),
    });
    messages
}

pub struct Gateway {
    chat: Arc<dyn TextModel>,
    scaffold: Arc<dyn TextModel>,
}

impl Gateway {
    pub fn new(models: &ModelSettings, api_key: &str) -> Self {
        Self {
            chat: Arc::new(GeminiClient::with_key(&models.chat_model, api_key)),
            scaffold: Arc::new(GeminiClient::with_key(&models.scaffold_model, api_key)),
        }
    }

    /// Swap in arbitrary models. Tests use this to script replies.
    pub fn with_models(chat: Arc<dyn TextModel>, scaffold: Arc<dyn TextModel>) -> Self {
        Self { chat, scaffold }
    }

    /// One-shot reply. Failures collapse to [`FALLBACK_REPLY`].
    pub async fn generate(
        &self,
        prompt: &str,
        history: &[ChatMessage],
        system: Option<&str>,
    ) -> String {
        let config = RequestConfig {
            system_instruction: Some(system.unwrap_or(DEFAULT_SYSTEM_INSTRUCTION).to_string()),
            temperature: Some(0.7),
            ..Default::default()
        };
        match self
            .chat
            .generate(conversation(prompt, history), &config)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                warn!("generate failed: {e:#}");
                FALLBACK_REPLY.to_string()
            }
        }
    }

    /// Streamed reply. `on_chunk` sees the accumulated text so far, not
    /// the deltas. Resolves to the final text, or to an empty string after
    /// a failure (with [`STREAM_ERROR_REPLY`] pushed through the callback).
    pub async fn generate_stream(
        &self,
        prompt: &str,
        history: &[ChatMessage],
        mut on_chunk: impl FnMut(&str),
    ) -> String {
        let config = RequestConfig {
            system_instruction: Some(STREAM_SYSTEM_INSTRUCTION.to_string()),
            temperature: Some(0.7),
            ..Default::default()
        };
        let messages = conversation(prompt, history);

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let model = Arc::clone(&self.chat);
        let handle =
            tokio::spawn(async move { model.generate_stream(messages, &config, tx).await });

        let mut full = String::new();
        let mut failed = false;
        while let Some(chunk) = rx.recv().await {
            match chunk {
                StreamChunk::Text(delta) => {
                    full.push_str(&delta);
                    on_chunk(&full);
                }
                StreamChunk::Done => break,
                StreamChunk::Error(e) => {
                    warn!("stream failed: {e}");
                    failed = true;
                    break;
                }
            }
        }

        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!("stream failed: {e:#}");
                failed = true;
            }
            Err(e) => {
                warn!("stream task panicked: {e}");
                failed = true;
            }
        }

        if failed {
            on_chunk(STREAM_ERROR_REPLY);
            return String::new();
        }
        full
    }

    /// JSON-mode call against the scaffold model. Anything that goes wrong
    /// resolves to `None`.
    pub async fn generate_structured(&self, prompt: &str, schema: Value) -> Option<Value> {
        let config = RequestConfig {
            response_mime_type: Some("application/json".to_string()),
            response_schema: Some(schema),
            ..Default::default()
        };
        let reply = match self
            .scaffold
            .generate(conversation(prompt, &[]), &config)
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                warn!("structured generate failed: {e:#}");
                return None;
            }
        };
        match serde_json::from_str(&reply) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("structured reply was not valid JSON: {e}");
                None
            }
        }
    }

    /// Ask the fast model for a project skeleton. `None` when the model
    /// fails or replies with something that is not a usable spec.
    pub async fn scaffold(&self, prompt: &str) -> Option<ScaffoldSpec> {
        let request = format!(
            r#"Generate a skeleton for a web project based on this prompt: "{prompt}".
Return ONLY a JSON object with this exact structure:
{{
  "description": "Brief project description",
  "files": [
    {{ "name": "index.html", "content": "...", "language": "html" }},
    {{ "name": "styles.css", "content": "...", "language": "css" }},
    {{ "name": "main.js", "content": "...", "language": "javascript" }}
  ]
}}"#
        );
        let value = self
            .generate_structured(&request, ScaffoldSpec::response_schema())
            .await?;
        let spec = ScaffoldSpec::from_value(value);
        if spec.is_none() {
            warn!("scaffold reply did not match the expected shape");
        }
        spec
    }

    /// Rewrite `code` per `instruction`. Precision work, so the
    /// temperature drops and no persona is injected. `None` when the model
    /// fails or returns nothing usable.
    pub async fn refactor_code(&self, code: &str, instruction: &str) -> Option<String> {
        let request = format!(
            r#"Refactor the following code based on this instruction: "{instruction}".
Return ONLY the updated code block without any explanation or markdown formatting unless requested in the instruction.

CODE:
{code}"#
        );
        let config = RequestConfig {
            temperature: Some(0.3),
            ..Default::default()
        };
        let reply = match self
            .chat
            .generate(conversation(&request, &[]), &config)
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                warn!("refactor failed: {e:#}");
                return None;
            }
        };
        let cleaned = strip_code_fence(&reply);
        if cleaned.is_empty() {
            return None;
        }
        Some(cleaned)
    }
}
