//! Language-model collaborator over an OpenAI-compatible chat-completions API.

use std::sync::LazyLock;
use std::thread;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{Error, Result};

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 500;
const TEMPERATURE: f64 = 0.1;

static CODE_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:python|py)?[ \t]*\n(.*?)```").expect("valid regex"));

pub trait ModelClient {
    /// Identifier recorded in the experiment log.
    fn model_id(&self) -> &str;

    /// Send one prompt and return the completion text.
    fn complete(&self, prompt: &str) -> Result<String>;
}

/// Read the model credential from the environment.
///
/// Returns `Ok(None)` in deterministic mode, where no model is ever called.
pub fn resolve_api_key(config: &Config) -> Result<Option<String>> {
    if config.deterministic {
        return Ok(None);
    }
    match std::env::var(&config.api_key_env) {
        Ok(key) if !key.trim().is_empty() => Ok(Some(key)),
        _ => Err(Error::ConfigValidation(format!(
            "model API key not found in ${} (set it or pass --disable-llm)",
            config.api_key_env
        ))),
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Blocking chat-completions client.
pub struct ChatClient {
    api_base: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl ChatClient {
    pub fn new(api_base: String, api_key: String, model: String, timeout: Duration) -> Self {
        Self {
            api_base,
            api_key,
            model,
            timeout,
        }
    }

    pub fn from_config(config: &Config, api_key: String) -> Self {
        Self::new(
            config.api_base.clone(),
            api_key,
            config.model.clone(),
            Duration::from_secs(config.model_timeout),
        )
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base.trim_end_matches('/'))
    }

    pub fn request_body(&self, prompt: &str) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "temperature": TEMPERATURE,
            "messages": [{ "role": "user", "content": prompt }],
        })
    }
}

impl ModelClient for ChatClient {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn complete(&self, prompt: &str) -> Result<String> {
        let url = self.endpoint();
        let body = self.request_body(prompt);

        let mut backoff_ms = INITIAL_BACKOFF_MS;
        for attempt in 1..=MAX_RETRIES {
            match ureq::post(&url)
                .set("Authorization", &format!("Bearer {}", self.api_key))
                .set("Content-Type", "application/json")
                .timeout(self.timeout)
                .send_json(&body)
            {
                Ok(response) => {
                    let parsed: ChatResponse = response.into_json().map_err(|e| {
                        Error::Model(format!("failed to parse model response: {e}"))
                    })?;
                    debug!(model = %self.model, "model call complete");
                    return parsed
                        .choices
                        .into_iter()
                        .next()
                        .and_then(|c| c.message.content)
                        .ok_or_else(|| Error::Model("model response had no content".to_string()));
                }
                Err(ref e) if attempt < MAX_RETRIES && is_retryable(e) => {
                    warn!(
                        attempt,
                        error = %e,
                        backoff_ms,
                        "retrying model call after transient error"
                    );
                    thread::sleep(Duration::from_millis(backoff_ms));
                    backoff_ms *= 2;
                }
                Err(e) => {
                    return Err(Error::Model(format!("model request failed: {e}")));
                }
            }
        }
        Err(Error::Model(format!(
            "model request failed after {MAX_RETRIES} attempts"
        )))
    }
}

/// Only retry rate-limits (429), server errors (5xx), and transport/network errors.
fn is_retryable(err: &ureq::Error) -> bool {
    match err {
        ureq::Error::Status(code, _) => *code == 429 || *code >= 500,
        ureq::Error::Transport(_) => true,
    }
}

/// Return the body of the first fenced code block, or the whole response.
pub fn extract_code_block(response: &str) -> String {
    match CODE_BLOCK_RE.captures(response) {
        Some(caps) => caps[1].to_string(),
        None => response.to_string(),
    }
}
