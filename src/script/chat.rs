use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};

use crate::config::LlmConfig;
use crate::foundation::error::{ReelError, ReelResult};

/// Thin client for an OpenAI-compatible `/chat/completions` endpoint.
#[derive(Clone, Debug)]
pub struct ChatClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    provider: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

/// One chat request.
#[derive(Clone, Debug)]
pub struct ChatRequest<'a> {
    pub system: &'a str,
    pub user: &'a str,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Structured-output schema; `None` asks for free text.
    pub json_schema: Option<(&'a str, Value)>,
}

impl ChatClient {
    pub fn new(cfg: &LlmConfig, provider: &'static str) -> ReelResult<Self> {
        let api_key = cfg
            .api_key
            .clone()
            .ok_or_else(|| ReelError::validation("LLM_API_KEY is not set"))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| ReelError::upstream(provider, format!("http client: {e}")))?;
        Ok(Self {
            http,
            api_key,
            model: cfg.model.clone(),
            base_url: cfg.base_url.trim_end_matches('/').to_owned(),
            provider,
        })
    }

    pub fn provider(&self) -> &'static str {
        self.provider
    }

    /// Send one request and return the first choice's text content.
    pub async fn complete(&self, req: ChatRequest<'_>) -> ReelResult<String> {
        let mut body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": req.system },
                { "role": "user", "content": req.user },
            ],
            "temperature": req.temperature,
            "max_tokens": req.max_tokens,
        });
        if let Some((name, schema)) = req.json_schema {
            body["response_format"] = json!({
                "type": "json_schema",
                "json_schema": { "name": name, "schema": schema, "strict": true },
            });
        }

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ReelError::upstream(self.provider, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ReelError::upstream(
                self.provider,
                format!("{} - {}", status.as_u16(), text.trim()),
            ));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ReelError::upstream(self.provider, format!("bad response body: {e}")))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ReelError::upstream(self.provider, "response had no message content"))
    }
}

/// Strip a surrounding Markdown code fence, if the model added one.
pub(crate) fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(nl) => &rest[nl + 1..],
        None => rest,
    };
    body.trim_end().trim_end_matches("```").trim()
}
