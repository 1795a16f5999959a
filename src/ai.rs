use std::sync::LazyLock;

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::AiConfig;
use crate::error::AiError;

/// Plain text generation: prompt in, model text out.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Image generation. Returns a `data:image/...;base64,` URI, or `None` when
/// the model answered without an image.
#[async_trait]
pub trait ImageModel: Send + Sync {
    async fn generate_image(&self, prompt: &str) -> Result<Option<String>>;
}

/// Client for an OpenRouter-compatible chat completions API.
pub struct OpenRouterClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    text_model: String,
    image_model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    modalities: Option<Vec<&'a str>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize, Debug)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize, Debug)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    images: Vec<ResponseImage>,
}

#[derive(Deserialize, Debug)]
struct ResponseImage {
    #[serde(default, alias = "imageUrl")]
    image_url: Option<ResponseImageUrl>,
}

#[derive(Deserialize, Debug)]
struct ResponseImageUrl {
    url: String,
}

impl OpenRouterClient {
    pub fn new(config: &AiConfig) -> Result<Self> {
        let timeout = humantime::parse_duration(&config.timeout).context("parsing ai timeout")?;

        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("blogsmith/", env!("CARGO_PKG_VERSION"))),
        );

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(AiError::Http)?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            text_model: config.text_model.clone(),
            image_model: config.image_model.clone(),
        })
    }

    async fn chat(&self, model: &str, prompt: &str, modalities: Option<Vec<&str>>) -> Result<ChatResponse> {
        let api_key = self.api_key.as_deref().ok_or(AiError::MissingApiKey)?;

        let request = ChatRequest {
            model,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
            modalities,
        };

        debug!(model = %model, prompt_len = prompt.len(), "sending chat completion request");

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(AiError::Http)?;

        let status = response.status();
        let body = response.text().await.map_err(AiError::Http)?;

        if !status.is_success() {
            warn!(status = %status, body = %truncate_for_log(&body, 500), "AI provider returned an error");
            return Err(AiError::Api {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let parsed: ChatResponse = serde_json::from_str(&body).map_err(|e| AiError::Parse(e.to_string()))?;
        debug!(choices = parsed.choices.len(), "chat completion received");
        Ok(parsed)
    }
}

#[async_trait]
impl TextGenerator for OpenRouterClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let response = self.chat(&self.text_model, prompt, None).await?;
        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        Ok(text)
    }
}

#[async_trait]
impl ImageModel for OpenRouterClient {
    async fn generate_image(&self, prompt: &str) -> Result<Option<String>> {
        let response = self
            .chat(&self.image_model, prompt, Some(vec!["image", "text"]))
            .await?;
        let url = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.images.into_iter().find_map(|i| i.image_url))
            .map(|u| u.url);
        Ok(url)
    }
}

/// Greedy match from the first `{` to the last `}`.
static JSON_OBJECT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("valid regex"));

/// Extract the first brace-delimited JSON substring from free model text.
pub fn extract_json_object(text: &str) -> Option<&str> {
    JSON_OBJECT.find(text).map(|m| m.as_str())
}

/// Pull a string array out of `{"<key>": [...]}` embedded in model output.
/// `None` when there is no object, it does not parse, or the key is missing.
pub fn extract_string_list(text: &str, key: &str) -> Option<Vec<String>> {
    let json = extract_json_object(text)?;
    let value: serde_json::Value = serde_json::from_str(json).ok()?;
    let items = value.get(key)?.as_array()?;
    Some(
        items
            .iter()
            .filter_map(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
    )
}

/// Strip the `data:image/...;base64,` prefix, returning the raw payload.
/// Input without a data-URI prefix is returned unchanged.
pub fn strip_data_uri(uri: &str) -> &str {
    let lower = uri.get(..5).map(|s| s.to_ascii_lowercase());
    if lower.as_deref() != Some("data:") {
        return uri;
    }
    match uri.find(',') {
        Some(idx) => &uri[idx + 1..],
        None => uri,
    }
}

pub fn truncate_for_log(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let head: String = s.chars().take(max_chars).collect();
    format!("{head}... [truncated, total_len={}]", s.len())
}
