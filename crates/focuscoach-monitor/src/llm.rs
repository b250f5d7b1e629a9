//! OpenAI-compatible chat-completions client.
//!
//! One client serves both collaborators that talk to a model: the
//! [`DistractionClassifier`] (a user turn carrying the prompt and an inline
//! base64 screenshot) and plain [`ChatCompletion`].  Any endpoint that
//! speaks the Chat Completions API works; point `base_url` at it.
//!
//! Screenshots are shrunk to fit [`LlmConfig::max_image_dimension`] before
//! upload, which keeps request size and token cost flat across displays.

use std::io::Cursor;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::ImageFormat;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::{Value, json};

use crate::error::{MonitorError, Result};
use crate::traits::{ChatCompletion, ChatMessage, DistractionClassifier};
use crate::verdict::{self, DistractionVerdict};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Default OpenAI API base URL.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Default vision-capable model.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Default bound, in pixels, for both sides of an uploaded screenshot.
pub const DEFAULT_MAX_IMAGE_DIMENSION: u32 = 512;

/// Connection settings for a chat-completions endpoint.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    /// Base URL without the `/chat/completions` suffix.
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    pub timeout: Duration,
    /// Shrink screenshots to fit this square before upload.  `None` sends
    /// them at capture resolution.
    pub max_image_dimension: Option<u32>,
}

impl LlmConfig {
    /// Settings for the OpenAI API with the default model.
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: OPENAI_BASE_URL.to_owned(),
            model: DEFAULT_MODEL.to_owned(),
            max_tokens: 1024,
            temperature: Some(0.4),
            timeout: Duration::from_secs(60),
            max_image_dimension: Some(DEFAULT_MAX_IMAGE_DIMENSION),
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// A client for one OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    config: LlmConfig,
    http: reqwest::Client,
}

impl OpenAiClient {
    /// Create a client.  Fails if no API key is configured.
    pub fn new(config: LlmConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(MonitorError::MissingApiKey {
                provider: "openai".into(),
            });
        }

        let http = reqwest::Client::builder().timeout(config.timeout).build()?;

        Ok(Self { config, http })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Build the JSON body for a Chat Completions request.
    fn build_request_body(&self, messages: Value) -> Value {
        let mut body = json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "messages": messages,
        });
        if let Some(temp) = self.config.temperature {
            body["temperature"] = json!(temp);
        }
        body
    }

    /// POST `body` and return the assistant's reply text.
    async fn send(&self, body: &Value) -> std::result::Result<String, String> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );

        let mut headers = HeaderMap::new();
        let auth_value = format!("Bearer {}", self.config.api_key);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth_value)
                .map_err(|e| format!("invalid authorization header: {e}"))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        tracing::debug!(url = %url, model = %self.config.model, "sending completion request");

        let resp = self
            .http
            .post(&url)
            .headers(headers)
            .json(body)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| format!("failed to read response body: {e}"))?;

        if !status.is_success() {
            return Err(format!("API returned {status}: {text}"));
        }

        let v: Value =
            serde_json::from_str(&text).map_err(|e| format!("invalid JSON response: {e}"))?;
        parse_completion(&v)
    }
}

/// Extract the reply text from a non-streaming Chat Completions response.
pub fn parse_completion(v: &Value) -> std::result::Result<String, String> {
    let message = &v["choices"][0]["message"];
    if message.is_null() {
        return Err("missing `choices[0].message` in response".into());
    }
    Ok(message["content"].as_str().unwrap_or_default().to_owned())
}

fn messages_to_openai(messages: &[ChatMessage]) -> Value {
    json!(
        messages
            .iter()
            .map(|m| json!({ "role": m.role, "content": m.content }))
            .collect::<Vec<_>>()
    )
}

/// MIME type for an image file, by extension.  Unknown extensions are
/// sent as PNG, which is what the capture tools produce.
fn image_media_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase());
    match ext.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/png",
    }
}

/// Shrink an encoded image to fit within `max` x `max`, keeping its aspect
/// ratio.  Images already inside the bound come back untouched; larger ones
/// are re-encoded as PNG.
pub fn fit_image(
    bytes: Vec<u8>,
    media_type: &'static str,
    max: u32,
) -> Result<(Vec<u8>, &'static str)> {
    let decoded = image::load_from_memory(&bytes).map_err(|e| MonitorError::Classifier {
        reason: format!("failed to decode screenshot: {e}"),
    })?;
    if decoded.width() <= max && decoded.height() <= max {
        return Ok((bytes, media_type));
    }

    let resized = decoded.thumbnail(max, max);
    let mut out = Cursor::new(Vec::new());
    resized
        .write_to(&mut out, ImageFormat::Png)
        .map_err(|e| MonitorError::Classifier {
            reason: format!("failed to encode resized screenshot: {e}"),
        })?;
    tracing::debug!(
        width = resized.width(),
        height = resized.height(),
        "screenshot downscaled"
    );
    Ok((out.into_inner(), "image/png"))
}

/// A single user turn with the prompt text and an inline image.
fn vision_messages(prompt: &str, media_type: &str, image: &[u8]) -> Value {
    json!([{
        "role": "user",
        "content": [
            { "type": "text", "text": prompt },
            {
                "type": "image_url",
                "image_url": { "url": format!("data:{media_type};base64,{}", BASE64.encode(image)) },
            },
        ],
    }])
}

#[async_trait]
impl ChatCompletion for OpenAiClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let body = self.build_request_body(messages_to_openai(messages));
        self.send(&body)
            .await
            .map_err(|reason| MonitorError::Chat { reason })
    }
}

#[async_trait]
impl DistractionClassifier for OpenAiClient {
    async fn classify(&self, objective: &str, image: &Path) -> Result<DistractionVerdict> {
        let bytes = tokio::fs::read(image).await?;
        let media_type = image_media_type(image);
        let (bytes, media_type) = match self.config.max_image_dimension {
            Some(max) => tokio::task::spawn_blocking(move || fit_image(bytes, media_type, max))
                .await
                .map_err(|e| MonitorError::Classifier {
                    reason: format!("screenshot resize task failed: {e}"),
                })??,
            None => (bytes, media_type),
        };

        let prompt = verdict::distraction_prompt(objective);
        let body = self.build_request_body(vision_messages(&prompt, media_type, &bytes));

        let raw = self
            .send(&body)
            .await
            .map_err(|reason| MonitorError::Classifier { reason })?;
        tracing::debug!(path = %image.display(), response = %raw, "classifier responded");

        Ok(verdict::normalize(&raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> OpenAiClient {
        OpenAiClient::new(LlmConfig::openai("sk-test")).unwrap()
    }

    #[test]
    fn missing_api_key_rejected() {
        let err = OpenAiClient::new(LlmConfig::openai("  ")).unwrap_err();
        assert!(matches!(err, MonitorError::MissingApiKey { .. }));
    }

    #[test]
    fn request_body_carries_model_and_limits() {
        let body = client().build_request_body(messages_to_openai(&[
            ChatMessage::system("be brief"),
            ChatMessage::user("hello"),
        ]));
        assert_eq!(body["model"], DEFAULT_MODEL);
        assert_eq!(body["max_tokens"], 1024);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hello");
        assert!(body["temperature"].is_number());
    }

    #[test]
    fn temperature_omitted_when_unset() {
        let mut config = LlmConfig::openai("sk-test");
        config.temperature = None;
        let body = OpenAiClient::new(config)
            .unwrap()
            .build_request_body(json!([]));
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn vision_message_inlines_image() {
        let messages = vision_messages("look", "image/png", b"abc");
        let parts = &messages[0]["content"];
        assert_eq!(parts[0]["text"], "look");
        assert_eq!(parts[1]["image_url"]["url"], "data:image/png;base64,YWJj");
    }

    #[test]
    fn media_type_from_extension() {
        assert_eq!(image_media_type(Path::new("a.JPG")), "image/jpeg");
        assert_eq!(image_media_type(Path::new("a.webp")), "image/webp");
        assert_eq!(image_media_type(Path::new("a")), "image/png");
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([40, 90, 200]));
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn large_screenshot_fits_the_bound() {
        let (bytes, media_type) = fit_image(png(2000, 1000), "image/png", 512).unwrap();
        assert_eq!(media_type, "image/png");
        let resized = image::load_from_memory(&bytes).unwrap();
        assert!(resized.width() <= 512 && resized.height() <= 512);
        assert_eq!(resized.width(), 512);
        assert_eq!(resized.height(), 256);
    }

    #[test]
    fn small_screenshot_is_sent_as_captured() {
        let original = png(300, 200);
        let (bytes, media_type) = fit_image(original.clone(), "image/png", 512).unwrap();
        assert_eq!(bytes, original);
        assert_eq!(media_type, "image/png");
    }

    #[test]
    fn undecodable_screenshot_is_a_classifier_error() {
        let err = fit_image(b"not an image".to_vec(), "image/png", 512).unwrap_err();
        assert!(matches!(err, MonitorError::Classifier { .. }));
    }

    #[test]
    fn openai_defaults_bound_images() {
        assert_eq!(
            LlmConfig::openai("sk").max_image_dimension,
            Some(DEFAULT_MAX_IMAGE_DIMENSION)
        );
    }

    #[test]
    fn parse_completion_text() {
        let v = json!({
            "choices": [{ "message": { "role": "assistant", "content": "hi there" } }]
        });
        assert_eq!(parse_completion(&v).unwrap(), "hi there");
    }

    #[test]
    fn parse_completion_without_choices_fails() {
        assert!(parse_completion(&json!({ "error": "nope" })).is_err());
    }
}
