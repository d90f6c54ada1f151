use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use super::{ApiError, ApiResult};
use crate::capture::Transcriber;
use crate::config::TranscriptionConfig;

/// OpenAI audio transcription client
pub struct WhisperClient {
    config: TranscriptionConfig,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

impl WhisperClient {
    pub fn new(config: TranscriptionConfig) -> ApiResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self { config, client })
    }

    /// Transcribe one recorded chunk, returning the subtitle text
    pub async fn transcribe_chunk(&self, data: Vec<u8>, mime: &str) -> ApiResult<String> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or(ApiError::MissingKey("OpenAI"))?;

        let extension = if mime.contains("mp4") { "mp4" } else { "webm" };
        info!("🎙️ Transcribing {} bytes ({})", data.len(), mime);

        let file = Part::bytes(data)
            .file_name(format!("audio.{}", extension))
            .mime_str(if mime.is_empty() { "audio/webm" } else { mime })?;
        let form = Form::new()
            .part("file", file)
            .text("model", self.config.model.clone())
            .text("response_format", self.config.response_format.clone())
            .text("prompt", self.config.prompt.clone());

        let endpoint = format!("{}/audio/transcriptions", self.config.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(api_key)
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let fallback = status.canonical_reason().unwrap_or("OpenAI API Error").to_string();
            let message = match response.json::<ErrorEnvelope>().await {
                Ok(envelope) => envelope.error.message.unwrap_or(fallback),
                Err(_) => fallback,
            };
            return Err(ApiError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let text = response.text().await?;
        debug!("Transcription returned {} bytes", text.len());
        Ok(text)
    }
}

#[async_trait]
impl Transcriber for WhisperClient {
    async fn transcribe(&self, data: Vec<u8>, mime: &str) -> ApiResult<String> {
        self.transcribe_chunk(data, mime).await
    }
}
