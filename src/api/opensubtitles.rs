use reqwest::header::USER_AGENT;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use super::{ApiError, ApiResult};
use crate::config::SubtitleConfig;

const API_KEY_HEADER: &str = "Api-Key";

/// OpenSubtitles REST client
pub struct OpenSubtitlesClient {
    config: SubtitleConfig,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    attributes: SearchAttributes,
}

#[derive(Debug, Deserialize)]
struct SearchAttributes {
    #[serde(default)]
    files: Vec<SubtitleFile>,
}

#[derive(Debug, Deserialize)]
struct SubtitleFile {
    file_id: u64,
}

#[derive(Debug, Serialize)]
struct DownloadRequest {
    file_id: u64,
}

#[derive(Debug, Deserialize)]
struct DownloadResponse {
    link: Option<String>,
}

impl OpenSubtitlesClient {
    pub fn new(config: SubtitleConfig) -> ApiResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self { config, client })
    }

    fn api_key(&self) -> ApiResult<&str> {
        self.config
            .api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or(ApiError::MissingKey("OpenSubtitles"))
    }

    /// File id of the best match for `title`, if any
    pub async fn search(&self, title: &str) -> ApiResult<Option<u64>> {
        let api_key = self.api_key()?;
        let endpoint = url::Url::parse_with_params(
            &format!("{}/subtitles", self.config.base_url.trim_end_matches('/')),
            &[("query", title), ("languages", self.config.languages.as_str())],
        )?;

        info!("🔎 Searching subtitles for: {}", title);
        let response = self
            .client
            .get(endpoint)
            .header(API_KEY_HEADER, api_key)
            .header(USER_AGENT, &self.config.user_agent)
            .send()
            .await?;
        let response = check_status(response).await?;

        let body: SearchResponse = response.json().await?;
        let file_id = body
            .data
            .first()
            .and_then(|hit| hit.attributes.files.first())
            .map(|file| file.file_id);
        debug!("Search returned {} hits, first file {:?}", body.data.len(), file_id);
        Ok(file_id)
    }

    /// Resolve a download link for `file_id` and fetch the subtitle text
    pub async fn download(&self, file_id: u64) -> ApiResult<String> {
        let api_key = self.api_key()?;
        let endpoint = format!("{}/download", self.config.base_url.trim_end_matches('/'));

        let response = self
            .client
            .post(&endpoint)
            .header(API_KEY_HEADER, api_key)
            .header(USER_AGENT, &self.config.user_agent)
            .json(&DownloadRequest { file_id })
            .send()
            .await?;
        let response = check_status(response).await?;

        let body: DownloadResponse = response.json().await?;
        let link = body.link.ok_or(ApiError::MissingLink)?;

        debug!("⬇️ Downloading subtitle file {}", file_id);
        let response = check_status(self.client.get(&link).send().await?).await?;
        Ok(response.text().await?)
    }
}

async fn check_status(response: reqwest::Response) -> ApiResult<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    Err(ApiError::Status { status, message })
}

/// Search-then-download subtitle lookup for a page title
pub struct SubtitleFinder {
    client: OpenSubtitlesClient,
}

impl SubtitleFinder {
    pub fn new(client: OpenSubtitlesClient) -> Self {
        Self { client }
    }

    pub async fn smart_process(&self, title: &str) -> ApiResult<String> {
        let file_id = self.client.search(title).await?.ok_or(ApiError::NoResults)?;
        let content = self.client.download(file_id).await?;
        info!("✅ Downloaded {} bytes of subtitles for {}", content.len(), title);
        Ok(content)
    }
}
