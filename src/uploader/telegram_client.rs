use async_trait::async_trait;
use reqwest::{multipart, Client};
use serde::Deserialize;
use std::path::Path;
use tokio::time::{sleep, Duration};

use crate::errors::{AppError, AppResult};
use crate::story_processor::MediaKind;

use super::upload_queue::MediaSender;

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Longest server-requested pause honoured before handing the failure back.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Telegram Bot API client for posting media to a channel
pub struct TelegramClient {
    client: Client,
    api_base: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

impl TelegramClient {
    pub fn new(token: &str) -> AppResult<Self> {
        Self::with_api_base(token, DEFAULT_API_BASE)
    }

    pub fn with_api_base(token: &str, api_base: &str) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    async fn send_media(
        &self,
        method: &str,
        chat_id: &str,
        payload: &UploadPayload,
    ) -> AppResult<()> {
        let form = payload
            .build_form()?
            .text("chat_id", chat_id.to_string());

        // The URL embeds the bot token, so strip it from transport errors.
        let response = self
            .client
            .post(self.method_url(method))
            .multipart(form)
            .send()
            .await
            .map_err(|e| AppError::Network(e.without_url()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::Network(e.without_url()))?;

        let parsed: Option<ApiResponse> = serde_json::from_str(&body).ok();

        if status.is_success() && parsed.as_ref().map(|r| r.ok).unwrap_or(false) {
            log::debug!("Telegram {} accepted {}", method, payload.file_name());
            return Ok(());
        }

        let description = parsed
            .as_ref()
            .and_then(|r| r.description.clone())
            .unwrap_or_else(|| body.chars().take(300).collect::<String>());

        if status.as_u16() == 429 {
            if let Some(retry_after) = parsed
                .as_ref()
                .and_then(|r| r.parameters.as_ref())
                .and_then(|p| p.retry_after)
            {
                let wait = Duration::from_secs(retry_after).min(MAX_RETRY_AFTER);
                log::warn!("Telegram rate limit hit, waiting {:?}", wait);
                sleep(wait).await;
            }
        }

        Err(AppError::upload_failed(format!(
            "Telegram API error {} on {}: {}",
            status, method, description
        )))
    }
}

#[async_trait]
impl MediaSender for TelegramClient {
    async fn send_video(&self, chat_id: &str, payload: &UploadPayload) -> AppResult<()> {
        self.send_media("sendVideo", chat_id, payload).await
    }

    async fn send_photo(&self, chat_id: &str, payload: &UploadPayload) -> AppResult<()> {
        self.send_media("sendPhoto", chat_id, payload).await
    }
}

/// One media file, read into memory for a single API call
#[derive(Debug, Clone)]
pub struct UploadPayload {
    file_name: String,
    data: Vec<u8>,
    mime_type: String,
    field_name: String,
}

impl UploadPayload {
    /// Reads the whole file; the handle is closed before this returns.
    pub async fn from_file(file_path: &Path, kind: MediaKind) -> AppResult<Self> {
        let data = tokio::fs::read(file_path).await?;
        let file_name = file_path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();

        let field_name = match kind {
            MediaKind::Video => "video",
            MediaKind::Image => "photo",
        };

        Ok(Self {
            file_name,
            data,
            mime_type: kind.mime_type().to_string(),
            field_name: field_name.to_string(),
        })
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn build_form(&self) -> AppResult<multipart::Form> {
        let part = multipart::Part::bytes(self.data.clone())
            .file_name(self.file_name.clone())
            .mime_str(&self.mime_type)?;

        Ok(multipart::Form::new().part(self.field_name.clone(), part))
    }
}
