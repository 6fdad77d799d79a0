use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::time::Instant;

use crate::errors::{AppError, AppResult};
use crate::story_processor::MediaKind;

use super::retry::RetryPolicy;
use super::telegram_client::UploadPayload;

/// Destination that accepts one media file per call
#[async_trait]
pub trait MediaSender: Send + Sync {
    async fn send_video(&self, chat_id: &str, payload: &UploadPayload) -> AppResult<()>;

    async fn send_photo(&self, chat_id: &str, payload: &UploadPayload) -> AppResult<()>;
}

/// Sends one story file, reopening it on every attempt.
pub async fn send_story_file<S: MediaSender + ?Sized>(
    sender: &S,
    chat_id: &str,
    file_path: &Path,
    retry_policy: &RetryPolicy,
) -> AppResult<()> {
    let display = file_path.display().to_string();
    let kind = MediaKind::from_path(file_path)
        .ok_or_else(|| AppError::unsupported_media(&display))?;

    retry_policy
        .run(&display, |attempt| async move {
            let payload = UploadPayload::from_file(file_path, kind).await?;
            log::debug!(
                "Attempt {} for {} ({} bytes)",
                attempt,
                payload.file_name(),
                payload.len()
            );
            match kind {
                MediaKind::Video => sender.send_video(chat_id, &payload).await,
                MediaKind::Image => sender.send_photo(chat_id, &payload).await,
            }
        })
        .await
}

/// Sends every selected file in order. The first file that exhausts its
/// retries aborts the queue; nothing after it is sent.
pub async fn process_upload_queue<S: MediaSender + ?Sized>(
    sender: &S,
    chat_id: &str,
    media_to_upload: &[PathBuf],
    retry_policy: &RetryPolicy,
) -> AppResult<usize> {
    let start_time = Instant::now();
    let total = media_to_upload.len();

    if total == 0 {
        log::info!("No stories to send");
        return Ok(0);
    }

    for (index, file_path) in media_to_upload.iter().enumerate() {
        log::info!(
            "Sending {} ({} of {})...",
            file_path.display(),
            index + 1,
            total
        );
        send_story_file(sender, chat_id, file_path, retry_policy).await?;
    }

    log::info!(
        "Sent {} stories in {:.1}s",
        total,
        start_time.elapsed().as_secs_f64()
    );
    Ok(total)
}
