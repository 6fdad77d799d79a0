use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::errors::AppResult;
use crate::instagram::{InstagramClient, StorySource};
use crate::security::FileSystemGuard;
use crate::uploader::{self, MediaSender, TelegramClient};

/// What one completed cycle did
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunOutcome {
    pub run_id: String,
    pub downloaded: usize,
    pub sent: usize,
}

/// Body of the handler's success reply.
pub const HANDLER_SUCCESS_BODY: &str = "Function executed successfully";

/// Reply shape expected by managed function runtimes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HandlerResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub body: String,
}

/// Runs one full cycle against the given source and destination:
/// login, download, organize, send, clean up.
pub async fn run_cycle_with<Src, Dst>(
    config: &Config,
    source: &Src,
    sender: &Dst,
) -> AppResult<RunOutcome>
where
    Src: StorySource + ?Sized,
    Dst: MediaSender + ?Sized,
{
    let run_id = uuid::Uuid::new_v4().to_string();
    let stories_dir = config.stories_dir();

    log::info!("[{}] Logging in...", run_id);
    source.login(&config.credential).await?;
    log::info!("[{}] Logged in as {}", run_id, config.ig_user);

    FileSystemGuard::prepare_stories_dir(&stories_dir)?;

    log::info!("[{}] Downloading stories of {}...", run_id, config.ig_profile);
    let downloaded = source
        .download_stories(&config.ig_profile, &stories_dir)
        .await?;

    let files = FileSystemGuard::list_story_files(&stories_dir)?;
    let groups = uploader::group_stories(&files, &stories_dir);
    let media_to_upload = uploader::select_media_to_upload(&groups)?;

    let sent = uploader::process_upload_queue(
        sender,
        &config.channel_id,
        &media_to_upload,
        &config.retry_policy(),
    )
    .await?;

    FileSystemGuard::cleanup_stories_dir(&stories_dir)?;
    log::info!(
        "[{}] Done: {} stories downloaded, {} forwarded",
        run_id,
        downloaded,
        sent
    );

    Ok(RunOutcome {
        run_id,
        downloaded,
        sent,
    })
}

/// Builds the real Instagram and Telegram clients for a config.
fn platform_clients(config: &Config) -> AppResult<(InstagramClient, TelegramClient)> {
    let source = InstagramClient::with_api_base(&config.ig_user, &config.instagram_api_base)?;
    let sender = TelegramClient::with_api_base(&config.bot_token, &config.telegram_api_base)?;
    Ok((source, sender))
}

/// Runs one cycle with the real Instagram and Telegram clients.
pub async fn run_cycle(config: &Config) -> AppResult<RunOutcome> {
    let (source, sender) = platform_clients(config)?;
    run_cycle_with(config, &source, &sender).await
}

/// Loads the configuration from the environment and runs one cycle.
pub async fn run_once() -> AppResult<RunOutcome> {
    log::info!("Starting...");
    let config = Config::from_env()?;
    log::debug!("Loaded {:?}", config);
    run_cycle(&config).await
}

/// Parses a raw invocation event. Blank input is a null event.
pub fn parse_event(input: &str) -> AppResult<serde_json::Value> {
    if input.trim().is_empty() {
        return Ok(serde_json::Value::Null);
    }
    Ok(serde_json::from_str(input)?)
}

/// Handler body: one cycle against the given clients, answered with the
/// runtime's success reply. The event and context are only logged.
pub async fn handler_with<Src, Dst>(
    config: &Config,
    source: &Src,
    sender: &Dst,
    event: serde_json::Value,
    context: serde_json::Value,
) -> AppResult<HandlerResponse>
where
    Src: StorySource + ?Sized,
    Dst: MediaSender + ?Sized,
{
    log::debug!("Invoked with event {} and context {}", event, context);
    let outcome = run_cycle_with(config, source, sender).await?;
    log::info!("[{}] Handler finished", outcome.run_id);

    Ok(HandlerResponse {
        status_code: 200,
        body: HANDLER_SUCCESS_BODY.to_string(),
    })
}

/// Entry point for scheduled function runtimes.
pub async fn handler(
    event: serde_json::Value,
    context: serde_json::Value,
) -> AppResult<HandlerResponse> {
    log::info!("Starting...");
    let config = Config::from_env()?;
    let (source, sender) = platform_clients(&config)?;
    handler_with(&config, &source, &sender, event, context).await
}
