use std::fmt;
use std::path::PathBuf;
use tokio::time::Duration;

use crate::errors::{AppError, AppResult};
use crate::security::InputValidator;
use crate::uploader::retry::{RetryPolicy, DEFAULT_MAX_ATTEMPTS};
use crate::{instagram, uploader::telegram_client};

/// Subdirectory of the scratch root the stories are downloaded into.
pub const STORIES_DIR_NAME: &str = "stories";

/// Raw settings exactly as found in the environment, blanks already dropped.
struct RawSettings {
    ig_user: Option<String>,
    ig_session: Option<String>,
    ig_password: Option<String>,
    ig_profile: Option<String>,
    bot_token: Option<String>,
    tg_channel_id: Option<String>,
    scratch_root: Option<String>,
    max_upload_attempts: Option<String>,
    retry_delay_ms: Option<String>,
    telegram_api_base: Option<String>,
    instagram_api_base: Option<String>,
}

impl RawSettings {
    fn read<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        Self {
            ig_user: get("IG_USER"),
            ig_session: get("IG_SESSION"),
            ig_password: get("IG_PASSWORD"),
            ig_profile: get("IG_PROFILE"),
            bot_token: get("BOT_TOKEN"),
            tg_channel_id: get("TG_CHANNEL_ID"),
            scratch_root: get("SCRATCH_ROOT"),
            max_upload_attempts: get("MAX_UPLOAD_ATTEMPTS"),
            retry_delay_ms: get("RETRY_DELAY_MS"),
            telegram_api_base: get("TELEGRAM_API_BASE"),
            instagram_api_base: get("INSTAGRAM_API_BASE"),
        }
    }
}

/// How the forwarder proves its identity to Instagram.
#[derive(Clone, PartialEq, Eq)]
pub enum SourceCredential {
    /// A `sessionid` cookie from an existing login.
    Session(String),
    /// Password for a fresh web login.
    Password(String),
}

impl fmt::Debug for SourceCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceCredential::Session(_) => f.write_str("Session(<redacted>)"),
            SourceCredential::Password(_) => f.write_str("Password(<redacted>)"),
        }
    }
}

#[derive(Clone)]
pub struct Config {
    pub ig_user: String,
    pub credential: SourceCredential,
    pub ig_profile: String,
    pub bot_token: String,
    pub channel_id: String,
    pub scratch_root: PathBuf,
    pub max_upload_attempts: u32,
    pub retry_delay_ms: u64,
    pub telegram_api_base: String,
    pub instagram_api_base: String,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("ig_user", &self.ig_user)
            .field("credential", &self.credential)
            .field("ig_profile", &self.ig_profile)
            .field("bot_token", &"<redacted>")
            .field("channel_id", &self.channel_id)
            .field("scratch_root", &self.scratch_root)
            .field("max_upload_attempts", &self.max_upload_attempts)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .field("telegram_api_base", &self.telegram_api_base)
            .field("instagram_api_base", &self.instagram_api_base)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw = RawSettings::read(lookup);
        let config = Self::from_raw(raw)?;
        validate_config(&config)?;
        Ok(config)
    }

    fn from_raw(raw: RawSettings) -> AppResult<Self> {
        let ig_user = require(raw.ig_user, "IG_USER")?;

        let credential = match (raw.ig_session, raw.ig_password) {
            (Some(session), _) => SourceCredential::Session(session),
            (None, Some(password)) => SourceCredential::Password(password),
            (None, None) => {
                return Err(AppError::Config(
                    "one of IG_SESSION or IG_PASSWORD must be set".to_string(),
                ))
            }
        };

        let max_upload_attempts = match raw.max_upload_attempts {
            Some(value) => value.parse::<u32>().map_err(|_| {
                AppError::validation("MAX_UPLOAD_ATTEMPTS", "Must be a whole number")
            })?,
            None => DEFAULT_MAX_ATTEMPTS,
        };

        let retry_delay_ms = match raw.retry_delay_ms {
            Some(value) => value
                .parse::<u64>()
                .map_err(|_| AppError::validation("RETRY_DELAY_MS", "Must be a whole number"))?,
            None => 0,
        };

        Ok(Self {
            ig_user,
            credential,
            ig_profile: require(raw.ig_profile, "IG_PROFILE")?,
            bot_token: require(raw.bot_token, "BOT_TOKEN")?,
            channel_id: require(raw.tg_channel_id, "TG_CHANNEL_ID")?,
            scratch_root: raw
                .scratch_root
                .map(PathBuf::from)
                .unwrap_or_else(std::env::temp_dir),
            max_upload_attempts,
            retry_delay_ms,
            telegram_api_base: raw
                .telegram_api_base
                .unwrap_or_else(|| telegram_client::DEFAULT_API_BASE.to_string()),
            instagram_api_base: raw
                .instagram_api_base
                .unwrap_or_else(|| instagram::DEFAULT_API_BASE.to_string()),
        })
    }

    pub fn stories_dir(&self) -> PathBuf {
        self.scratch_root.join(STORIES_DIR_NAME)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_upload_attempts,
            Duration::from_millis(self.retry_delay_ms),
        )
    }
}

fn require(value: Option<String>, key: &str) -> AppResult<String> {
    value.ok_or_else(|| AppError::missing_setting(key))
}

pub fn validate_config(config: &Config) -> AppResult<()> {
    InputValidator::validate_username("IG_USER", &config.ig_user)?;
    InputValidator::validate_username("IG_PROFILE", &config.ig_profile)?;
    InputValidator::validate_bot_token(&config.bot_token)?;
    InputValidator::validate_channel_id(&config.channel_id)?;
    InputValidator::validate_api_base("TELEGRAM_API_BASE", &config.telegram_api_base)?;
    InputValidator::validate_api_base("INSTAGRAM_API_BASE", &config.instagram_api_base)?;

    if config.max_upload_attempts == 0 || config.max_upload_attempts > 10 {
        return Err(AppError::validation(
            "MAX_UPLOAD_ATTEMPTS",
            "Must be between 1 and 10",
        ));
    }

    if config.retry_delay_ms > 60_000 {
        return Err(AppError::validation(
            "RETRY_DELAY_MS",
            "Must be 60000ms or less",
        ));
    }

    Ok(())
}
