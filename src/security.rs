use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;
use crate::errors::{AppError, AppResult};

fn static_regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static regex"))
}

pub struct InputValidator;

impl InputValidator {
    /// Instagram handles: letters, digits, periods and underscores, max 30.
    pub fn validate_username(field: &str, username: &str) -> AppResult<()> {
        let trimmed = username.trim();

        if trimmed.is_empty() {
            return Err(AppError::validation(field, "Username cannot be empty"));
        }

        if trimmed.len() > 30 {
            return Err(AppError::validation(field, "Username too long (max 30 characters)"));
        }

        static SAFE_CHARS: OnceLock<Regex> = OnceLock::new();
        let safe_chars = static_regex(&SAFE_CHARS, r"^[A-Za-z0-9._]+$");
        if !safe_chars.is_match(trimmed) {
            return Err(AppError::validation(field, "Username contains invalid characters"));
        }

        Ok(())
    }

    pub fn validate_bot_token(token: &str) -> AppResult<()> {
        static TOKEN_PATTERN: OnceLock<Regex> = OnceLock::new();
        let token_pattern = static_regex(&TOKEN_PATTERN, r"^\d{5,}:[A-Za-z0-9_-]{30,}$");

        if !token_pattern.is_match(token.trim()) {
            // Never echo the token itself
            return Err(AppError::validation(
                "BOT_TOKEN",
                "Must look like <bot id>:<secret>",
            ));
        }

        Ok(())
    }

    /// Accepts a public `@channelname` or a numeric chat id such as `-1001234567890`.
    pub fn validate_channel_id(channel_id: &str) -> AppResult<()> {
        let trimmed = channel_id.trim();

        static USERNAME_PATTERN: OnceLock<Regex> = OnceLock::new();
        static NUMERIC_PATTERN: OnceLock<Regex> = OnceLock::new();
        let username_pattern = static_regex(&USERNAME_PATTERN, r"^@[A-Za-z][A-Za-z0-9_]{3,31}$");
        let numeric_pattern = static_regex(&NUMERIC_PATTERN, r"^-?\d{1,20}$");

        if username_pattern.is_match(trimmed) || numeric_pattern.is_match(trimmed) {
            Ok(())
        } else {
            Err(AppError::validation(
                "TG_CHANNEL_ID",
                "Must be @channelname or a numeric chat id",
            ))
        }
    }

    pub fn validate_api_base(field: &str, url: &str) -> AppResult<()> {
        let trimmed = url.trim();

        if !(trimmed.starts_with("https://") || trimmed.starts_with("http://")) {
            return Err(AppError::validation(field, "Must be an http(s) URL"));
        }

        if trimmed.len() > 500 {
            return Err(AppError::validation(field, "URL too long"));
        }

        Ok(())
    }
}

// Scratch directory lifecycle for one run
pub struct FileSystemGuard;

impl FileSystemGuard {
    /// Creates an empty stories directory. Leftovers from a run that died
    /// before cleanup are removed so they are not forwarded twice.
    pub fn prepare_stories_dir(stories_dir: &Path) -> AppResult<()> {
        if stories_dir.exists() {
            log::warn!(
                "Removing leftover stories directory {}",
                stories_dir.display()
            );
            std::fs::remove_dir_all(stories_dir)?;
        }
        std::fs::create_dir_all(stories_dir)?;
        Ok(())
    }

    /// Names of the regular files directly inside the stories directory.
    pub fn list_story_files(stories_dir: &Path) -> AppResult<Vec<String>> {
        let mut names = Vec::new();

        for entry in std::fs::read_dir(stories_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(raw) => log::warn!("Skipping non UTF-8 file name {:?}", raw),
            }
        }

        Ok(names)
    }

    pub fn cleanup_stories_dir(stories_dir: &Path) -> AppResult<()> {
        if stories_dir.exists() {
            std::fs::remove_dir_all(stories_dir)?;
            log::info!("Removed {}", stories_dir.display());
        }
        Ok(())
    }
}
