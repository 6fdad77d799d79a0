use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::cookie::Jar;
use reqwest::{Client, Response, StatusCode, Url};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::time::Duration;

use crate::config::SourceCredential;
use crate::errors::{AppError, AppResult};
use crate::story_processor::{self, MediaKind};

pub const DEFAULT_API_BASE: &str = "https://www.instagram.com";

/// App id the Instagram web client sends with API calls.
const WEB_APP_ID: &str = "936619743392459";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/124.0 Safari/537.36";
/// Graphql query returning the logged-in user, or null without a session.
const CURRENT_USER_QUERY_HASH: &str = "d6f4427fbe92d846298cf93df0b937d3";

/// Where stories come from
#[async_trait]
pub trait StorySource: Send + Sync {
    async fn login(&self, credential: &SourceCredential) -> AppResult<()>;

    /// Downloads every current story of `profile` into `target_dir` and
    /// returns how many stories were saved.
    async fn download_stories(&self, profile: &str, target_dir: &Path) -> AppResult<usize>;
}

#[derive(Debug, Deserialize)]
struct CurrentUserResponse {
    data: Option<CurrentUserData>,
}

#[derive(Debug, Deserialize)]
struct CurrentUserData {
    user: Option<UserRef>,
}

#[derive(Debug, Deserialize)]
struct UserRef {
    username: String,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(default)]
    authenticated: bool,
    #[serde(default)]
    two_factor_required: bool,
    #[serde(default)]
    checkpoint_url: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProfileInfoResponse {
    data: Option<ProfileInfoData>,
}

#[derive(Debug, Deserialize)]
struct ProfileInfoData {
    user: Option<ProfileUser>,
}

#[derive(Debug, Deserialize)]
struct ProfileUser {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ReelsMediaResponse {
    #[serde(default)]
    reels: HashMap<String, Reel>,
}

#[derive(Debug, Deserialize)]
struct Reel {
    #[serde(default)]
    items: Vec<StoryItem>,
}

#[derive(Debug, Deserialize)]
struct StoryItem {
    taken_at: i64,
    #[serde(default)]
    image_versions2: Option<ImageVersions>,
    #[serde(default)]
    video_versions: Option<Vec<MediaCandidate>>,
}

#[derive(Debug, Deserialize)]
struct ImageVersions {
    #[serde(default)]
    candidates: Vec<MediaCandidate>,
}

#[derive(Debug, Deserialize)]
struct MediaCandidate {
    url: String,
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
}

fn best_candidate(candidates: &[MediaCandidate]) -> Option<&MediaCandidate> {
    candidates
        .iter()
        .max_by_key(|c| u64::from(c.width) * u64::from(c.height))
}

/// Instagram web API client holding the login cookies for one run
pub struct InstagramClient {
    client: Client,
    jar: Arc<Jar>,
    api_base: Url,
    username: String,
}

impl InstagramClient {
    pub fn new(username: &str) -> AppResult<Self> {
        Self::with_api_base(username, DEFAULT_API_BASE)
    }

    pub fn with_api_base(username: &str, api_base: &str) -> AppResult<Self> {
        let api_base = Url::parse(api_base)
            .map_err(|e| AppError::validation("INSTAGRAM_API_BASE", &e.to_string()))?;
        let jar = Arc::new(Jar::default());

        let client = Client::builder()
            .cookie_provider(jar.clone())
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(120))
            .build()?;

        Ok(Self {
            client,
            jar,
            api_base,
            username: username.to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> AppResult<Url> {
        self.api_base
            .join(path)
            .map_err(|e| AppError::Source(format!("invalid endpoint {}: {}", path, e)))
    }

    /// Maps rejected sessions to authentication errors and anything else
    /// unsuccessful to a source error.
    fn check_status(&self, response: Response, context: &str) -> AppResult<Response> {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(AppError::authentication(
                &self.username,
                &format!("{} rejected with {}", context, status),
            ));
        }
        if response.url().path().starts_with("/accounts/login") {
            return Err(AppError::authentication(
                &self.username,
                &format!("{} redirected to the login page", context),
            ));
        }
        if !status.is_success() {
            return Err(AppError::Source(format!("{} failed with {}", context, status)));
        }
        Ok(response)
    }

    async fn login_with_session(&self, session_id: &str) -> AppResult<()> {
        self.jar
            .add_cookie_str(&format!("sessionid={}", session_id), &self.api_base);

        let mut url = self.endpoint("graphql/query/")?;
        url.query_pairs_mut()
            .append_pair("query_hash", CURRENT_USER_QUERY_HASH)
            .append_pair("variables", "{}");

        let response = self
            .client
            .get(url)
            .header("X-IG-App-ID", WEB_APP_ID)
            .send()
            .await?;
        let response = self.check_status(response, "session check")?;
        let body: CurrentUserResponse = response.json().await?;

        let user = body
            .data
            .and_then(|d| d.user)
            .ok_or_else(|| AppError::authentication(&self.username, "session is not logged in"))?;

        if !user.username.eq_ignore_ascii_case(&self.username) {
            log::warn!(
                "Session belongs to {} but IG_USER is {}",
                user.username,
                self.username
            );
        }
        Ok(())
    }

    async fn login_with_password(&self, password: &str) -> AppResult<()> {
        let response = self
            .client
            .get(self.endpoint("accounts/login/")?)
            .send()
            .await?;
        let csrf_token = response
            .cookies()
            .find(|c| c.name() == "csrftoken")
            .map(|c| c.value().to_string())
            .ok_or_else(|| {
                AppError::authentication(&self.username, "login page did not set a csrftoken")
            })?;

        let enc_password = format!(
            "#PWD_INSTAGRAM_BROWSER:0:{}:{}",
            Utc::now().timestamp(),
            password
        );
        let form = [
            ("username", self.username.as_str()),
            ("enc_password", enc_password.as_str()),
            ("queryParams", "{}"),
            ("optIntoOneTap", "false"),
        ];

        let response = self
            .client
            .post(self.endpoint("api/v1/web/accounts/login/ajax/")?)
            .header("X-CSRFToken", csrf_token)
            .header("X-IG-App-ID", WEB_APP_ID)
            .header("X-Requested-With", "XMLHttpRequest")
            .header("Referer", self.endpoint("accounts/login/")?.as_str())
            .form(&form)
            .send()
            .await?;

        // Failed logins come back as 400 with a JSON explanation.
        let status = response.status();
        let body: LoginResponse = response.json().await.map_err(|_| {
            AppError::authentication(&self.username, &format!("login failed with {}", status))
        })?;

        if body.authenticated {
            return Ok(());
        }

        let reason = if body.two_factor_required {
            "two-factor authentication required".to_string()
        } else if let Some(checkpoint) = body.checkpoint_url {
            format!("checkpoint required: {}", checkpoint)
        } else {
            body.message
                .unwrap_or_else(|| "wrong username or password".to_string())
        };
        Err(AppError::authentication(&self.username, &reason))
    }

    async fn fetch_profile_id(&self, profile: &str) -> AppResult<String> {
        let mut url = self.endpoint("api/v1/users/web_profile_info/")?;
        url.query_pairs_mut().append_pair("username", profile);

        let response = self
            .client
            .get(url)
            .header("X-IG-App-ID", WEB_APP_ID)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(AppError::Source(format!("profile {} not found", profile)));
        }
        let response = self.check_status(response, "profile lookup")?;
        let body: ProfileInfoResponse = response.json().await?;

        body.data
            .and_then(|d| d.user)
            .map(|u| u.id)
            .ok_or_else(|| AppError::Source(format!("profile {} not found", profile)))
    }

    async fn fetch_story_items(&self, profile_id: &str) -> AppResult<Vec<StoryItem>> {
        let mut url = self.endpoint("api/v1/feed/reels_media/")?;
        url.query_pairs_mut().append_pair("reel_ids", profile_id);

        let response = self
            .client
            .get(url)
            .header("X-IG-App-ID", WEB_APP_ID)
            .send()
            .await?;
        let response = self.check_status(response, "story feed")?;
        let mut body: ReelsMediaResponse = response.json().await?;

        Ok(body
            .reels
            .remove(profile_id)
            .map(|reel| reel.items)
            .unwrap_or_default())
    }

    async fn download_file(&self, url: &str, target: &Path) -> AppResult<()> {
        let response = self.client.get(url).send().await?;
        let response = self.check_status(response, "media download")?;
        let bytes = response.bytes().await?;
        tokio::fs::write(target, &bytes).await?;
        log::debug!("Saved {} ({} bytes)", target.display(), bytes.len());
        Ok(())
    }

    async fn save_story_item(&self, item: &StoryItem, target_dir: &Path) -> AppResult<bool> {
        let taken_at = Utc
            .timestamp_opt(item.taken_at, 0)
            .single()
            .ok_or_else(|| AppError::Source(format!("invalid taken_at {}", item.taken_at)))?;
        let stem = unique_stem(target_dir, &story_processor::format_story_stem(taken_at));

        let image = item
            .image_versions2
            .as_ref()
            .and_then(|v| best_candidate(&v.candidates));
        let video = item.video_versions.as_deref().and_then(best_candidate);

        if image.is_none() && video.is_none() {
            log::warn!("Story taken at {} has no downloadable media", taken_at);
            return Ok(false);
        }

        for (kind, candidate) in [(MediaKind::Image, image), (MediaKind::Video, video)] {
            if let Some(candidate) = candidate {
                let target = target_dir.join(format!("{}.{}", stem, kind.extension()));
                self.download_file(&candidate.url, &target).await?;
            }
        }
        Ok(true)
    }
}

/// Appends `_1`, `_2`, ... until no variant of the stem exists yet.
fn unique_stem(target_dir: &Path, base: &str) -> String {
    let taken = |stem: &str| {
        [MediaKind::Image, MediaKind::Video]
            .iter()
            .any(|kind| target_dir.join(format!("{}.{}", stem, kind.extension())).exists())
    };

    if !taken(base) {
        return base.to_string();
    }
    (1..)
        .map(|n| format!("{}_{}", base, n))
        .find(|candidate| !taken(candidate))
        .unwrap_or_else(|| base.to_string())
}

#[async_trait]
impl StorySource for InstagramClient {
    async fn login(&self, credential: &SourceCredential) -> AppResult<()> {
        match credential {
            SourceCredential::Session(session_id) => self.login_with_session(session_id).await,
            SourceCredential::Password(password) => self.login_with_password(password).await,
        }
    }

    async fn download_stories(&self, profile: &str, target_dir: &Path) -> AppResult<usize> {
        let profile_id = self.fetch_profile_id(profile).await?;
        log::debug!("Resolved profile {} to id {}", profile, profile_id);

        let items = self.fetch_story_items(&profile_id).await?;
        log::info!("{} has {} current stories", profile, items.len());

        let mut saved = 0;
        for item in &items {
            if self.save_story_item(item, target_dir).await? {
                saved += 1;
            }
        }
        Ok(saved)
    }
}
