// Main uploader module - organizes downloaded stories and forwards them
//
// This module is responsible for turning the stories directory into an
// ordered upload queue and pushing it to the Telegram channel

pub mod retry;
pub mod story_groups;
pub mod telegram_client;
pub mod upload_queue;

pub use retry::RetryPolicy;
pub use story_groups::{group_stories, select_media_to_upload, StoryGroups, StoryRecord};
pub use telegram_client::{TelegramClient, UploadPayload};
pub use upload_queue::{process_upload_queue, MediaSender};
