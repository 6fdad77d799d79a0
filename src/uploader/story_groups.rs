use indexmap::IndexMap;
use std::path::{Path, PathBuf};

use crate::errors::AppResult;
use crate::story_processor::{self, MediaKind};

/// All downloaded variants of one story, keyed by the shared base name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoryRecord {
    pub story_name: String,
    pub video: Option<PathBuf>,
    pub image: Option<PathBuf>,
}

impl StoryRecord {
    fn new(story_name: &str) -> Self {
        Self {
            story_name: story_name.to_string(),
            ..Default::default()
        }
    }

    /// Video wins over image; records holding only sidecar files have
    /// nothing to upload.
    pub fn preferred_media(&self) -> Option<&PathBuf> {
        self.video.as_ref().or(self.image.as_ref())
    }
}

/// Keeps first-seen order so equal timestamps stay in listing order.
pub type StoryGroups = IndexMap<String, StoryRecord>;

/// Splits `<story_name>.<...>.<kind>` into the story name and kind token.
fn split_story_filename(file_name: &str) -> Option<(&str, &str)> {
    let (story_name, rest) = file_name.split_once('.')?;
    if story_name.is_empty() || rest.is_empty() {
        return None;
    }
    let kind = rest.rsplit('.').next().unwrap_or(rest);
    Some((story_name, kind))
}

/// Groups a flat listing of the stories directory by story name.
pub fn group_stories<I, S>(file_names: I, stories_dir: &Path) -> StoryGroups
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut groups = StoryGroups::new();

    for file_name in file_names {
        let file_name = file_name.as_ref();
        let Some((story_name, kind_token)) = split_story_filename(file_name) else {
            log::warn!("Skipping malformed story file name: {}", file_name);
            continue;
        };

        let record = groups
            .entry(story_name.to_string())
            .or_insert_with(|| StoryRecord::new(story_name));
        let path = stories_dir.join(file_name);

        match MediaKind::from_token(kind_token) {
            Some(MediaKind::Video) => record.video = Some(path),
            Some(MediaKind::Image) => record.image = Some(path),
            None => log::debug!("Ignoring non-media story file: {}", file_name),
        }
    }

    log::info!("Organized {} story groups", groups.len());
    groups
}

/// Picks one file per story and orders the picks by capture time.
///
/// A single unparseable timestamp fails the whole selection, since
/// uploading out of order is worse than not uploading.
pub fn select_media_to_upload(groups: &StoryGroups) -> AppResult<Vec<PathBuf>> {
    let mut keyed = Vec::with_capacity(groups.len());

    for record in groups.values() {
        match record.preferred_media() {
            Some(path) => {
                let taken_at = story_processor::get_timestamp_from_filename(path)?;
                keyed.push((taken_at, path.clone()));
            }
            None => log::debug!("Story {} has no uploadable media", record.story_name),
        }
    }

    keyed.sort_by_key(|(taken_at, _)| *taken_at);

    log::info!(
        "Selected {} of {} stories for upload",
        keyed.len(),
        groups.len()
    );

    Ok(keyed.into_iter().map(|(_, path)| path).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AppError;
    use std::collections::HashSet;

    fn dir() -> PathBuf {
        PathBuf::from("/tmp/stories")
    }

    #[test]
    fn test_group_by_story_name() {
        let files = [
            "2024-01-01_10-00-00_UTC.mp4",
            "2024-01-01_10-00-00_UTC.jpg",
            "2024-01-01_10-00-00_UTC.json.xz",
            "2024-01-02_08-30-00_UTC.jpg",
        ];
        let groups = group_stories(files, &dir());

        assert_eq!(groups.len(), 2);
        let first = &groups["2024-01-01_10-00-00_UTC"];
        assert_eq!(
            first.video,
            Some(dir().join("2024-01-01_10-00-00_UTC.mp4"))
        );
        assert_eq!(
            first.image,
            Some(dir().join("2024-01-01_10-00-00_UTC.jpg"))
        );

        let second = &groups["2024-01-02_08-30-00_UTC"];
        assert!(second.video.is_none());
        assert!(second.image.is_some());
    }

    #[test]
    fn test_malformed_names_are_skipped() {
        let files = ["README", ".hidden", "trailing.", "2024-01-01_10-00-00_UTC.jpg"];
        let groups = group_stories(files, &dir());

        assert_eq!(groups.len(), 1);
        assert!(groups.contains_key("2024-01-01_10-00-00_UTC"));
    }

    #[test]
    fn test_duplicate_kind_last_write_wins() {
        let files = ["a.2024-01-01_10-00-00_UTC.jpg", "a.2024-01-01_11-00-00_UTC.jpg"];
        let groups = group_stories(files, &dir());

        assert_eq!(
            groups["a"].image,
            Some(dir().join("a.2024-01-01_11-00-00_UTC.jpg"))
        );
    }

    #[test]
    fn test_grouping_is_idempotent() {
        let files = vec![
            "b.2024-01-01_09-00-00_UTC.jpg".to_string(),
            "a.2024-01-01_10-00-00_UTC.mp4".to_string(),
            "a.2024-01-01_10-00-00_UTC.jpg".to_string(),
        ];
        assert_eq!(group_stories(&files, &dir()), group_stories(&files, &dir()));
    }

    #[test]
    fn test_video_preferred_over_image() {
        let files = ["a.2024-01-01_10-00-00_UTC.mp4", "a.2024-01-01_10-00-00_UTC.jpg"];
        let selection = select_media_to_upload(&group_stories(files, &dir())).unwrap();

        assert_eq!(selection, vec![dir().join("a.2024-01-01_10-00-00_UTC.mp4")]);
    }

    #[test]
    fn test_records_without_media_are_dropped() {
        let files = ["meta.2024-01-01_10-00-00_UTC.json", "c.2024-01-01_10-00-00_UTC.jpg"];
        let groups = group_stories(files, &dir());
        assert_eq!(groups.len(), 2);

        let selection = select_media_to_upload(&groups).unwrap();
        assert_eq!(selection, vec![dir().join("c.2024-01-01_10-00-00_UTC.jpg")]);
    }

    #[test]
    fn test_selection_sorted_by_timestamp() {
        let files = [
            "2024-05-01_12-00-00_UTC.jpg",
            "2024-05-01_08-00-00_UTC.mp4",
            "2024-05-01_10-00-00_UTC.jpg",
        ];
        let selection = select_media_to_upload(&group_stories(files, &dir())).unwrap();

        assert_eq!(
            selection,
            vec![
                dir().join("2024-05-01_08-00-00_UTC.mp4"),
                dir().join("2024-05-01_10-00-00_UTC.jpg"),
                dir().join("2024-05-01_12-00-00_UTC.jpg"),
            ]
        );
    }

    #[test]
    fn test_one_path_per_known_story() {
        let files = [
            "x.2024-01-01_10-00-00_UTC.mp4",
            "x.2024-01-01_10-00-00_UTC.jpg",
            "y.2024-01-01_11-00-00_UTC.jpg",
            "z.2024-01-01_12-00-00_UTC.txt",
        ];
        let groups = group_stories(files, &dir());
        let selection = select_media_to_upload(&groups).unwrap();

        let mut seen = HashSet::new();
        for path in &selection {
            let name = path.file_name().unwrap().to_str().unwrap();
            let story = name.split('.').next().unwrap();
            assert!(groups.contains_key(story));
            assert!(seen.insert(story.to_string()), "duplicate story {}", story);
        }
        assert_eq!(selection.len(), 2);
    }

    #[test]
    fn test_end_to_end_example() {
        let files = [
            "alice.2024-01-01_10-00-00_UTC.mp4",
            "alice.2024-01-01_10-00-00_UTC.jpg",
            "bob.2024-01-01_09-00-00_UTC.jpg",
        ];
        let groups = group_stories(files, &dir());
        assert_eq!(groups.len(), 2);

        let selection = select_media_to_upload(&groups).unwrap();
        assert_eq!(
            selection,
            vec![
                dir().join("bob.2024-01-01_09-00-00_UTC.jpg"),
                dir().join("alice.2024-01-01_10-00-00_UTC.mp4"),
            ]
        );
    }

    #[test]
    fn test_equal_timestamps_keep_listing_order() {
        let files = [
            "second.2024-01-01_10-00-00_UTC.jpg",
            "first.2024-01-01_09-00-00_UTC.jpg",
            "third.2024-01-01_10-00-00_UTC.mp4",
        ];
        let selection = select_media_to_upload(&group_stories(files, &dir())).unwrap();

        assert_eq!(
            selection,
            vec![
                dir().join("first.2024-01-01_09-00-00_UTC.jpg"),
                dir().join("second.2024-01-01_10-00-00_UTC.jpg"),
                dir().join("third.2024-01-01_10-00-00_UTC.mp4"),
            ]
        );
    }

    #[test]
    fn test_unparseable_timestamp_fails_selection() {
        let files = ["ok.2024-01-01_10-00-00_UTC.jpg", "broken.jpg"];
        let result = select_media_to_upload(&group_stories(files, &dir()));

        assert!(matches!(result, Err(AppError::Parse { .. })));
    }
}
