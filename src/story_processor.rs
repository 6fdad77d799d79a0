use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

use crate::errors::{AppError, AppResult};

/// Marker the downloader appends after the capture time.
pub const UTC_MARKER: &str = "_UTC";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Video,
    Image,
}

impl MediaKind {
    /// Maps a filename kind token (extension) to a media kind. Sidecar
    /// tokens such as `json` or `xz` are not media.
    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "mp4" => Some(MediaKind::Video),
            "jpg" | "jpeg" => Some(MediaKind::Image),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_token)
    }

    pub fn extension(&self) -> &'static str {
        match self {
            MediaKind::Video => "mp4",
            MediaKind::Image => "jpg",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            MediaKind::Video => "video/mp4",
            MediaKind::Image => "image/jpeg",
        }
    }
}

fn timestamp_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // The timestamp must fill a whole dot segment, optionally with a `_N` collision suffix
    RE.get_or_init(|| {
        Regex::new(r"(?:^|\.)(\d{4}-\d{2}-\d{2}_\d{2}-\d{2}-\d{2})_UTC(?:_\d+)?(?:\.|$)")
            .expect("static regex is valid")
    })
}

/// Extracts the capture time embedded in a story filename, e.g.
/// `stories/2024-01-01_10-00-00_UTC.mp4`.
///
/// Fails instead of guessing: a missing `_UTC` segment or an impossible
/// date/time is a parse error.
pub fn get_timestamp_from_filename(file_path: &Path) -> AppResult<DateTime<Utc>> {
    let display = file_path.to_string_lossy();
    let filename = file_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| AppError::parse(&display, "path has no file name"))?;

    if !filename.contains(UTC_MARKER) {
        return Err(AppError::parse(&display, "missing _UTC timestamp marker"));
    }

    let captures = timestamp_regex().captures(filename).ok_or_else(|| {
        AppError::parse(&display, "timestamp does not match YYYY-MM-DD_HH-MM-SS")
    })?;
    let datetime_str = &captures[1];
    log::debug!("Parsing datetime from filename: {}", datetime_str);

    NaiveDateTime::parse_from_str(datetime_str, TIMESTAMP_FORMAT)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .map_err(|e| AppError::parse(&display, &e.to_string()))
}

/// Formats a capture time the way story files are named on disk.
pub fn format_story_stem(taken_at: DateTime<Utc>) -> String {
    format!("{}{}", taken_at.format(TIMESTAMP_FORMAT), UTC_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_timestamp_from_downloaded_name() {
        let ts = get_timestamp_from_filename(Path::new("stories/2024-03-05_17-42-09_UTC.mp4"))
            .unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 3, 5, 17, 42, 9).unwrap());
    }

    #[test]
    fn test_timestamp_with_name_prefix_and_suffix() {
        let path = PathBuf::from("/tmp/stories/alice.2024-01-01_10-00-00_UTC_1.jpg");
        let ts = get_timestamp_from_filename(&path).unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap());
    }

    #[test]
    fn test_missing_marker_is_parse_error() {
        let result = get_timestamp_from_filename(Path::new("stories/2024-01-01_10-00-00.jpg"));
        assert!(matches!(result, Err(AppError::Parse { .. })));
    }

    #[test]
    fn test_malformed_timestamps_never_guess() {
        for name in [
            "stories/2024-13-01_10-00-00_UTC.jpg",
            "stories/2024-02-30_10-00-00_UTC.jpg",
            "stories/2024-01-01_25-00-00_UTC.jpg",
            "stories/2024-1-01_10-00-00_UTC.jpg",
            "stories/garbage_UTC.jpg",
            "stories/12024-01-01_10-00-00_UTC.jpg",
            "stories/x2024-01-01_10-00-00_UTC.jpg",
            "stories/2024-01-01_10-00-00_UTCx.jpg",
            "stories/2024-01-01_10-00-001_UTC.jpg",
            "stories/alice_2024-01-01_10-00-00_UTC.jpg",
        ] {
            let result = get_timestamp_from_filename(Path::new(name));
            assert!(
                matches!(result, Err(AppError::Parse { .. })),
                "expected parse error for {}",
                name
            );
        }
    }

    #[test]
    fn test_marker_only_in_directory_is_rejected() {
        let result =
            get_timestamp_from_filename(Path::new("2024-01-01_10-00-00_UTC/story.jpg"));
        assert!(result.is_err());
    }

    #[test]
    fn test_story_stem_round_trips_through_parser() {
        let taken_at = Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 58).unwrap();
        let stem = format_story_stem(taken_at);
        assert_eq!(stem, "2023-12-31_23-59-58_UTC");

        let parsed = get_timestamp_from_filename(Path::new(&format!("{}.jpg", stem))).unwrap();
        assert_eq!(parsed, taken_at);
    }

    #[test]
    fn test_media_kind_classification() {
        assert_eq!(MediaKind::from_path(Path::new("a.mp4")), Some(MediaKind::Video));
        assert_eq!(MediaKind::from_path(Path::new("a.JPG")), Some(MediaKind::Image));
        assert_eq!(MediaKind::from_path(Path::new("a.jpeg")), Some(MediaKind::Image));
        assert_eq!(MediaKind::from_path(Path::new("a.json.xz")), None);
        assert_eq!(MediaKind::from_path(Path::new("noext")), None);
        assert_eq!(MediaKind::Video.mime_type(), "video/mp4");
    }
}
