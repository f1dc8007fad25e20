//! Media id extraction and destination filename derivation.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::error::{Error, Result};
use crate::model::Track;

static MEDIA_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("valid regex"));

/// Maximum length in bytes of the sanitised title part of a filename.
pub const MAX_TITLE_BYTES: usize = 255;

/// Maximum length in bytes of a whole destination file name.
pub const MAX_FILENAME_BYTES: usize = 255;

const UNTITLED: &str = "untitled";

/// Audio container extension used for every download.
pub const AUDIO_EXTENSION: &str = "m4a";

/// Extracts the YouTube video id from a URL.
///
/// Understands `watch?v=`, `youtu.be/`, `/embed/`, `/v/`, `/shorts/` and
/// `/live/` forms on any `youtube.com` subdomain (including
/// `music.youtube.com`).
#[must_use]
pub fn extract_youtube_id(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    let host = url.host_str()?.to_ascii_lowercase();

    let candidate = if host == "youtu.be" || host == "www.youtu.be" {
        url.path_segments()?.next().map(str::to_string)
    } else if host == "youtube.com"
        || host.ends_with(".youtube.com")
        || host == "youtube-nocookie.com"
        || host.ends_with(".youtube-nocookie.com")
    {
        let mut segments = url.path_segments()?;
        match segments.next() {
            Some("watch") => url
                .query_pairs()
                .find(|(k, _)| k == "v")
                .map(|(_, v)| v.into_owned()),
            Some("embed" | "v" | "shorts" | "live") => segments.next().map(str::to_string),
            _ => None,
        }
    } else {
        None
    }?;

    MEDIA_ID_RE.is_match(&candidate).then_some(candidate)
}

/// Replaces characters that are unsafe in file names and caps the length.
///
/// Reserved (`<>:"/\|?*`) and control characters become spaces, whitespace
/// runs collapse to one space, and leading/trailing spaces and dots are
/// removed. The result is truncated to [`MAX_TITLE_BYTES`] on a char
/// boundary. An empty result becomes `"untitled"`.
#[must_use]
pub fn sanitize_title(title: &str) -> String {
    clean_title(title, MAX_TITLE_BYTES)
}

fn clean_title(title: &str, max_bytes: usize) -> String {
    let replaced: String = title
        .chars()
        .map(|c| {
            if c.is_control() || matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*')
            {
                ' '
            } else {
                c
            }
        })
        .collect();

    let collapsed = replaced.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut clean = collapsed.trim_matches(|c| c == ' ' || c == '.').to_string();

    if clean.len() > max_bytes {
        let mut end = max_bytes;
        while !clean.is_char_boundary(end) {
            end -= 1;
        }
        clean.truncate(end);
        clean = clean.trim_end_matches([' ', '.']).to_string();
    }

    if clean.is_empty() {
        UNTITLED.to_string()
    } else {
        clean
    }
}

/// Builds the deterministic destination path for a track:
/// `<dir>/<clean title> [<media id>].m4a`.
///
/// The title is shortened so the file name fits in [`MAX_FILENAME_BYTES`].
///
/// # Errors
///
/// Returns [`Error::InvalidTrackData`] if the title is blank and
/// [`Error::CannotDeriveFilename`] if the URL has no media id, or one too
/// long to leave room for a title.
pub fn track_filename(track: &Track, dir: &Path) -> Result<PathBuf> {
    if track.title.trim().is_empty() {
        return Err(Error::InvalidTrackData(format!(
            "invalid track title: {:?}",
            track.title
        )));
    }
    let id = extract_youtube_id(&track.url)
        .ok_or_else(|| Error::CannotDeriveFilename(track.url.clone()))?;
    let suffix = format!(" [{id}].{AUDIO_EXTENSION}");
    let budget = MAX_FILENAME_BYTES
        .checked_sub(suffix.len())
        .filter(|budget| *budget >= UNTITLED.len())
        .ok_or_else(|| Error::CannotDeriveFilename(track.url.clone()))?;
    let title = clean_title(&track.title, budget.min(MAX_TITLE_BYTES));
    Ok(dir.join(format!("{title}{suffix}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn youtube_id_forms() {
        let cases = [
            ("https://www.youtube.com/watch?v=dQw4w9WgXcQ", "dQw4w9WgXcQ"),
            ("https://youtube.com/watch?v=abc123", "abc123"),
            ("https://m.youtube.com/watch?feature=share&v=dQw4w9WgXcQ", "dQw4w9WgXcQ"),
            ("https://music.youtube.com/watch?v=dQw4w9WgXcQ&list=RD", "dQw4w9WgXcQ"),
            ("https://youtu.be/dQw4w9WgXcQ", "dQw4w9WgXcQ"),
            ("https://youtu.be/dQw4w9WgXcQ?t=42", "dQw4w9WgXcQ"),
            ("https://www.youtube.com/embed/dQw4w9WgXcQ", "dQw4w9WgXcQ"),
            ("https://www.youtube.com/shorts/dQw4w9WgXcQ", "dQw4w9WgXcQ"),
            ("https://www.youtube-nocookie.com/embed/dQw4w9WgXcQ", "dQw4w9WgXcQ"),
        ];
        for (url, id) in cases {
            assert_eq!(extract_youtube_id(url).as_deref(), Some(id), "{url}");
        }
    }

    #[test]
    fn youtube_id_rejects_other_urls() {
        assert_eq!(extract_youtube_id("https://soundcloud.com/a/b"), None);
        assert_eq!(extract_youtube_id("https://www.youtube.com/channel/UC123"), None);
        assert_eq!(extract_youtube_id("https://www.youtube.com/watch"), None);
        assert_eq!(extract_youtube_id("https://youtu.be/"), None);
        assert_eq!(extract_youtube_id("not a url"), None);
        assert_eq!(extract_youtube_id("https://www.youtube.com/watch?v=a%20b"), None);
    }

    #[test]
    fn sanitize_replaces_reserved_characters() {
        assert_eq!(sanitize_title("AC/DC: Back in Black?"), "AC DC Back in Black");
        assert_eq!(sanitize_title("a\tb\nc"), "a b c");
        assert_eq!(sanitize_title("  ..hidden.. "), "hidden");
        assert_eq!(sanitize_title("???"), "untitled");
    }

    #[test]
    fn sanitize_caps_length_on_char_boundary() {
        let title = "é".repeat(200);
        let clean = sanitize_title(&title);
        assert!(clean.len() <= MAX_TITLE_BYTES);
        assert!(clean.chars().all(|c| c == 'é'));
    }

    #[test]
    fn filename_combines_title_and_id() {
        let track = Track {
            id: "t1".into(),
            title: "Artist - Song 1".into(),
            url: "https://youtube.com/watch?v=abc123".into(),
            ..Track::default()
        };
        let path = track_filename(&track, Path::new("/music/oskar/tracks")).unwrap();
        assert_eq!(
            path,
            PathBuf::from("/music/oskar/tracks/Artist - Song 1 [abc123].m4a")
        );
    }

    #[test]
    fn long_title_leaves_room_for_id() {
        let dir = tempfile::TempDir::new().unwrap();
        let track = Track {
            id: "t1".into(),
            title: "é".repeat(300),
            url: "https://youtu.be/dQw4w9WgXcQ".into(),
            ..Track::default()
        };
        let path = track_filename(&track, dir.path()).unwrap();
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.len() <= MAX_FILENAME_BYTES);
        assert!(name.ends_with(" [dQw4w9WgXcQ].m4a"));
        std::fs::write(&path, b"audio").unwrap();
    }

    #[test]
    fn filename_errors() {
        let mut track = Track {
            id: "t1".into(),
            title: "Song".into(),
            url: "https://example.com/song.mp3".into(),
            ..Track::default()
        };
        assert!(matches!(
            track_filename(&track, Path::new(".")),
            Err(Error::CannotDeriveFilename(_))
        ));
        track.url = format!("https://youtu.be/{}", "a".repeat(250));
        assert!(matches!(
            track_filename(&track, Path::new(".")),
            Err(Error::CannotDeriveFilename(_))
        ));
        track.title = "   ".into();
        assert!(matches!(
            track_filename(&track, Path::new(".")),
            Err(Error::InvalidTrackData(_))
        ));
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn sanitized_titles_are_safe(title in ".{0,400}") {
                let clean = sanitize_title(&title);
                prop_assert!(!clean.is_empty());
                prop_assert!(clean.len() <= MAX_TITLE_BYTES);
                prop_assert!(!clean.contains(['/', '\\', ':', '*', '?', '"', '<', '>', '|']));
                prop_assert!(!clean.chars().any(char::is_control));
            }

            #[test]
            fn file_names_fit_the_name_limit(title in ".{1,400}") {
                prop_assume!(!title.trim().is_empty());
                let track = Track {
                    title,
                    url: "https://www.youtube.com/watch?v=dQw4w9WgXcQ".into(),
                    ..Track::default()
                };
                let path = track_filename(&track, Path::new("out")).unwrap();
                let name = path.file_name().unwrap().to_str().unwrap();
                prop_assert!(name.len() <= MAX_FILENAME_BYTES);
                prop_assert!(name.ends_with(" [dQw4w9WgXcQ].m4a"));
            }

            #[test]
            fn sanitize_is_idempotent(title in ".{0,300}") {
                let once = sanitize_title(&title);
                prop_assert_eq!(sanitize_title(&once), once.clone());
            }
        }
    }
}
