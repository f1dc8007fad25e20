//! Output formatting for channels, tracks and durations.

use std::fmt::Write as _;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::error::Result;
use crate::model::{Channel, Track};

/// Output format of listing and view commands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum OutputFormat {
    Text,
    #[default]
    Json,
    Sql,
}

/// Formats a channel for reading.
#[must_use]
pub fn channel_text(channel: &Channel) -> String {
    let title = if channel.name.is_empty() {
        "Untitled Channel"
    } else {
        &channel.name
    };

    let mut optional = Vec::new();
    if let Some(url) = channel.url.as_deref().filter(|u| !u.is_empty()) {
        optional.push(format!("Website: {url}"));
    }
    if !channel.image.is_empty() {
        optional.push(format!("Image: {}", channel.image));
    }
    if let Some(latitude) = channel.latitude {
        optional.push(format!("Latitude: {latitude}"));
    }
    if let Some(longitude) = channel.longitude {
        optional.push(format!("Longitude: {longitude}"));
    }
    optional.push(format!("Tracks: {}", channel.track_count));
    if let Some(firebase_id) = &channel.firebase_id {
        optional.push(format!("Firebase ID: {firebase_id}"));
    }

    let mut out = String::new();
    let _ = writeln!(out, "{title}");
    let _ = writeln!(out, "{}", "=".repeat(title.chars().count()));
    let _ = writeln!(out);
    let _ = writeln!(out, "{}", channel.description);
    let _ = writeln!(out);
    let _ = writeln!(out, "Info:");
    let _ = writeln!(out, "  ID: {}", channel.id.as_deref().unwrap_or("N/A"));
    let _ = writeln!(out, "  Slug: {}", channel.slug);
    let _ = writeln!(out, "  Source: {}", channel.source.as_str());
    let _ = writeln!(out, "  Created: {}", date_or_unknown(channel.created_at.as_deref()));
    let _ = writeln!(out, "  Updated: {}", date_or_unknown(channel.updated_at.as_deref()));
    for line in optional {
        let _ = writeln!(out, "  {line}");
    }
    out
}

/// Formats a track as title, description and indented URL.
#[must_use]
pub fn track_text(track: &Track) -> String {
    format!("{}\n{}\n  {}", track.title, track.description, track.url)
}

/// One line per channel: slug and name.
#[must_use]
pub fn channel_line(channel: &Channel) -> String {
    let name = if channel.name.is_empty() { "Untitled" } else { &channel.name };
    format!("{}\t{name}", channel.slug)
}

/// One line per track: title and URL.
#[must_use]
pub fn track_line(track: &Track) -> String {
    let title = if track.title.is_empty() { "Untitled" } else { &track.title };
    format!("{title}\t{}", track.url)
}

fn date_or_unknown(raw: Option<&str>) -> String {
    raw.map_or_else(
        || "Unknown".to_string(),
        |raw| {
            chrono::DateTime::parse_from_rfc3339(raw)
                .map_or_else(|_| raw.to_string(), |d| d.format("%Y-%m-%d").to_string())
        },
    )
}

/// Pretty-printed JSON.
///
/// # Errors
///
/// Returns an error if the value cannot be serialized.
pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// One `INSERT` statement per row.
///
/// Columns are each row's top-level fields, sorted by name; nested values
/// are stored as JSON text.
///
/// # Errors
///
/// Returns an error if a row cannot be serialized.
pub fn to_sql<T: Serialize>(table: &str, rows: &[T]) -> Result<String> {
    let mut out = String::new();
    for row in rows {
        let Value::Object(fields) = serde_json::to_value(row)? else {
            continue;
        };
        let columns: Vec<&str> = fields.keys().map(String::as_str).collect();
        let values: Vec<String> = fields.values().map(sql_literal).collect();
        let _ = writeln!(
            out,
            "INSERT INTO {table} ({}) VALUES ({});",
            columns.join(", "),
            values.join(", ")
        );
    }
    Ok(out)
}

fn sql_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => (if *b { "TRUE" } else { "FALSE" }).to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote(s),
        Value::Array(_) | Value::Object(_) => quote(&value.to_string()),
    }
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Channels in the requested format.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn render_channels(channels: &[Channel], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => to_json(channels),
        OutputFormat::Sql => to_sql("channels", channels),
        OutputFormat::Text => Ok(channels
            .iter()
            .map(channel_line)
            .collect::<Vec<_>>()
            .join("\n")),
    }
}

/// One channel in the requested format.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn render_channel(channel: &Channel, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => to_json(channel),
        OutputFormat::Sql => to_sql("channels", std::slice::from_ref(channel)),
        OutputFormat::Text => Ok(channel_text(channel)),
    }
}

/// Tracks in the requested format.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn render_tracks(tracks: &[Track], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => to_json(tracks),
        OutputFormat::Sql => to_sql("tracks", tracks),
        OutputFormat::Text => Ok(tracks.iter().map(track_text).collect::<Vec<_>>().join("\n\n")),
    }
}

/// Pluralises `noun` for `count`.
#[must_use]
pub fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("{count} {noun}")
    } else {
        format!("{count} {noun}s")
    }
}

/// Formats a duration as a human-readable string (e.g. "5.0s", "1m 05s", "1h 01m 05s").
#[must_use]
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs >= 3600 {
        format!(
            "{}h {:02}m {:02}s",
            secs / 3600,
            (secs % 3600) / 60,
            secs % 60
        )
    } else if secs >= 60 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{}.{:01}s", secs, d.subsec_millis() / 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RecordSource;

    fn channel() -> Channel {
        Channel {
            id: Some("c1".into()),
            slug: "oskar".into(),
            name: "Oskar".into(),
            description: "Good music".into(),
            track_count: 12,
            created_at: Some("2020-05-01T10:00:00Z".into()),
            source: RecordSource::V1,
            ..Channel::default()
        }
    }

    #[test]
    fn channel_text_layout() {
        let text = channel_text(&channel());
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "Oskar");
        assert_eq!(lines[1], "=====");
        assert_eq!(lines[3], "Good music");
        assert!(text.contains("  ID: c1\n"));
        assert!(text.contains("  Source: v1\n"));
        assert!(text.contains("  Created: 2020-05-01\n"));
        assert!(text.contains("  Updated: Unknown\n"));
        assert!(text.contains("  Tracks: 12\n"));
        assert!(!text.contains("Website"));
    }

    #[test]
    fn untitled_channel() {
        let text = channel_text(&Channel::default());
        assert!(text.starts_with("Untitled Channel\n================\n"));
        assert!(text.contains("  ID: N/A\n"));
    }

    #[test]
    fn track_text_layout() {
        let track = Track {
            title: "Song".into(),
            description: "#jazz".into(),
            url: "https://youtu.be/abc".into(),
            ..Track::default()
        };
        assert_eq!(track_text(&track), "Song\n#jazz\n  https://youtu.be/abc");
        assert_eq!(track_line(&track), "Song\thttps://youtu.be/abc");
    }

    #[test]
    fn sql_escapes_quotes_and_nulls() {
        #[derive(Serialize)]
        struct Row<'a> {
            id: &'a str,
            title: &'a str,
            count: u32,
            note: Option<&'a str>,
            live: bool,
        }
        let sql = to_sql(
            "tracks",
            &[Row {
                id: "t1",
                title: "Don't stop",
                count: 3,
                note: None,
                live: true,
            }],
        )
        .unwrap();
        assert_eq!(
            sql,
            "INSERT INTO tracks (count, id, live, note, title) VALUES (3, 't1', TRUE, NULL, 'Don''t stop');\n"
        );
    }

    #[test]
    fn render_formats() {
        let channels = vec![channel()];
        let json = render_channels(&channels, OutputFormat::Json).unwrap();
        let parsed: Vec<Channel> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, channels);

        assert_eq!(render_channels(&channels, OutputFormat::Text).unwrap(), "oskar\tOskar");
        assert!(render_channel(&channel(), OutputFormat::Sql)
            .unwrap()
            .starts_with("INSERT INTO channels (created_at, description, id, image, name, slug"));
        assert_eq!(render_tracks(&[], OutputFormat::Sql).unwrap(), "");
    }

    #[test]
    fn plural_forms() {
        assert_eq!(plural(1, "track"), "1 track");
        assert_eq!(plural(0, "track"), "0 tracks");
    }

    #[test]
    fn format_duration_units() {
        assert_eq!(format_duration(Duration::from_secs(5)), "5.0s");
        assert_eq!(format_duration(Duration::from_secs(65)), "1m 05s");
        assert_eq!(format_duration(Duration::from_secs(3665)), "1h 01m 05s");
        assert_eq!(format_duration(Duration::ZERO), "0.0s");
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn quoted_strings_have_balanced_quotes(s in ".*") {
                let quoted = quote(&s);
                prop_assert!(quoted.starts_with('\'') && quoted.ends_with('\''));
                let inner = &quoted[1..quoted.len() - 1];
                prop_assert_eq!(inner.replace("''", ""), s.replace('\'', ""));
            }

            #[test]
            fn format_duration_never_panics(secs in 0u64..1_000_000) {
                let _ = format_duration(Duration::from_secs(secs));
            }
        }
    }
}
