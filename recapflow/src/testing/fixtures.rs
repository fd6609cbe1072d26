//! Canned recordings, media and model output.

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::core::{MediaBundle, MediaFile, MediaKind, MediaPayload, Recording};

/// Start time shared by the sample recordings: 2026-03-04 09:00 UTC.
const SAMPLE_START_SECS: i64 = 1_772_614_800;

/// A 45-minute recording with audio and video.
#[must_use]
pub fn sample_recording() -> Recording {
    let start = DateTime::<Utc>::from_timestamp(SAMPLE_START_SECS, 0).unwrap_or_default();
    Recording::new("812345", "abcDEF==", "Weekly sync", start)
        .with_duration_minutes(45)
        .with_host("host@example.com")
        .with_file(MediaFile::new(MediaKind::Video, 2_048, "download/video/812345", "MP4"))
        .with_file(MediaFile::new(MediaKind::Audio, 512, "download/audio/812345", "M4A"))
}

/// Audio and video payloads for [`sample_recording`].
#[must_use]
pub fn sample_media() -> MediaBundle {
    MediaBundle {
        audio: Some(MediaPayload::new(MediaKind::Audio, "audio/mp4", vec![7; 512])),
        video: Some(MediaPayload::new(MediaKind::Video, "video/mp4", vec![9; 2_048])),
    }
}

/// A well-formed reply in the current summary shape.
#[must_use]
pub fn valid_model_output() -> String {
    json!({
        "transcription": "Ana: Let's start with the budget.\nBen: It's approved for Q2.",
        "summary": {
            "schema_version": 2,
            "purpose": "Weekly project sync",
            "counterpart": "Acme Corp",
            "attendees": ["Ana", "Ben"],
            "discussion_points": [
                {
                    "topic": "Budget",
                    "start": "00:01:00",
                    "end": "00:05:30",
                    "details": "Q2 budget approved."
                },
                {
                    "topic": "Hiring",
                    "start": "05:30",
                    "end": "12:00",
                    "details": "Two roles still open."
                }
            ],
            "decisions": ["Ship the beta in May"],
            "next_actions": [
                {"task": "Send revised deck", "owner": "Ana", "due": "2026-03-10"}
            ],
            "materials": ["roadmap.pdf"],
            "open_issues": ["Vendor contract terms"]
        },
        "quality": {"confidence": 0.9, "notes": []}
    })
    .to_string()
}

/// A well-formed reply in the legacy summary shape, wrapped in a fence.
#[must_use]
pub fn legacy_model_output() -> String {
    let body = json!({
        "transcription": "Client: We need the report by Friday.",
        "summary": {
            "meeting_purpose": "Client check-in",
            "client_name": "Globex",
            "participants": [{"name": "Chris"}, "Dana"],
            "topics": [
                {"title": "Reporting", "time_range": "00:00:10-00:04:00", "summary": "Deadline set."}
            ],
            "decisions": ["Weekly reports"],
            "todos": [{"item": "Draft report", "assignee": "Dana"}],
            "references": ["sla.docx"]
        }
    });
    format!("Here is the analysis:\n```json\n{body}\n```")
}
