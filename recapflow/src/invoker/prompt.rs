//! Analysis prompts.

use crate::core::Recording;

const SCHEMA_DESCRIPTION: &str = r#"{
  "schema_version": "v2",
  "transcription": "full verbatim transcript, speaker-labelled where possible",
  "summary": {
    "purpose": "one or two sentences",
    "counterpart": "client or counterpart organisation, or null",
    "attendees": ["name"],
    "discussion_points": [
      {"topic": "headline", "start": "HH:MM:SS", "end": "HH:MM:SS", "details": "what was said"}
    ],
    "decisions": ["decision"],
    "next_actions": [{"task": "task", "owner": "name or null", "due": "date or null"}],
    "materials": ["document or link referenced"],
    "open_issues": ["unresolved question"]
  },
  "quality": {"confidence": 0.0, "notes": ["audio problems, overlapping speakers"]}
}"#;

/// Builds the analysis prompt for a recording.
#[must_use]
pub fn analysis_prompt(recording: &Recording) -> String {
    format!(
        "You are given the recording of a meeting titled \"{topic}\" held on {date} \
         ({minutes} minutes, hosted by {host}).\n\
         Transcribe it and summarise it. Reply with a single JSON object of this shape:\n\
         {schema}\n\
         Times are offsets into the recording. Leave a list empty rather than inventing content.",
        topic = recording.topic,
        date = recording.start_time.format("%Y-%m-%d"),
        minutes = recording.duration_minutes,
        host = if recording.host_email.is_empty() {
            "an unknown host"
        } else {
            recording.host_email.as_str()
        },
        schema = SCHEMA_DESCRIPTION,
    )
}

/// Builds the corrective prompt sent after output failed validation.
#[must_use]
pub fn strict_prompt(recording: &Recording, problems: &[String]) -> String {
    let listed = problems
        .iter()
        .map(|p| format!("- {p}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "{base}\n\n\
         Your previous reply was rejected:\n{listed}\n\
         Reply with ONLY the JSON object. No prose, no markdown fences. \
         Every field shown above must be present; \"purpose\" and \"transcription\" \
         must not be empty and every time must be HH:MM:SS or MM:SS with start before end.",
        base = analysis_prompt(recording),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn recording() -> Recording {
        Recording::new(
            "1",
            "u",
            "Budget review",
            Utc.with_ymd_and_hms(2026, 3, 4, 9, 0, 0).unwrap(),
        )
        .with_duration_minutes(42)
    }

    #[test]
    fn test_analysis_prompt_mentions_meeting() {
        let prompt = analysis_prompt(&recording());
        assert!(prompt.contains("Budget review"));
        assert!(prompt.contains("2026-03-04"));
        assert!(prompt.contains("42 minutes"));
        assert!(prompt.contains("\"open_issues\""));
    }

    #[test]
    fn test_strict_prompt_lists_problems() {
        let prompt = strict_prompt(&recording(), &["summary.purpose is empty".to_string()]);
        assert!(prompt.contains("- summary.purpose is empty"));
        assert!(prompt.contains("ONLY the JSON object"));
    }
}
