//! The structured analysis result and its summary schema.
//!
//! Model output arrives in two shapes: the current eight-section summary and
//! a legacy seven-section form with different field names. Both are folded
//! into [`MeetingSummary`] by [`normalize_summary`] at the ingestion boundary;
//! nothing downstream looks for optional legacy fields.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::LazyLock;

use crate::errors::SchemaError;

/// `HH:MM:SS` or `MM:SS`.
static TIME_PATTERN: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^(?:(\d{1,2}):)?([0-5]?\d):([0-5]\d)$"));

/// Keys that only appear in legacy summaries.
const LEGACY_KEYS: [&str; 7] = [
    "meeting_purpose",
    "client_name",
    "participants",
    "topics",
    "todos",
    "action_items",
    "references",
];

/// Version tag of a summary payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummarySchemaVersion {
    /// Seven sections, legacy field names, no open issues.
    LegacyV1,
    /// Eight sections, canonical field names.
    #[default]
    V2,
}

impl SummarySchemaVersion {
    /// Parses an explicit `schema_version` value.
    fn from_tag(tag: &Value) -> Option<Self> {
        match tag {
            Value::Number(n) => match n.as_u64() {
                Some(1) => Some(Self::LegacyV1),
                Some(2) => Some(Self::V2),
                _ => None,
            },
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "1" | "v1" | "legacy_v1" | "legacy" => Some(Self::LegacyV1),
                "2" | "v2" => Some(Self::V2),
                _ => None,
            },
            _ => None,
        }
    }

    /// Detects the version of a raw summary object.
    #[must_use]
    pub fn detect(summary: &Value) -> Self {
        if let Some(tag) = summary.get("schema_version").and_then(Self::from_tag) {
            return tag;
        }
        let legacy = summary
            .as_object()
            .is_some_and(|obj| LEGACY_KEYS.iter().any(|k| obj.contains_key(*k)));
        if legacy {
            Self::LegacyV1
        } else {
            Self::V2
        }
    }
}

impl fmt::Display for SummarySchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LegacyV1 => write!(f, "legacy_v1"),
            Self::V2 => write!(f, "v2"),
        }
    }
}

/// A discussed topic with an optional time range into the recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscussionPoint {
    /// Topic headline.
    pub topic: String,
    /// Start offset (`HH:MM:SS` or `MM:SS`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    /// End offset (`HH:MM:SS` or `MM:SS`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    /// What was said.
    #[serde(default)]
    pub details: String,
}

/// A follow-up task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextAction {
    /// The task.
    pub task: String,
    /// Who owns it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// When it is due.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due: Option<String>,
}

/// The canonical eight-section meeting summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingSummary {
    /// Why the meeting happened.
    pub purpose: String,
    /// Client or counterpart organisation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counterpart: Option<String>,
    /// Who attended.
    #[serde(default)]
    pub attendees: Vec<String>,
    /// Topics discussed.
    #[serde(default)]
    pub discussion_points: Vec<DiscussionPoint>,
    /// Decisions made.
    #[serde(default)]
    pub decisions: Vec<String>,
    /// Follow-up tasks.
    #[serde(default)]
    pub next_actions: Vec<NextAction>,
    /// Documents or links referenced.
    #[serde(default)]
    pub materials: Vec<String>,
    /// Questions left unresolved.
    #[serde(default)]
    pub open_issues: Vec<String>,
}

impl MeetingSummary {
    /// Returns every schema problem in this summary.
    #[must_use]
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.purpose.trim().is_empty() {
            problems.push("summary.purpose is empty".to_string());
        }

        for (idx, point) in self.discussion_points.iter().enumerate() {
            if point.topic.trim().is_empty() {
                problems.push(format!("summary.discussion_points[{idx}].topic is empty"));
            }
            let start = check_time(&mut problems, idx, "start", point.start.as_deref());
            let end = check_time(&mut problems, idx, "end", point.end.as_deref());
            if let (Some(s), Some(e)) = (start, end) {
                if s > e {
                    problems.push(format!(
                        "summary.discussion_points[{idx}] starts after it ends"
                    ));
                }
            }
        }

        for (idx, action) in self.next_actions.iter().enumerate() {
            if action.task.trim().is_empty() {
                problems.push(format!("summary.next_actions[{idx}].task is empty"));
            }
        }

        problems
    }

    /// Approximate rendered size, used for the compression ratio.
    #[must_use]
    pub fn char_len(&self) -> usize {
        let lists = [
            &self.attendees,
            &self.decisions,
            &self.materials,
            &self.open_issues,
        ];
        let points: usize = self
            .discussion_points
            .iter()
            .map(|p| p.topic.chars().count() + p.details.chars().count())
            .sum();
        let actions: usize = self
            .next_actions
            .iter()
            .map(|a| a.task.chars().count())
            .sum();
        self.purpose.chars().count()
            + self.counterpart.as_deref().map_or(0, |c| c.chars().count())
            + lists
                .iter()
                .flat_map(|l| l.iter())
                .map(|s| s.chars().count())
                .sum::<usize>()
            + points
            + actions
    }
}

fn check_time(problems: &mut Vec<String>, idx: usize, which: &str, raw: Option<&str>) -> Option<u32> {
    let raw = raw?;
    match parse_offset(raw) {
        Ok(Some(secs)) => Some(secs),
        Ok(None) => {
            problems.push(format!(
                "summary.discussion_points[{idx}].{which} '{raw}' is not HH:MM:SS or MM:SS"
            ));
            None
        }
        Err(err) => {
            problems.extend(err.problems);
            None
        }
    }
}

/// Parses a recording offset into seconds. `Ok(None)` means the text does
/// not match the time pattern.
pub fn parse_offset(raw: &str) -> Result<Option<u32>, SchemaError> {
    let pattern = TIME_PATTERN
        .as_ref()
        .map_err(|e| SchemaError::new(format!("time pattern failed to compile: {e}")))?;
    let Some(caps) = pattern.captures(raw.trim()) else {
        return Ok(None);
    };
    let field = |i: usize| -> u32 {
        caps.get(i)
            .and_then(|m| m.as_str().parse::<u32>().ok())
            .unwrap_or(0)
    };
    Ok(Some(field(1) * 3600 + field(2) * 60 + field(3)))
}

/// Optional quality notes reported alongside the summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    /// Self-reported confidence in `[0, 1]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Free-form notes (audio problems, overlapping speakers).
    #[serde(default)]
    pub notes: Vec<String>,
}

/// Provenance and size metadata for a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMetadata {
    /// Model that produced the result.
    pub model: String,
    /// Attempts made across all models, including the successful one.
    pub attempts: u32,
    /// Schema version the model actually emitted.
    pub source_schema: SummarySchemaVersion,
    /// Transcript length in characters.
    pub transcript_chars: usize,
    /// Summary size divided by transcript size.
    pub compression_ratio: f64,
    /// Quality notes, when the model gave any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<QualityReport>,
    /// When the result was produced.
    pub generated_at: DateTime<Utc>,
}

/// Schema-validated transcription plus summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredResult {
    /// Always the canonical version once normalised.
    pub schema_version: SummarySchemaVersion,
    /// Full transcription.
    pub transcription: String,
    /// Canonical summary.
    pub summary: MeetingSummary,
    /// Provenance and size metadata.
    pub metadata: ResultMetadata,
}

impl StructuredResult {
    /// Builds a result, computing size metadata, and validates it in full.
    pub fn new(
        transcription: impl Into<String>,
        summary: MeetingSummary,
        model: impl Into<String>,
        attempts: u32,
        source_schema: SummarySchemaVersion,
        quality: Option<QualityReport>,
    ) -> Result<Self, SchemaError> {
        let transcription = transcription.into();
        let transcript_chars = transcription.chars().count();
        #[allow(clippy::cast_precision_loss)]
        let compression_ratio = if transcript_chars == 0 {
            0.0
        } else {
            summary.char_len() as f64 / transcript_chars as f64
        };

        let result = Self {
            schema_version: SummarySchemaVersion::V2,
            transcription,
            summary,
            metadata: ResultMetadata {
                model: model.into(),
                attempts,
                source_schema,
                transcript_chars,
                compression_ratio,
                quality,
                generated_at: Utc::now(),
            },
        };
        result.validate()?;
        Ok(result)
    }

    /// Validates the whole result. Partial results are never accepted.
    pub fn validate(&self) -> Result<(), SchemaError> {
        let mut problems = Vec::new();
        if self.transcription.trim().is_empty() {
            problems.push("transcription is empty".to_string());
        }
        problems.extend(self.summary.problems());
        if problems.is_empty() {
            Ok(())
        } else {
            Err(SchemaError::from_problems(problems))
        }
    }
}

#[derive(Deserialize)]
struct LegacySummary {
    #[serde(default)]
    meeting_purpose: String,
    #[serde(default)]
    client_name: Option<String>,
    #[serde(default)]
    participants: Vec<LegacyPerson>,
    #[serde(default)]
    topics: Vec<LegacyTopic>,
    #[serde(default)]
    decisions: Vec<String>,
    #[serde(default, alias = "action_items")]
    todos: Vec<LegacyTodo>,
    #[serde(default)]
    references: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LegacyPerson {
    Name(String),
    Detailed { name: String },
}

#[derive(Deserialize)]
struct LegacyTopic {
    #[serde(alias = "topic")]
    title: String,
    #[serde(default)]
    time_range: Option<String>,
    #[serde(default, alias = "details")]
    summary: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LegacyTodo {
    Text(String),
    Detailed {
        #[serde(alias = "item")]
        task: String,
        #[serde(default, alias = "assignee")]
        owner: Option<String>,
        #[serde(default, alias = "deadline")]
        due: Option<String>,
    },
}

fn split_range(range: Option<String>) -> (Option<String>, Option<String>) {
    let Some(range) = range else {
        return (None, None);
    };
    let mut parts = range.splitn(2, |c| matches!(c, '-' | '~' | '–'));
    let start = parts.next().map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
    let end = parts.next().map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
    (start, end)
}

impl From<LegacySummary> for MeetingSummary {
    fn from(legacy: LegacySummary) -> Self {
        Self {
            purpose: legacy.meeting_purpose,
            counterpart: legacy.client_name.filter(|c| !c.trim().is_empty()),
            attendees: legacy
                .participants
                .into_iter()
                .map(|p| match p {
                    LegacyPerson::Name(name) | LegacyPerson::Detailed { name } => name,
                })
                .collect(),
            discussion_points: legacy
                .topics
                .into_iter()
                .map(|t| {
                    let (start, end) = split_range(t.time_range);
                    DiscussionPoint {
                        topic: t.title,
                        start,
                        end,
                        details: t.summary,
                    }
                })
                .collect(),
            decisions: legacy.decisions,
            next_actions: legacy
                .todos
                .into_iter()
                .map(|t| match t {
                    LegacyTodo::Text(task) => NextAction {
                        task,
                        owner: None,
                        due: None,
                    },
                    LegacyTodo::Detailed { task, owner, due } => NextAction { task, owner, due },
                })
                .collect(),
            materials: legacy.references,
            open_issues: Vec::new(),
        }
    }
}

/// Folds a raw summary object of either version into the canonical form.
///
/// Returns the canonical summary and the version that was detected. The
/// summary is not validated here; see [`StructuredResult::validate`].
pub fn normalize_summary(raw: Value) -> Result<(MeetingSummary, SummarySchemaVersion), SchemaError> {
    if !raw.is_object() {
        return Err(SchemaError::new("summary is not a JSON object"));
    }
    let version = SummarySchemaVersion::detect(&raw);
    let summary = match version {
        SummarySchemaVersion::V2 => serde_json::from_value::<MeetingSummary>(raw),
        SummarySchemaVersion::LegacyV1 => {
            serde_json::from_value::<LegacySummary>(raw).map(MeetingSummary::from)
        }
    }
    .map_err(|e| SchemaError::new(format!("summary ({version}) does not match schema: {e}")))?;
    Ok((summary, version))
}
