//! Minimal chat message rendering.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::size_budget::truncate_field;
use crate::core::{ArtifactRef, MeetingSummary, Recording, StructuredResult};
use crate::errors::RunError;

/// A labelled block of message text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageField {
    /// Field label.
    pub label: String,
    /// Field text.
    pub value: String,
}

/// A labelled link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageLink {
    /// Link text.
    pub label: String,
    /// Target URL.
    pub url: String,
}

/// A channel-agnostic message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedMessage {
    /// Headline.
    pub title: String,
    /// Lead paragraph.
    pub body: String,
    /// Labelled sections.
    #[serde(default)]
    pub fields: Vec<MessageField>,
    /// Links to artifacts.
    #[serde(default)]
    pub links: Vec<MessageLink>,
}

impl RenderedMessage {
    /// Creates a message with a title and body.
    #[must_use]
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            fields: Vec::new(),
            links: Vec::new(),
        }
    }

    /// Adds a field, skipping empty text.
    #[must_use]
    pub fn with_field(mut self, label: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.trim().is_empty() {
            self.fields.push(MessageField {
                label: label.into(),
                value,
            });
        }
        self
    }

    /// Adds a link.
    #[must_use]
    pub fn with_link(mut self, label: impl Into<String>, url: impl Into<String>) -> Self {
        self.links.push(MessageLink {
            label: label.into(),
            url: url.into(),
        });
        self
    }

    /// Applies the field size budget to the body and every field.
    #[must_use]
    pub fn within_limit(mut self, limit: usize) -> Self {
        self.body = truncate_field(&self.body, limit).0;
        for field in &mut self.fields {
            field.value = truncate_field(&field.value, limit).0;
        }
        self
    }

    /// Plain-text rendering.
    #[must_use]
    pub fn to_text(&self) -> String {
        let mut out = format!("*{}*", self.title);
        if !self.body.is_empty() {
            out.push('\n');
            out.push_str(&self.body);
        }
        for field in &self.fields {
            out.push_str(&format!("\n\n*{}*\n{}", field.label, field.value));
        }
        if !self.links.is_empty() {
            out.push('\n');
            for link in &self.links {
                out.push_str(&format!("\n<{}|{}>", link.url, link.label));
            }
        }
        out
    }

    /// Incoming-webhook JSON body.
    #[must_use]
    pub fn to_payload(&self) -> Value {
        json!({ "text": self.to_text() })
    }
}

fn bullets<'a>(items: impl IntoIterator<Item = &'a str>) -> String {
    items
        .into_iter()
        .map(|s| format!("• {s}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn discussion(summary: &MeetingSummary) -> String {
    summary
        .discussion_points
        .iter()
        .map(|p| {
            let range = match (&p.start, &p.end) {
                (Some(s), Some(e)) => format!(" ({s}-{e})"),
                (Some(s), None) => format!(" ({s})"),
                _ => String::new(),
            };
            if p.details.is_empty() {
                format!("• {}{range}", p.topic)
            } else {
                format!("• {}{range}: {}", p.topic, p.details)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn actions(summary: &MeetingSummary) -> String {
    summary
        .next_actions
        .iter()
        .map(|a| {
            let mut line = format!("• {}", a.task);
            if let Some(owner) = &a.owner {
                line.push_str(&format!(" [{owner}]"));
            }
            if let Some(due) = &a.due {
                line.push_str(&format!(" (due {due})"));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Builds the main result notification.
#[must_use]
pub fn render_result_message(
    recording: &Recording,
    result: &StructuredResult,
    artifacts: &[ArtifactRef],
    limit: usize,
) -> RenderedMessage {
    let summary = &result.summary;
    let mut message = RenderedMessage::new(
        format!("Meeting summary: {}", recording.folder_label()),
        summary.purpose.clone(),
    )
    .with_field("Counterpart", summary.counterpart.clone().unwrap_or_default())
    .with_field("Attendees", summary.attendees.join(", "))
    .with_field("Discussion", discussion(summary))
    .with_field("Decisions", bullets(summary.decisions.iter().map(String::as_str)))
    .with_field("Next actions", actions(summary))
    .with_field("Materials", bullets(summary.materials.iter().map(String::as_str)))
    .with_field("Open issues", bullets(summary.open_issues.iter().map(String::as_str)));

    for artifact in artifacts {
        message = message.with_link(format!("{} ({})", artifact.name, artifact.category), &artifact.link);
    }
    message.within_limit(limit)
}

/// Builds the error notification for a failed or deferred run.
#[must_use]
pub fn render_failure_message(
    recording: &Recording,
    error: &RunError,
    audit_link: Option<&str>,
    limit: usize,
) -> RenderedMessage {
    let mut message = RenderedMessage::new(
        format!("Meeting processing failed: {}", recording.folder_label()),
        error.message.clone(),
    )
    .with_field("Error code", error.code.clone())
    .with_field("Class", error.class.to_string())
    .with_field(
        "Stage",
        error.stage.map(|s| s.to_string()).unwrap_or_default(),
    )
    .with_field("Recording", format!("{} ({})", recording.id, recording.uuid));
    if let Some(link) = audit_link {
        message = message.with_link("Execution log", link);
    }
    message.within_limit(limit)
}

/// Builds the secondary "delivery failed" notice sent after recovery.
#[must_use]
pub fn render_delivery_failed_message(recording: &Recording, reference: &str) -> RenderedMessage {
    RenderedMessage::new(
        format!("Notification delivery failed: {}", recording.folder_label()),
        format!("Delivery failed, data preserved at {reference}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ArtifactCategory, PipelineStage};
    use crate::errors::{codes, ErrorClass};
    use crate::invoker::parse_model_output;
    use crate::notify::{FIELD_CHAR_LIMIT, TRUNCATION_MARKER};
    use crate::testing::{sample_recording, valid_model_output};

    #[test]
    fn test_result_message_sections() {
        let result = parse_model_output(&valid_model_output(), "m", 1).unwrap();
        let artifacts = vec![ArtifactRef::new(
            "x",
            "summary.json",
            "memory://x",
            ArtifactCategory::Summary,
            1,
        )];
        let message =
            render_result_message(&sample_recording(), &result, &artifacts, FIELD_CHAR_LIMIT);

        assert!(message.title.contains("Weekly sync"));
        let labels: Vec<&str> = message.fields.iter().map(|f| f.label.as_str()).collect();
        assert!(labels.contains(&"Decisions"));
        assert!(labels.contains(&"Open issues"));
        assert_eq!(message.links.len(), 1);
        assert!(message.to_payload()["text"]
            .as_str()
            .unwrap()
            .contains("<memory://x|summary.json (summary)>"));
    }

    #[test]
    fn test_empty_fields_skipped() {
        let message = RenderedMessage::new("t", "b").with_field("Empty", "  ");
        assert!(message.fields.is_empty());
    }

    #[test]
    fn test_long_body_truncated() {
        let message = RenderedMessage::new("t", "x".repeat(50)).within_limit(10);
        assert!(message.body.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn test_failure_message() {
        let error = RunError::new(codes::AI_FATAL, ErrorClass::Fatal, "HTTP 401: bad key")
            .at_stage(PipelineStage::AiAnalysis);
        let message = render_failure_message(
            &sample_recording(),
            &error,
            Some("memory://log"),
            FIELD_CHAR_LIMIT,
        );
        assert_eq!(message.body, "HTTP 401: bad key");
        assert!(message.to_text().contains("AI_FATAL"));
        assert!(message.to_text().contains("ai_analysis"));
    }
}
