//! Turning raw model text into a validated [`StructuredResult`].

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

use crate::core::{normalize_summary, QualityReport, StructuredResult};
use crate::errors::SchemaError;

static FENCED_JSON: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(\{.*\})\s*```"));

/// Pulls the JSON object out of a reply that may wrap it in a markdown
/// fence or surrounding prose.
pub fn extract_json(text: &str) -> Result<&str, SchemaError> {
    let fenced = FENCED_JSON
        .as_ref()
        .map_err(|e| SchemaError::new(format!("fence pattern failed to compile: {e}")))?;
    if let Some(body) = fenced.captures(text).and_then(|c| c.get(1)) {
        return Ok(body.as_str());
    }
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => Ok(&text[start..=end]),
        _ => Err(SchemaError::new("reply contains no JSON object")),
    }
}

/// Parses, normalises and validates one model reply.
///
/// The envelope carries `transcription`, `summary` and optionally `quality`
/// and `schema_version`. A version tag on the envelope applies to the
/// summary when the summary has none of its own.
pub fn parse_model_output(
    text: &str,
    model: &str,
    attempts: u32,
) -> Result<StructuredResult, SchemaError> {
    let body = extract_json(text)?;
    let mut envelope: Value = serde_json::from_str(body)
        .map_err(|e| SchemaError::new(format!("reply is not valid JSON: {e}")))?;
    let Some(obj) = envelope.as_object_mut() else {
        return Err(SchemaError::new("reply is not a JSON object"));
    };

    let transcription = match obj.remove("transcription") {
        Some(Value::String(t)) => t,
        Some(_) => return Err(SchemaError::new("transcription is not a string")),
        None => return Err(SchemaError::new("transcription is missing")),
    };

    let mut summary = obj
        .remove("summary")
        .ok_or_else(|| SchemaError::new("summary is missing"))?;
    if let (Some(tag), Some(inner)) = (obj.get("schema_version"), summary.as_object_mut()) {
        inner
            .entry("schema_version")
            .or_insert_with(|| tag.clone());
    }

    let quality = match obj.remove("quality") {
        None | Some(Value::Null) => None,
        Some(raw) => Some(
            serde_json::from_value::<QualityReport>(raw)
                .map_err(|e| SchemaError::new(format!("quality does not match schema: {e}")))?,
        ),
    };

    let (summary, version) = normalize_summary(summary)?;
    StructuredResult::new(transcription, summary, model, attempts, version, quality)
}
