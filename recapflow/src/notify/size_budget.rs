//! Chat payload size budget.
//!
//! Chat channels reject messages whose free-text fields exceed a fixed
//! size. Any field that may be long is passed through [`truncate_field`]
//! before it is posted or stored in a recovery record. The contract:
//!
//! - at most `limit` characters of the original text are kept, cut on a
//!   `char` boundary;
//! - [`TRUNCATION_MARKER`] is appended, on its own line, only when text
//!   was actually cut;
//! - text within the limit is returned unchanged.

use crate::core::StructuredResult;

/// Maximum characters kept per free-text field.
pub const FIELD_CHAR_LIMIT: usize = 2_700;

/// Appended to every field that was cut.
pub const TRUNCATION_MARKER: &str = "[truncated: see durable document]";

/// Cuts `text` to `limit` characters. Returns the text and whether it was
/// cut.
#[must_use]
pub fn truncate_field(text: &str, limit: usize) -> (String, bool) {
    match text.char_indices().nth(limit) {
        None => (text.to_string(), false),
        Some((byte_idx, _)) => {
            let mut cut = text[..byte_idx].trim_end().to_string();
            cut.push('\n');
            cut.push_str(TRUNCATION_MARKER);
            (cut, true)
        }
    }
}

/// Applies the field budget to every long text field of a result.
#[must_use]
pub fn truncate_result(result: &StructuredResult, limit: usize) -> (StructuredResult, bool) {
    let mut out = result.clone();
    let mut truncated = false;

    let mut apply = |field: &mut String| {
        let (text, cut) = truncate_field(field, limit);
        if cut {
            *field = text;
            truncated = true;
        }
    };

    apply(&mut out.transcription);
    apply(&mut out.summary.purpose);
    for point in &mut out.summary.discussion_points {
        apply(&mut point.details);
    }

    (out, truncated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoker::parse_model_output;
    use crate::testing::valid_model_output;

    #[test]
    fn test_short_text_untouched() {
        assert_eq!(truncate_field("hello", 10), ("hello".to_string(), false));
        assert_eq!(truncate_field("hello", 5), ("hello".to_string(), false));
    }

    #[test]
    fn test_cut_on_char_boundary() {
        let (text, cut) = truncate_field("ééééé", 3);
        assert!(cut);
        assert_eq!(text, format!("ééé\n{TRUNCATION_MARKER}"));
    }

    #[test]
    fn test_default_limit() {
        let long = "a".repeat(FIELD_CHAR_LIMIT + 1);
        let (text, cut) = truncate_field(&long, FIELD_CHAR_LIMIT);
        assert!(cut);
        assert!(text.starts_with(&"a".repeat(FIELD_CHAR_LIMIT)));
        assert!(text.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn test_truncate_result_marks_transcription() {
        let mut result = parse_model_output(&valid_model_output(), "m", 1).unwrap();
        result.transcription = "word ".repeat(2_000);

        let (cut, truncated) = truncate_result(&result, FIELD_CHAR_LIMIT);
        assert!(truncated);
        assert!(cut.transcription.ends_with(TRUNCATION_MARKER));
        assert_eq!(cut.summary.decisions, result.summary.decisions);

        let (same, truncated) = truncate_result(&cut, usize::MAX);
        assert!(!truncated);
        assert_eq!(same, cut);
    }
}
