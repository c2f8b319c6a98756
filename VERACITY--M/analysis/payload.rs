//! Locating JSON payloads inside free-form model output.
//!
//! Generative models wrap JSON in markdown fences, prefix it with prose, or
//! return no JSON at all. Everything that reads model output goes through
//! [`parse_json_payload`].

use serde_json::Value;
use thiserror::Error;

/// Top-level JSON shape expected from the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    /// `[ ... ]`
    Array,
    /// `{ ... }`
    Object,
}

impl PayloadShape {
    const fn delimiters(self) -> (char, char) {
        match self {
            Self::Array => ('[', ']'),
            Self::Object => ('{', '}'),
        }
    }

    /// Human label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Array => "array",
            Self::Object => "object",
        }
    }

    fn matches(self, value: &Value) -> bool {
        match self {
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
        }
    }
}

/// Reasons a model response could not be used.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    /// No JSON of the requested shape was found.
    #[error("model output contained no JSON {0}")]
    Missing(&'static str),
    /// Candidate JSON failed to parse.
    #[error("model output was not valid JSON: {0}")]
    Malformed(String),
    /// JSON parsed but had the wrong top-level shape.
    #[error("expected a JSON {expected}, found {found}")]
    WrongShape {
        /// Requested shape.
        expected: &'static str,
        /// Shape actually found.
        found: &'static str,
    },
    /// A field was present with an unusable type.
    #[error("field `{field}` must be {expected}")]
    FieldType {
        /// Field name.
        field: &'static str,
        /// Expected type.
        expected: &'static str,
    },
}

/// Removes a surrounding markdown code fence (```` ```json ```` or ```` ``` ````).
#[must_use]
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

/// Returns the slice of `text` most likely to hold the JSON payload: the
/// whole de-fenced body when it parses, otherwise the span from the first
/// opening to the last closing delimiter of `shape`.
#[must_use]
pub fn extract_json_payload(text: &str, shape: PayloadShape) -> Option<&str> {
    let body = strip_code_fence(text);
    if body.is_empty() {
        return None;
    }
    if serde_json::from_str::<Value>(body).is_ok() {
        return Some(body);
    }
    delimited_span(body, shape)
}

/// Extracts and parses the payload, checking its top-level shape.
pub fn parse_json_payload(text: &str, shape: PayloadShape) -> Result<Value, PayloadError> {
    let slice = extract_json_payload(text, shape).ok_or(PayloadError::Missing(shape.label()))?;
    let value: Value =
        serde_json::from_str(slice).map_err(|err| PayloadError::Malformed(err.to_string()))?;
    if shape.matches(&value) {
        Ok(value)
    } else {
        Err(PayloadError::WrongShape {
            expected: shape.label(),
            found: json_type(&value),
        })
    }
}

/// Name of a JSON value's type.
#[must_use]
pub const fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn delimited_span(body: &str, shape: PayloadShape) -> Option<&str> {
    let (open, close) = shape.delimiters();
    let start = body.find(open)?;
    let end = body.rfind(close)?;
    (end > start).then(|| &body[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strips_language_tagged_fence() {
        let raw = "```json\n[\"a\", \"b\"]\n```";
        assert_eq!(strip_code_fence(raw), "[\"a\", \"b\"]");
    }

    #[test]
    fn strips_bare_fence() {
        let raw = "  ```\n{\"verdict\": \"MIXED_ACCURACY\"}\n```  ";
        assert_eq!(strip_code_fence(raw), "{\"verdict\": \"MIXED_ACCURACY\"}");
    }

    #[test]
    fn unfenced_json_is_returned_untouched() {
        let raw = "[\"Water boils at 100 degrees Celsius.\"]";
        assert_eq!(extract_json_payload(raw, PayloadShape::Array), Some(raw));
    }

    #[test]
    fn prose_around_json_is_cut_away() {
        let raw = "Sure! Here is the assessment:\n{\"credibility_score\": 0.4}\nHope this helps.";
        let value = parse_json_payload(raw, PayloadShape::Object).unwrap();
        assert_eq!(value, json!({ "credibility_score": 0.4 }));
    }

    #[test]
    fn fenced_json_after_prose_is_found() {
        let raw = "Claims below.\n```json\n[\"The moon landing happened in 1969.\"]\n```";
        let value = parse_json_payload(raw, PayloadShape::Array).unwrap();
        assert_eq!(value, json!(["The moon landing happened in 1969."]));
    }

    #[test]
    fn non_json_text_is_missing() {
        assert_eq!(
            parse_json_payload("not valid json", PayloadShape::Object),
            Err(PayloadError::Missing("object"))
        );
        assert_eq!(extract_json_payload("   ", PayloadShape::Array), None);
    }

    #[test]
    fn truncated_json_is_malformed() {
        let err = parse_json_payload("{\"verdict\": \"LIKELY_ACCURATE\", }", PayloadShape::Object)
            .unwrap_err();
        assert!(matches!(err, PayloadError::Malformed(_)));
    }

    #[test]
    fn wrong_top_level_shape_is_reported() {
        let err = parse_json_payload("{\"claims\": []}", PayloadShape::Array).unwrap_err();
        assert_eq!(
            err,
            PayloadError::WrongShape {
                expected: "array",
                found: "object"
            }
        );
    }
}
