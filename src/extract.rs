//! Recovery of structured payloads from free-form completion text.
//!
//! The extractors themselves never fail on malformed input. They report
//! which path produced the candidate so callers can tell a clean fenced
//! block from a best-effort guess. Decoding and shape checks live in the
//! `decode_*` helpers, which are the only place extraction errors arise.

use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;

// Fences only count at line starts. Clean JSON never has a raw newline
// inside a string, so a fence mentioned in a string value cannot match.
static JSON_FENCE: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"(?ms)^[ \t]*```(?:json|JSON)?[ \t]*\r?\n(.*?)\r?\n[ \t]*```[ \t]*\r?$").ok()
});

static DOCKER_FENCE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?si)```(?:dockerfile|docker)[ \t]*\r?\n(.*?)```").ok());

static FROM_SPAN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?s)FROM\s.*?(?:\n[ \t]*\n|\z)").ok());

/// Dockerfile instruction keywords that start a capture.
pub const DOCKERFILE_INSTRUCTIONS: &[&str] = &[
    "FROM",
    "RUN",
    "COPY",
    "ADD",
    "WORKDIR",
    "EXPOSE",
    "CMD",
    "ENTRYPOINT",
    "ENV",
    "ARG",
    "LABEL",
    "USER",
    "VOLUME",
    "HEALTHCHECK",
];

const LEADING_PHRASES: &[&str] = &[
    "here is",
    "here's",
    "this dockerfile",
    "the following",
    "below is",
    "i've created",
];

const TRAILING_PHRASES: &[&str] = &[
    "to build",
    "note:",
    "you can",
    "this will",
    "make sure",
    "to run",
];

/// A JSON candidate and the path that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "text", rename_all = "snake_case")]
pub enum JsonExtraction {
    /// Inner content of a fenced code block
    FencedBlock(String),
    /// First balanced `{...}` or `[...]` span in the text
    BalancedSpan(String),
    /// Trimmed input, returned unchanged
    RawText(String),
}

impl JsonExtraction {
    /// Returns the candidate text.
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::FencedBlock(text) | Self::BalancedSpan(text) | Self::RawText(text) => text,
        }
    }

    /// Consumes the outcome and returns the candidate text.
    #[must_use]
    pub fn into_text(self) -> String {
        match self {
            Self::FencedBlock(text) | Self::BalancedSpan(text) | Self::RawText(text) => text,
        }
    }

    /// Short name of the extraction path, for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::FencedBlock(_) => "fenced_block",
            Self::BalancedSpan(_) => "balanced_span",
            Self::RawText(_) => "raw_text",
        }
    }
}

/// Locates a JSON candidate in free-form text.
///
/// Tries a fenced block first, then the first balanced span, then falls
/// through to the trimmed text.
///
/// # Errors
///
/// Returns [`Error::EmptyResponse`] if the text is empty or whitespace.
pub fn extract_json(text: &str) -> Result<JsonExtraction> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(Error::empty_response("extraction"));
    }

    let fenced = JSON_FENCE.as_ref().and_then(|re| {
        re.captures_iter(trimmed)
            .filter_map(|caps| caps.get(1))
            .map(|inner| inner.as_str().trim())
            .find(|inner| !inner.is_empty())
    });
    if let Some(inner) = fenced {
        return Ok(JsonExtraction::FencedBlock(inner.to_string()));
    }

    if !is_string_literal(trimmed) {
        if let Some(span) = balanced_span(trimmed) {
            return Ok(JsonExtraction::BalancedSpan(span.to_string()));
        }
    }

    Ok(JsonExtraction::RawText(trimmed.to_string()))
}

/// True if `text` is exactly one double-quoted string literal.
fn is_string_literal(text: &str) -> bool {
    let Some(body) = text.strip_prefix('"') else {
        return false;
    };
    let mut escaped = false;
    for (idx, ch) in body.char_indices() {
        match ch {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '"' => return idx + 1 == body.len(),
            _ => {}
        }
    }
    false
}

/// Finds the first balanced `{...}` or `[...]` span in one pass.
///
/// Nesting depth is unbounded and brackets inside string literals are not
/// counted. Quotes only open a string while some opener is live, so prose
/// before the payload cannot swallow it. An opener that never closes is
/// skipped in favor of the next one, and a mismatched closer kills every
/// live opener.
fn balanced_span(text: &str) -> Option<&str> {
    // (expected closer, start offset)
    let mut stack: Vec<(char, usize)> = Vec::new();
    let mut best: Option<(usize, usize)> = None;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' if !stack.is_empty() => in_string = true,
            '{' => stack.push(('}', idx)),
            '[' => stack.push((']', idx)),
            '}' | ']' => match stack.pop() {
                Some((expected, start)) if expected == ch => {
                    let end = idx + ch.len_utf8();
                    if best.is_none_or(|(s, _)| start < s) {
                        best = Some((start, end));
                    }
                }
                Some(_) => stack.clear(),
                None => {}
            },
            _ => {}
        }
        // Every later opener starts after the best span.
        if stack.is_empty() && best.is_some() {
            break;
        }
    }
    best.map(|(start, end)| &text[start..end])
}

/// Extracts and decodes a JSON value from a completion.
///
/// # Errors
///
/// Returns [`Error::EmptyResponse`] for blank text and [`Error::Extraction`]
/// if the candidate does not decode as `T`.
pub fn decode_json<T: DeserializeOwned>(stage: &str, raw: &str) -> Result<T> {
    let extraction = extract_json(raw).map_err(|_| Error::empty_response(stage))?;
    debug!(stage, outcome = extraction.kind(), "Extracted JSON candidate");

    serde_json::from_str(extraction.text())
        .map_err(|e| Error::extraction(stage, e.to_string(), raw, extraction.text()))
}

/// Decodes a completion that must be a JSON object.
///
/// # Errors
///
/// Decode errors as in [`decode_json`], or [`Error::InvalidShape`].
pub fn decode_object(stage: &str, raw: &str) -> Result<Map<String, Value>> {
    match decode_json::<Value>(stage, raw)? {
        Value::Object(map) => Ok(map),
        other => Err(Error::invalid_shape(stage, "object", describe(&other))),
    }
}

/// Decodes a completion that must be a JSON array of objects.
///
/// # Errors
///
/// Decode errors as in [`decode_json`], or [`Error::InvalidShape`].
pub fn decode_object_array(stage: &str, raw: &str) -> Result<Vec<Map<String, Value>>> {
    let items = match decode_json::<Value>(stage, raw)? {
        Value::Array(items) => items,
        other => return Err(Error::invalid_shape(stage, "array of objects", describe(&other))),
    };
    items
        .into_iter()
        .map(|item| match item {
            Value::Object(map) => Ok(map),
            other => Err(Error::invalid_shape(
                stage,
                "array of objects",
                format!("array containing {}", describe(&other)),
            )),
        })
        .collect()
}

/// Decodes a completion that must be a JSON array of strings.
///
/// # Errors
///
/// Decode errors as in [`decode_json`], or [`Error::InvalidShape`].
pub fn decode_string_list(stage: &str, raw: &str) -> Result<Vec<String>> {
    let items = match decode_json::<Value>(stage, raw)? {
        Value::Array(items) => items,
        other => return Err(Error::invalid_shape(stage, "array of strings", describe(&other))),
    };
    items
        .into_iter()
        .map(|item| match item {
            Value::String(s) => Ok(s),
            other => Err(Error::invalid_shape(
                stage,
                "array of strings",
                format!("array containing {}", describe(&other)),
            )),
        })
        .collect()
}

pub(crate) fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A Dockerfile payload and the path that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "text", rename_all = "snake_case")]
pub enum DockerfileExtraction {
    /// Lines captured from the first instruction onwards
    Instructions(String),
    /// Inner content of a `dockerfile`/`docker` fenced block
    FencedBlock(String),
    /// From the first `FROM` through the next blank line
    FromSpan(String),
    /// Nothing resembling a Dockerfile was found
    Empty,
}

impl DockerfileExtraction {
    /// Returns the recovered text, or `None` for [`Self::Empty`].
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Instructions(text) | Self::FencedBlock(text) | Self::FromSpan(text) => {
                Some(text)
            }
            Self::Empty => None,
        }
    }

    /// Short name of the extraction path, for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Instructions(_) => "instructions",
            Self::FencedBlock(_) => "fenced_block",
            Self::FromSpan(_) => "from_span",
            Self::Empty => "empty",
        }
    }
}

/// Recovers Dockerfile content from free-form text.
#[must_use]
pub fn extract_dockerfile(text: &str) -> DockerfileExtraction {
    let mut captured: Vec<&str> = Vec::new();
    let mut capturing = false;

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("```") {
            continue;
        }
        let lower = trimmed.to_lowercase();

        if !capturing {
            if LEADING_PHRASES.iter().any(|p| lower.contains(p)) {
                continue;
            }
            if !starts_with_instruction(trimmed) {
                continue;
            }
            capturing = true;
        } else if !trimmed.starts_with('#') && TRAILING_PHRASES.iter().any(|p| lower.contains(p)) {
            break;
        }
        captured.push(line.trim_end());
    }

    let joined = dedent(&captured);
    let joined = joined.trim();
    if !joined.is_empty() {
        return DockerfileExtraction::Instructions(joined.to_string());
    }

    if let Some(inner) = DOCKER_FENCE
        .as_ref()
        .and_then(|re| re.captures(text))
        .and_then(|caps| caps.get(1))
    {
        let inner = inner.as_str().trim();
        if !inner.is_empty() {
            return DockerfileExtraction::FencedBlock(inner.to_string());
        }
    }

    if let Some(span) = FROM_SPAN.as_ref().and_then(|re| re.find(text)) {
        return DockerfileExtraction::FromSpan(span.as_str().trim().to_string());
    }

    DockerfileExtraction::Empty
}

/// Joins lines after stripping the indentation they all share.
fn dedent(lines: &[&str]) -> String {
    let indent = lines
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start_matches([' ', '\t']).len())
        .min()
        .unwrap_or(0);

    lines
        .iter()
        .map(|line| line.get(indent..).unwrap_or_default())
        .collect::<Vec<_>>()
        .join("\n")
}

fn starts_with_instruction(line: &str) -> bool {
    line.split_whitespace()
        .next()
        .is_some_and(|token| DOCKERFILE_INSTRUCTIONS.contains(&token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_fenced_json_block() {
        let out = extract_json("```json\n{\"a\":1}\n```").unwrap();
        assert_eq!(out, JsonExtraction::FencedBlock("{\"a\":1}".to_string()));
    }

    #[test]
    fn test_fenced_block_with_prose() {
        let text = "Here is the result:\n```json\n{\"test\": \"value\"}\n```\nLet me know!";
        assert_eq!(extract_json(text).unwrap().text(), "{\"test\": \"value\"}");
    }

    #[test]
    fn test_untagged_fence() {
        let out = extract_json("```\n[\"a\", \"b\"]\n```").unwrap();
        assert_eq!(out, JsonExtraction::FencedBlock("[\"a\", \"b\"]".to_string()));
    }

    #[test]
    fn test_balanced_span_in_prose() {
        let text = "Sure! The files are [\"src/main.rs\", \"Cargo.toml\"] as requested.";
        let out = extract_json(text).unwrap();
        assert_eq!(
            out,
            JsonExtraction::BalancedSpan("[\"src/main.rs\", \"Cargo.toml\"]".to_string())
        );
    }

    #[test]
    fn test_balanced_span_handles_deep_nesting_and_strings() {
        let text = r#"Result: {"a": {"b": {"c": [1, 2, {"d": "}]"}]}}} trailing"#;
        let out = extract_json(text).unwrap();
        assert_eq!(out.text(), r#"{"a": {"b": {"c": [1, 2, {"d": "}]"}]}}}"#);
    }

    #[test]
    fn test_unclosed_opener_is_skipped() {
        let text = "Note [unfinished. Answer: {\"ok\": true}";
        assert_eq!(extract_json(text).unwrap().text(), "{\"ok\": true}");
    }

    #[test]
    fn test_raw_text_fallthrough() {
        let out = extract_json("  no json here  ").unwrap();
        assert_eq!(out, JsonExtraction::RawText("no json here".to_string()));
    }

    #[test]
    fn test_empty_input() {
        assert!(extract_json("").unwrap_err().is_empty_response());
        assert!(extract_json(" \n\t").unwrap_err().is_empty_response());
    }

    #[test]
    fn test_clean_json_is_unchanged() {
        let out = extract_json("{\"test\": \"value\"}").unwrap();
        assert_eq!(out.text(), "{\"test\": \"value\"}");
    }

    #[test]
    fn test_fence_inside_string_value_is_not_a_fence() {
        let text = r#"{"example": "run ```json\n{}\n``` to see", "ok": true}"#;
        let out = extract_json(text).unwrap();
        assert_eq!(out, JsonExtraction::BalancedSpan(text.to_string()));
    }

    #[test]
    fn test_inline_fence_mention_is_skipped() {
        let out = extract_json("Wrap it in ```json``` fences? Sure: {\"a\": 1}").unwrap();
        assert_eq!(out, JsonExtraction::BalancedSpan("{\"a\": 1}".to_string()));
    }

    #[test]
    fn test_empty_fence_falls_through() {
        let text = "```json\n\n```\nThen: ```\n[1, 2]\n```";
        assert_eq!(extract_json(text).unwrap().text(), "[1, 2]");

        let text = "```\n   \n```\n```json\n{\"b\": 2}\n```";
        assert_eq!(
            extract_json(text).unwrap(),
            JsonExtraction::FencedBlock("{\"b\": 2}".to_string())
        );
    }

    #[test]
    fn test_top_level_string_is_raw_text() {
        let out = extract_json(r#""see {x}""#).unwrap();
        assert_eq!(out, JsonExtraction::RawText(r#""see {x}""#.to_string()));

        let out = extract_json(r#""a \" [b]""#).unwrap();
        assert_eq!(out.kind(), "raw_text");
    }

    #[test]
    fn test_quotes_in_prose_do_not_hide_payload() {
        let out = extract_json("Use the 5\" cable: {\"a\": 1}").unwrap();
        assert_eq!(out.text(), "{\"a\": 1}");
    }

    #[test]
    fn test_mismatched_closer_drops_live_openers() {
        let out = extract_json("[ {\"a\": 1} } then {\"b\": 2}").unwrap();
        assert_eq!(out.text(), "{\"a\": 1}");

        let out = extract_json("[1, 2} and {\"b\": 2}").unwrap();
        assert_eq!(out.text(), "{\"b\": 2}");
    }

    #[test]
    fn test_long_run_of_unclosed_openers() {
        let text = format!("{}x", "[".repeat(50_000));
        let started = std::time::Instant::now();
        let out = extract_json(&text).unwrap();
        assert_eq!(out, JsonExtraction::RawText(text.clone()));
        assert!(started.elapsed() < std::time::Duration::from_secs(1));

        let text = format!("{}{{\"ok\": true}}", "{".repeat(50_000));
        assert_eq!(extract_json(&text).unwrap().text(), "{\"ok\": true}");
    }

    #[test]
    fn test_extraction_serializes_tagged() {
        let json = serde_json::to_value(JsonExtraction::BalancedSpan("{}".into())).unwrap();
        assert_eq!(json["outcome"], "balanced_span");
        assert_eq!(json["text"], "{}");
    }

    #[test]
    fn test_decode_string_list() {
        let files = decode_string_list("selection", "```json\n[\"a.rs\", \"b.rs\"]\n```").unwrap();
        assert_eq!(files, vec!["a.rs", "b.rs"]);
    }

    #[test]
    fn test_decode_string_list_wrong_shape() {
        let err = decode_string_list("selection", "{\"files\": []}").unwrap_err();
        assert!(err.is_invalid_shape());
        assert!(err.to_string().contains("object"));

        let err = decode_string_list("selection", "[1, 2]").unwrap_err();
        assert!(err.is_invalid_shape());
    }

    #[test]
    fn test_decode_invalid_json() {
        let err = decode_string_list("selection", "definitely not json").unwrap_err();
        assert!(err.is_extraction());
        assert!(err.to_string().contains("Invalid JSON response from LLM"));
    }

    #[test]
    fn test_decode_empty_carries_stage() {
        let err = decode_object("codebase analysis", "").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Empty response from LLM during codebase analysis"
        );
    }

    #[test]
    fn test_decode_object_and_array() {
        let map = decode_object("analysis", "{\"api_endpoints\": []}").unwrap();
        assert!(map.contains_key("api_endpoints"));
        assert!(decode_object("analysis", "[]").unwrap_err().is_invalid_shape());

        let tools = decode_object_array("tools", "[{\"name\": \"x\"}]").unwrap();
        assert_eq!(tools.len(), 1);
        assert!(
            decode_object_array("tools", "[\"x\"]")
                .unwrap_err()
                .is_invalid_shape()
        );
    }

    #[test]
    fn test_dockerfile_plain_instructions() {
        let out = extract_dockerfile("FROM node:18-alpine\nWORKDIR /app\n");
        assert_eq!(
            out,
            DockerfileExtraction::Instructions("FROM node:18-alpine\nWORKDIR /app".to_string())
        );
    }

    #[test]
    fn test_dockerfile_strips_prose_and_fences() {
        let text = "Here is a Dockerfile for your project:\n\
                    ```dockerfile\n\
                    FROM python:3.11-slim\n\
                    # install deps\n\
                    RUN pip install -r requirements.txt\n\
                    \n\
                    CMD [\"python\", \"main.py\"]\n\
                    ```\n\
                    To build the image, run docker build.";
        let out = extract_dockerfile(text);
        assert_eq!(
            out.text(),
            Some(
                "FROM python:3.11-slim\n# install deps\nRUN pip install -r requirements.txt\n\nCMD [\"python\", \"main.py\"]"
            )
        );
    }

    #[test]
    fn test_dockerfile_indented_block_is_dedented() {
        let text = "Dockerfile:\n    FROM x\n    RUN y\n";
        assert_eq!(
            extract_dockerfile(text),
            DockerfileExtraction::Instructions("FROM x\nRUN y".to_string())
        );

        let text = "  FROM x\n\n      RUN y";
        assert_eq!(extract_dockerfile(text).text(), Some("FROM x\n\n    RUN y"));
    }

    #[test]
    fn test_dockerfile_comment_with_trailing_phrase_is_kept() {
        let text = "FROM alpine\n# note: pinned on purpose\nRUN apk add curl";
        assert_eq!(
            extract_dockerfile(text).text(),
            Some("FROM alpine\n# note: pinned on purpose\nRUN apk add curl")
        );
    }

    #[test]
    fn test_dockerfile_fenced_fallback() {
        // Lowercase instructions never start a capture.
        let text = "Result:\n```docker\nfrom alpine\nrun echo hi\n```\n";
        assert_eq!(
            extract_dockerfile(text),
            DockerfileExtraction::FencedBlock("from alpine\nrun echo hi".to_string())
        );
    }

    #[test]
    fn test_dockerfile_from_span_fallback() {
        let text = "Use: FROM rust:1.70 then build\nmore\n\nunrelated";
        assert_eq!(
            extract_dockerfile(text),
            DockerfileExtraction::FromSpan("FROM rust:1.70 then build\nmore".to_string())
        );
    }

    #[test]
    fn test_dockerfile_nothing_found() {
        assert_eq!(extract_dockerfile(""), DockerfileExtraction::Empty);
        assert_eq!(extract_dockerfile("I cannot help."), DockerfileExtraction::Empty);
    }

    fn arb_json() -> impl Strategy<Value = serde_json::Value> {
        let leaf = prop_oneof![
            Just(serde_json::Value::Null),
            any::<bool>().prop_map(serde_json::Value::from),
            any::<i32>().prop_map(serde_json::Value::from),
            "[a-z {}\\[\\]`\"\\\\\n]{0,8}".prop_map(serde_json::Value::from),
            Just(serde_json::Value::from("run ```json\n{}\n``` to see")),
        ];
        leaf.prop_recursive(3, 24, 4, containers)
    }

    fn containers(
        inner: BoxedStrategy<serde_json::Value>,
    ) -> impl Strategy<Value = serde_json::Value> {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(serde_json::Value::Array),
            prop::collection::btree_map("[a-z]{1,5}", inner, 0..4)
                .prop_map(|m| serde_json::Value::Object(m.into_iter().collect())),
        ]
    }

    proptest! {
        #[test]
        fn test_extract_json_idempotent(value in arb_json(), pretty in any::<bool>()) {
            let text = if pretty {
                serde_json::to_string_pretty(&value).unwrap()
            } else {
                serde_json::to_string(&value).unwrap()
            };
            let padded = format!("\n  {text}\n");
            let out = extract_json(&padded).unwrap();
            prop_assert_eq!(out.text(), text.trim());
        }
    }
}
