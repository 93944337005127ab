use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;
use sha2::{Digest, Sha256};

use sentry_core::IssueLevel;

const FINGERPRINT_HEX_LEN: usize = 16;
const DEFAULT_FINGERPRINT_TOKEN: &str = "{{ default }}";
const MAX_NORMALIZED_LEN: usize = 500;
const MAX_TITLE_VALUE_LEN: usize = 97;
const MAX_TITLE_MESSAGE_LEN: usize = 125;
const MAX_METADATA_VALUE_LEN: usize = 200;

/// Output of grouping one event: the stable key plus the display fields derived
/// alongside it (§4.2).
#[derive(Debug, Clone)]
pub struct Derived {
    pub fingerprint: String,
    pub title: String,
    pub culprit: Option<String>,
    pub level: IssueLevel,
    pub platform: String,
    pub metadata: Value,
}

#[derive(Debug, Clone, Default)]
struct Frame {
    filename: Option<String>,
    function: Option<String>,
    lineno: Option<i64>,
    in_app: bool,
}

/// Computes the fingerprint and derived display fields for one normalized event
/// payload, in priority order (§4.2).
pub fn derive(event: &Value, event_id: &str) -> Derived {
    let level = event
        .get("level")
        .and_then(Value::as_str)
        .and_then(IssueLevel::parse)
        .unwrap_or_default();
    let platform = event
        .get("platform")
        .and_then(Value::as_str)
        .unwrap_or("other")
        .to_string();

    if let Some(fingerprint) = explicit_fingerprint(event) {
        let (title, metadata) = message_title(event);
        // Culprit derivation doesn't depend on which tier matched the
        // fingerprint (§4.2): an explicitly-fingerprinted event with an
        // exception and frames still gets a frame-derived culprit.
        let frames = primary_exception(event)
            .map(|(_, _, frames)| top_in_app_frames(&frames, 3))
            .unwrap_or_default();
        return Derived {
            fingerprint,
            title,
            culprit: culprit(event, &frames),
            level,
            platform,
            metadata,
        };
    }

    if let Some((exc_type, exc_value, frames)) = primary_exception(event) {
        let normalized = normalize_message(&exc_value);
        let top_frames = top_in_app_frames(&frames, 3);
        let formatted_frames: Vec<String> =
            top_frames.iter().map(|f| format_frame(f)).collect();

        let mut parts = vec![exc_type.clone(), normalized];
        for i in 0..3 {
            parts.push(formatted_frames.get(i).cloned().unwrap_or_default());
        }
        let fingerprint = hash_parts(&parts);

        let title = format!("{exc_type}: {}", truncate(&exc_value, MAX_TITLE_VALUE_LEN));
        let top = top_frames.first();
        let metadata = serde_json::json!({
            "type": exc_type,
            "value": truncate(&exc_value, MAX_METADATA_VALUE_LEN),
            "filename": top.and_then(|f| f.filename.clone()),
            "function": top.and_then(|f| f.function.clone()),
        });

        return Derived {
            fingerprint,
            title,
            culprit: culprit(event, &top_frames),
            level,
            platform,
            metadata,
        };
    }

    if let Some(message) = event_message(event) {
        let normalized = normalize_message(&message);
        let fingerprint = hash_parts(&[level.as_str().to_string(), normalized]);
        let title = truncate(&message, MAX_TITLE_MESSAGE_LEN);
        let metadata = serde_json::json!({
            "type": Value::Null,
            "value": truncate(&message, MAX_METADATA_VALUE_LEN),
        });
        return Derived {
            fingerprint,
            title,
            culprit: culprit(event, &[]),
            level,
            platform,
            metadata,
        };
    }

    Derived {
        fingerprint: hash_parts(&[event_id.to_string()]),
        title: "Unknown Error".to_string(),
        culprit: culprit(event, &[]),
        level,
        platform,
        metadata: serde_json::json!({ "type": Value::Null, "value": Value::Null }),
    }
}

fn explicit_fingerprint(event: &Value) -> Option<String> {
    let tokens: Vec<String> = event
        .get("fingerprint")
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    if tokens.is_empty() {
        return None;
    }
    if tokens.iter().all(|t| t == DEFAULT_FINGERPRINT_TOKEN) {
        return None;
    }

    Some(hash_parts(&[tokens.join("||")]))
}

fn primary_exception(event: &Value) -> Option<(String, String, Vec<Frame>)> {
    let values = event.get("exception")?.get("values")?.as_array()?;
    let exc = values.first()?;

    let exc_type = exc
        .get("type")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or("Error")
        .to_string();
    let exc_value = exc
        .get("value")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    let frames = exc
        .get("stacktrace")
        .and_then(|s| s.get("frames"))
        .and_then(Value::as_array)
        .map(|frames| frames.iter().map(parse_frame).collect())
        .unwrap_or_default();

    Some((exc_type, exc_value, frames))
}

fn parse_frame(value: &Value) -> Frame {
    Frame {
        filename: value
            .get("filename")
            .and_then(Value::as_str)
            .map(strip_query_and_fragment),
        function: value
            .get("function")
            .and_then(Value::as_str)
            .map(str::to_string),
        lineno: value.get("lineno").and_then(Value::as_i64),
        in_app: value.get("in_app").and_then(Value::as_bool).unwrap_or(false),
    }
}

fn strip_query_and_fragment(filename: &str) -> String {
    let without_fragment = filename.split('#').next().unwrap_or(filename);
    without_fragment.split('?').next().unwrap_or(without_fragment).to_string()
}

/// SDKs emit frames oldest-first; the spec wants the top (most recent) frames,
/// so the list is reversed before taking the first N. Falls back to any frame if
/// none are flagged `in_app`.
fn top_in_app_frames(frames: &[Frame], limit: usize) -> Vec<Frame> {
    let mut reversed: Vec<Frame> = frames.iter().rev().cloned().collect();
    let mut in_app: Vec<Frame> = reversed.iter().filter(|f| f.in_app).cloned().collect();
    if in_app.is_empty() {
        std::mem::swap(&mut in_app, &mut reversed);
    }
    in_app.truncate(limit);
    in_app
}

fn format_frame(frame: &Frame) -> String {
    let mut parts = Vec::new();
    if let Some(filename) = &frame.filename {
        parts.push(filename.clone());
    }
    if let Some(function) = &frame.function {
        parts.push(function.clone());
    }
    if let Some(lineno) = frame.lineno {
        parts.push(lineno.to_string());
    }
    parts.join(":")
}

fn culprit(event: &Value, top_frames: &[Frame]) -> Option<String> {
    if let Some(transaction) = event.get("transaction").and_then(Value::as_str) {
        if !transaction.is_empty() {
            return Some(transaction.to_string());
        }
    }

    let frame = top_frames.first()?;
    match (&frame.filename, &frame.function, frame.lineno) {
        (Some(filename), Some(function), Some(lineno)) => {
            Some(format!("{filename} in {function} at line {lineno}"))
        }
        (Some(filename), Some(function), None) => Some(format!("{filename} in {function}")),
        (Some(filename), None, _) => Some(filename.clone()),
        (None, Some(function), _) => Some(function.clone()),
        (None, None, _) => None,
    }
}

fn event_message(event: &Value) -> Option<String> {
    match event.get("message") {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Object(map)) => map
            .get("formatted")
            .or_else(|| map.get("message"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        _ => None,
    }
}

fn message_title(event: &Value) -> (String, Value) {
    if let Some((exc_type, exc_value, _)) = primary_exception(event) {
        let title = format!("{exc_type}: {}", truncate(&exc_value, MAX_TITLE_VALUE_LEN));
        let metadata = serde_json::json!({
            "type": exc_type,
            "value": truncate(&exc_value, MAX_METADATA_VALUE_LEN),
        });
        return (title, metadata);
    }
    if let Some(message) = event_message(event) {
        let title = truncate(&message, MAX_TITLE_MESSAGE_LEN);
        let metadata = serde_json::json!({ "type": Value::Null, "value": truncate(&message, MAX_METADATA_VALUE_LEN) });
        return (title, metadata);
    }
    (
        "Unknown Error".to_string(),
        serde_json::json!({ "type": Value::Null, "value": Value::Null }),
    )
}

fn truncate(value: &str, max_chars: usize) -> String {
    let char_count = value.chars().count();
    if char_count <= max_chars {
        return value.to_string();
    }
    let truncated: String = value.chars().take(max_chars).collect();
    format!("{truncated}...")
}

fn hash_parts(parts: &[String]) -> String {
    let joined = parts.join("||");
    let digest = Sha256::digest(joined.as_bytes());
    hex::encode(digest)[..FINGERPRINT_HEX_LEN].to_string()
}

/// Normalizes a message for grouping: replaces volatile substrings with stable
/// placeholders, in the fixed order required for determinism (§4.2).
pub fn normalize_message(message: &str) -> String {
    let mut text = message.to_string();
    text = uuid_regex().replace_all(&text, "<uuid>").into_owned();
    text = hex_run_regex().replace_all(&text, "<id>").into_owned();
    text = decimal_run_regex().replace_all(&text, "<num>").into_owned();
    text = timestamp_regex().replace_all(&text, "<timestamp>").into_owned();
    text = ipv4_regex().replace_all(&text, "<ip>").into_owned();
    text = email_regex().replace_all(&text, "<email>").into_owned();
    text = whitespace_regex().replace_all(&text, " ").into_owned();
    truncate(text.trim(), MAX_NORMALIZED_LEN)
}

fn uuid_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}\b").unwrap()
    })
}

fn hex_run_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b[0-9a-f]{24,}\b").unwrap())
}

fn decimal_run_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\d{6,}\b").unwrap())
}

fn timestamp_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(\.\d+)?(Z|[+-]\d{2}:?\d{2})?\b")
            .unwrap()
    })
}

fn ipv4_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}\b").unwrap())
}

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b[\w.+-]+@[\w-]+\.[a-z]{2,}\b").unwrap())
}

fn whitespace_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalizes_uuid_hex_num_ip_email_and_collapses_whitespace() {
        let input = "User 123e4567-e89b-12d3-a456-426614174000   failed at  10.0.0.1 for a@b.com, code 1234567";
        let normalized = normalize_message(input);
        assert_eq!(
            normalized,
            "User <uuid> failed at <ip> for <email>, code <num>"
        );
    }

    #[test]
    fn hex_run_needs_at_least_24_chars() {
        assert_eq!(normalize_message("id deadbeefdeadbeefdead"), "id deadbeefdeadbeefdead");
        assert_eq!(
            normalize_message("id deadbeefdeadbeefdeadbeefdead"),
            "id <id>"
        );
    }

    #[test]
    fn explicit_fingerprint_wins_over_exception() {
        let event = json!({
            "fingerprint": ["custom-group"],
            "exception": {"values": [{"type": "Err", "value": "boom"}]},
        });
        let a = derive(&event, "e1");
        let b = derive(&event, "e2");
        assert_eq!(a.fingerprint, b.fingerprint);

        let other = json!({
            "fingerprint": ["other-group"],
            "exception": {"values": [{"type": "Err", "value": "boom"}]},
        });
        assert_ne!(a.fingerprint, derive(&other, "e3").fingerprint);
    }

    #[test]
    fn explicit_fingerprint_still_derives_culprit_from_frames() {
        let event = json!({
            "fingerprint": ["custom-group"],
            "exception": {"values": [{
                "type": "Err",
                "value": "boom",
                "stacktrace": {"frames": [
                    {"filename": "app.js", "function": "top", "lineno": 9, "in_app": true}
                ]}
            }]},
        });
        let derived = derive(&event, "e1");
        assert_eq!(derived.culprit, Some("app.js in top at line 9".to_string()));
    }

    #[test]
    fn default_only_fingerprint_token_is_ignored() {
        let event = json!({
            "fingerprint": ["{{ default }}"],
            "exception": {"values": [{"type": "TypeError", "value": "boom"}]},
        });
        let derived = derive(&event, "e1");
        assert_eq!(derived.title, "TypeError: boom");
    }

    #[test]
    fn exception_grouping_ignores_ids_in_message() {
        let make = |uuid: &str| {
            json!({
                "exception": {"values": [{
                    "type": "TypeError",
                    "value": format!("Request {uuid} failed"),
                    "stacktrace": {"frames": [
                        {"filename": "app.js", "function": "handleClick", "lineno": 42, "in_app": true}
                    ]}
                }]}
            })
        };
        let a = derive(&make("abc12345-1234-1234-1234-1234567890ab"), "e1");
        let b = derive(&make("def67890-4321-4321-4321-0987654321fe"), "e2");
        assert_eq!(a.fingerprint, b.fingerprint);
    }

    #[test]
    fn frames_are_reversed_and_top_in_app_preferred() {
        let event = json!({
            "exception": {"values": [{
                "type": "Err",
                "value": "boom",
                "stacktrace": {"frames": [
                    {"filename": "vendor.js", "function": "lib", "lineno": 1, "in_app": false},
                    {"filename": "app.js", "function": "top", "lineno": 9, "in_app": true}
                ]}
            }]}
        });
        let derived = derive(&event, "e1");
        assert_eq!(derived.culprit, Some("app.js in top at line 9".to_string()));
    }

    #[test]
    fn message_only_event_groups_by_level_and_message() {
        let event = json!({"level": "warning", "message": "disk almost full"});
        let derived = derive(&event, "e1");
        assert_eq!(derived.title, "disk almost full");
        assert_eq!(derived.level, IssueLevel::Warning);
    }

    #[test]
    fn fallback_uses_event_id_so_each_event_gets_its_own_issue() {
        let event = json!({});
        let a = derive(&event, "same-id");
        let b = derive(&event, "same-id");
        let c = derive(&event, "different-id");
        assert_eq!(a.fingerprint, b.fingerprint);
        assert_ne!(a.fingerprint, c.fingerprint);
        assert_eq!(a.title, "Unknown Error");
    }

    #[test]
    fn title_truncates_long_exception_value() {
        let long_value = "x".repeat(200);
        let event = json!({"exception": {"values": [{"type": "Err", "value": long_value}]}});
        let derived = derive(&event, "e1");
        assert!(derived.title.ends_with("..."));
    }
}
