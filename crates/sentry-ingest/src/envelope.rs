use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("empty body")]
    EmptyBody,

    #[error("missing envelope header")]
    MissingHeader,

    #[error("envelope header is not a JSON object")]
    InvalidHeader,
}

/// The first line of an envelope: an arbitrary JSON object. `event_id` and
/// `sent_at`, if present, are informational only — the codec never trusts them
/// over what an individual item carries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvelopeHeader {
    pub raw: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnvelopeItem {
    pub item_type: String,
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub header: EnvelopeHeader,
    pub items: Vec<EnvelopeItem>,
}

impl Envelope {
    /// The event-shaped items a shard should ingest: `event` and `transaction`.
    /// Everything else (sessions, client reports, attachments, ...) is parsed but
    /// intentionally dropped — those item types are Non-goals (§1).
    pub fn event_items(&self) -> impl Iterator<Item = &Value> {
        self.items
            .iter()
            .filter(|item| item.item_type == "event" || item.item_type == "transaction")
            .map(|item| &item.payload)
    }
}

/// Parses the newline-delimited envelope grammar (§4.1). Lenient: a malformed
/// item header just advances past that line, and a payload line that isn't valid
/// JSON is kept as a raw JSON string rather than discarding the item.
pub fn parse_envelope(body: &str) -> Result<Envelope, EnvelopeError> {
    if body.trim().is_empty() {
        return Err(EnvelopeError::EmptyBody);
    }

    let mut lines = body.lines();
    let header_line = lines.next().ok_or(EnvelopeError::MissingHeader)?;
    let header_raw: Value =
        serde_json::from_str(header_line).map_err(|_| EnvelopeError::InvalidHeader)?;
    if !header_raw.is_object() {
        return Err(EnvelopeError::InvalidHeader);
    }

    let mut items = Vec::new();
    let remaining: Vec<&str> = lines.collect();
    let mut i = 0;
    while i < remaining.len() {
        let line = remaining[i];
        if line.trim().is_empty() {
            i += 1;
            continue;
        }

        let item_header: Value = match serde_json::from_str::<Value>(line) {
            Ok(value) if value.is_object() => value,
            _ => {
                tracing::warn!(line = line, "skipping malformed envelope item header");
                i += 1;
                continue;
            }
        };

        let item_type = item_header
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        let length = item_header.get("length").and_then(Value::as_u64);

        i += 1;
        let Some(payload_line) = remaining.get(i) else {
            // Header with no following payload line: stop, per §4.1 "only a
            // header-level failure aborts the whole envelope" — a dangling item
            // header is not a header-level failure, it simply ends parsing.
            break;
        };

        let payload_text: &str = match length {
            Some(len) => {
                let len = len as usize;
                if len <= payload_line.len() {
                    &payload_line[..len]
                } else {
                    payload_line
                }
            }
            None => payload_line,
        };

        let payload = serde_json::from_str(payload_text)
            .unwrap_or_else(|_| Value::String(payload_text.to_string()));

        items.push(EnvelopeItem { item_type, payload });
        i += 1;
    }

    Ok(Envelope {
        header: EnvelopeHeader { raw: header_raw },
        items,
    })
}

/// Accepts a bare JSON event (the legacy `/store/` contract): one JSON object,
/// no envelope wrapper.
pub fn parse_legacy_event(body: &str) -> Result<Value, EnvelopeError> {
    if body.trim().is_empty() {
        return Err(EnvelopeError::EmptyBody);
    }
    serde_json::from_str(body).map_err(|_| EnvelopeError::InvalidHeader)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_header_and_single_item() {
        let body = "{}\n{\"type\":\"event\"}\n{\"message\":\"hi\"}\n";
        let envelope = parse_envelope(body).unwrap();
        assert_eq!(envelope.items.len(), 1);
        assert_eq!(envelope.items[0].item_type, "event");
        assert_eq!(envelope.event_items().count(), 1);
    }

    #[test]
    fn tolerates_trailing_blank_lines() {
        let body = "{}\n{\"type\":\"event\"}\n{\"message\":\"hi\"}\n\n\n";
        let envelope = parse_envelope(body).unwrap();
        assert_eq!(envelope.items.len(), 1);
    }

    #[test]
    fn skips_malformed_item_header_without_discarding_envelope() {
        let body = "{}\nnot json\n{\"type\":\"event\"}\n{\"message\":\"ok\"}\n";
        let envelope = parse_envelope(body).unwrap();
        assert_eq!(envelope.items.len(), 1);
        assert_eq!(envelope.items[0].payload["message"], "ok");
    }

    #[test]
    fn drops_dangling_header_with_no_payload_line() {
        let body = "{}\n{\"type\":\"event\"}\n{\"message\":\"ok\"}\n{\"type\":\"event\"}";
        let envelope = parse_envelope(body).unwrap();
        assert_eq!(envelope.items.len(), 1);
    }

    #[test]
    fn respects_explicit_length_and_ignores_trailing_bytes() {
        let body = "{}\n{\"type\":\"event\",\"length\":13}\n{\"a\":1}trailing junk\n";
        let envelope = parse_envelope(body).unwrap();
        assert_eq!(envelope.items[0].payload["a"], 1);
    }

    #[test]
    fn unknown_item_types_are_kept_but_excluded_from_event_items() {
        let body = "{}\n{\"type\":\"session\"}\n{\"status\":\"ok\"}\n";
        let envelope = parse_envelope(body).unwrap();
        assert_eq!(envelope.items.len(), 1);
        assert_eq!(envelope.event_items().count(), 0);
    }

    #[test]
    fn empty_body_is_a_parse_failure() {
        assert_eq!(parse_envelope("   "), Err(EnvelopeError::EmptyBody));
    }

    #[test]
    fn legacy_single_json_event() {
        let value = parse_legacy_event("{\"message\":\"hi\"}").unwrap();
        assert_eq!(value["message"], "hi");
    }
}
