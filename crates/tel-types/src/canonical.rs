//! Canonical byte form of an audit event.
//!
//! This encoding is the wire contract between implementations: two ledgers
//! that agree on it compute bit-identical digests for the same event.
//!
//! ```text
//! str("tel-event-v1")
//! str(event_id)            36-char hyphenated lowercase UUID
//! u64(timestamp)           big-endian milliseconds
//! str(event_type) str(severity)
//! str(actor.kind) str(actor.id)
//! opt(origin.session_id) opt(origin.ip_address) opt(origin.user_agent)
//! str(resource_type) str(resource_id) str(action)
//! map(details) map(metadata)
//!
//! str(s)  = u32 BE byte length, UTF-8 bytes
//! opt(s)  = 0x00 | 0x01 str(s)
//! map(m)  = u32 BE count, then per key in byte order: str(key) str(canonical_json(value))
//! ```
//!
//! Canonical JSON sorts object keys byte-wise at every depth, has no
//! insignificant whitespace, and admits only integral numbers.

use serde_json::Value;

use crate::error::TypeError;
use crate::event::{AuditEvent, Fields};

/// Format tag leading every canonical event encoding.
pub const EVENT_FORMAT_TAG: &str = "tel-event-v1";

/// Longest permitted `details`/`metadata` key, in bytes.
pub const MAX_KEY_LEN: usize = 256;

/// Deepest permitted nesting of a JSON value.
pub const MAX_JSON_DEPTH: usize = 32;

/// Append-only builder for canonical encodings.
#[derive(Debug, Default)]
pub struct CanonicalEncoder {
    buf: Vec<u8>,
}

impl CanonicalEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_str(&mut self, s: &str) -> &mut Self {
        self.buf.extend_from_slice(&(s.len() as u32).to_be_bytes());
        self.buf.extend_from_slice(s.as_bytes());
        self
    }

    /// Like [`put_str`](Self::put_str) but rejects the empty string.
    pub fn put_required(&mut self, field: &str, s: &str) -> Result<&mut Self, TypeError> {
        if s.is_empty() {
            return Err(TypeError::Canonicalization {
                field: field.to_string(),
                reason: "must not be empty".into(),
            });
        }
        Ok(self.put_str(s))
    }

    pub fn put_u64(&mut self, value: u64) -> &mut Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn put_opt_str(&mut self, value: Option<&str>) -> &mut Self {
        match value {
            None => self.buf.push(0x00),
            Some(s) => {
                self.buf.push(0x01);
                self.put_str(s);
            }
        }
        self
    }

    pub fn put_fields(&mut self, field: &str, fields: &Fields) -> Result<&mut Self, TypeError> {
        self.buf
            .extend_from_slice(&(fields.len() as u32).to_be_bytes());
        // BTreeMap<String, _> iterates in byte-wise key order.
        for (key, value) in fields {
            if key.is_empty() || key.len() > MAX_KEY_LEN {
                return Err(TypeError::Canonicalization {
                    field: format!("{field}.{key}"),
                    reason: format!("key length must be 1..={MAX_KEY_LEN} bytes"),
                });
            }
            let mut json = String::new();
            write_canonical_json(&mut json, value, 0, &format!("{field}.{key}"))?;
            self.put_str(key);
            self.put_str(&json);
        }
        Ok(self)
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Encode everything an event's digest covers except `previous_digest`.
pub fn canonical_event_bytes(event: &AuditEvent) -> Result<Vec<u8>, TypeError> {
    let mut enc = CanonicalEncoder::new();
    enc.put_str(EVENT_FORMAT_TAG)
        .put_str(&event.event_id.as_uuid().hyphenated().to_string())
        .put_u64(event.timestamp.as_millis())
        .put_str(event.event_type.as_str())
        .put_str(event.severity.as_str())
        .put_str(event.actor.kind.as_str());
    enc.put_required("actor.id", &event.actor.id)?;
    enc.put_opt_str(event.origin.session_id.as_deref())
        .put_opt_str(event.origin.ip_address.as_deref())
        .put_opt_str(event.origin.user_agent.as_deref());
    enc.put_required("resource.resource_type", &event.resource.resource_type)?
        .put_required("resource.resource_id", &event.resource.resource_id)?
        .put_required("action", &event.action)?;
    enc.put_fields("details", &event.details)?
        .put_fields("metadata", &event.metadata)?;
    Ok(enc.finish())
}

/// Render `value` as canonical JSON into `out`.
pub fn write_canonical_json(
    out: &mut String,
    value: &Value,
    depth: usize,
    path: &str,
) -> Result<(), TypeError> {
    if depth > MAX_JSON_DEPTH {
        return Err(TypeError::Canonicalization {
            field: path.to_string(),
            reason: format!("nesting deeper than {MAX_JSON_DEPTH}"),
        });
    }
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                out.push_str(&i.to_string());
            } else if let Some(u) = n.as_u64() {
                out.push_str(&u.to_string());
            } else {
                return Err(TypeError::Canonicalization {
                    field: path.to_string(),
                    reason: format!("non-integral number {n}"),
                });
            }
        }
        Value::String(s) => push_json_string(out, s, path)?,
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical_json(out, item, depth + 1, path)?;
            }
            out.push(']');
        }
        Value::Object(map) => {
            // Sort explicitly: serde_json's map order depends on crate features.
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                push_json_string(out, key, path)?;
                out.push(':');
                write_canonical_json(out, item, depth + 1, path)?;
            }
            out.push('}');
        }
    }
    Ok(())
}

fn push_json_string(out: &mut String, s: &str, path: &str) -> Result<(), TypeError> {
    let quoted = serde_json::to_string(s).map_err(|e| TypeError::Canonicalization {
        field: path.to_string(),
        reason: e.to_string(),
    })?;
    out.push_str(&quoted);
    Ok(())
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;
    use crate::event::{Actor, EventDraft, EventId, EventType, Origin, Resource, Severity};
    use crate::temporal::Timestamp;

    fn event_with(details: Fields) -> AuditEvent {
        let id = EventId::from_uuid(uuid::Uuid::from_u128(0x0190_0000_0000_7000_8000_0000_0000_0001));
        let mut draft = EventDraft::new(
            EventType::Configuration,
            Severity::Medium,
            Actor::service("deployer"),
            Resource::new("config", "feature-flags"),
            "update",
        );
        draft.details = details;
        AuditEvent::unsealed(id, Timestamp(1_700_000_000_000), draft)
    }

    fn canonical(value: &Value) -> String {
        let mut s = String::new();
        write_canonical_json(&mut s, value, 0, "test").unwrap();
        s
    }

    #[test]
    fn detail_insertion_order_does_not_matter() {
        let mut a = Fields::new();
        a.insert("a".into(), json!(1));
        a.insert("b".into(), json!(2));
        let mut b = Fields::new();
        b.insert("b".into(), json!(2));
        b.insert("a".into(), json!(1));

        let ea = canonical_event_bytes(&event_with(a)).unwrap();
        let eb = canonical_event_bytes(&event_with(b)).unwrap();
        assert_eq!(ea, eb);
    }

    #[test]
    fn nested_objects_are_key_sorted() {
        let v: Value = serde_json::from_str(r#"{"z":{"y":1,"x":[true,null]},"a":"s"}"#).unwrap();
        assert_eq!(canonical(&v), r#"{"a":"s","z":{"x":[true,null],"y":1}}"#);
    }

    #[test]
    fn strings_are_json_escaped() {
        assert_eq!(canonical(&json!("a\"b\n")), r#""a\"b\n""#);
    }

    #[test]
    fn floats_are_rejected() {
        let mut details = Fields::new();
        details.insert("ratio".into(), json!(0.5));
        let err = canonical_event_bytes(&event_with(details)).unwrap_err();
        assert!(matches!(err, TypeError::Canonicalization { ref field, .. } if field == "details.ratio"));
    }

    #[test]
    fn large_unsigned_integers_are_accepted() {
        assert_eq!(canonical(&json!(u64::MAX)), u64::MAX.to_string());
        assert_eq!(canonical(&json!(-3)), "-3");
    }

    #[test]
    fn empty_and_oversized_keys_are_rejected() {
        let mut details = Fields::new();
        details.insert(String::new(), json!(1));
        assert!(canonical_event_bytes(&event_with(details)).is_err());

        let mut details = Fields::new();
        details.insert("k".repeat(MAX_KEY_LEN + 1), json!(1));
        assert!(canonical_event_bytes(&event_with(details)).is_err());
    }

    #[test]
    fn deep_nesting_is_rejected() {
        let mut v = json!(1);
        for _ in 0..=MAX_JSON_DEPTH {
            v = json!([v]);
        }
        let mut s = String::new();
        assert!(write_canonical_json(&mut s, &v, 0, "deep").is_err());
    }

    #[test]
    fn empty_required_fields_are_rejected() {
        let mut event = event_with(Fields::new());
        event.action.clear();
        let err = canonical_event_bytes(&event).unwrap_err();
        assert!(matches!(err, TypeError::Canonicalization { ref field, .. } if field == "action"));
    }

    #[test]
    fn absent_and_empty_origin_fields_differ() {
        let mut with_empty = event_with(Fields::new());
        with_empty.origin = Origin {
            session_id: Some(String::new()),
            ..Origin::default()
        };
        let absent = event_with(Fields::new());
        assert_ne!(
            canonical_event_bytes(&with_empty).unwrap(),
            canonical_event_bytes(&absent).unwrap()
        );
    }

    #[test]
    fn chain_fields_are_not_encoded() {
        let event = event_with(Fields::new());
        let before = canonical_event_bytes(&event).unwrap();
        let sealed = event.seal(
            crate::Digest::of(b"prev"),
            crate::Digest::of(b"cur"),
            crate::SignatureBytes([1; 64]),
        );
        assert_eq!(canonical_event_bytes(&sealed).unwrap(), before);
    }

    #[test]
    fn encoding_starts_with_format_tag() {
        let bytes = canonical_event_bytes(&event_with(Fields::new())).unwrap();
        assert_eq!(&bytes[..4], &(EVENT_FORMAT_TAG.len() as u32).to_be_bytes());
        assert_eq!(&bytes[4..4 + EVENT_FORMAT_TAG.len()], EVENT_FORMAT_TAG.as_bytes());
    }

    proptest! {
        #[test]
        fn field_order_never_changes_encoding(
            map in proptest::collection::btree_map("[a-z]{1,8}", any::<i64>(), 0..16)
        ) {
            let pairs: Vec<(String, i64)> = map.into_iter().collect();
            let mut forward = Fields::new();
            for (k, v) in &pairs {
                forward.insert(k.clone(), json!(v));
            }
            let mut reverse = Fields::new();
            for (k, v) in pairs.iter().rev() {
                reverse.insert(k.clone(), json!(v));
            }
            prop_assert_eq!(
                canonical_event_bytes(&event_with(forward)).unwrap(),
                canonical_event_bytes(&event_with(reverse)).unwrap()
            );
        }
    }
}
