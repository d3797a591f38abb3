use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::digest::Digest;
use crate::error::TypeError;
use crate::temporal::Timestamp;

/// Application-supplied context attached to an event.
///
/// A `BTreeMap` so iteration is always in key order; insertion order never
/// reaches the digest.
pub type Fields = BTreeMap<String, serde_json::Value>;

/// Globally unique event identifier (UUID v7, time-ordered).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(uuid::Uuid);

impl EventId {
    /// Generate a fresh identifier.
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7())
    }

    pub fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }

    /// First 8 characters of the hyphenated form.
    pub fn short_id(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventId({})", self.short_id())
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Classification of the fact being recorded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Login, logout, token issuance.
    Authentication,
    /// Permission checks and access decisions.
    Authorization,
    /// Reads of protected data.
    DataAccess,
    /// Creates, updates and deletes of protected data.
    DataModification,
    /// Configuration changes.
    Configuration,
    /// Key creation, rotation and revocation.
    KeyManagement,
    /// Secret rotation runs.
    SecretRotation,
    /// Workflow lifecycle steps.
    Workflow,
    /// Startup, shutdown and internal faults.
    System,
    /// Suspicious activity and policy violations.
    Security,
}

impl EventType {
    pub const ALL: [Self; 10] = [
        Self::Authentication,
        Self::Authorization,
        Self::DataAccess,
        Self::DataModification,
        Self::Configuration,
        Self::KeyManagement,
        Self::SecretRotation,
        Self::Workflow,
        Self::System,
        Self::Security,
    ];

    /// Stable wire name, used by the canonical form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authentication => "authentication",
            Self::Authorization => "authorization",
            Self::DataAccess => "data_access",
            Self::DataModification => "data_modification",
            Self::Configuration => "configuration",
            Self::KeyManagement => "key_management",
            Self::SecretRotation => "secret_rotation",
            Self::Workflow => "workflow",
            Self::System => "system",
            Self::Security => "security",
        }
    }
}

impl FromStr for EventType {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| TypeError::UnknownVariant {
                kind: "event type",
                value: s.to_string(),
            })
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of an event. Ordered from `Info` (lowest) to `Critical`.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Self; 5] = [
        Self::Info,
        Self::Low,
        Self::Medium,
        Self::High,
        Self::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Returns `true` if this severity is at or above `threshold`.
    pub fn meets_threshold(&self, threshold: Self) -> bool {
        *self >= threshold
    }
}

impl FromStr for Severity {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| TypeError::UnknownVariant {
                kind: "severity",
                value: s.to_string(),
            })
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorKind {
    #[default]
    User,
    Service,
    System,
}

impl ActorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Service => "service",
            Self::System => "system",
        }
    }
}

/// Who performed the action.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    #[serde(default)]
    pub kind: ActorKind,
    pub id: String,
}

impl Actor {
    pub fn user(id: impl Into<String>) -> Self {
        Self {
            kind: ActorKind::User,
            id: id.into(),
        }
    }

    pub fn service(id: impl Into<String>) -> Self {
        Self {
            kind: ActorKind::Service,
            id: id.into(),
        }
    }

    pub fn system(id: impl Into<String>) -> Self {
        Self {
            kind: ActorKind::System,
            id: id.into(),
        }
    }
}

/// Where the action came from.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Origin {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

/// What the action was performed on.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resource {
    pub resource_type: String,
    pub resource_id: String,
}

impl Resource {
    pub fn new(resource_type: impl Into<String>, resource_id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
        }
    }
}

/// The fields a collaborator supplies when recording an event.
///
/// Identity, time, chain linkage and signature are assigned by the ledger.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventDraft {
    pub event_type: EventType,
    #[serde(default)]
    pub severity: Severity,
    pub actor: Actor,
    #[serde(default)]
    pub origin: Origin,
    pub resource: Resource,
    pub action: String,
    #[serde(default)]
    pub details: Fields,
    #[serde(default)]
    pub metadata: Fields,
}

impl EventDraft {
    pub fn new(
        event_type: EventType,
        severity: Severity,
        actor: Actor,
        resource: Resource,
        action: impl Into<String>,
    ) -> Self {
        Self {
            event_type,
            severity,
            actor,
            origin: Origin::default(),
            resource,
            action: action.into(),
            details: Fields::new(),
            metadata: Fields::new(),
        }
    }

    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Detached Ed25519 signature bytes as stored on an event.
///
/// Kept as plain bytes so the event model does not depend on a signature
/// implementation; `tel-crypto` converts to and from its `Signature`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SignatureBytes(pub [u8; 64]);

impl SignatureBytes {
    /// All-zero bytes. Never a valid signature.
    pub const fn empty() -> Self {
        Self([0u8; 64])
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        let arr: [u8; 64] = bytes.try_into().map_err(|b: Vec<u8>| TypeError::InvalidLength {
            expected: 64,
            actual: b.len(),
        })?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for SignatureBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SignatureBytes({}...)", hex::encode(&self.0[..8]))
    }
}

impl Serialize for SignatureBytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for SignatureBytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// One immutable audit fact.
///
/// `current_digest` covers every field above it plus `previous_digest`;
/// `signature` is over `current_digest`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: EventId,
    pub timestamp: Timestamp,
    pub event_type: EventType,
    pub severity: Severity,
    pub actor: Actor,
    pub origin: Origin,
    pub resource: Resource,
    pub action: String,
    pub details: Fields,
    pub metadata: Fields,
    pub previous_digest: Digest,
    pub current_digest: Digest,
    pub signature: SignatureBytes,
}

impl AuditEvent {
    /// Materialize a draft with its identity and capture time.
    ///
    /// Chain fields are zeroed until [`AuditEvent::seal`]; only the ledger's
    /// append path should hold an unsealed event.
    pub fn unsealed(event_id: EventId, timestamp: Timestamp, draft: EventDraft) -> Self {
        Self {
            event_id,
            timestamp,
            event_type: draft.event_type,
            severity: draft.severity,
            actor: draft.actor,
            origin: draft.origin,
            resource: draft.resource,
            action: draft.action,
            details: draft.details,
            metadata: draft.metadata,
            previous_digest: Digest::zero(),
            current_digest: Digest::zero(),
            signature: SignatureBytes::empty(),
        }
    }

    /// Attach chain linkage and signature.
    pub fn seal(mut self, previous: Digest, current: Digest, signature: SignatureBytes) -> Self {
        self.previous_digest = previous;
        self.current_digest = current;
        self.signature = signature;
        self
    }

    /// The caller-supplied portion of this event.
    pub fn to_draft(&self) -> EventDraft {
        EventDraft {
            event_type: self.event_type,
            severity: self.severity,
            actor: self.actor.clone(),
            origin: self.origin.clone(),
            resource: self.resource.clone(),
            action: self.action.clone(),
            details: self.details.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn draft() -> EventDraft {
        EventDraft::new(
            EventType::DataAccess,
            Severity::Low,
            Actor::user("alice"),
            Resource::new("document", "doc-1"),
            "read",
        )
        .with_detail("bytes", 512)
        .with_metadata("tenant", "acme")
    }

    #[test]
    fn event_type_names_roundtrip() {
        for t in EventType::ALL {
            assert_eq!(t.as_str().parse::<EventType>().unwrap(), t);
            let json = serde_json::to_string(&t).unwrap();
            assert_eq!(json, format!("\"{}\"", t.as_str()));
        }
    }

    #[test]
    fn unknown_event_type_is_rejected() {
        let err = "teleport".parse::<EventType>().unwrap_err();
        assert!(matches!(err, TypeError::UnknownVariant { kind: "event type", .. }));
    }

    #[test]
    fn severity_is_ordered() {
        assert!(Severity::Info < Severity::Critical);
        assert!(Severity::High.meets_threshold(Severity::Medium));
        assert!(!Severity::Low.meets_threshold(Severity::Medium));
        assert_eq!("critical".parse::<Severity>().unwrap(), Severity::Critical);
    }

    #[test]
    fn draft_deserializes_with_defaults() {
        let value = json!({
            "event_type": "authentication",
            "actor": { "id": "svc-login", "kind": "service" },
            "resource": { "resource_type": "session", "resource_id": "s-9" },
            "action": "login"
        });
        let parsed: EventDraft = serde_json::from_value(value).unwrap();
        assert_eq!(parsed.severity, Severity::Info);
        assert_eq!(parsed.actor.kind, ActorKind::Service);
        assert!(parsed.details.is_empty());
        assert_eq!(parsed.origin, Origin::default());
    }

    #[test]
    fn unsealed_then_sealed_preserves_fields() {
        let d = draft();
        let id = EventId::new();
        let event = AuditEvent::unsealed(id, Timestamp(10), d.clone());
        assert!(event.current_digest.is_zero());
        assert_eq!(event.to_draft(), d);

        let sealed = event.seal(Digest::zero(), Digest::of(b"x"), SignatureBytes([7; 64]));
        assert_eq!(sealed.current_digest, Digest::of(b"x"));
        assert_eq!(sealed.event_id, id);
    }

    #[test]
    fn signature_bytes_hex_roundtrip() {
        let sig = SignatureBytes([0xab; 64]);
        let json = serde_json::to_string(&sig).unwrap();
        let parsed: SignatureBytes = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, sig);
        assert!(SignatureBytes::from_hex("00").is_err());
    }

    #[test]
    fn event_ids_are_unique() {
        assert_ne!(EventId::new(), EventId::new());
    }
}
