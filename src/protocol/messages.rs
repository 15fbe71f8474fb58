//! Protocol message definitions
//!
//! Inbound envelopes are classified into [`Inbound`] and known events are
//! decoded into the typed [`ServerEvent`] union. Outbound traffic is limited
//! to heartbeat [`ControlFrame`]s.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

// ─────────────────────────────────────────────────────────────────
// Event Tags
// ─────────────────────────────────────────────────────────────────

/// Discriminant naming which domain event occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventTag {
    /// Welcome frame sent by the server right after the handshake
    Connected,
    ViolationCreated,
    ViolationResolved,
    ViolationDeleted,
    AgentUpdated,
    AgentDeleted,
    AgentStatusChanged,
    RuleUpdated,
    RuleToggled,
    RuleDeleted,
}

impl EventTag {
    /// Every tag the server is known to emit
    pub const ALL: [EventTag; 10] = [
        EventTag::Connected,
        EventTag::ViolationCreated,
        EventTag::ViolationResolved,
        EventTag::ViolationDeleted,
        EventTag::AgentUpdated,
        EventTag::AgentDeleted,
        EventTag::AgentStatusChanged,
        EventTag::RuleUpdated,
        EventTag::RuleToggled,
        EventTag::RuleDeleted,
    ];

    /// Wire name of the tag
    pub fn as_str(&self) -> &'static str {
        match self {
            EventTag::Connected => "connected",
            EventTag::ViolationCreated => "violation_created",
            EventTag::ViolationResolved => "violation_resolved",
            EventTag::ViolationDeleted => "violation_deleted",
            EventTag::AgentUpdated => "agent_updated",
            EventTag::AgentDeleted => "agent_deleted",
            EventTag::AgentStatusChanged => "agent_status_changed",
            EventTag::RuleUpdated => "rule_updated",
            EventTag::RuleToggled => "rule_toggled",
            EventTag::RuleDeleted => "rule_deleted",
        }
    }

    /// Look up a tag by its wire name
    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|tag| tag.as_str() == name)
    }

    /// Whether subscribers may register for this tag.
    ///
    /// `connected` is informational only and never reaches a subscriber.
    pub fn is_subscribable(&self) -> bool {
        !matches!(self, EventTag::Connected)
    }
}

impl fmt::Display for EventTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventTag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_wire(s).ok_or_else(|| Error::malformed(format!("unknown event tag '{}'", s)))
    }
}

// ─────────────────────────────────────────────────────────────────
// Payloads
// ─────────────────────────────────────────────────────────────────

/// Identifier of a server-side record.
///
/// The backend emits integer ids for records and string ids for some
/// delete notifications, so both are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResourceId {
    Int(i64),
    Text(String),
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceId::Int(id) => write!(f, "{}", id),
            ResourceId::Text(id) => f.write_str(id),
        }
    }
}

impl From<i64> for ResourceId {
    fn from(id: i64) -> Self {
        ResourceId::Int(id)
    }
}

impl From<&str> for ResourceId {
    fn from(id: &str) -> Self {
        ResourceId::Text(id.to_string())
    }
}

/// Rule severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
    #[serde(other)]
    Unknown,
}

/// Payload of the `connected` welcome frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectedInfo {
    /// Server-assigned id for this socket
    pub client_id: String,

    #[serde(default)]
    pub message: Option<String>,
}

/// Violation as broadcast on create/resolve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationRecord {
    pub id: ResourceId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<ResourceId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<ResourceId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Detection confidence in `0.0..=1.0`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,

    /// ISO-8601 timestamps are kept verbatim; the backend emits naive times.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detected_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_notes: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<Box<AgentRecord>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<Box<RuleRecord>>,

    /// Fields this client does not model
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ViolationRecord {
    /// Whether the violation has been resolved
    pub fn is_resolved(&self) -> bool {
        self.resolved_at.is_some()
    }
}

/// Monitored host as broadcast on update/status change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: ResourceId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_online: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checkin: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compliance_rate: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_scan_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_heartbeat: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Compliance rule as broadcast on update/toggle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleRecord {
    pub id: ResourceId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_expression: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_type: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Payload of every `*_deleted` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedRecord {
    pub id: ResourceId,
}

// ─────────────────────────────────────────────────────────────────
// Server Events (Discriminated Union)
// ─────────────────────────────────────────────────────────────────

/// A decoded server event.
///
/// Typed variants carry `None` when the frame had no `data` field. A known
/// tag whose `data` does not fit its record type arrives as [`ServerEvent::Raw`].
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    Connected(Option<ConnectedInfo>),
    ViolationCreated(Option<ViolationRecord>),
    ViolationResolved(Option<ViolationRecord>),
    ViolationDeleted(Option<DeletedRecord>),
    AgentUpdated(Option<AgentRecord>),
    AgentDeleted(Option<DeletedRecord>),
    AgentStatusChanged(Option<AgentRecord>),
    RuleUpdated(Option<RuleRecord>),
    RuleToggled(Option<RuleRecord>),
    RuleDeleted(Option<DeletedRecord>),

    /// Known tag with a payload of an unmodelled shape, kept verbatim
    Raw { tag: EventTag, data: Value },
}

impl ServerEvent {
    /// Decode the `data` of a frame tagged `tag` into its typed variant
    pub fn decode(tag: EventTag, data: Option<&Value>) -> Result<Self> {
        let event = match tag {
            EventTag::Connected => ServerEvent::Connected(payload(tag, data)?),
            EventTag::ViolationCreated => ServerEvent::ViolationCreated(payload(tag, data)?),
            EventTag::ViolationResolved => ServerEvent::ViolationResolved(payload(tag, data)?),
            EventTag::ViolationDeleted => ServerEvent::ViolationDeleted(payload(tag, data)?),
            EventTag::AgentUpdated => ServerEvent::AgentUpdated(payload(tag, data)?),
            EventTag::AgentDeleted => ServerEvent::AgentDeleted(payload(tag, data)?),
            EventTag::AgentStatusChanged => ServerEvent::AgentStatusChanged(payload(tag, data)?),
            EventTag::RuleUpdated => ServerEvent::RuleUpdated(payload(tag, data)?),
            EventTag::RuleToggled => ServerEvent::RuleToggled(payload(tag, data)?),
            EventTag::RuleDeleted => ServerEvent::RuleDeleted(payload(tag, data)?),
        };
        Ok(event)
    }

    /// Decode into the typed variant, keeping the payload as
    /// [`ServerEvent::Raw`] when it does not fit
    pub fn decode_or_raw(tag: EventTag, data: Option<Value>) -> Self {
        match Self::decode(tag, data.as_ref()) {
            Ok(event) => event,
            Err(_) => ServerEvent::Raw {
                tag,
                data: data.unwrap_or(Value::Null),
            },
        }
    }

    /// Whether the payload failed typed decoding
    pub fn is_raw(&self) -> bool {
        matches!(self, ServerEvent::Raw { .. })
    }

    /// Tag of this event
    pub fn tag(&self) -> EventTag {
        match self {
            ServerEvent::Connected(_) => EventTag::Connected,
            ServerEvent::ViolationCreated(_) => EventTag::ViolationCreated,
            ServerEvent::ViolationResolved(_) => EventTag::ViolationResolved,
            ServerEvent::ViolationDeleted(_) => EventTag::ViolationDeleted,
            ServerEvent::AgentUpdated(_) => EventTag::AgentUpdated,
            ServerEvent::AgentDeleted(_) => EventTag::AgentDeleted,
            ServerEvent::AgentStatusChanged(_) => EventTag::AgentStatusChanged,
            ServerEvent::RuleUpdated(_) => EventTag::RuleUpdated,
            ServerEvent::RuleToggled(_) => EventTag::RuleToggled,
            ServerEvent::RuleDeleted(_) => EventTag::RuleDeleted,
            ServerEvent::Raw { tag, .. } => *tag,
        }
    }

    /// Re-encode the payload as JSON (`null` when absent)
    pub fn data_json(&self) -> Value {
        let encoded = match self {
            ServerEvent::Connected(d) => serde_json::to_value(d),
            ServerEvent::ViolationCreated(d) | ServerEvent::ViolationResolved(d) => {
                serde_json::to_value(d)
            }
            ServerEvent::ViolationDeleted(d)
            | ServerEvent::AgentDeleted(d)
            | ServerEvent::RuleDeleted(d) => serde_json::to_value(d),
            ServerEvent::AgentUpdated(d) | ServerEvent::AgentStatusChanged(d) => {
                serde_json::to_value(d)
            }
            ServerEvent::RuleUpdated(d) | ServerEvent::RuleToggled(d) => serde_json::to_value(d),
            ServerEvent::Raw { data, .. } => Ok(data.clone()),
        };
        encoded.unwrap_or(Value::Null)
    }
}

fn payload<T>(tag: EventTag, data: Option<&Value>) -> Result<Option<T>>
where
    T: for<'de> Deserialize<'de>,
{
    match data {
        None | Some(Value::Null) => Ok(None),
        Some(value) => T::deserialize(value)
            .map(Some)
            .map_err(|e| Error::ProtocolUnexpected {
                tag,
                message: e.to_string(),
            }),
    }
}

// ─────────────────────────────────────────────────────────────────
// Inbound Classification
// ─────────────────────────────────────────────────────────────────

/// Classification of one inbound text frame
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// A known event with its decoded payload
    Event(ServerEvent),

    /// Heartbeat acknowledgment
    Pong,

    /// An `event` tag this client does not know
    UnknownEvent(String),

    /// Valid JSON of any other shape
    Unrecognized(Value),
}

impl Inbound {
    /// Parse and classify a text frame.
    ///
    /// Fails only when the frame is not a JSON object or when `event` is not
    /// a string.
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text).map_err(|e| Error::malformed(e.to_string()))?;

        let mut object = match value {
            Value::Object(object) => object,
            other => {
                return Err(Error::malformed(format!(
                    "expected a JSON object, got {}",
                    json_kind(&other)
                )))
            }
        };

        match object.remove("event") {
            Some(Value::String(name)) => match EventTag::from_wire(&name) {
                Some(tag) => {
                    let data = object.remove("data");
                    Ok(Inbound::Event(ServerEvent::decode_or_raw(tag, data)))
                }
                None => Ok(Inbound::UnknownEvent(name)),
            },
            Some(other) => Err(Error::malformed(format!(
                "'event' must be a string, got {}",
                json_kind(&other)
            ))),
            None => {
                if object.get("type").and_then(Value::as_str) == Some("pong") {
                    Ok(Inbound::Pong)
                } else {
                    Ok(Inbound::Unrecognized(Value::Object(object)))
                }
            }
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ─────────────────────────────────────────────────────────────────
// Control Frames
// ─────────────────────────────────────────────────────────────────

/// Heartbeat control frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlFrame {
    Ping,
    Pong,
}

impl ControlFrame {
    /// Serialize to a JSON text frame
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Internal(e.to_string()))
    }
}
