//! Remote push events and their classification.

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Kind of remote push event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    /// A value was replaced at the path.
    Put,
    /// Children of the path were updated.
    Patch,
    /// Anything else the store may send.
    #[serde(untagged)]
    Unknown(String),
}

impl EventType {
    /// Parses an event type name, case-insensitively.
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "put" => EventType::Put,
            "patch" => EventType::Patch,
            _ => EventType::Unknown(name.to_string()),
        }
    }

    /// Returns the event type name.
    pub fn as_str(&self) -> &str {
        match self {
            EventType::Put => "put",
            EventType::Patch => "patch",
            EventType::Unknown(name) => name,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A push notification from the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteEvent {
    /// Event kind.
    pub event_type: EventType,
    /// Path relative to the store root, `/` for the root.
    pub path: String,
    /// New data; `None` when the path was deleted.
    pub data: Option<Value>,
}

impl RemoteEvent {
    /// Creates an event.
    pub fn new(event_type: EventType, path: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            event_type,
            path: path.into(),
            data: data.filter(|value| !value.is_null()),
        }
    }

    /// Creates a put event.
    pub fn put(path: impl Into<String>, data: Option<Value>) -> Self {
        Self::new(EventType::Put, path, data)
    }

    /// Creates a patch event.
    pub fn patch(path: impl Into<String>, data: Map<String, Value>) -> Self {
        Self::new(EventType::Patch, path, Some(Value::Object(data)))
    }

    /// Non-empty segments of the path.
    pub fn segments(&self) -> Vec<&str> {
        path_segments(&self.path)
    }

    fn unexpected(&self, reason: &str) -> EngineError {
        EngineError::unexpected(self.event_type.as_str(), &self.path, reason)
    }
}

/// Splits a store path into its non-empty segments.
pub fn path_segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|segment| !segment.is_empty()).collect()
}

/// What the gateway should do with an event.
#[derive(Debug, Clone, PartialEq)]
pub enum EventAction {
    /// The whole store is empty.
    EmptyStore,
    /// A device entry was removed.
    Remove {
        /// Device identity.
        device_id: String,
    },
    /// The whole device map was delivered; open every unknown device.
    OpenAll {
        /// Device records keyed by id.
        devices: Map<String, Value>,
    },
    /// A device entry was written as a whole.
    Open {
        /// Device identity.
        device_id: String,
        /// The written record.
        record: Value,
    },
    /// Part of a device entry changed; re-fetch and apply it.
    Update {
        /// Device identity.
        device_id: String,
    },
}

/// Where an event's author can be found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provenance {
    /// The event cannot have been written by the gateway.
    External,
    /// The author travels with the event payload.
    Payload {
        /// Device identity.
        device_id: String,
        /// Marker found in the payload, if any.
        changer_id: Option<String>,
    },
    /// The author must be read from `{device}/changer_id`.
    Lookup {
        /// Device identity.
        device_id: String,
    },
}

impl EventAction {
    /// Device the action targets, if it targets exactly one.
    pub fn device_id(&self) -> Option<&str> {
        match self {
            EventAction::Remove { device_id }
            | EventAction::Open { device_id, .. }
            | EventAction::Update { device_id } => Some(device_id),
            EventAction::EmptyStore | EventAction::OpenAll { .. } => None,
        }
    }

    /// Where the author of the underlying event is recorded.
    pub fn provenance(&self) -> Provenance {
        match self {
            EventAction::EmptyStore | EventAction::Remove { .. } | EventAction::OpenAll { .. } => {
                Provenance::External
            }
            EventAction::Open { device_id, record } => Provenance::Payload {
                device_id: device_id.clone(),
                changer_id: record
                    .get("changer_id")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            },
            EventAction::Update { device_id } => Provenance::Lookup {
                device_id: device_id.clone(),
            },
        }
    }
}

impl fmt::Display for EventAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventAction::EmptyStore => write!(f, "ignore (store is empty)"),
            EventAction::Remove { device_id } => write!(f, "remove device {device_id}"),
            EventAction::OpenAll { devices } => write!(f, "open {} device(s)", devices.len()),
            EventAction::Open { device_id, .. } => write!(f, "open device {device_id}"),
            EventAction::Update { device_id } => write!(f, "update device {device_id}"),
        }
    }
}

/// Decides how an event is routed.
///
/// # Errors
///
/// Returns [`EngineError::UnexpectedEventShape`] for events that do not fit
/// any route, e.g. a deletion below device level or an unknown event type.
pub fn classify(event: &RemoteEvent) -> EngineResult<EventAction> {
    let segments = event.segments();

    let Some(data) = &event.data else {
        return match segments.as_slice() {
            [] => Ok(EventAction::EmptyStore),
            [device_id] => Ok(EventAction::Remove {
                device_id: (*device_id).to_string(),
            }),
            _ => Err(event.unexpected("deletion below device level")),
        };
    };

    match (&event.event_type, segments.as_slice()) {
        (EventType::Put, []) => match data {
            Value::Object(devices) => Ok(EventAction::OpenAll {
                devices: devices.clone(),
            }),
            _ => Err(event.unexpected("root payload is not a device map")),
        },
        (EventType::Put, [device_id]) => match data {
            Value::Object(_) => Ok(EventAction::Open {
                device_id: (*device_id).to_string(),
                record: data.clone(),
            }),
            _ => Err(event.unexpected("device payload is not an object")),
        },
        (EventType::Put, [device_id, ..]) | (EventType::Patch, [device_id, ..]) => {
            Ok(EventAction::Update {
                device_id: (*device_id).to_string(),
            })
        }
        (EventType::Patch, []) => {
            // Keys keep the order the store sent them in.
            let first_key = data
                .as_object()
                .and_then(|keys| keys.keys().next())
                .ok_or_else(|| event.unexpected("root patch without keys"))?;
            match path_segments(first_key).first() {
                Some(device_id) => Ok(EventAction::Update {
                    device_id: (*device_id).to_string(),
                }),
                None => Err(event.unexpected("root patch key is empty")),
            }
        }
        (EventType::Unknown(_), _) => Err(event.unexpected("unknown event type")),
    }
}
