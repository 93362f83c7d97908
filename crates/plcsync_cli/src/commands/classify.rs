//! Classify command implementation.

use crate::error::{CliError, CliResult};
use plcsync_engine::{classify, EventAction, EventType, Provenance, RemoteEvent};
use serde_json::Value;

/// Runs the classify command.
pub fn run(event_type: &str, path: &str, data: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let event = build_event(event_type, path, data)?;
    let action = classify(&event)?;

    println!("Event:      {} {}", event.event_type, event.path);
    println!("Action:     {action}");
    println!("Provenance: {}", describe_provenance(&action));
    Ok(())
}

/// Builds a remote event from command-line arguments.
pub fn build_event(event_type: &str, path: &str, data: Option<&str>) -> CliResult<RemoteEvent> {
    let event_type = EventType::from_name(event_type);
    if let EventType::Unknown(name) = &event_type {
        return Err(CliError::usage(format!(
            "unknown event type '{name}' (expected put or patch)"
        )));
    }

    let data = data
        .map(|text| {
            serde_json::from_str::<Value>(text).map_err(|source| CliError::Json {
                what: "--data".into(),
                source,
            })
        })
        .transpose()?;
    Ok(RemoteEvent::new(event_type, path, data))
}

/// Describes where the author of an event would be looked up.
pub fn describe_provenance(action: &EventAction) -> String {
    match action.provenance() {
        Provenance::External => "not checked".to_string(),
        Provenance::Payload {
            changer_id: Some(id), ..
        } => format!("changer_id '{id}' in the payload"),
        Provenance::Payload {
            changer_id: None, ..
        } => "payload has no changer_id (device would be purged)".to_string(),
        Provenance::Lookup { device_id } => format!("changer_id read from {device_id}/changer_id"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_events() {
        let event = build_event("put", "/", Some(r#"{"dev1": {}}"#)).unwrap();
        assert!(matches!(classify(&event).unwrap(), EventAction::OpenAll { .. }));

        let event = build_event("PATCH", "/", Some(r#"{"dev2/current/x": 1}"#)).unwrap();
        let action = classify(&event).unwrap();
        assert_eq!(action.device_id(), Some("dev2"));
        assert_eq!(describe_provenance(&action), "changer_id read from dev2/changer_id");

        let event = build_event("put", "/dev3", None).unwrap();
        assert!(matches!(classify(&event).unwrap(), EventAction::Remove { .. }));
    }

    #[test]
    fn reports_missing_marker() {
        let event = build_event("put", "/dev1", Some(r#"{"plc_name": "x"}"#)).unwrap();
        let action = classify(&event).unwrap();
        assert!(describe_provenance(&action).contains("purged"));
    }

    #[test]
    fn bad_arguments() {
        assert!(matches!(build_event("post", "/", None), Err(CliError::Usage(_))));
        assert!(matches!(
            build_event("put", "/", Some("{oops")),
            Err(CliError::Json { .. })
        ));
    }
}
