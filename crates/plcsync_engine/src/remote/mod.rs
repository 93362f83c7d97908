//! Remote store abstraction.
//!
//! The remote store is a JSON tree addressed by `/`-separated paths that
//! pushes a [`RemoteEvent`] whenever something changes. Devices live one
//! level below the root:
//!
//! ```text
//! {id}/plc_name
//! {id}/plc_parameters
//! {id}/new | {id}/current
//! {id}/permission/to_write
//! {id}/changer_id
//! ```

pub mod memory;

use crate::error::EngineResult;
use crate::event::RemoteEvent;
use plcsync_core::{block_name, value_to_json, PendingUpload};
use serde_json::{Map, Value};
use std::sync::mpsc::Receiver;

/// A push-notifying JSON store.
pub trait RemoteStore: Send + Sync {
    /// Reads the value at `path`; `None` if nothing is stored there.
    fn get(&self, path: &str) -> EngineResult<Option<Value>>;

    /// Replaces the value at `path`. Writing `null` deletes it.
    fn set(&self, path: &str, value: Value) -> EngineResult<()>;

    /// Writes several paths at once. `null` values delete.
    fn update(&self, changes: Map<String, Value>) -> EngineResult<()>;

    /// Deletes the value at `path`.
    fn delete(&self, path: &str) -> EngineResult<()>;

    /// Starts receiving change events.
    ///
    /// The first event is a put at `/` carrying the whole tree.
    fn subscribe(&self) -> EngineResult<Receiver<RemoteEvent>>;

    /// Stops delivering events to every subscriber.
    fn unsubscribe(&self);
}

/// Joins a device id and a relative path.
pub fn device_path(device_id: &str, rest: &str) -> String {
    if rest.is_empty() {
        device_id.to_string()
    } else {
        format!("{device_id}/{rest}")
    }
}

/// Path of one field value inside a device's `current` version.
pub fn field_value_path(device_id: &str, block: u16, index: usize) -> String {
    format!(
        "{device_id}/current/datablocks/{}/data/{index}/Value",
        block_name(block)
    )
}

/// Builds the multi-path update an operator sends to change field values,
/// stamped with the operator's own marker.
pub fn operator_update(device_id: &str, marker: &str, values: &[(u16, usize, Value)]) -> Map<String, Value> {
    let mut changes = Map::new();
    for (block, index, value) in values {
        changes.insert(field_value_path(device_id, *block, *index), value.clone());
    }
    changes.insert(
        device_path(device_id, "changer_id"),
        Value::String(marker.to_string()),
    );
    changes
}

/// Gateway-level operations built on [`RemoteStore`].
pub trait RemoteStoreExt: RemoteStore {
    /// Reads a device's provenance marker.
    fn changer_id(&self, device_id: &str) -> EngineResult<Option<String>> {
        let value = self.get(&device_path(device_id, "changer_id"))?;
        Ok(value.and_then(|v| v.as_str().map(str::to_string)))
    }

    /// Moves the device's `new` version to `current`, grants write
    /// permission and stamps the marker, in one update.
    fn promote_new(&self, device_id: &str, marker: &str) -> EngineResult<()> {
        let new = self.get(&device_path(device_id, "new"))?.unwrap_or(Value::Null);
        let mut changes = Map::new();
        changes.insert(device_path(device_id, "new"), Value::Null);
        changes.insert(device_path(device_id, "current"), new);
        stamp(&mut changes, device_id, marker);
        self.update(changes)
    }

    /// Uploads observed field changes as one multi-path update.
    fn upload_changes(&self, upload: &PendingUpload, marker: &str) -> EngineResult<()> {
        let mut changes = Map::new();
        for (block, fields) in &upload.blocks {
            for (index, value) in fields {
                changes.insert(
                    field_value_path(&upload.device_id, *block, *index),
                    value_to_json(value),
                );
            }
        }
        stamp(&mut changes, &upload.device_id, marker);
        self.update(changes)
    }

    /// Removes a device entry.
    fn delete_device(&self, device_id: &str) -> EngineResult<()> {
        self.delete(device_id)
    }
}

impl<S: RemoteStore + ?Sized> RemoteStoreExt for S {}

fn stamp(changes: &mut Map<String, Value>, device_id: &str, marker: &str) {
    changes.insert(device_path(device_id, "permission/to_write"), Value::Bool(true));
    changes.insert(
        device_path(device_id, "changer_id"),
        Value::String(marker.to_string()),
    );
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryRemoteStore;
    use super::*;
    use plcsync_codec::FieldValue;
    use plcsync_core::ChangeSet;
    use serde_json::json;

    #[test]
    fn paths() {
        assert_eq!(device_path("d", ""), "d");
        assert_eq!(device_path("d", "new"), "d/new");
        assert_eq!(
            field_value_path("d", 3, 7),
            "d/current/datablocks/DB3/data/7/Value"
        );
    }

    #[test]
    fn operator_update_paths() {
        let changes = operator_update("d", "op", &[(1, 3, json!(5))]);
        assert_eq!(changes["d/current/datablocks/DB1/data/3/Value"], json!(5));
        assert_eq!(changes["d/changer_id"], json!("op"));
    }

    #[test]
    fn promote_new_moves_version() {
        let store = MemoryRemoteStore::with_root(json!({
            "dev1": {"plc_name": "p", "new": {"plc_informations": {"a": 1}}, "changer_id": "op"}
        }));
        store.promote_new("dev1", "server").unwrap();

        assert!(store.get("dev1/new").unwrap().is_none());
        assert_eq!(
            store.get("dev1/current").unwrap(),
            Some(json!({"plc_informations": {"a": 1}}))
        );
        assert_eq!(store.get("dev1/permission/to_write").unwrap(), Some(json!(true)));
        assert_eq!(store.changer_id("dev1").unwrap().as_deref(), Some("server"));
    }

    #[test]
    fn upload_changes_targets_field_values() {
        let store = MemoryRemoteStore::with_root(json!({
            "dev1": {"current": {"datablocks": {"DB1": {"data": [
                {"Offset": 0, "Data_type": "Int", "Value": 1},
                {"Offset": 2, "Data_type": "Int", "Value": 2}
            ]}}}}
        }));
        let mut changes = ChangeSet::new();
        changes.insert(1, FieldValue::Int(42));
        let upload = PendingUpload {
            device_id: "dev1".into(),
            blocks: vec![(1, changes)],
        };
        store.upload_changes(&upload, "server").unwrap();

        assert_eq!(
            store.get("dev1/current/datablocks/DB1/data/1/Value").unwrap(),
            Some(json!(42))
        );
        assert_eq!(
            store.get("dev1/current/datablocks/DB1/data/0/Value").unwrap(),
            Some(json!(1))
        );
        assert_eq!(store.changer_id("dev1").unwrap().as_deref(), Some("server"));
    }

    #[test]
    fn delete_device_removes_entry() {
        let store = MemoryRemoteStore::with_root(json!({"dev1": {"plc_name": "p"}, "dev2": {"plc_name": "q"}}));
        store.delete_device("dev1").unwrap();
        assert!(store.get("dev1").unwrap().is_none());
        assert!(store.get("dev2").unwrap().is_some());
    }
}
