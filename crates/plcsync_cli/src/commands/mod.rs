//! CLI command implementations.

pub mod classify;
pub mod encode;
pub mod inspect;
pub mod simulate;

use crate::error::{CliError, CliResult};
use plcsync_core::{DeviceRecord, VersionLabel, VersionPayload};
use serde_json::Value;
use std::path::Path;

/// A device record loaded from disk.
pub struct LoadedRecord {
    /// Raw JSON.
    pub raw: Value,
    /// Parsed record.
    pub record: DeviceRecord,
}

/// Reads and parses a device record file.
pub fn load_record(path: &Path) -> CliResult<LoadedRecord> {
    let text = std::fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let raw: Value = serde_json::from_str(&text).map_err(|source| CliError::Json {
        what: path.display().to_string(),
        source,
    })?;
    let record = DeviceRecord::from_value(&raw)?;
    Ok(LoadedRecord { raw, record })
}

/// Picks the version named on the command line, or `new` then `current`.
pub fn select_version<'a>(
    record: &'a DeviceRecord,
    requested: Option<&str>,
) -> CliResult<(VersionLabel, &'a VersionPayload)> {
    let pick = |label: VersionLabel| {
        let payload = match label {
            VersionLabel::Current => record.current.as_ref(),
            _ => record.new.as_ref(),
        };
        payload.map(|payload| (label, payload))
    };

    match requested {
        None => pick(VersionLabel::New)
            .or_else(|| pick(VersionLabel::Current))
            .ok_or_else(|| CliError::usage("record has neither a new nor a current version")),
        Some("new") => pick(VersionLabel::New).ok_or_else(|| CliError::usage("record has no new version")),
        Some("current") => {
            pick(VersionLabel::Current).ok_or_else(|| CliError::usage("record has no current version"))
        }
        Some(other) => Err(CliError::usage(format!(
            "unknown version '{other}' (expected new or current)"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plcsync_testkit::{sample_builder, sample_record, TempRecordFile};

    #[test]
    fn loads_records_from_disk() {
        let file = TempRecordFile::new(&sample_record()).unwrap();
        let loaded = load_record(file.path()).unwrap();
        assert_eq!(loaded.record.plc_name, "press-1");
        assert_eq!(loaded.raw, sample_record());
    }

    #[test]
    fn load_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(matches!(load_record(&missing), Err(CliError::Io { .. })));

        let garbage = dir.path().join("garbage.json");
        std::fs::write(&garbage, "{ not json").unwrap();
        assert!(matches!(load_record(&garbage), Err(CliError::Json { .. })));
    }

    #[test]
    fn version_selection() {
        let new_only = DeviceRecord::from_value(&sample_record()).unwrap();
        let (label, _) = select_version(&new_only, None).unwrap();
        assert_eq!(label, VersionLabel::New);
        assert!(select_version(&new_only, Some("current")).is_err());
        assert!(select_version(&new_only, Some("baseline")).is_err());

        let current_only = DeviceRecord::from_value(&sample_builder().build_current()).unwrap();
        let (label, _) = select_version(&current_only, None).unwrap();
        assert_eq!(label, VersionLabel::Current);
    }
}
