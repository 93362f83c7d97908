//! Device sessions.
//!
//! A session owns everything the gateway knows about one controller: its
//! connection parameters, two live connections (one for writes, one for
//! read-verify and polling) and the version lifecycle
//! `new`/`current` → `baseline`.

use crate::block::ChangeSet;
use crate::device::{ConnectionParams, DeviceClient, DeviceClientFactory};
use crate::error::{CoreError, CoreResult};
use crate::record::{DeviceRecord, VersionPayload};
use crate::snapshot::{VersionLabel, VersionSnapshot};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info, warn};

/// Session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Nothing connected yet.
    Uninitialized,
    /// Both connections are open.
    Connected,
    /// Provisioning the `new` version.
    Loading,
    /// Applying a `current` version.
    Updating,
    /// A baseline is in effect.
    Ready,
    /// Connections closed; the session is unusable.
    Closed,
}

/// Field changes observed on a device, grouped by block.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingUpload {
    /// Device identity.
    pub device_id: String,
    /// Changes per block number, in block order.
    pub blocks: Vec<(u16, ChangeSet)>,
}

impl PendingUpload {
    /// Total number of changed fields.
    pub fn field_count(&self) -> usize {
        self.blocks.iter().map(|(_, changes)| changes.len()).sum()
    }
}

/// One controller under synchronization.
pub struct DeviceSession {
    device_id: String,
    device_name: String,
    params: ConnectionParams,
    writer: Box<dyn DeviceClient>,
    reader: Box<dyn DeviceClient>,
    new: Option<VersionSnapshot>,
    current: Option<VersionSnapshot>,
    baseline: Option<VersionSnapshot>,
    unsent: BTreeMap<u16, ChangeSet>,
    state: SessionState,
}

impl fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceSession")
            .field("device_id", &self.device_id)
            .field("device_name", &self.device_name)
            .field("params", &self.params)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl DeviceSession {
    /// Opens a session and provisions the record's `new` version.
    ///
    /// Both connections are opened, every block's size is probed, every
    /// block is written, and `new` becomes the baseline.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::NewMissing`] if the record has no `new`
    /// version, [`CoreError::PlcConnection`] if the device cannot be
    /// reached, [`CoreError::DatablockSize`] if a declared size is wrong and
    /// [`CoreError::Write`] if the device rejects a block. Both connections
    /// are closed again on failure.
    pub fn open(
        factory: &dyn DeviceClientFactory,
        device_id: impl Into<String>,
        record: &DeviceRecord,
    ) -> CoreResult<Self> {
        let device_id = device_id.into();
        let payload = record.new.as_ref().ok_or_else(|| CoreError::NewMissing {
            device_id: device_id.clone(),
        })?;
        let new = VersionSnapshot::from_payload(VersionLabel::New, payload)?;

        let mut session = Self {
            device_id,
            device_name: record.plc_name.clone(),
            params: record.connection_params(),
            writer: factory.create_client(),
            reader: factory.create_client(),
            new: Some(new),
            current: None,
            baseline: None,
            unsent: BTreeMap::new(),
            state: SessionState::Uninitialized,
        };

        match session.provision() {
            Ok(()) => {
                info!(
                    device_id = %session.device_id,
                    name = %session.device_name,
                    params = %session.params,
                    "device provisioned"
                );
                Ok(session)
            }
            Err(e) => {
                session.close();
                Err(e)
            }
        }
    }

    fn provision(&mut self) -> CoreResult<()> {
        self.connect_both()?;
        self.state = SessionState::Connected;

        let new = self.new.take().ok_or_else(|| CoreError::NewMissing {
            device_id: self.device_id.clone(),
        })?;
        self.state = SessionState::Loading;

        for block in new.blocks() {
            block.verify_size(self.reader.as_mut())?;
        }
        for block in new.blocks() {
            block.write_to(self.writer.as_mut())?;
            debug!(device_id = %self.device_id, block = block.number(), "block written");
        }

        self.baseline = Some(new.into_baseline());
        self.state = SessionState::Ready;
        Ok(())
    }

    /// Applies a `current` version to the device.
    ///
    /// The version must have the baseline's shape; on success it becomes
    /// the new baseline. On failure it is discarded and the previous
    /// baseline stays in effect.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::CurrentMissing`] if `current` is `None`,
    /// [`CoreError::PlcConnection`] if reconnecting fails,
    /// [`CoreError::OldDataMissing`] without a baseline,
    /// [`CoreError::CurrentMismatch`] on a shape mismatch and
    /// [`CoreError::Write`] if the device rejects a block.
    pub fn apply_update(&mut self, device_name: &str, current: Option<&VersionPayload>) -> CoreResult<()> {
        self.check_open()?;
        let payload = current.ok_or_else(|| CoreError::CurrentMissing {
            device_id: self.device_id.clone(),
        })?;
        self.ensure_connected()?;

        self.current = Some(VersionSnapshot::from_payload(VersionLabel::Current, payload)?);
        self.state = SessionState::Updating;
        if self.device_name != device_name {
            info!(
                device_id = %self.device_id,
                from = %self.device_name,
                to = %device_name,
                "device renamed"
            );
            self.device_name = device_name.to_string();
        }

        let result = self.write_current();
        if result.is_err() {
            self.current = None;
        }
        self.state = if self.baseline.is_some() {
            SessionState::Ready
        } else {
            SessionState::Connected
        };
        result
    }

    fn write_current(&mut self) -> CoreResult<()> {
        let current = self.current.take().ok_or_else(|| CoreError::CurrentMissing {
            device_id: self.device_id.clone(),
        })?;
        let baseline = self.baseline.as_ref().ok_or_else(|| CoreError::OldDataMissing {
            device_id: self.device_id.clone(),
        })?;
        current.matches_shape(baseline)?;

        for block in current.blocks() {
            block.write_to(self.writer.as_mut())?;
            debug!(device_id = %self.device_id, block = block.number(), "block updated");
        }

        self.baseline = Some(current.into_baseline());
        self.unsent.clear();
        info!(device_id = %self.device_id, "current version applied");
        Ok(())
    }

    /// Applies the `current` version of a re-fetched record.
    pub fn apply_record(&mut self, record: &DeviceRecord) -> CoreResult<()> {
        self.apply_update(&record.plc_name, record.current.as_ref())
    }

    /// Reads every baseline block and reports fields that changed since the
    /// last read, together with any changes handed back through
    /// [`DeviceSession::defer_upload`].
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::PlcConnection`] if the device cannot be
    /// reached after one reconnect, [`CoreError::OldDataMissing`] without a
    /// baseline and [`CoreError::Read`] if a block read fails.
    pub fn pending_changes(&mut self) -> CoreResult<Option<PendingUpload>> {
        self.check_open()?;
        if self.baseline.is_none() {
            return Err(CoreError::OldDataMissing {
                device_id: self.device_id.clone(),
            });
        }
        self.ensure_connected()?;

        let reader = self.reader.as_mut();
        let mut observed = Vec::new();
        if let Some(baseline) = self.baseline.as_mut() {
            for block in baseline.blocks_mut() {
                let fresh = block.read_from(reader)?;
                if let Some(changes) = block.diff(fresh)? {
                    observed.push((block.number(), changes));
                }
            }
        }

        let mut merged = std::mem::take(&mut self.unsent);
        for (number, changes) in observed {
            merged.entry(number).or_default().extend(changes);
        }
        if merged.is_empty() {
            return Ok(None);
        }
        Ok(Some(PendingUpload {
            device_id: self.device_id.clone(),
            blocks: merged.into_iter().collect(),
        }))
    }

    /// Hands back an upload the store did not accept.
    ///
    /// Its changes are merged into the next [`DeviceSession::pending_changes`]
    /// result, under any value observed later. Applying a `current` version
    /// discards them.
    pub fn defer_upload(&mut self, upload: PendingUpload) {
        for (number, changes) in upload.blocks {
            let entry = self.unsent.entry(number).or_default();
            for (index, value) in changes {
                entry.entry(index).or_insert(value);
            }
        }
        debug!(
            device_id = %self.device_id,
            blocks = self.unsent.len(),
            "upload deferred"
        );
    }

    /// Live status of the write connection.
    pub fn is_connected(&self) -> bool {
        self.writer.is_connected()
    }

    /// Disconnects both connections.
    pub fn close(&mut self) {
        self.writer.disconnect();
        self.reader.disconnect();
        self.new = None;
        self.current = None;
        self.unsent.clear();
        self.state = SessionState::Closed;
        debug!(device_id = %self.device_id, "session closed");
    }

    /// Device identity.
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Display name.
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Connection parameters.
    pub fn connection_params(&self) -> &ConnectionParams {
        &self.params
    }

    /// Lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The confirmed version, if any.
    pub fn baseline(&self) -> Option<&VersionSnapshot> {
        self.baseline.as_ref()
    }

    fn check_open(&self) -> CoreResult<()> {
        if self.state == SessionState::Closed {
            return Err(CoreError::SessionClosed);
        }
        Ok(())
    }

    fn connect_both(&mut self) -> CoreResult<()> {
        let params = &self.params;
        self.writer
            .connect(params)
            .and_then(|()| self.reader.connect(params))
            .map_err(|e| CoreError::PlcConnection {
                device_id: self.device_id.clone(),
                reason: e.to_string(),
            })
    }

    // One reconnect attempt when either link dropped.
    fn ensure_connected(&mut self) -> CoreResult<()> {
        if self.writer.is_connected() && self.reader.is_connected() {
            return Ok(());
        }
        warn!(device_id = %self.device_id, params = %self.params, "connection lost, reconnecting");
        self.writer.disconnect();
        self.reader.disconnect();
        self.connect_both()?;
        if !(self.writer.is_connected() && self.reader.is_connected()) {
            return Err(CoreError::PlcConnection {
                device_id: self.device_id.clone(),
                reason: "link did not come up".into(),
            });
        }
        Ok(())
    }
}
