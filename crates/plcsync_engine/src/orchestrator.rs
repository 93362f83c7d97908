//! The synchronization orchestrator.
//!
//! The orchestrator owns the registry of device sessions. Two triggers act
//! on it concurrently: remote push events (handled by the listener thread)
//! and the periodic device poll (the poll thread). The registry lock is only
//! held for lookups, insertions and removals; each session has its own lock
//! that is held for the whole of an update or poll.

use crate::config::GatewayConfig;
use crate::error::{EngineError, EngineResult};
use crate::event::{classify, EventAction, Provenance, RemoteEvent};
use crate::remote::{RemoteStore, RemoteStoreExt};
use parking_lot::{Mutex, RwLock};
use plcsync_core::{CoreError, DeviceClientFactory, DeviceRecord, DeviceSession, SessionState};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

type SessionHandle = Arc<Mutex<DeviceSession>>;

/// Counters describing what the gateway has done.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GatewayStats {
    /// Remote events received.
    pub events_received: u64,
    /// Events ignored because the gateway wrote them.
    pub events_ignored: u64,
    /// Events rejected as malformed.
    pub events_rejected: u64,
    /// Sessions opened successfully.
    pub sessions_opened: u64,
    /// Sessions removed from the registry.
    pub sessions_removed: u64,
    /// Open, update or poll failures of a session.
    pub session_failures: u64,
    /// Poll ticks completed.
    pub poll_ticks: u64,
    /// Change uploads sent to the store.
    pub uploads: u64,
    /// Field values uploaded.
    pub fields_uploaded: u64,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Registry entry as shown to operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceStatus {
    /// Device identity.
    pub device_id: String,
    /// Display name.
    pub device_name: String,
    /// Whether the write connection is up.
    pub connected: bool,
    /// Session state.
    #[serde(skip)]
    pub state: SessionState,
}

/// Outcome of one poll tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollReport {
    /// Devices removed during the tick.
    pub removed: Vec<String>,
    /// Uploads sent.
    pub uploads: usize,
}

/// Keeps device memory and the remote store in sync.
///
/// # Example
///
/// ```rust
/// use plcsync_core::device::memory::MemoryDeviceFactory;
/// use plcsync_engine::{GatewayConfig, MemoryRemoteStore, Orchestrator};
/// use std::sync::Arc;
///
/// let gateway = Arc::new(Orchestrator::new(
///     GatewayConfig::default(),
///     Arc::new(MemoryRemoteStore::new()),
///     Arc::new(MemoryDeviceFactory::new()),
/// ));
/// gateway.start().unwrap();
/// assert!(gateway.is_running());
/// gateway.shutdown().unwrap();
/// ```
pub struct Orchestrator<R: RemoteStore, F: DeviceClientFactory> {
    config: GatewayConfig,
    remote: Arc<R>,
    factory: Arc<F>,
    registry: Mutex<HashMap<String, SessionHandle>>,
    running: AtomicBool,
    stats: RwLock<GatewayStats>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

enum Origin {
    SelfAuthored,
    External,
}

impl<R: RemoteStore, F: DeviceClientFactory> Orchestrator<R, F> {
    /// Creates a stopped gateway with an empty registry.
    pub fn new(config: GatewayConfig, remote: Arc<R>, factory: Arc<F>) -> Self {
        Self {
            config,
            remote,
            factory,
            registry: Mutex::new(HashMap::new()),
            running: AtomicBool::new(false),
            stats: RwLock::new(GatewayStats::default()),
            threads: Mutex::new(Vec::new()),
        }
    }

    /// Gets the configuration.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Gets the remote store.
    pub fn remote(&self) -> &Arc<R> {
        &self.remote
    }

    /// Gets the current stats.
    pub fn stats(&self) -> GatewayStats {
        self.stats.read().clone()
    }

    /// Returns true between `start` and `shutdown`.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Returns true if a session exists for `device_id`.
    pub fn is_registered(&self, device_id: &str) -> bool {
        self.registry.lock().contains_key(device_id)
    }

    /// Number of registered sessions.
    pub fn session_count(&self) -> usize {
        self.registry.lock().len()
    }

    /// Lists registered devices, sorted by id.
    pub fn registered_devices(&self) -> Vec<DeviceStatus> {
        let mut devices: Vec<DeviceStatus> = self
            .snapshot_registry()
            .into_iter()
            .map(|(device_id, handle)| {
                let session = handle.lock();
                DeviceStatus {
                    device_id,
                    device_name: session.device_name().to_string(),
                    connected: session.is_connected(),
                    state: session.state(),
                }
            })
            .collect();
        devices.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        devices
    }

    /// Handles one remote push event.
    ///
    /// Events written by the gateway itself are ignored. Session failures
    /// are handled here (the session is removed and its remote entry
    /// deleted) and do not surface as errors.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnexpectedEventShape`] for events that fit no
    /// route, [`EngineError::MissingProvenance`] for device payloads without
    /// a marker, and [`EngineError::Remote`] if the store fails.
    pub fn on_remote_event(&self, event: &RemoteEvent) -> EngineResult<()> {
        self.stats.write().events_received += 1;
        let result = self.handle_event(event);
        if let Err(e) = &result {
            let mut stats = self.stats.write();
            stats.events_rejected += 1;
            stats.last_error = Some(e.to_string());
        }
        result
    }

    fn handle_event(&self, event: &RemoteEvent) -> EngineResult<()> {
        let action = classify(event)?;
        if let Origin::SelfAuthored = self.resolve_origin(&action)? {
            debug!(path = %event.path, event_type = %event.event_type, "ignoring own write");
            self.stats.write().events_ignored += 1;
            return Ok(());
        }

        debug!(path = %event.path, action = %action, "remote event");
        match action {
            EventAction::EmptyStore => {
                warn!("remote store is empty");
                Ok(())
            }
            EventAction::Remove { device_id } => {
                if self.remove_session(&device_id) {
                    self.delete_remote(&device_id);
                }
                Ok(())
            }
            EventAction::OpenAll { devices } => {
                for (device_id, record) in devices {
                    if !self.is_registered(&device_id) {
                        self.open_device(&device_id, &record);
                    }
                }
                Ok(())
            }
            EventAction::Open { device_id, record } => {
                self.remove_session(&device_id);
                self.open_device(&device_id, &record);
                Ok(())
            }
            EventAction::Update { device_id } => self.update_device(&device_id),
        }
    }

    fn resolve_origin(&self, action: &EventAction) -> EngineResult<Origin> {
        let marker = self.config.provenance_marker.as_str();
        let changer_id = match action.provenance() {
            Provenance::External => return Ok(Origin::External),
            Provenance::Payload {
                device_id,
                changer_id,
            } => changer_id.ok_or(EngineError::MissingProvenance { device_id }),
            Provenance::Lookup { device_id } => self
                .remote
                .changer_id(&device_id)?
                .ok_or(EngineError::MissingProvenance { device_id }),
        };

        match changer_id {
            Ok(id) if id == marker => Ok(Origin::SelfAuthored),
            Ok(_) => Ok(Origin::External),
            Err(EngineError::MissingProvenance { device_id }) => {
                error!(device_id = %device_id, "device entry has no changer_id, deleting it");
                self.remove_session(&device_id);
                self.delete_remote(&device_id);
                Err(EngineError::MissingProvenance { device_id })
            }
            Err(e) => Err(e),
        }
    }

    fn open_device(&self, device_id: &str, record: &Value) {
        let opened = DeviceRecord::from_value(record)
            .and_then(|record| DeviceSession::open(self.factory.as_ref(), device_id, &record));
        let session = match opened {
            Ok(session) => session,
            Err(e) => {
                self.session_failed(device_id, &e);
                self.delete_remote(device_id);
                return;
            }
        };

        let handle = Arc::new(Mutex::new(session));
        let previous = self
            .registry
            .lock()
            .insert(device_id.to_string(), Arc::clone(&handle));
        if let Some(previous) = previous {
            previous.lock().close();
        }

        let promoted = self
            .remote
            .promote_new(device_id, &self.config.provenance_marker);
        self.stats.write().sessions_opened += 1;
        if let Err(e) = promoted {
            warn!(device_id = %device_id, error = %e, "could not promote new version");
            self.remove_if_same(device_id, &handle);
            self.delete_remote(device_id);
        }
    }

    fn update_device(&self, device_id: &str) -> EngineResult<()> {
        let registered = self.registry.lock().get(device_id).cloned();
        let Some(handle) = registered else {
            match self.remote.get(device_id)? {
                Some(record) => self.open_device(device_id, &record),
                None => debug!(device_id = %device_id, "update for a device that no longer exists"),
            }
            return Ok(());
        };

        // The record is read under the session lock so that an upload in
        // flight lands in the store before it.
        let mut session = handle.lock();
        let Some(record) = self.remote.get(device_id)? else {
            drop(session);
            self.remove_if_same(device_id, &handle);
            return Ok(());
        };
        let applied = DeviceRecord::from_value(&record).and_then(|record| session.apply_record(&record));
        drop(session);
        if let Err(e) = applied {
            self.session_failed(device_id, &e);
            if self.remove_if_same(device_id, &handle) {
                self.delete_remote(device_id);
            }
        }
        Ok(())
    }

    /// Runs one poll cycle.
    ///
    /// Disconnected sessions are removed (and deleted remotely). Every
    /// surviving session's observed changes are uploaded, stamped with the
    /// provenance marker, while its lock is held. An upload the store
    /// rejects is handed back to the session and retried on the next tick.
    pub fn poll_tick(&self) -> PollReport {
        let mut report = PollReport::default();

        for (device_id, handle) in self.snapshot_registry() {
            let connected = handle.lock().is_connected();
            if !connected {
                warn!(device_id = %device_id, "device disconnected");
                if self.remove_if_same(&device_id, &handle) {
                    self.delete_remote(&device_id);
                    report.removed.push(device_id);
                }
                continue;
            }

            let mut session = handle.lock();
            let upload = match session.pending_changes() {
                Ok(Some(upload)) => upload,
                Ok(None) => continue,
                Err(e) => {
                    drop(session);
                    self.session_failed(&device_id, &e);
                    if self.remove_if_same(&device_id, &handle) {
                        self.delete_remote(&device_id);
                        report.removed.push(device_id);
                    }
                    continue;
                }
            };

            if !self.is_same(&device_id, &handle) {
                debug!(device_id = %device_id, "session replaced during poll, dropping upload");
                continue;
            }
            match self
                .remote
                .upload_changes(&upload, &self.config.provenance_marker)
            {
                Ok(()) => {
                    debug!(device_id = %device_id, fields = upload.field_count(), "changes uploaded");
                    let mut stats = self.stats.write();
                    stats.uploads += 1;
                    stats.fields_uploaded += upload.field_count() as u64;
                    report.uploads += 1;
                }
                Err(e) => {
                    warn!(device_id = %device_id, error = %e, "upload failed, retrying next tick");
                    session.defer_upload(upload);
                    self.stats.write().last_error = Some(e.to_string());
                }
            }
        }

        self.stats.write().poll_ticks += 1;
        report
    }

    /// Stops the background threads and closes every session.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotRunning`] if the gateway was not started.
    pub fn shutdown(&self) -> EngineResult<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Err(EngineError::NotRunning);
        }
        info!("gateway shutting down");
        self.remote.unsubscribe();

        let threads: Vec<JoinHandle<()>> = self.threads.lock().drain(..).collect();
        for handle in threads {
            if handle.join().is_err() {
                error!("background thread panicked");
            }
        }

        self.close_all();
        Ok(())
    }

    /// Closes every session and empties the registry.
    pub fn close_all(&self) {
        let sessions: Vec<(String, SessionHandle)> = self.registry.lock().drain().collect();
        for (device_id, handle) in sessions {
            handle.lock().close();
            debug!(device_id = %device_id, "session closed");
        }
    }

    fn snapshot_registry(&self) -> Vec<(String, SessionHandle)> {
        self.registry
            .lock()
            .iter()
            .map(|(id, handle)| (id.clone(), Arc::clone(handle)))
            .collect()
    }

    fn is_same(&self, device_id: &str, handle: &SessionHandle) -> bool {
        self.registry
            .lock()
            .get(device_id)
            .is_some_and(|current| Arc::ptr_eq(current, handle))
    }

    // Removes and closes the session; returns true if one was registered.
    fn remove_session(&self, device_id: &str) -> bool {
        let removed = self.registry.lock().remove(device_id);
        match removed {
            Some(handle) => {
                handle.lock().close();
                self.stats.write().sessions_removed += 1;
                info!(device_id = %device_id, "session removed");
                true
            }
            None => false,
        }
    }

    // Like `remove_session`, but only if `handle` is still the registered one.
    fn remove_if_same(&self, device_id: &str, handle: &SessionHandle) -> bool {
        let removed = {
            let mut registry = self.registry.lock();
            match registry.get(device_id) {
                Some(current) if Arc::ptr_eq(current, handle) => registry.remove(device_id),
                _ => None,
            }
        };
        match removed {
            Some(handle) => {
                handle.lock().close();
                self.stats.write().sessions_removed += 1;
                info!(device_id = %device_id, "session removed");
                true
            }
            None => false,
        }
    }

    fn delete_remote(&self, device_id: &str) {
        match self.remote.delete_device(device_id) {
            Ok(()) => warn!(device_id = %device_id, "device entry deleted"),
            Err(e) => warn!(device_id = %device_id, error = %e, "could not delete device entry"),
        }
    }

    fn session_failed(&self, device_id: &str, error: &CoreError) {
        warn!(
            device_id = %device_id,
            kind = ?error.kind(),
            error = %error,
            "device session failed"
        );
        let mut stats = self.stats.write();
        stats.session_failures += 1;
        stats.last_error = Some(error.to_string());
    }
}

impl<R, F> Orchestrator<R, F>
where
    R: RemoteStore + 'static,
    F: DeviceClientFactory + 'static,
{
    /// Subscribes to the remote store and starts the listener and poll
    /// threads.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::AlreadyRunning`] if already started, or the
    /// store's error if subscribing fails.
    pub fn start(self: &Arc<Self>) -> EngineResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(EngineError::AlreadyRunning);
        }

        let events = match self.remote.subscribe() {
            Ok(events) => events,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };

        let listener = Arc::clone(self);
        let poller = Arc::clone(self);
        let spawned = spawn("plcsync-listener", move || listener.listen(events)).and_then(|first| {
            self.threads.lock().push(first);
            spawn("plcsync-poll", move || poller.poll_loop())
        });
        match spawned {
            Ok(handle) => self.threads.lock().push(handle),
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                self.remote.unsubscribe();
                return Err(e);
            }
        }

        info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            marker = %self.config.provenance_marker,
            "gateway started"
        );
        Ok(())
    }

    fn listen(&self, events: Receiver<RemoteEvent>) {
        while self.is_running() {
            match events.recv_timeout(self.config.listener_poll) {
                Ok(event) => {
                    if let Err(e) = self.on_remote_event(&event) {
                        warn!(path = %event.path, error = %e, "remote event rejected");
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        debug!("listener stopped");
    }

    fn poll_loop(&self) {
        while self.is_running() {
            self.poll_tick();
            self.sleep_while_running(self.config.poll_interval);
        }
        debug!("poller stopped");
    }

    fn sleep_while_running(&self, total: Duration) {
        let deadline = Instant::now() + total;
        while self.is_running() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep(self.config.shutdown_slice.min(deadline - now));
        }
    }
}

fn spawn<T>(name: &'static str, body: T) -> EngineResult<JoinHandle<()>>
where
    T: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(body)
        .map_err(|source| EngineError::Spawn { name, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::memory::MemoryRemoteStore;
    use plcsync_codec::{DataType, FieldOffset, FieldValue};
    use plcsync_core::device::memory::{MemoryDeviceFactory, SimulatedPlc};
    use serde_json::{json, Map};

    fn record(marker: &str, int_value: i64) -> Value {
        json!({
            "plc_name": "press",
            "changer_id": marker,
            "plc_parameters": {"Ip_Address": "plc", "Rack": 0, "Slot": 1},
            "new": {
                "plc_informations": {},
                "datablocks": {
                    "data_block_names": ["DB1"],
                    "DB1": {"size": 4, "data": [
                        {"Offset": 0, "Data_type": "Int", "Value": int_value},
                        {"Offset": 2.1, "Data_type": "Bool", "Value": true}
                    ]}
                }
            }
        })
    }

    type TestGateway = Orchestrator<MemoryRemoteStore, MemoryDeviceFactory>;

    fn gateway(root: Value) -> (TestGateway, Arc<SimulatedPlc>) {
        let plc = Arc::new(SimulatedPlc::new("plc").with_block(1, 4));
        let factory = MemoryDeviceFactory::new();
        factory.register(Arc::clone(&plc));
        let gateway = Orchestrator::new(
            GatewayConfig::default(),
            Arc::new(MemoryRemoteStore::with_root(root)),
            Arc::new(factory),
        );
        (gateway, plc)
    }

    fn bootstrap(gateway: &TestGateway) {
        let root = gateway.remote().snapshot();
        gateway
            .on_remote_event(&RemoteEvent::put("/", Some(root)))
            .unwrap();
    }

    #[test]
    fn root_put_opens_and_promotes() {
        let (gateway, plc) = gateway(json!({"dev1": record("operator", 12)}));
        bootstrap(&gateway);

        assert!(gateway.is_registered("dev1"));
        assert_eq!(
            plc.get_field(1, FieldOffset::byte(0), DataType::Int),
            Some(FieldValue::Int(12))
        );
        let store = gateway.remote();
        assert!(store.get("dev1/new").unwrap().is_none());
        assert!(store.get("dev1/current").unwrap().is_some());
        assert_eq!(store.changer_id("dev1").unwrap().as_deref(), Some("server"));
        assert_eq!(gateway.stats().sessions_opened, 1);
    }

    #[test]
    fn bad_record_is_deleted() {
        let mut bad = record("operator", 1);
        bad["new"]["datablocks"]["DB1"]["size"] = json!(40);
        let (gateway, plc) = gateway(json!({"dev1": bad, "dev2": {"plc_name": "x"}}));
        bootstrap(&gateway);

        assert_eq!(gateway.session_count(), 0);
        assert!(gateway.remote().get("dev1").unwrap().is_none());
        assert!(gateway.remote().get("dev2").unwrap().is_none());
        assert_eq!(plc.write_count(), 0);
        assert_eq!(gateway.stats().session_failures, 2);
    }

    #[test]
    fn own_writes_are_ignored() {
        let (gateway, _) = gateway(json!({"dev1": record("operator", 12)}));
        bootstrap(&gateway);
        let before = gateway.stats();

        let mut changes = Map::new();
        changes.insert("dev1/permission/to_write".into(), json!(true));
        gateway
            .on_remote_event(&RemoteEvent::patch("/", changes))
            .unwrap();
        gateway
            .on_remote_event(&RemoteEvent::put("/dev1", Some(record("server", 99))))
            .unwrap();

        let after = gateway.stats();
        assert_eq!(after.events_ignored, before.events_ignored + 2);
        assert_eq!(after.sessions_opened, before.sessions_opened);
    }

    #[test]
    fn device_put_without_marker_is_deleted() {
        let (gateway, _) = gateway(json!({"dev1": record("operator", 12)}));
        bootstrap(&gateway);

        let mut unmarked = record("x", 1);
        unmarked.as_object_mut().unwrap().remove("changer_id");
        let err = gateway
            .on_remote_event(&RemoteEvent::put("/dev1", Some(unmarked)))
            .unwrap_err();
        assert!(matches!(err, EngineError::MissingProvenance { .. }));
        assert!(!gateway.is_registered("dev1"));
        assert!(gateway.remote().get("dev1").unwrap().is_none());
    }

    #[test]
    fn deletion_removes_session() {
        let (gateway, _) = gateway(json!({"dev1": record("operator", 12)}));
        bootstrap(&gateway);

        gateway
            .on_remote_event(&RemoteEvent::put("/dev1", None))
            .unwrap();
        assert!(!gateway.is_registered("dev1"));
        assert_eq!(gateway.stats().sessions_removed, 1);

        gateway
            .on_remote_event(&RemoteEvent::put("/dev1", None))
            .unwrap();
        assert_eq!(gateway.stats().sessions_removed, 1);
    }

    #[test]
    fn malformed_events_rejected() {
        let (gateway, _) = gateway(json!({}));
        let err = gateway
            .on_remote_event(&RemoteEvent::put("/dev1/current", None))
            .unwrap_err();
        assert!(matches!(err, EngineError::UnexpectedEventShape { .. }));
        assert_eq!(gateway.stats().events_rejected, 1);
    }

    #[test]
    fn poll_uploads_and_removes() {
        let (gateway, plc) = gateway(json!({"dev1": record("operator", 12)}));
        bootstrap(&gateway);

        assert_eq!(gateway.poll_tick(), PollReport::default());

        plc.set_field(1, FieldOffset::byte(0), &FieldValue::Int(-8)).unwrap();
        let report = gateway.poll_tick();
        assert_eq!(report.uploads, 1);
        assert_eq!(
            gateway
                .remote()
                .get("dev1/current/datablocks/DB1/data/0/Value")
                .unwrap(),
            Some(json!(-8))
        );

        plc.set_reachable(false);
        let report = gateway.poll_tick();
        assert_eq!(report.removed, vec!["dev1".to_string()]);
        assert!(gateway.remote().get("dev1").unwrap().is_none());
    }

    #[test]
    fn registered_devices_listing() {
        let (gateway, _) = gateway(json!({"dev1": record("operator", 12)}));
        bootstrap(&gateway);
        let devices = gateway.registered_devices();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].device_id, "dev1");
        assert_eq!(devices[0].device_name, "press");
        assert!(devices[0].connected);
        assert_eq!(devices[0].state, SessionState::Ready);
    }

    #[test]
    fn start_twice_and_stop_twice() {
        let (gateway, _) = gateway(json!({}));
        let gateway = Arc::new(gateway);
        gateway.start().unwrap();
        assert!(matches!(gateway.start(), Err(EngineError::AlreadyRunning)));
        gateway.shutdown().unwrap();
        assert!(matches!(gateway.shutdown(), Err(EngineError::NotRunning)));
    }

}
