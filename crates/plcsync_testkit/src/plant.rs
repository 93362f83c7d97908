//! A simulated plant: controllers, remote store and gateway.

use plcsync_core::device::memory::{MemoryDeviceFactory, SimulatedPlc};
use plcsync_core::DeviceRecord;
use plcsync_engine::{GatewayConfig, MemoryRemoteStore, Orchestrator, RemoteEvent};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Gateway type used throughout the tests.
pub type TestGateway = Orchestrator<MemoryRemoteStore, MemoryDeviceFactory>;

/// Builds a controller whose blocks match the record's declared sizes.
///
/// Returns `None` if the record does not parse or declares no version.
pub fn plc_for_record(record: &Value) -> Option<SimulatedPlc> {
    let record = DeviceRecord::from_value(record).ok()?;
    let version = record.new.as_ref().or(record.current.as_ref())?;
    let specs = version.block_specs().ok()?;
    let plc = SimulatedPlc::new(record.plc_parameters.ip_address.clone());
    for spec in specs {
        plc.add_block(spec.number, spec.size);
    }
    Some(plc)
}

/// Controllers, an in-memory store and a gateway wired to both.
pub struct TestPlant {
    /// Dials the simulated controllers.
    pub factory: MemoryDeviceFactory,
    /// The remote store.
    pub store: Arc<MemoryRemoteStore>,
    /// The gateway under test.
    pub gateway: Arc<TestGateway>,
}

impl TestPlant {
    /// Creates a plant with an empty store and no controllers.
    pub fn new(config: GatewayConfig) -> Self {
        let factory = MemoryDeviceFactory::new();
        let store = Arc::new(MemoryRemoteStore::new());
        let gateway = Arc::new(Orchestrator::new(
            config,
            Arc::clone(&store),
            Arc::new(factory.clone()),
        ));
        Self {
            factory,
            store,
            gateway,
        }
    }

    /// Creates a plant whose store holds `devices` and whose controllers
    /// are sized to match them.
    pub fn with_devices(devices: &[(&str, Value)]) -> Self {
        Self::with_config_and_devices(GatewayConfig::default(), devices)
    }

    /// Like [`TestPlant::with_devices`] with a custom configuration.
    pub fn with_config_and_devices(config: GatewayConfig, devices: &[(&str, Value)]) -> Self {
        let mut root = Map::new();
        for (device_id, record) in devices {
            root.insert((*device_id).to_string(), record.clone());
        }

        let factory = MemoryDeviceFactory::new();
        for (_, record) in devices {
            if let Some(plc) = plc_for_record(record) {
                if factory.plc(plc.address()).is_none() {
                    factory.register(Arc::new(plc));
                }
            }
        }

        let store = Arc::new(MemoryRemoteStore::with_root(Value::Object(root)));
        let gateway = Arc::new(Orchestrator::new(
            config,
            Arc::clone(&store),
            Arc::new(factory.clone()),
        ));
        Self {
            factory,
            store,
            gateway,
        }
    }

    /// Makes a controller dialable.
    pub fn add_plc(&self, plc: SimulatedPlc) -> Arc<SimulatedPlc> {
        let plc = Arc::new(plc);
        self.factory.register(Arc::clone(&plc));
        plc
    }

    /// Looks up a controller by address.
    pub fn plc(&self, address: &str) -> Option<Arc<SimulatedPlc>> {
        self.factory.plc(address)
    }

    /// Delivers the initial root put the store sends on subscribe,
    /// without starting any threads.
    pub fn bootstrap(&self) {
        let root = self.store.snapshot();
        let _ = self.gateway.on_remote_event(&RemoteEvent::put("/", Some(root)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{field, sample_record, RecordBuilder};

    #[test]
    fn controllers_sized_from_records() {
        let plc = plc_for_record(&sample_record()).unwrap();
        assert_eq!(plc.address(), "10.0.0.5");
        assert_eq!(plc.block(1).unwrap().len(), 8);
        assert_eq!(plc.block(2).unwrap().len(), 256);
        assert!(plc_for_record(&serde_json::json!({"plc_name": "x"})).is_none());
    }

    #[test]
    fn bootstrap_registers_devices() {
        let other = RecordBuilder::new("other", "10.0.0.6")
            .block(4, 2, vec![field(0, "Int", 3)])
            .build();
        let plant = TestPlant::with_devices(&[("a", sample_record()), ("b", other)]);
        plant.bootstrap();
        assert_eq!(plant.gateway.session_count(), 2);
        assert!(plant.plc("10.0.0.6").is_some());
    }
}
