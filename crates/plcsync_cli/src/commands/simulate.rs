//! Simulate command implementation.
//!
//! Runs a complete gateway against an in-memory remote store holding one
//! record and a simulated controller whose blocks match the record.

use super::{load_record, select_version};
use crate::error::{CliError, CliResult};
use plcsync_core::device::memory::{MemoryDeviceFactory, SimulatedPlc};
use plcsync_core::DeviceRecord;
use plcsync_engine::{DeviceStatus, GatewayConfig, GatewayStats, MemoryRemoteStore, Orchestrator};
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::info;

const STARTUP_GRACE: Duration = Duration::from_secs(5);
const CHECK_EVERY: Duration = Duration::from_millis(5);
const DEFAULT_AUTHOR: &str = "operator";

/// Options of a simulation run.
#[derive(Debug, Clone)]
pub struct SimulateOptions {
    /// Device id the record is stored under.
    pub device_id: String,
    /// Poll ticks to run before stopping.
    pub ticks: u64,
    /// Poll interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Provenance marker of the gateway.
    pub marker: String,
}

/// What the gateway looked like when the run ended.
#[derive(Debug, Serialize)]
pub struct SimulationReport {
    /// Registered devices.
    pub devices: Vec<DeviceStatus>,
    /// Gateway counters.
    pub stats: GatewayStats,
    /// The remote tree.
    pub remote: Value,
}

/// Runs the simulate command.
pub fn run(path: &Path, options: &SimulateOptions) -> Result<(), Box<dyn std::error::Error>> {
    let loaded = load_record(path)?;
    let report = simulate(loaded.raw, &loaded.record, options)?;

    println!("Registered devices: {}", report.devices.len());
    for device in &report.devices {
        println!(
            "  {} ({}) connected={}",
            device.device_id, device.device_name, device.connected
        );
    }
    println!();
    println!("Stats:");
    println!("{}", serde_json::to_string_pretty(&report.stats)?);
    println!();
    println!("Remote tree:");
    println!("{}", serde_json::to_string_pretty(&report.remote)?);
    Ok(())
}

/// Runs a gateway until it has completed `options.ticks` poll ticks.
pub fn simulate(mut raw: Value, record: &DeviceRecord, options: &SimulateOptions) -> CliResult<SimulationReport> {
    let plc = simulated_plc(record)?;
    let factory = MemoryDeviceFactory::new();
    factory.register(Arc::new(plc));

    if let Some(entry) = raw.as_object_mut() {
        if !entry.contains_key("changer_id") {
            info!(author = DEFAULT_AUTHOR, "record has no changer_id, stamping one");
            entry.insert("changer_id".into(), Value::String(DEFAULT_AUTHOR.into()));
        }
    }
    let mut root = Map::new();
    root.insert(options.device_id.clone(), raw);
    let store = Arc::new(MemoryRemoteStore::with_root(Value::Object(root)));

    let poll_interval = Duration::from_millis(options.poll_interval_ms);
    let config = GatewayConfig::default()
        .with_poll_interval(poll_interval)
        .with_provenance_marker(options.marker.clone());
    let gateway = Arc::new(Orchestrator::new(config, Arc::clone(&store), Arc::new(factory)));

    gateway.start()?;
    let budget = poll_interval
        .saturating_mul(u32::try_from(options.ticks.saturating_add(1)).unwrap_or(u32::MAX))
        .saturating_add(STARTUP_GRACE);
    let deadline = Instant::now() + budget;
    while Instant::now() < deadline {
        let stats = gateway.stats();
        let settled = stats.sessions_opened + stats.session_failures + stats.events_rejected > 0;
        if settled && stats.poll_ticks >= options.ticks {
            break;
        }
        thread::sleep(CHECK_EVERY);
    }

    let report = SimulationReport {
        devices: gateway.registered_devices(),
        stats: gateway.stats(),
        remote: store.snapshot(),
    };
    gateway.shutdown()?;
    Ok(report)
}

fn simulated_plc(record: &DeviceRecord) -> CliResult<SimulatedPlc> {
    let (_, payload) = select_version(record, None)?;
    let specs = payload.block_specs()?;
    if specs.is_empty() {
        return Err(CliError::usage("record declares no data blocks"));
    }
    let plc = SimulatedPlc::new(record.plc_parameters.ip_address.clone());
    for spec in specs {
        plc.add_block(spec.number, spec.size);
    }
    Ok(plc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use plcsync_testkit::{sample_builder, sample_record, TempRecordFile};

    fn options() -> SimulateOptions {
        SimulateOptions {
            device_id: "dev1".into(),
            ticks: 2,
            poll_interval_ms: 10,
            marker: "gateway".into(),
        }
    }

    #[test]
    fn provisions_from_a_record_file() {
        let file = TempRecordFile::new(&sample_record()).unwrap();
        let loaded = load_record(file.path()).unwrap();
        let report = simulate(loaded.raw, &loaded.record, &options()).unwrap();

        assert_eq!(report.devices.len(), 1);
        assert_eq!(report.devices[0].device_name, "press-1");
        assert_eq!(report.stats.sessions_opened, 1);
        assert!(report.stats.poll_ticks >= 2);
        assert_eq!(report.remote["dev1"]["changer_id"], "gateway");
        assert!(report.remote["dev1"].get("new").is_none());
        assert!(report.remote["dev1"]["current"]["datablocks"]["DB1"].is_object());
    }

    #[test]
    fn unmarked_records_get_an_author() {
        let raw = sample_builder().changer_id(None).build();
        let record = DeviceRecord::from_value(&raw).unwrap();
        let report = simulate(raw, &record, &options()).unwrap();
        assert_eq!(report.devices.len(), 1);
    }
}
