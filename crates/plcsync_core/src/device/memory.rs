//! In-memory controller simulation for tests and demos.

use super::{ConnectionParams, DeviceClient, DeviceClientFactory};
use crate::error::{DeviceError, DeviceResult};
use parking_lot::RwLock;
use plcsync_codec::{decode_field, encode_field, CodecResult, DataType, FieldOffset, FieldValue};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// A simulated controller with a fixed set of data blocks.
///
/// Reads past a block's size fail, exactly like a real controller, so the
/// size probe behaves the same against the simulation.
///
/// # Example
///
/// ```rust
/// use plcsync_core::device::memory::SimulatedPlc;
///
/// let plc = SimulatedPlc::new("10.0.0.5").with_block(1, 16);
/// assert_eq!(plc.block(1).unwrap().len(), 16);
/// ```
#[derive(Debug)]
pub struct SimulatedPlc {
    address: String,
    state: RwLock<PlcState>,
}

#[derive(Debug)]
struct PlcState {
    blocks: BTreeMap<u16, Vec<u8>>,
    reachable: bool,
    reject_writes: bool,
    // Bumped whenever the link drops so existing clients notice.
    link_epoch: u64,
    writes: u64,
}

impl SimulatedPlc {
    /// Creates a reachable controller without blocks.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            state: RwLock::new(PlcState {
                blocks: BTreeMap::new(),
                reachable: true,
                reject_writes: false,
                link_epoch: 0,
                writes: 0,
            }),
        }
    }

    /// Adds a zero-filled block.
    #[must_use]
    pub fn with_block(self, number: u16, size: usize) -> Self {
        self.add_block(number, size);
        self
    }

    /// Adds (or replaces) a zero-filled block.
    pub fn add_block(&self, number: u16, size: usize) {
        self.state.write().blocks.insert(number, vec![0u8; size]);
    }

    /// Returns the controller's address.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Makes the controller reachable or unreachable.
    ///
    /// Going unreachable drops every open connection.
    pub fn set_reachable(&self, reachable: bool) {
        let mut state = self.state.write();
        if state.reachable && !reachable {
            state.link_epoch += 1;
        }
        state.reachable = reachable;
    }

    /// Makes every subsequent write fail.
    pub fn set_reject_writes(&self, reject: bool) {
        self.state.write().reject_writes = reject;
    }

    /// Returns a copy of a block's memory.
    pub fn block(&self, number: u16) -> Option<Vec<u8>> {
        self.state.read().blocks.get(&number).cloned()
    }

    /// Number of block writes accepted so far.
    pub fn write_count(&self) -> u64 {
        self.state.read().writes
    }

    /// Overwrites raw bytes, as the control program would.
    pub fn poke(&self, number: u16, start: usize, data: &[u8]) -> DeviceResult<()> {
        let mut state = self.state.write();
        let block = state
            .blocks
            .get_mut(&number)
            .ok_or(DeviceError::UnknownBlock { block: number })?;
        let end = checked_end(number, start, data.len(), block.len())?;
        block[start..end].copy_from_slice(data);
        Ok(())
    }

    /// Writes one typed field, as the control program would.
    pub fn set_field(&self, number: u16, offset: FieldOffset, value: &FieldValue) -> CodecResult<bool> {
        let mut state = self.state.write();
        match state.blocks.get_mut(&number) {
            Some(block) => encode_field(block, offset, value).map(|()| true),
            None => Ok(false),
        }
    }

    /// Reads one typed field.
    pub fn get_field(&self, number: u16, offset: FieldOffset, data_type: DataType) -> Option<FieldValue> {
        let state = self.state.read();
        let block = state.blocks.get(&number)?;
        decode_field(block, offset, data_type).ok()
    }

    fn link_epoch(&self) -> Option<u64> {
        let state = self.state.read();
        state.reachable.then_some(state.link_epoch)
    }

    fn read_range(&self, number: u16, start: usize, len: usize) -> DeviceResult<Vec<u8>> {
        let state = self.state.read();
        let block = state
            .blocks
            .get(&number)
            .ok_or(DeviceError::UnknownBlock { block: number })?;
        let end = checked_end(number, start, len, block.len())?;
        Ok(block[start..end].to_vec())
    }

    fn write_range(&self, number: u16, start: usize, data: &[u8]) -> DeviceResult<()> {
        let mut state = self.state.write();
        if state.reject_writes {
            return Err(DeviceError::WriteRejected {
                block: number,
                reason: "write protection active".into(),
            });
        }
        let block = state
            .blocks
            .get_mut(&number)
            .ok_or(DeviceError::UnknownBlock { block: number })?;
        let end = checked_end(number, start, data.len(), block.len())?;
        block[start..end].copy_from_slice(data);
        state.writes += 1;
        Ok(())
    }
}

fn checked_end(block: u16, start: usize, len: usize, size: usize) -> DeviceResult<usize> {
    match start.checked_add(len) {
        Some(end) if end <= size => Ok(end),
        _ => Err(DeviceError::OutOfRange {
            block,
            start,
            len,
            size,
        }),
    }
}

/// Hands out clients that dial simulated controllers by address.
#[derive(Debug, Clone, Default)]
pub struct MemoryDeviceFactory {
    plcs: Arc<RwLock<HashMap<String, Arc<SimulatedPlc>>>>,
}

impl MemoryDeviceFactory {
    /// Creates an empty factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes a controller dialable at its address.
    pub fn register(&self, plc: Arc<SimulatedPlc>) {
        self.plcs.write().insert(plc.address().to_string(), plc);
    }

    /// Looks up a controller by address.
    pub fn plc(&self, address: &str) -> Option<Arc<SimulatedPlc>> {
        self.plcs.read().get(address).cloned()
    }
}

impl DeviceClientFactory for MemoryDeviceFactory {
    fn create_client(&self) -> Box<dyn DeviceClient> {
        Box::new(MemoryDeviceClient {
            plcs: Arc::clone(&self.plcs),
            link: None,
        })
    }
}

/// A client connected to a [`SimulatedPlc`].
#[derive(Debug)]
pub struct MemoryDeviceClient {
    plcs: Arc<RwLock<HashMap<String, Arc<SimulatedPlc>>>>,
    link: Option<(Arc<SimulatedPlc>, u64)>,
}

impl MemoryDeviceClient {
    fn connected_plc(&self) -> DeviceResult<&SimulatedPlc> {
        match &self.link {
            Some((plc, epoch)) if plc.link_epoch() == Some(*epoch) => Ok(plc.as_ref()),
            _ => Err(DeviceError::NotConnected),
        }
    }
}

impl DeviceClient for MemoryDeviceClient {
    fn connect(&mut self, params: &ConnectionParams) -> DeviceResult<()> {
        let plc = self.plcs.read().get(&params.address).cloned().ok_or_else(|| {
            DeviceError::ConnectionRefused {
                address: params.address.clone(),
                reason: "no controller at this address".into(),
            }
        })?;
        let epoch = plc.link_epoch().ok_or_else(|| DeviceError::ConnectionRefused {
            address: params.address.clone(),
            reason: "controller unreachable".into(),
        })?;
        self.link = Some((plc, epoch));
        Ok(())
    }

    fn disconnect(&mut self) {
        self.link = None;
    }

    fn is_connected(&self) -> bool {
        self.connected_plc().is_ok()
    }

    fn read(&mut self, block: u16, start: usize, len: usize) -> DeviceResult<Vec<u8>> {
        self.connected_plc()?.read_range(block, start, len)
    }

    fn write(&mut self, block: u16, start: usize, data: &[u8]) -> DeviceResult<()> {
        self.connected_plc()?.write_range(block, start, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factory_with(plc: SimulatedPlc) -> (MemoryDeviceFactory, Arc<SimulatedPlc>) {
        let plc = Arc::new(plc);
        let factory = MemoryDeviceFactory::new();
        factory.register(Arc::clone(&plc));
        (factory, plc)
    }

    #[test]
    fn connect_and_read_write() {
        let (factory, plc) = factory_with(SimulatedPlc::new("10.0.0.1").with_block(1, 8));
        let mut client = factory.create_client();
        assert!(!client.is_connected());

        client.connect(&ConnectionParams::new("10.0.0.1", 0, 1)).unwrap();
        assert!(client.is_connected());

        client.write(1, 2, &[7, 8]).unwrap();
        assert_eq!(client.read(1, 0, 4).unwrap(), vec![0, 0, 7, 8]);
        assert_eq!(plc.write_count(), 1);
    }

    #[test]
    fn unknown_address_refused() {
        let (factory, _) = factory_with(SimulatedPlc::new("10.0.0.1"));
        let mut client = factory.create_client();
        let err = client.connect(&ConnectionParams::new("10.0.0.99", 0, 1)).unwrap_err();
        assert!(matches!(err, DeviceError::ConnectionRefused { .. }));
    }

    #[test]
    fn reads_past_block_fail() {
        let (factory, _) = factory_with(SimulatedPlc::new("plc").with_block(3, 10));
        let mut client = factory.create_client();
        client.connect(&ConnectionParams::new("plc", 0, 1)).unwrap();

        assert!(client.read(3, 0, 10).is_ok());
        assert!(matches!(
            client.read(3, 0, 12),
            Err(DeviceError::OutOfRange { size: 10, .. })
        ));
        assert!(matches!(
            client.read(4, 0, 1),
            Err(DeviceError::UnknownBlock { block: 4 })
        ));
    }

    #[test]
    fn unreachable_drops_links_until_reconnect() {
        let (factory, plc) = factory_with(SimulatedPlc::new("plc").with_block(1, 4));
        let params = ConnectionParams::new("plc", 0, 1);
        let mut client = factory.create_client();
        client.connect(&params).unwrap();

        plc.set_reachable(false);
        assert!(!client.is_connected());
        assert!(client.connect(&params).is_err());

        plc.set_reachable(true);
        assert!(!client.is_connected());
        client.connect(&params).unwrap();
        assert!(client.is_connected());
    }

    #[test]
    fn rejected_writes() {
        let (factory, plc) = factory_with(SimulatedPlc::new("plc").with_block(1, 4));
        let mut client = factory.create_client();
        client.connect(&ConnectionParams::new("plc", 0, 1)).unwrap();

        plc.set_reject_writes(true);
        assert!(matches!(
            client.write(1, 0, &[1]),
            Err(DeviceError::WriteRejected { .. })
        ));
        assert_eq!(plc.write_count(), 0);
    }

    #[test]
    fn typed_field_access() {
        let plc = SimulatedPlc::new("plc").with_block(1, 4);
        assert!(plc.set_field(1, FieldOffset::byte(0), &FieldValue::Int(-5)).unwrap());
        assert!(!plc.set_field(9, FieldOffset::byte(0), &FieldValue::Int(1)).unwrap());
        assert_eq!(
            plc.get_field(1, FieldOffset::byte(0), DataType::Int),
            Some(FieldValue::Int(-5))
        );
        plc.poke(1, 3, &[0xff]).unwrap();
        assert_eq!(plc.block(1).unwrap()[3], 0xff);
    }
}
