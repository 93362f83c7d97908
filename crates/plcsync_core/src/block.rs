//! Memory blocks: one data block buffer plus its field template.

use crate::device::DeviceClient;
use crate::error::{CoreError, CoreResult};
use crate::field::FieldDescriptor;
use crate::record::{block_name, BlockSpec, MAX_BLOCK_SIZE};
use plcsync_codec::{decode_field, BlockEncoder, CodecError, FieldValue};
use std::collections::BTreeMap;
use tracing::debug;

/// Observed field changes keyed by the field's declared index.
pub type ChangeSet = BTreeMap<usize, FieldValue>;

/// One data block: its number, size, template and last-applied buffer.
#[derive(Debug, Clone)]
pub struct MemoryBlock {
    number: u16,
    size: usize,
    fields: Vec<FieldDescriptor>,
    buffer: Vec<u8>,
}

impl MemoryBlock {
    /// Builds a block, encoding every field into a zero-filled buffer.
    ///
    /// Fields are sorted by offset first.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::InvalidBlock`] for a zero block number, a
    /// zero size or a size above [`MAX_BLOCK_SIZE`], and with
    /// [`CoreError::InvalidFieldSpec`] for duplicate offsets
    /// or fields that do not fit.
    pub fn build(number: u16, size: usize, mut fields: Vec<FieldDescriptor>) -> CoreResult<Self> {
        if number == 0 {
            return Err(CoreError::invalid_block(block_name(number), "block number must be positive"));
        }
        if size == 0 {
            return Err(CoreError::invalid_block(block_name(number), "size must be positive"));
        }
        if size > MAX_BLOCK_SIZE {
            return Err(CoreError::invalid_block(
                block_name(number),
                format!("size {size} exceeds {MAX_BLOCK_SIZE} bytes"),
            ));
        }

        fields.sort_by_key(|field| field.offset);
        if let Some(pair) = fields.windows(2).find(|pair| pair[0].offset == pair[1].offset) {
            return Err(CoreError::InvalidFieldSpec {
                index: pair[1].index,
                reason: format!("offset {} already used by field #{}", pair[1].offset, pair[0].index),
            });
        }

        let mut encoder = BlockEncoder::new(size);
        for field in &fields {
            encoder
                .put(field.offset, &field.value)
                .map_err(|e| field_error(field.index, e))?;
        }

        Ok(Self {
            number,
            size,
            fields,
            buffer: encoder.into_bytes(),
        })
    }

    /// Builds a block from its declaration.
    pub fn from_spec(spec: &BlockSpec) -> CoreResult<Self> {
        Self::build(spec.number, spec.size, spec.fields.clone())
    }

    /// Block number.
    pub fn number(&self) -> u16 {
        self.number
    }

    /// Declared size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Offset-sorted field template.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Last-applied buffer.
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Decodes every template field from the retained buffer.
    pub fn values(&self) -> CoreResult<Vec<(usize, FieldValue)>> {
        self.fields
            .iter()
            .map(|field| {
                decode_field(&self.buffer, field.offset, field.data_type())
                    .map(|value| (field.index, value))
                    .map_err(CoreError::from)
            })
            .collect()
    }

    /// Compares a freshly read buffer with the retained one and adopts it.
    ///
    /// Returns `None` when no template field changed.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::SizeMismatch`] if `fresh` is not exactly
    /// `size` bytes; the retained buffer is then left untouched.
    pub fn diff(&mut self, fresh: Vec<u8>) -> CoreResult<Option<ChangeSet>> {
        if fresh.len() != self.size {
            return Err(CoreError::SizeMismatch {
                block: self.number,
                expected: self.size,
                actual: fresh.len(),
            });
        }

        let mut changes = ChangeSet::new();
        for field in &self.fields {
            let data_type = field.data_type();
            let old = decode_field(&self.buffer, field.offset, data_type)?;
            let new = decode_field(&fresh, field.offset, data_type)?;
            if old != new {
                changes.insert(field.index, new);
            }
        }
        self.buffer = fresh;

        if changes.is_empty() {
            Ok(None)
        } else {
            debug!(block = self.number, changed = changes.len(), "data block changed");
            Ok(Some(changes))
        }
    }

    /// Checks the declared size against the device.
    ///
    /// Reading `size` bytes must succeed and reading `size + 2` must fail.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::DatablockSize`] naming the failed probe, or
    /// with [`CoreError::Read`] if the link dropped during the probe.
    pub fn verify_size(&self, reader: &mut dyn DeviceClient) -> CoreResult<()> {
        match reader.read(self.number, 0, self.size) {
            Ok(_) => {}
            Err(source) if source.is_connection_error() => {
                return Err(CoreError::Read {
                    block: self.number,
                    source,
                })
            }
            Err(source) => {
                return Err(CoreError::DatablockSize {
                    block: self.number,
                    declared: self.size,
                    reason: format!("declared size is larger than the device block ({source})"),
                })
            }
        }

        let Some(past_end) = self.size.checked_add(2) else {
            return Ok(());
        };
        match reader.read(self.number, 0, past_end) {
            Ok(_) => Err(CoreError::DatablockSize {
                block: self.number,
                declared: self.size,
                reason: "declared size is smaller than the device block".into(),
            }),
            Err(source) if source.is_connection_error() => Err(CoreError::Read {
                block: self.number,
                source,
            }),
            Err(_) => Ok(()),
        }
    }

    /// Writes the retained buffer to the device.
    pub fn write_to(&self, writer: &mut dyn DeviceClient) -> CoreResult<()> {
        writer
            .write(self.number, 0, &self.buffer)
            .map_err(|source| CoreError::Write {
                block: self.number,
                source,
            })
    }

    /// Reads the live buffer from the device.
    pub fn read_from(&self, reader: &mut dyn DeviceClient) -> CoreResult<Vec<u8>> {
        reader
            .read(self.number, 0, self.size)
            .map_err(|source| CoreError::Read {
                block: self.number,
                source,
            })
    }
}

fn field_error(index: usize, error: CodecError) -> CoreError {
    CoreError::InvalidFieldSpec {
        index,
        reason: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::memory::{MemoryDeviceFactory, SimulatedPlc};
    use crate::device::{ConnectionParams, DeviceClientFactory};
    use plcsync_codec::{encode_field, FieldOffset};
    use std::sync::Arc;

    fn field(index: usize, byte: usize, bit: u8, value: FieldValue) -> FieldDescriptor {
        FieldDescriptor::new(index, FieldOffset::new(byte, bit).unwrap(), value).unwrap()
    }

    fn sample() -> MemoryBlock {
        MemoryBlock::build(
            1,
            8,
            vec![
                field(0, 4, 0, FieldValue::Real(1.5)),
                field(1, 0, 3, FieldValue::Bool(true)),
                field(2, 2, 0, FieldValue::Int(-2)),
            ],
        )
        .unwrap()
    }

    #[test]
    fn build_sorts_and_encodes() {
        let block = sample();
        let offsets: Vec<usize> = block.fields().iter().map(|f| f.offset.byte).collect();
        assert_eq!(offsets, vec![0, 2, 4]);
        assert_eq!(block.buffer().len(), 8);
        assert_eq!(block.buffer()[0], 0b0000_1000);
        assert_eq!(&block.buffer()[2..4], &(-2i16).to_be_bytes());

        let values = block.values().unwrap();
        assert_eq!(values[0], (1, FieldValue::Bool(true)));
    }

    #[test]
    fn build_rejects_bad_blocks() {
        assert!(matches!(
            MemoryBlock::build(0, 4, vec![]),
            Err(CoreError::InvalidBlock { .. })
        ));
        assert!(matches!(
            MemoryBlock::build(1, 0, vec![]),
            Err(CoreError::InvalidBlock { .. })
        ));
        assert!(matches!(
            MemoryBlock::build(1, MAX_BLOCK_SIZE + 1, vec![]),
            Err(CoreError::InvalidBlock { .. })
        ));
        assert!(matches!(
            MemoryBlock::build(1, usize::MAX, vec![]),
            Err(CoreError::InvalidBlock { .. })
        ));
        assert!(matches!(
            MemoryBlock::build(1, 4, vec![field(0, 3, 0, FieldValue::Int(1))]),
            Err(CoreError::InvalidFieldSpec { index: 0, .. })
        ));
        assert!(matches!(
            MemoryBlock::build(
                1,
                4,
                vec![field(0, 0, 0, FieldValue::Int(1)), field(5, 0, 0, FieldValue::Int(2))]
            ),
            Err(CoreError::InvalidFieldSpec { index: 5, .. })
        ));
    }

    #[test]
    fn diff_reports_declared_indices() {
        let mut block = sample();
        let mut fresh = block.buffer().to_vec();
        encode_field(&mut fresh, FieldOffset::byte(2), &FieldValue::Int(77)).unwrap();
        encode_field(&mut fresh, FieldOffset::new(0, 3).unwrap(), &FieldValue::Bool(false)).unwrap();

        let changes = block.diff(fresh.clone()).unwrap().unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[&2], FieldValue::Int(77));
        assert_eq!(changes[&1], FieldValue::Bool(false));

        assert!(block.diff(fresh).unwrap().is_none());
    }

    #[test]
    fn diff_ignores_bytes_outside_template() {
        let mut block = sample();
        let mut fresh = block.buffer().to_vec();
        fresh[1] = 0xff;
        assert!(block.diff(fresh).unwrap().is_none());
    }

    #[test]
    fn diff_nan_is_stable() {
        let mut block = MemoryBlock::build(1, 4, vec![field(0, 0, 0, FieldValue::Real(f32::NAN))]).unwrap();
        let fresh = block.buffer().to_vec();
        assert!(block.diff(fresh).unwrap().is_none());
    }

    #[test]
    fn diff_size_mismatch_keeps_buffer() {
        let mut block = sample();
        let before = block.buffer().to_vec();
        let err = block.diff(vec![0u8; 6]).unwrap_err();
        assert!(matches!(
            err,
            CoreError::SizeMismatch {
                expected: 8,
                actual: 6,
                ..
            }
        ));
        assert_eq!(block.buffer(), &before[..]);
    }

    fn connected_reader(device_size: usize) -> Box<dyn DeviceClient> {
        let factory = MemoryDeviceFactory::new();
        factory.register(Arc::new(SimulatedPlc::new("plc").with_block(1, device_size)));
        let mut client = factory.create_client();
        client.connect(&ConnectionParams::new("plc", 0, 1)).unwrap();
        client
    }

    #[test]
    fn size_probe() {
        let block = sample();

        assert!(block.verify_size(connected_reader(8).as_mut()).is_ok());
        // One byte of slack still passes the second probe.
        assert!(block.verify_size(connected_reader(9).as_mut()).is_ok());

        let err = block.verify_size(connected_reader(6).as_mut()).unwrap_err();
        assert!(matches!(err, CoreError::DatablockSize { ref reason, .. } if reason.contains("larger")));

        let err = block.verify_size(connected_reader(12).as_mut()).unwrap_err();
        assert!(matches!(err, CoreError::DatablockSize { ref reason, .. } if reason.contains("smaller")));
    }

    #[test]
    fn size_probe_disconnected() {
        let block = sample();
        let mut reader = connected_reader(8);
        reader.disconnect();
        assert!(matches!(
            block.verify_size(reader.as_mut()),
            Err(CoreError::Read { .. })
        ));
    }
}
