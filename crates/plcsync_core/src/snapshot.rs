//! Version snapshots.

use crate::block::MemoryBlock;
use crate::error::{CoreError, CoreResult};
use crate::record::{BlockSpec, VersionPayload};
use serde_json::{Map, Value};
use std::fmt;

/// Lifecycle stage of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VersionLabel {
    /// Waiting to be provisioned.
    New,
    /// Being applied as an update.
    Current,
    /// Confirmed on the device.
    Baseline,
}

impl VersionLabel {
    /// Lowercase name used in logs and remote paths.
    pub fn as_str(&self) -> &'static str {
        match self {
            VersionLabel::New => "new",
            VersionLabel::Current => "current",
            VersionLabel::Baseline => "baseline",
        }
    }
}

impl fmt::Display for VersionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An ordered set of memory blocks with a lifecycle label.
#[derive(Debug, Clone)]
pub struct VersionSnapshot {
    label: VersionLabel,
    metadata: Map<String, Value>,
    blocks: Vec<MemoryBlock>,
}

impl VersionSnapshot {
    /// Builds one block per declaration, sorted by block number.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::EmptySnapshot`] when `specs` is empty and
    /// with [`CoreError::DuplicateBlock`] when a block number repeats.
    pub fn build(label: VersionLabel, metadata: Map<String, Value>, specs: &[BlockSpec]) -> CoreResult<Self> {
        if specs.is_empty() {
            return Err(CoreError::EmptySnapshot);
        }

        let mut blocks = specs
            .iter()
            .map(MemoryBlock::from_spec)
            .collect::<CoreResult<Vec<_>>>()?;
        blocks.sort_by_key(MemoryBlock::number);
        if let Some(pair) = blocks.windows(2).find(|pair| pair[0].number() == pair[1].number()) {
            return Err(CoreError::DuplicateBlock {
                block: pair[0].number(),
            });
        }

        Ok(Self {
            label,
            metadata,
            blocks,
        })
    }

    /// Builds a snapshot from a remote version payload.
    pub fn from_payload(label: VersionLabel, payload: &VersionPayload) -> CoreResult<Self> {
        let specs = payload.block_specs()?;
        Self::build(label, payload.plc_informations.clone(), &specs)
    }

    /// Lifecycle label.
    pub fn label(&self) -> VersionLabel {
        self.label
    }

    /// Device metadata.
    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    /// Blocks sorted by number.
    pub fn blocks(&self) -> &[MemoryBlock] {
        &self.blocks
    }

    pub(crate) fn blocks_mut(&mut self) -> &mut [MemoryBlock] {
        &mut self.blocks
    }

    /// Relabels the snapshot as the confirmed baseline.
    #[must_use]
    pub fn into_baseline(mut self) -> Self {
        self.label = VersionLabel::Baseline;
        self
    }

    /// Checks that `self` has the same blocks and sizes as `other`.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::CurrentMismatch`] describing the first
    /// difference found.
    pub fn matches_shape(&self, other: &VersionSnapshot) -> CoreResult<()> {
        if self.blocks.len() != other.blocks.len() {
            return Err(CoreError::CurrentMismatch {
                reason: format!(
                    "{} declares {} data blocks, {} has {}",
                    self.label,
                    self.blocks.len(),
                    other.label,
                    other.blocks.len()
                ),
            });
        }

        for (mine, theirs) in self.blocks.iter().zip(&other.blocks) {
            if mine.number() != theirs.number() {
                return Err(CoreError::CurrentMismatch {
                    reason: format!("DB{} where DB{} was expected", mine.number(), theirs.number()),
                });
            }
            if mine.size() != theirs.size() {
                return Err(CoreError::CurrentMismatch {
                    reason: format!(
                        "DB{} is {} bytes, expected {}",
                        mine.number(),
                        mine.size(),
                        theirs.size()
                    ),
                });
            }
        }
        Ok(())
    }
}
