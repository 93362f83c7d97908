//! Device memory client abstraction.
//!
//! A device client speaks the controller's memory-block protocol. The
//! gateway never interprets the wire format; it only needs to connect,
//! read and write whole data blocks.

pub mod memory;

use crate::error::DeviceResult;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default TCP port of the block protocol.
pub const DEFAULT_PORT: u16 = 102;

/// Network parameters of one controller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionParams {
    /// IP address or host name.
    pub address: String,
    /// Rack number.
    pub rack: u16,
    /// Slot number.
    pub slot: u16,
    /// TCP port.
    pub port: u16,
}

impl ConnectionParams {
    /// Creates parameters using the default port.
    pub fn new(address: impl Into<String>, rack: u16, slot: u16) -> Self {
        Self {
            address: address.into(),
            rack,
            slot,
            port: DEFAULT_PORT,
        }
    }

    /// Sets the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

impl fmt::Display for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} (rack {}, slot {})",
            self.address, self.port, self.rack, self.slot
        )
    }
}

/// A connection to one controller's memory.
///
/// Clients are owned by exactly one session, which serializes access, so
/// methods take `&mut self`.
pub trait DeviceClient: Send {
    /// Opens the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the device cannot be reached or refuses the
    /// parameters.
    fn connect(&mut self, params: &ConnectionParams) -> DeviceResult<()>;

    /// Closes the connection. Closing a closed client is a no-op.
    fn disconnect(&mut self);

    /// Reports whether the link is currently up.
    fn is_connected(&self) -> bool;

    /// Reads `len` bytes of data block `block` starting at `start`.
    ///
    /// # Errors
    ///
    /// Fails if the range exceeds the block's addressable region or the
    /// client is not connected.
    fn read(&mut self, block: u16, start: usize, len: usize) -> DeviceResult<Vec<u8>>;

    /// Writes `data` into data block `block` starting at `start`.
    ///
    /// # Errors
    ///
    /// Fails if the device rejects the write or the client is not connected.
    fn write(&mut self, block: u16, start: usize, data: &[u8]) -> DeviceResult<()>;
}

/// Creates device clients. Each session asks for two.
pub trait DeviceClientFactory: Send + Sync {
    /// Creates a fresh, unconnected client.
    fn create_client(&self) -> Box<dyn DeviceClient>;
}
