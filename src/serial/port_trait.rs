//! Trait abstraction for serial port operations to enable testing

use async_trait::async_trait;
use std::io;

/// Trait for serial port I/O operations
///
/// Writes issued one after another reach the device in the same order.
#[async_trait]
pub trait SerialPortIO: Send {
    /// Write all data to the port
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Flush the output buffer
    async fn flush(&mut self) -> io::Result<()>;

    /// Read the next chunk of received bytes
    ///
    /// Returns `Ok(0)` once the port is closed.
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}
