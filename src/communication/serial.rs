// src/communication/serial.rs - Byte transport trait and the serial2-tokio implementation
use crate::error::{MountError, MountResult};
use async_trait::async_trait;
use serial2_tokio::SerialPort;
use std::collections::HashSet;
use std::sync::{LazyLock, Mutex, PoisonError};
use std::time::Duration;

/// A half-duplex byte link to a hand controller.
///
/// Implementations never apply timeouts of their own; `DeviceHandle` owns the
/// reply window.
#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, frame: &[u8]) -> MountResult<()>;

    /// Read exactly `len` bytes.
    async fn receive(&mut self, len: usize) -> MountResult<Vec<u8>>;

    /// Drop any bytes still buffered from an earlier, abandoned exchange.
    async fn discard_input(&mut self) -> MountResult<()> {
        Ok(())
    }

    fn describe(&self) -> String;
}

static OPEN_PORTS: LazyLock<Mutex<HashSet<String>>> = LazyLock::new(|| Mutex::new(HashSet::new()));

/// Exclusive claim on a port name within this process. Released on drop.
#[derive(Debug)]
pub struct PortLease {
    port: String,
}

impl PortLease {
    pub fn acquire(port: &str) -> MountResult<Self> {
        let mut ports = OPEN_PORTS.lock().unwrap_or_else(PoisonError::into_inner);
        if !ports.insert(port.to_string()) {
            return Err(MountError::ConnectionFailure(format!("{} is already in use", port)));
        }
        Ok(Self { port: port.to_string() })
    }

    pub fn port(&self) -> &str {
        &self.port
    }
}

impl Drop for PortLease {
    fn drop(&mut self) {
        OPEN_PORTS
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.port);
        tracing::debug!("Released serial port {}", self.port);
    }
}

pub struct SerialTransport {
    port: SerialPort,
    lease: PortLease,
    baud: u32,
}

impl SerialTransport {
    pub fn open(port_name: &str, baud: u32) -> MountResult<Self> {
        let lease = PortLease::acquire(port_name)?;
        let port = SerialPort::open(port_name, baud)
            .map_err(|e| MountError::ConnectionFailure(format!("{}: {}", port_name, e)))?;
        tracing::info!("Opened serial port {} at {} baud", port_name, baud);
        Ok(Self { port, lease, baud })
    }

    pub fn available_ports() -> Vec<String> {
        match SerialPort::available_ports() {
            Ok(paths) => paths.iter().map(|p| p.display().to_string()).collect(),
            Err(_) => vec![],
        }
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn send(&mut self, frame: &[u8]) -> MountResult<()> {
        let mut written = 0;
        while written < frame.len() {
            written += self.port.write(&frame[written..]).await?;
        }
        Ok(())
    }

    async fn receive(&mut self, len: usize) -> MountResult<Vec<u8>> {
        let mut buf = vec![0u8; len];
        let mut filled = 0;
        while filled < len {
            let n = self.port.read(&mut buf[filled..]).await?;
            if n == 0 {
                return Err(MountError::ConnectionFailure(format!("{} closed", self.lease.port())));
            }
            filled += n;
        }
        Ok(buf)
    }

    async fn discard_input(&mut self) -> MountResult<()> {
        let mut scratch = [0u8; 64];
        let mut discarded = 0;
        while let Ok(Ok(n)) = tokio::time::timeout(Duration::from_millis(5), self.port.read(&mut scratch)).await {
            if n == 0 {
                break;
            }
            discarded += n;
        }
        if discarded > 0 {
            tracing::debug!("Discarded {} stale bytes from {}", discarded, self.lease.port());
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("{} @ {} baud", self.lease.port(), self.baud)
    }
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("port", &self.lease.port())
            .field("baud", &self.baud)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lease_is_exclusive_until_dropped() {
        let lease = PortLease::acquire("/dev/lease-test-0").unwrap();
        let err = PortLease::acquire("/dev/lease-test-0").unwrap_err();
        assert!(matches!(err, MountError::ConnectionFailure(_)));
        drop(lease);
        assert!(PortLease::acquire("/dev/lease-test-0").is_ok());
    }

    #[test]
    fn test_open_missing_port_fails_and_releases_lease() {
        let err = SerialTransport::open("/dev/nexstar-does-not-exist", 9600).unwrap_err();
        assert!(matches!(err, MountError::ConnectionFailure(_)));
        assert!(PortLease::acquire("/dev/nexstar-does-not-exist").is_ok());
    }
}
