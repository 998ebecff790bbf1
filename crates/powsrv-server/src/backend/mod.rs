//! PoW device implementations.

pub mod cpu;
pub mod curl;
pub mod relay;

use std::time::Duration;

use powsrv_transport::Endpoint;

pub use cpu::CpuDevice;
pub use relay::RelayDevice;

use crate::device::PowDevice;
use crate::error::DeviceError;

/// What to build for one configured device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceSpec {
    /// Curl-P search on the CPU; `threads == 0` uses every available core.
    Cpu { threads: usize },
    /// Forward work to another powsrv.
    Relay { upstream: Endpoint, timeout: Duration },
}

impl DeviceSpec {
    /// Short kind name used in configuration.
    pub fn kind(&self) -> &'static str {
        match self {
            DeviceSpec::Cpu { .. } => "cpu",
            DeviceSpec::Relay { .. } => "relay",
        }
    }
}

/// Create a device. Relay devices connect to their upstream here.
pub fn build_device(spec: &DeviceSpec) -> Result<Box<dyn PowDevice>, DeviceError> {
    match spec {
        DeviceSpec::Cpu { threads } => Ok(Box::new(CpuDevice::new(*threads))),
        DeviceSpec::Relay { upstream, timeout } => {
            Ok(Box::new(RelayDevice::connect(upstream.clone(), *timeout)?))
        }
    }
}
