use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::error::{DeviceError, ServerError};

/// A proof-of-work capable device.
///
/// Implementations are driven from one thread at a time: the dispatcher
/// holds the device lock for the duration of every call.
pub trait PowDevice: Send {
    /// Search a nonce for `trytes` at difficulty `min_weight_magnitude` and
    /// return it as trytes.
    fn compute(&mut self, trytes: &str, min_weight_magnitude: u8) -> Result<String, DeviceError>;

    /// Bring the device (back) into a usable state.
    fn init(&mut self) -> Result<(), DeviceError>;

    /// Display name of the implementation.
    fn pow_type(&self) -> String;

    /// Display version of the implementation.
    fn pow_version(&self) -> String;

    /// Flag that makes a running `compute` give up when set.
    ///
    /// Devices whose work is already bounded by a deadline return `None`.
    fn abort_flag(&self) -> Option<Arc<AtomicBool>> {
        None
    }
}

/// How the dispatcher picks a device for a `PowFunc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionPolicy {
    /// Always the device at this index.
    Fixed(usize),
    /// Rotate over all devices.
    #[default]
    RoundRobin,
}

struct DeviceSlot {
    pow_type: String,
    pow_version: String,
    abort: Option<Arc<AtomicBool>>,
    device: Mutex<Box<dyn PowDevice>>,
}

/// The server's devices, each behind its own lock.
pub struct DeviceDispatcher {
    slots: Vec<DeviceSlot>,
    policy: SelectionPolicy,
    next: AtomicUsize,
}

impl DeviceDispatcher {
    /// Take ownership of `devices`; at least one is required.
    pub fn new(
        devices: Vec<Box<dyn PowDevice>>,
        policy: SelectionPolicy,
    ) -> crate::error::Result<Self> {
        if devices.is_empty() {
            return Err(ServerError::NoDevices);
        }
        if let SelectionPolicy::Fixed(index) = policy {
            if index >= devices.len() {
                return Err(ServerError::Config(format!(
                    "fixed device index {index} out of range ({} devices)",
                    devices.len()
                )));
            }
        }

        let slots = devices
            .into_iter()
            .map(|device| DeviceSlot {
                pow_type: device.pow_type(),
                pow_version: device.pow_version(),
                abort: device.abort_flag(),
                device: Mutex::new(device),
            })
            .collect();

        Ok(Self {
            slots,
            policy,
            next: AtomicUsize::new(0),
        })
    }

    /// Number of devices.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Always false; construction requires a device.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Selection policy in effect.
    pub fn policy(&self) -> SelectionPolicy {
        self.policy
    }

    /// Type string of the primary (first) device.
    pub fn pow_type(&self) -> &str {
        &self.slots[0].pow_type
    }

    /// Version string of the primary (first) device.
    pub fn pow_version(&self) -> &str {
        &self.slots[0].pow_version
    }

    /// `(type, version)` of every device, in order.
    pub fn describe(&self) -> Vec<(String, String)> {
        self.slots
            .iter()
            .map(|slot| (slot.pow_type.clone(), slot.pow_version.clone()))
            .collect()
    }

    /// Index of the device the next computation should use.
    pub fn select(&self) -> usize {
        match self.policy {
            SelectionPolicy::Fixed(index) => index,
            SelectionPolicy::RoundRobin => {
                self.next.fetch_add(1, Ordering::Relaxed) % self.slots.len()
            }
        }
    }

    /// Run a computation on the device at `index`.
    ///
    /// Blocks while another connection is using the same device.
    pub fn dispatch(
        &self,
        index: usize,
        trytes: &str,
        min_weight_magnitude: u8,
    ) -> Result<String, DeviceError> {
        let slot = self.slots.get(index).ok_or_else(|| {
            DeviceError::Unavailable(format!("no device at index {index}"))
        })?;
        let mut device = slot
            .device
            .lock()
            .map_err(|_| DeviceError::Poisoned { index })?;
        debug!(device = index, min_weight_magnitude, "pow started");
        let result = device.compute(trytes, min_weight_magnitude);
        if let Err(err) = &result {
            warn!(device = index, error = %err, "pow failed");
        }
        result
    }

    /// Select a device by policy and run a computation on it.
    pub fn compute(
        &self,
        trytes: &str,
        min_weight_magnitude: u8,
    ) -> Result<String, DeviceError> {
        self.dispatch(self.select(), trytes, min_weight_magnitude)
    }

    /// Make running and future computations fail fast. Used on shutdown so
    /// connection threads blocked on a device can finish.
    pub fn abort_all(&self) {
        for (index, flag) in self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.abort.as_ref().map(|flag| (index, flag)))
        {
            flag.store(true, Ordering::SeqCst);
            debug!(device = index, "device aborted");
        }
    }

    /// Re-initialize every device in order, stopping at the first failure.
    pub fn init_all(&self) -> Result<(), DeviceError> {
        for (index, slot) in self.slots.iter().enumerate() {
            let mut device = slot
                .device
                .lock()
                .map_err(|_| DeviceError::Poisoned { index })?;
            device.init()?;
            debug!(device = index, "device initialized");
        }
        Ok(())
    }
}

impl std::fmt::Debug for DeviceDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceDispatcher")
            .field("devices", &self.describe())
            .field("policy", &self.policy)
            .finish()
    }
}
