use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use tracing::debug;

use super::curl::{
    trits_to_trytes, trytes_to_trits, Curl, HASH_LENGTH, NONCE_TRYTES, TRANSACTION_TRYTES,
};
use crate::device::PowDevice;
use crate::error::DeviceError;

const NONCE_TRITS: usize = NONCE_TRYTES * 3;
const NONCE_OFFSET: usize = HASH_LENGTH - NONCE_TRITS;
const TRANSACTION_TRITS: usize = TRANSACTION_TRYTES * 3;

/// Curl-P-81 nonce search on the CPU.
///
/// Workers share the absorbed transaction prefix and each walk their own
/// stride of nonce candidates until one of them finds a hash with enough
/// trailing zero trits, or until the device is aborted.
#[derive(Debug, Clone)]
pub struct CpuDevice {
    threads: usize,
    abort: Arc<AtomicBool>,
}

impl CpuDevice {
    /// `threads == 0` uses the available parallelism.
    pub fn new(threads: usize) -> Self {
        let threads = if threads == 0 {
            thread::available_parallelism().map_or(1, |n| n.get())
        } else {
            threads
        };
        Self {
            threads,
            abort: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Worker threads used per computation.
    pub fn threads(&self) -> usize {
        self.threads
    }
}

impl PowDevice for CpuDevice {
    fn compute(&mut self, trytes: &str, min_weight_magnitude: u8) -> Result<String, DeviceError> {
        if trytes.len() != TRANSACTION_TRYTES {
            return Err(DeviceError::Compute(format!(
                "expected {TRANSACTION_TRYTES} trytes, got {}",
                trytes.len()
            )));
        }
        let trits = trytes_to_trits(trytes)
            .ok_or_else(|| DeviceError::Compute("input is not trytes".to_string()))?;
        let mwm = usize::from(min_weight_magnitude);
        if mwm > HASH_LENGTH {
            return Err(DeviceError::Compute(format!(
                "min weight magnitude {mwm} exceeds hash length"
            )));
        }

        let prefix = TRANSACTION_TRITS - HASH_LENGTH;
        let mut base = Curl::new();
        base.absorb(&trits[..prefix]);
        base.rate_mut().copy_from_slice(&trits[prefix..]);

        debug!(threads = self.threads, mwm, "searching nonce");
        let nonce = search(&base, mwm, self.threads, &self.abort);
        if self.abort.load(Ordering::SeqCst) {
            return Err(DeviceError::Unavailable("device aborted".to_string()));
        }
        let nonce =
            nonce.ok_or_else(|| DeviceError::Compute("nonce space exhausted".to_string()))?;
        Ok(trits_to_trytes(&nonce))
    }

    fn init(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }

    fn pow_type(&self) -> String {
        "curl-p-cpu".to_string()
    }

    fn pow_version(&self) -> String {
        env!("CARGO_PKG_VERSION").to_string()
    }

    fn abort_flag(&self) -> Option<Arc<AtomicBool>> {
        Some(Arc::clone(&self.abort))
    }
}

fn search(
    base: &Curl,
    mwm: usize,
    threads: usize,
    abort: &AtomicBool,
) -> Option<[i8; NONCE_TRITS]> {
    let stop = AtomicBool::new(false);
    thread::scope(|scope| {
        let workers: Vec<_> = (0..threads as u64)
            .map(|start| {
                let stop = &stop;
                scope.spawn(move || {
                    search_worker(base, mwm, start, threads as u64, stop, abort)
                })
            })
            .collect();

        let mut found = None;
        for worker in workers {
            if let Ok(Some(nonce)) = worker.join() {
                found.get_or_insert(nonce);
            }
        }
        found
    })
}

fn search_worker(
    base: &Curl,
    mwm: usize,
    start: u64,
    step: u64,
    stop: &AtomicBool,
    abort: &AtomicBool,
) -> Option<[i8; NONCE_TRITS]> {
    let mut counter = start;
    while !stop.load(Ordering::Relaxed) && !abort.load(Ordering::Relaxed) {
        let nonce = counter_trits(counter);
        let mut curl = base.clone();
        curl.rate_mut()[NONCE_OFFSET..].copy_from_slice(&nonce);
        curl.transform();
        if curl.rate()[HASH_LENGTH - mwm..].iter().all(|&trit| trit == 0) {
            stop.store(true, Ordering::Relaxed);
            return Some(nonce);
        }
        counter = counter.checked_add(step)?;
    }
    None
}

/// Balanced-ternary digits of `value`, least significant first.
fn counter_trits(mut value: u64) -> [i8; NONCE_TRITS] {
    let mut trits = [0i8; NONCE_TRITS];
    for trit in trits.iter_mut() {
        if value == 0 {
            break;
        }
        match value % 3 {
            0 => value /= 3,
            1 => {
                *trit = 1;
                value /= 3;
            }
            _ => {
                *trit = -1;
                value = value / 3 + 1;
            }
        }
    }
    trits
}
