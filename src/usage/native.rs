//! NVML-backed usage provider
//!
//! Each provider holds one claim on the shared NVML lifecycle plus the device
//! handle for its index. Reads are serialized per instance by `slot`; the
//! shared lifecycle lock is only taken on construction and close, never while
//! `slot` is held.

use crate::domain::Utilization;
use crate::error::{NvmlError, UsageError};
use crate::nvml::{DeviceHandle, NvmlLease, SharedNvml};
use crate::usage::UsageProvider;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A device handle and the claim that keeps it valid
#[derive(Debug)]
struct Claim {
    device: DeviceHandle,
    lease: NvmlLease,
}

/// GPU usage provider reading utilization rates through NVML
#[derive(Debug)]
pub struct NvmlUsageProvider {
    device_index: u32,
    shared: Arc<SharedNvml>,
    slot: Mutex<Option<Claim>>,
    init_error: Option<NvmlError>,
    closed: AtomicBool,
}

impl NvmlUsageProvider {
    /// Provider for `device_index` on the process-wide NVML instance
    pub fn new(device_index: u32) -> Self {
        Self::with_shared(SharedNvml::global(), device_index)
    }

    /// Provider for `device_index` on a specific lifecycle
    ///
    /// Never fails: if NVML cannot be loaded or initialized, or the device
    /// does not exist, the provider is created not-ready and every read fails.
    pub fn with_shared(shared: Arc<SharedNvml>, device_index: u32) -> Self {
        let (claim, init_error) = match Self::claim_device(&shared, device_index) {
            Ok(claim) => (Some(claim), None),
            Err(e) => {
                log::log!(
                    not_ready_level(&e),
                    "GPU {} usage provider not ready: {}",
                    device_index,
                    e
                );
                (None, Some(e))
            }
        };

        Self {
            device_index,
            shared,
            slot: Mutex::new(claim),
            init_error,
            closed: AtomicBool::new(false),
        }
    }

    fn claim_device(shared: &Arc<SharedNvml>, device_index: u32) -> Result<Claim, NvmlError> {
        let lease = shared.acquire()?;
        // A failed lookup drops `lease`, which gives the claim back.
        let device = lease.backend().device_handle(device_index)?;
        log::debug!("GPU {} usage provider ready", device_index);
        Ok(Claim { device, lease })
    }

    fn lock_slot(&self) -> MutexGuard<'_, Option<Claim>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read GPU and memory utilization, retrying a failed query once
    pub fn read_utilization(&self) -> Result<Utilization, UsageError> {
        let slot = self.lock_slot();
        let Some(claim) = slot.as_ref() else {
            return Err(if self.is_closed() {
                UsageError::Closed
            } else {
                UsageError::NotReady
            });
        };

        let backend = claim.lease.backend();
        let util = match backend.utilization(claim.device) {
            Ok(util) => util,
            Err(first) => {
                log::debug!("GPU {} utilization query failed ({}), retrying", self.device_index, first);
                backend.utilization(claim.device).map_err(|e| {
                    log::warn!("GPU {} utilization query failed twice: {}", self.device_index, e);
                    UsageError::Read(e)
                })?
            }
        };

        Ok(Utilization::new(util.gpu, util.memory))
    }

    /// Device index this provider queries
    pub fn device_index(&self) -> u32 {
        self.device_index
    }

    /// Whether the provider holds a device handle
    pub fn is_ready(&self) -> bool {
        self.lock_slot().is_some()
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Why construction left the provider not-ready, if it did
    pub fn init_error(&self) -> Option<&NvmlError> {
        self.init_error.as_ref()
    }
}

/// A missing library is already reported once by the shared loader
fn not_ready_level(err: &NvmlError) -> log::Level {
    match err {
        NvmlError::LibraryNotFound(_) => log::Level::Debug,
        _ => log::Level::Warn,
    }
}

impl UsageProvider for NvmlUsageProvider {
    fn try_read_usage(&self) -> Result<u8, UsageError> {
        self.read_utilization().map(|u| u.gpu_percent())
    }

    fn is_available(&self) -> bool {
        self.shared.is_library_present()
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        // Take the claim under the instance lock, release it after.
        let claim = self.lock_slot().take();
        if let Some(claim) = claim {
            log::debug!("GPU {} usage provider closed", self.device_index);
            drop(claim);
        }
    }
}

impl Drop for NvmlUsageProvider {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockBackend;
    use crate::nvml::NativeBackend;

    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::{Duration, Instant};

    fn setup(device_count: u32) -> (Arc<MockBackend>, Arc<SharedNvml>) {
        let backend = Arc::new(MockBackend::new(device_count));
        let shared = Arc::new(SharedNvml::from_backend(
            Arc::clone(&backend) as Arc<dyn NativeBackend>
        ));
        (backend, shared)
    }

    #[test]
    fn test_provider_reads_gpu_percent() {
        let (backend, shared) = setup(1);
        backend.set_reading(Utilization::new(64, 20));

        let provider = NvmlUsageProvider::with_shared(shared, 0);
        assert!(provider.is_ready());
        assert_eq!(provider.read_usage_percent(), 64);
        assert_eq!(provider.read_utilization().unwrap().memory_percent(), 20);
    }

    #[test]
    fn test_two_providers_share_lifecycle() {
        let (backend, shared) = setup(2);

        let first = NvmlUsageProvider::with_shared(Arc::clone(&shared), 0);
        let second = NvmlUsageProvider::with_shared(Arc::clone(&shared), 1);
        assert_eq!(shared.ref_count(), 2);
        assert_eq!(backend.init_calls(), 1);

        first.close();
        assert_eq!(shared.ref_count(), 1);
        assert!(shared.is_initialized());
        assert_eq!(backend.shutdown_calls(), 0);

        second.close();
        assert_eq!(shared.ref_count(), 0);
        assert!(!shared.is_initialized());
        assert_eq!(backend.shutdown_calls(), 1);
    }

    #[test]
    fn test_initialized_while_any_provider_open() {
        let (backend, shared) = setup(1);
        let providers: Vec<_> = (0..5)
            .map(|_| NvmlUsageProvider::with_shared(Arc::clone(&shared), 0))
            .collect();

        for (closed, provider) in providers.iter().enumerate() {
            assert!(shared.is_initialized());
            assert_eq!(shared.ref_count(), 5 - closed);
            provider.close();
        }

        assert!(!shared.is_initialized());
        assert_eq!(backend.init_calls(), 1);
        assert_eq!(backend.shutdown_calls(), 1);
    }

    #[test]
    fn test_close_is_idempotent() {
        let (backend, shared) = setup(1);
        let keep = NvmlUsageProvider::with_shared(Arc::clone(&shared), 0);
        let provider = NvmlUsageProvider::with_shared(Arc::clone(&shared), 0);

        provider.close();
        provider.close();
        drop(provider);

        assert_eq!(shared.ref_count(), 1);
        assert_eq!(backend.shutdown_calls(), 0);
        drop(keep);
        assert_eq!(backend.shutdown_calls(), 1);
    }

    #[test]
    fn test_read_after_close_fails() {
        let (_backend, shared) = setup(1);
        let provider = NvmlUsageProvider::with_shared(shared, 0);
        provider.close();

        assert_eq!(provider.try_read_usage(), Err(UsageError::Closed));
        assert_eq!(provider.read_usage_percent(), -1);
    }

    #[test]
    fn test_drop_releases_claim() {
        let (backend, shared) = setup(1);
        drop(NvmlUsageProvider::with_shared(Arc::clone(&shared), 0));

        assert_eq!(shared.ref_count(), 0);
        assert_eq!(backend.shutdown_calls(), 1);
    }

    #[test]
    fn test_missing_device_unwinds_claim() {
        let (backend, shared) = setup(1);

        let provider = NvmlUsageProvider::with_shared(Arc::clone(&shared), 5);
        assert!(!provider.is_ready());
        assert_eq!(provider.init_error(), Some(&NvmlError::DeviceNotFound(5)));
        assert_eq!(shared.ref_count(), 0);
        assert!(!shared.is_initialized());
        assert_eq!(backend.init_calls(), 1);
        assert_eq!(backend.shutdown_calls(), 1);

        assert_eq!(provider.try_read_usage(), Err(UsageError::NotReady));
        assert_eq!(backend.query_calls(), 0);

        // Close on a never-ready provider does not touch the count
        provider.close();
        assert_eq!(shared.ref_count(), 0);
        assert_eq!(backend.shutdown_calls(), 1);
    }

    #[test]
    fn test_missing_device_keeps_other_claims() {
        let (backend, shared) = setup(1);
        let good = NvmlUsageProvider::with_shared(Arc::clone(&shared), 0);
        let bad = NvmlUsageProvider::with_shared(Arc::clone(&shared), 3);

        assert!(good.is_ready());
        assert!(!bad.is_ready());
        assert_eq!(shared.ref_count(), 1);
        assert!(shared.is_initialized());
        assert_eq!(backend.shutdown_calls(), 0);
    }

    #[test]
    fn test_failed_init_leaves_provider_not_ready() {
        let (backend, shared) = setup(1);
        backend.fail_next_init(NvmlError::InitializationFailed("driver not loaded".into()));

        let provider = NvmlUsageProvider::with_shared(Arc::clone(&shared), 0);
        assert!(!provider.is_ready());
        assert!(provider.is_available());
        assert!(matches!(
            provider.init_error(),
            Some(NvmlError::InitializationFailed(_))
        ));
        assert_eq!(shared.ref_count(), 0);
        assert_eq!(backend.shutdown_calls(), 0);
        assert_eq!(provider.read_usage_percent(), -1);
    }

    #[test]
    fn test_missing_library_is_soft() {
        let shared = Arc::new(SharedNvml::new(|| {
            Err(NvmlError::LibraryNotFound("libnvidia-ml.so.1".into()))
        }));

        let provider = NvmlUsageProvider::with_shared(Arc::clone(&shared), 0);
        assert!(!provider.is_available());
        assert!(!provider.is_ready());
        assert_eq!(provider.read_usage_percent(), -1);
        provider.close();
        assert_eq!(shared.ref_count(), 0);
    }

    #[test]
    fn test_missing_library_logged_once() {
        let missing = NvmlError::LibraryNotFound("libnvidia-ml.so.1".into());
        assert_eq!(not_ready_level(&missing), log::Level::Debug);
        assert_eq!(not_ready_level(&NvmlError::DeviceNotFound(2)), log::Level::Warn);
        assert_eq!(
            not_ready_level(&NvmlError::InitializationFailed("driver".into())),
            log::Level::Warn
        );
    }

    #[test]
    fn test_concurrent_reads_keep_retry_paired() {
        let (backend, shared) = setup(1);
        let provider = Arc::new(NvmlUsageProvider::with_shared(shared, 0));

        // Every read sees one failure then one success, unless another read
        // on the same provider slips in between the pair.
        const READS: usize = 64;
        for _ in 0..READS {
            backend.push_reading(Err(NvmlError::QueryFailed("timeout".into())));
            backend.push_reading(Ok(Utilization::new(70, 0)));
        }

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let provider = Arc::clone(&provider);
                thread::spawn(move || {
                    (0..READS / 8)
                        .map(|_| provider.read_usage_percent())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        for handle in handles {
            assert!(handle.join().unwrap().iter().all(|&v| v == 70));
        }
        assert_eq!(backend.query_calls(), READS * 2);
    }

    /// Backend whose queries wait until a second query is in flight
    #[derive(Default)]
    struct RendezvousBackend {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl NativeBackend for RendezvousBackend {
        fn init(&self) -> Result<(), NvmlError> {
            Ok(())
        }

        fn shutdown(&self) -> Result<(), NvmlError> {
            Ok(())
        }

        fn device_handle(&self, index: u32) -> Result<DeviceHandle, NvmlError> {
            Ok(DeviceHandle::from_token(index as usize + 1))
        }

        fn utilization(&self, _device: DeviceHandle) -> Result<Utilization, NvmlError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            let deadline = Instant::now() + Duration::from_secs(2);
            while self.in_flight.load(Ordering::SeqCst) < 2 && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(1));
            }

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(Utilization::new(10, 0))
        }
    }

    #[test]
    fn test_providers_read_independently() {
        let backend = Arc::new(RendezvousBackend::default());
        let shared = Arc::new(SharedNvml::from_backend(
            Arc::clone(&backend) as Arc<dyn NativeBackend>
        ));

        let handles: Vec<_> = (0..2)
            .map(|index| {
                let provider = NvmlUsageProvider::with_shared(Arc::clone(&shared), index);
                thread::spawn(move || provider.read_usage_percent())
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), 10);
        }
        assert_eq!(backend.max_in_flight.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_single_failure_is_retried() {
        let (backend, shared) = setup(1);
        let provider = NvmlUsageProvider::with_shared(shared, 0);

        backend.push_reading(Err(NvmlError::QueryFailed("timeout".into())));
        backend.push_reading(Ok(Utilization::new(37, 0)));

        assert_eq!(provider.read_usage_percent(), 37);
        assert_eq!(backend.query_calls(), 2);
    }

    #[test]
    fn test_two_failures_yield_sentinel() {
        let (backend, shared) = setup(1);
        let provider = NvmlUsageProvider::with_shared(shared, 0);

        backend.push_reading(Err(NvmlError::QueryFailed("timeout".into())));
        backend.push_reading(Err(NvmlError::GpuLost));

        assert_eq!(provider.try_read_usage(), Err(UsageError::Read(NvmlError::GpuLost)));
        assert_eq!(backend.query_calls(), 2);

        // Next read starts fresh
        assert_eq!(provider.read_usage_percent(), 50);
        assert_eq!(backend.query_calls(), 3);
    }

    #[test]
    fn test_out_of_range_reading_is_clamped() {
        let (backend, shared) = setup(1);
        let provider = NvmlUsageProvider::with_shared(shared, 0);

        backend.push_reading(Ok(Utilization {
            gpu: 250,
            memory: 101,
        }));

        let util = provider.read_utilization().unwrap();
        assert_eq!(util.gpu, 100);
        assert_eq!(util.memory, 100);
    }

    #[test]
    fn test_close_then_reconstruct_reinitializes() {
        let (backend, shared) = setup(1);

        NvmlUsageProvider::with_shared(Arc::clone(&shared), 0).close();
        let provider = NvmlUsageProvider::with_shared(Arc::clone(&shared), 0);

        assert!(provider.is_ready());
        assert_eq!(backend.init_calls(), 2);
        assert_eq!(provider.read_usage_percent(), 50);
    }

    #[test]
    #[ignore = "Requires NVIDIA GPU"]
    fn test_real_provider_reads() {
        let provider = NvmlUsageProvider::new(0);
        assert!(provider.is_available());
        let percent = provider.read_usage_percent();
        assert!((0..=100).contains(&percent));
    }
}
