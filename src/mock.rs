//! Mock implementations for testing
//!
//! Provides a scripted native backend so the lifecycle and provider logic can
//! be exercised without real hardware.

use crate::domain::Utilization;
use crate::error::NvmlError;
use crate::nvml::{DeviceHandle, NativeBackend};

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Handle tokens start here so that a zero token never looks valid
const HANDLE_BASE: usize = 0x1000;

/// Scripted native backend
///
/// Init and utilization results are taken from queues; when a queue is empty
/// the call succeeds (init) or returns the default reading (utilization).
#[derive(Debug)]
pub struct MockBackend {
    device_count: u32,
    initialized: AtomicBool,
    init_results: Mutex<VecDeque<Result<(), NvmlError>>>,
    shutdown_results: Mutex<VecDeque<Result<(), NvmlError>>>,
    readings: Mutex<VecDeque<Result<Utilization, NvmlError>>>,
    default_reading: Mutex<Utilization>,
    init_calls: AtomicUsize,
    shutdown_calls: AtomicUsize,
    handle_calls: AtomicUsize,
    query_calls: AtomicUsize,
}

impl MockBackend {
    /// Create a backend exposing `device_count` devices
    pub fn new(device_count: u32) -> Self {
        Self {
            device_count,
            initialized: AtomicBool::new(false),
            init_results: Mutex::new(VecDeque::new()),
            shutdown_results: Mutex::new(VecDeque::new()),
            readings: Mutex::new(VecDeque::new()),
            default_reading: Mutex::new(Utilization::new(50, 10)),
            init_calls: AtomicUsize::new(0),
            shutdown_calls: AtomicUsize::new(0),
            handle_calls: AtomicUsize::new(0),
            query_calls: AtomicUsize::new(0),
        }
    }

    /// Builder: set the reading returned when no scripted result is queued
    pub fn with_reading(self, reading: Utilization) -> Self {
        self.set_reading(reading);
        self
    }

    /// Set the reading returned when no scripted result is queued
    pub fn set_reading(&self, reading: Utilization) {
        *self.default_reading.lock().unwrap() = reading;
    }

    /// Make the next init call fail
    pub fn fail_next_init(&self, err: NvmlError) {
        self.init_results.lock().unwrap().push_back(Err(err));
    }

    /// Make the next shutdown call fail
    pub fn fail_next_shutdown(&self, err: NvmlError) {
        self.shutdown_results.lock().unwrap().push_back(Err(err));
    }

    /// Queue the result of a future utilization query
    pub fn push_reading(&self, result: Result<Utilization, NvmlError>) {
        self.readings.lock().unwrap().push_back(result);
    }

    /// Whether the backend is between init and shutdown
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Number of init calls
    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    /// Number of shutdown calls
    pub fn shutdown_calls(&self) -> usize {
        self.shutdown_calls.load(Ordering::SeqCst)
    }

    /// Number of device handle lookups
    pub fn handle_calls(&self) -> usize {
        self.handle_calls.load(Ordering::SeqCst)
    }

    /// Number of utilization queries
    pub fn query_calls(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
    }
}

impl NativeBackend for MockBackend {
    fn init(&self) -> Result<(), NvmlError> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        let result = self.init_results.lock().unwrap().pop_front().unwrap_or(Ok(()));
        if result.is_ok() {
            self.initialized.store(true, Ordering::SeqCst);
        }
        result
    }

    fn shutdown(&self) -> Result<(), NvmlError> {
        self.shutdown_calls.fetch_add(1, Ordering::SeqCst);
        // Real NVML tears down even when it reports an error
        self.initialized.store(false, Ordering::SeqCst);
        self.shutdown_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()))
    }

    fn device_handle(&self, index: u32) -> Result<DeviceHandle, NvmlError> {
        self.handle_calls.fetch_add(1, Ordering::SeqCst);
        if !self.is_initialized() {
            return Err(NvmlError::Unknown("NVML not initialized".to_string()));
        }
        if index >= self.device_count {
            return Err(NvmlError::DeviceNotFound(index));
        }
        Ok(DeviceHandle::from_token(HANDLE_BASE + index as usize))
    }

    fn utilization(&self, device: DeviceHandle) -> Result<Utilization, NvmlError> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        if !self.is_initialized() {
            return Err(NvmlError::Unknown("NVML not initialized".to_string()));
        }
        let index = device.token().wrapping_sub(HANDLE_BASE);
        if index >= self.device_count as usize {
            return Err(NvmlError::QueryFailed("invalid device handle".to_string()));
        }
        self.readings
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(*self.default_reading.lock().unwrap()))
    }
}
