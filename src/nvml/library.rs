//! Dynamically loaded NVML backend
//!
//! Resolves the four entry points the crate uses straight from the vendor
//! shared object with `libloading`. Nothing is initialized here; lifecycle
//! calls are issued by `SharedNvml`.

use crate::domain::Utilization;
use crate::error::NvmlError;
use crate::nvml::traits::{DeviceHandle, NativeBackend};

use libloading::{Library, Symbol};
use nvml_wrapper::error::{nvml_try, NvmlError as WrapperError};
use nvml_wrapper_sys::bindings::{nvmlDevice_t, nvmlReturn_t, nvmlUtilization_t};
use std::os::raw::c_uint;
use std::path::Path;

#[cfg(target_os = "linux")]
const DEFAULT_LIBRARY_NAMES: &[&str] = &["libnvidia-ml.so.1", "libnvidia-ml.so"];

#[cfg(target_os = "windows")]
const DEFAULT_LIBRARY_NAMES: &[&str] = &["nvml.dll"];

#[cfg(not(any(target_os = "linux", target_os = "windows")))]
const DEFAULT_LIBRARY_NAMES: &[&str] = &[];

type InitFn = unsafe extern "C" fn() -> nvmlReturn_t;
type ShutdownFn = unsafe extern "C" fn() -> nvmlReturn_t;
type HandleByIndexFn = unsafe extern "C" fn(c_uint, *mut nvmlDevice_t) -> nvmlReturn_t;
type UtilizationFn = unsafe extern "C" fn(nvmlDevice_t, *mut nvmlUtilization_t) -> nvmlReturn_t;

/// NVML entry points resolved from a loaded library
pub struct NvmlLibrary {
    init: InitFn,
    shutdown: ShutdownFn,
    handle_by_index: HandleByIndexFn,
    utilization: UtilizationFn,
    // Keeps the function pointers above valid.
    _lib: Library,
}

impl NvmlLibrary {
    /// Load from the platform's default search list
    pub fn load() -> Result<Self, NvmlError> {
        Self::load_first(Self::default_names())
    }

    /// Load the first candidate that opens and exposes every entry point
    pub fn load_first<P: AsRef<Path>>(candidates: &[P]) -> Result<Self, NvmlError> {
        let mut last_err =
            NvmlError::LibraryNotFound("no library candidates for this platform".to_string());

        for candidate in candidates {
            match Self::open(candidate) {
                Ok(lib) => return Ok(lib),
                Err(e) => {
                    log::debug!("NVML candidate {} rejected: {}", candidate.as_ref().display(), e);
                    last_err = e;
                }
            }
        }

        Err(last_err)
    }

    /// Open a specific library file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, NvmlError> {
        let path = path.as_ref();

        // SAFETY: loading NVML runs no initialization routines with
        // preconditions on our side.
        let lib = unsafe { Library::new(path) }
            .map_err(|e| NvmlError::LibraryNotFound(format!("{}: {}", path.display(), e)))?;

        let init = resolve::<InitFn>(&lib, b"nvmlInit_v2\0")?;
        let shutdown = resolve::<ShutdownFn>(&lib, b"nvmlShutdown\0")?;
        let handle_by_index = resolve::<HandleByIndexFn>(&lib, b"nvmlDeviceGetHandleByIndex_v2\0")?;
        let utilization = resolve::<UtilizationFn>(&lib, b"nvmlDeviceGetUtilizationRates\0")?;

        log::debug!("Loaded NVML from {}", path.display());

        Ok(Self {
            init,
            shutdown,
            handle_by_index,
            utilization,
            _lib: lib,
        })
    }

    /// Platform default library names
    pub fn default_names() -> &'static [&'static str] {
        DEFAULT_LIBRARY_NAMES
    }
}

fn resolve<T: Copy>(lib: &Library, name: &[u8]) -> Result<T, NvmlError> {
    // SAFETY: every `T` used here matches the C prototype in nvml.h.
    let symbol: Symbol<T> = unsafe { lib.get(name) }.map_err(|e| {
        let name = String::from_utf8_lossy(name.strip_suffix(b"\0").unwrap_or(name)).into_owned();
        NvmlError::SymbolMissing(format!("{}: {}", name, e))
    })?;
    Ok(*symbol)
}

/// Map a wrapper error onto ours, with `fallback` for anything unspecific
fn convert_error(err: WrapperError, fallback: impl FnOnce(String) -> NvmlError) -> NvmlError {
    match err {
        WrapperError::GpuLost => NvmlError::GpuLost,
        WrapperError::LibraryNotFound => NvmlError::LibraryNotFound(err.to_string()),
        other => fallback(other.to_string()),
    }
}

impl NativeBackend for NvmlLibrary {
    fn init(&self) -> Result<(), NvmlError> {
        // SAFETY: takes no arguments; NVML tolerates repeated init calls.
        let code = unsafe { (self.init)() };
        nvml_try(code).map_err(|e| convert_error(e, NvmlError::InitializationFailed))
    }

    fn shutdown(&self) -> Result<(), NvmlError> {
        // SAFETY: only issued after a successful init.
        let code = unsafe { (self.shutdown)() };
        nvml_try(code).map_err(|e| convert_error(e, NvmlError::Unknown))
    }

    fn device_handle(&self, index: u32) -> Result<DeviceHandle, NvmlError> {
        let mut device: nvmlDevice_t = std::ptr::null_mut();

        // SAFETY: `device` is a valid out-pointer for the duration of the call.
        let code = unsafe { (self.handle_by_index)(index, &mut device) };
        nvml_try(code).map_err(|e| convert_error(e, |_| NvmlError::DeviceNotFound(index)))?;

        if device.is_null() {
            return Err(NvmlError::DeviceNotFound(index));
        }

        Ok(DeviceHandle::from_raw(device))
    }

    fn utilization(&self, device: DeviceHandle) -> Result<Utilization, NvmlError> {
        let mut util = nvmlUtilization_t { gpu: 0, memory: 0 };

        // SAFETY: the handle was issued by this library and `util` is a valid
        // out-pointer.
        let code = unsafe { (self.utilization)(device.as_raw(), &mut util) };
        nvml_try(code).map_err(|e| convert_error(e, NvmlError::QueryFailed))?;

        Ok(Utilization::from_raw(util.gpu, util.memory))
    }
}
