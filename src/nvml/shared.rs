//! Process-wide NVML lifecycle
//!
//! `SharedNvml` owns the lazily loaded library and a reference count of the
//! claims held against the initialized subsystem. The library is loaded at most
//! once; the load outcome (success or failure) is cached for the lifetime of
//! the `SharedNvml`. Init runs on the 0 -> 1 transition and shutdown on the
//! 1 -> 0 transition, both under the same mutex as the counter, so concurrent
//! acquire/release pairs can never lose a transition. A later acquire after a
//! shutdown initializes again with the cached library.
//!
//! Lock order: callers may hold their own per-instance lock while acquiring,
//! but must not hold it while a lease is released.

use crate::error::NvmlError;
use crate::nvml::library::NvmlLibrary;
use crate::nvml::traits::NativeBackend;

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

type Loader = dyn Fn() -> Result<Arc<dyn NativeBackend>, NvmlError> + Send + Sync;

static GLOBAL: OnceLock<Arc<SharedNvml>> = OnceLock::new();

#[derive(Debug, Default)]
struct Lifecycle {
    initialized: bool,
    ref_count: usize,
}

/// Shared, reference-counted NVML subsystem
pub struct SharedNvml {
    loader: Box<Loader>,
    backend: OnceLock<Result<Arc<dyn NativeBackend>, NvmlError>>,
    state: Mutex<Lifecycle>,
}

impl SharedNvml {
    /// Create a lifecycle around a lazily invoked loader
    pub fn new<F>(loader: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn NativeBackend>, NvmlError> + Send + Sync + 'static,
    {
        Self {
            loader: Box::new(loader),
            backend: OnceLock::new(),
            state: Mutex::new(Lifecycle::default()),
        }
    }

    /// Create a lifecycle around an already constructed backend
    pub fn from_backend(backend: Arc<dyn NativeBackend>) -> Self {
        Self::new(move || Ok(Arc::clone(&backend)))
    }

    /// Create a lifecycle that loads NVML from an explicit path
    pub fn with_library_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self::new(move || {
            NvmlLibrary::open(&path).map(|lib| Arc::new(lib) as Arc<dyn NativeBackend>)
        })
    }

    /// The process-wide instance, loading NVML from the default search list
    pub fn global() -> Arc<Self> {
        Arc::clone(GLOBAL.get_or_init(|| {
            Arc::new(Self::new(|| {
                NvmlLibrary::load().map(|lib| Arc::new(lib) as Arc<dyn NativeBackend>)
            }))
        }))
    }

    fn backend(&self) -> Result<Arc<dyn NativeBackend>, NvmlError> {
        self.backend
            .get_or_init(|| {
                let loaded = (self.loader)();
                if let Err(ref e) = loaded {
                    log::warn!("NVML unavailable: {}", e);
                }
                loaded
            })
            .clone()
    }

    fn lock_state(&self) -> MutexGuard<'_, Lifecycle> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether the native library could be loaded
    ///
    /// Triggers the lazy load on first call. Independent of init state.
    pub fn is_library_present(&self) -> bool {
        self.backend().is_ok()
    }

    /// Take a claim on the initialized subsystem
    ///
    /// Initializes NVML if no claim is currently held. On failure nothing is
    /// counted and the subsystem stays as it was.
    pub fn acquire(self: &Arc<Self>) -> Result<NvmlLease, NvmlError> {
        let backend = self.backend()?;
        let mut state = self.lock_state();

        if state.initialized {
            state.ref_count += 1;
            log::debug!("NVML claim acquired (refs: {})", state.ref_count);
        } else {
            backend.init()?;
            state.initialized = true;
            state.ref_count = 1;
            log::info!("NVML initialized");
        }

        Ok(NvmlLease {
            shared: Arc::clone(self),
            backend,
        })
    }

    /// Give a claim back; equivalent to dropping the lease
    pub fn release(&self, lease: NvmlLease) {
        drop(lease);
    }

    fn release_claim(&self) {
        let mut state = self.lock_state();
        if !state.initialized {
            return;
        }

        state.ref_count = state.ref_count.saturating_sub(1);
        log::debug!("NVML claim released (refs: {})", state.ref_count);

        if state.ref_count == 0 {
            if let Some(Ok(backend)) = self.backend.get() {
                match backend.shutdown() {
                    Ok(()) => log::info!("NVML shut down"),
                    Err(e) => log::warn!("NVML shutdown failed: {}", e),
                }
            }
            state.initialized = false;
        }
    }

    /// Number of live claims
    pub fn ref_count(&self) -> usize {
        self.lock_state().ref_count
    }

    /// Whether the subsystem is currently initialized
    pub fn is_initialized(&self) -> bool {
        self.lock_state().initialized
    }
}

impl fmt::Debug for SharedNvml {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock_state();
        f.debug_struct("SharedNvml")
            .field("loaded", &self.backend.get().map(|b| b.is_ok()))
            .field("initialized", &state.initialized)
            .field("ref_count", &state.ref_count)
            .finish()
    }
}

/// A claim on the initialized subsystem
///
/// Dropping the lease releases the claim; the last lease dropped shuts the
/// subsystem down.
pub struct NvmlLease {
    shared: Arc<SharedNvml>,
    backend: Arc<dyn NativeBackend>,
}

impl NvmlLease {
    /// The backend this claim was taken against
    pub fn backend(&self) -> &dyn NativeBackend {
        self.backend.as_ref()
    }
}

impl Drop for NvmlLease {
    fn drop(&mut self) {
        self.shared.release_claim();
    }
}

impl fmt::Debug for NvmlLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NvmlLease").finish_non_exhaustive()
    }
}
