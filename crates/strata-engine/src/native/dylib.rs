//! `dlopen`-backed native host

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use strata_sdk::{LoadError, LoadResult, NativeHost};

/// Native host that maps libraries into the process with `dlopen`.
///
/// Libraries are opened with `RTLD_NOW | RTLD_LOCAL` and closed again on
/// [`unload`](NativeHost::unload).
#[derive(Default)]
pub struct DylibHost {
    open: Mutex<FxHashMap<String, RawLibrary>>,
}

/// An open `dlopen` handle
struct RawLibrary(*mut std::ffi::c_void);

// dlopen handles are process-wide and usable from any thread.
unsafe impl Send for RawLibrary {}

impl DylibHost {
    /// Create a host with no open libraries
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of libraries currently open
    pub fn open_count(&self) -> usize {
        self.open.lock().len()
    }
}

impl NativeHost for DylibHost {
    fn load(&self, canonical: &str) -> LoadResult<bool> {
        if self.open.lock().contains_key(canonical) {
            return Ok(true);
        }
        let library = open_library(canonical)?;
        self.open.lock().insert(canonical.to_string(), library);
        tracing::debug!(library = canonical, "opened native library");
        Ok(true)
    }

    fn unload(&self, canonical: &str) {
        if let Some(library) = self.open.lock().remove(canonical) {
            close_library(library);
            tracing::debug!(library = canonical, "closed native library");
        }
    }
}

impl Drop for DylibHost {
    fn drop(&mut self) {
        for (_, library) in self.open.get_mut().drain() {
            close_library(library);
        }
    }
}

// ============================================================================
// Unix Implementation (Linux, macOS, BSD)
// ============================================================================

#[cfg(unix)]
fn open_library(path: &str) -> LoadResult<RawLibrary> {
    use std::ffi::{CStr, CString};

    let c_path = CString::new(path).map_err(|e| LoadError::NativeLoad {
        name: path.to_string(),
        reason: format!("Invalid path: {}", e),
    })?;

    // RTLD_NOW: resolve all symbols immediately
    let handle = unsafe { libc::dlopen(c_path.as_ptr(), libc::RTLD_NOW | libc::RTLD_LOCAL) };
    if handle.is_null() {
        let reason = unsafe {
            let err_ptr = libc::dlerror();
            if err_ptr.is_null() {
                "Unknown error".to_string()
            } else {
                CStr::from_ptr(err_ptr).to_string_lossy().into_owned()
            }
        };
        return Err(LoadError::NativeLoad {
            name: path.to_string(),
            reason,
        });
    }
    Ok(RawLibrary(handle))
}

#[cfg(unix)]
fn close_library(library: RawLibrary) {
    unsafe {
        libc::dlclose(library.0);
    }
}

// ============================================================================
// Other platforms
// ============================================================================

#[cfg(not(unix))]
fn open_library(path: &str) -> LoadResult<RawLibrary> {
    Err(LoadError::NativeLoad {
        name: path.to_string(),
        reason: "dynamic loading is not supported on this platform".to_string(),
    })
}

#[cfg(not(unix))]
fn close_library(_library: RawLibrary) {}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_missing_library_fails() {
        let host = DylibHost::new();
        let err = host.load("/nonexistent/libstrata_missing.so").unwrap_err();
        assert!(matches!(err, LoadError::NativeLoad { .. }));
        assert_eq!(host.open_count(), 0);
    }

    #[test]
    fn test_interior_nul_rejected() {
        let host = DylibHost::new();
        assert!(matches!(
            host.load("lib\0bad.so"),
            Err(LoadError::NativeLoad { .. })
        ));
    }
}
