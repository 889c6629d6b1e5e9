//! EGL buffer swap for client-composited frames
//!
//! libEGL is resolved at runtime with `dlopen` so the shim can be loaded on
//! systems without EGL; only presenting a frame needs it.

use crate::composer::SwapTarget;
use crate::{Error, Result};
use std::ffi::{c_void, CStr};
use tracing::{debug, info};

pub type EGLDisplay = *mut c_void;
pub type EGLSurface = *mut c_void;
pub type EGLBoolean = u32;
pub type EGLint = i32;

pub const EGL_FALSE: EGLBoolean = 0;
pub const EGL_SUCCESS: EGLint = 0x3000;

type SwapBuffersFn = unsafe extern "C" fn(EGLDisplay, EGLSurface) -> EGLBoolean;
type GetErrorFn = unsafe extern "C" fn() -> EGLint;

const EGL_LIBRARIES: &[&CStr] = &[c"libEGL.so.1", c"libEGL.so"];

/// `dlopen` handle, closed on drop
struct Library(*mut c_void);

impl Library {
    fn open_first(names: &[&CStr]) -> Option<Self> {
        names
            .iter()
            .map(|name| unsafe { libc::dlopen(name.as_ptr(), libc::RTLD_NOW | libc::RTLD_GLOBAL) })
            .find(|lib| !lib.is_null())
            .map(Library)
    }

    fn symbol(&self, name: &CStr) -> *mut c_void {
        unsafe { libc::dlsym(self.0, name.as_ptr()) }
    }
}

impl Drop for Library {
    fn drop(&mut self) {
        if unsafe { libc::dlclose(self.0) } != 0 {
            debug!("dlclose failed for EGL library");
        }
    }
}

/// Swap target for one EGL window surface
pub struct EglSwapTarget {
    display: EGLDisplay,
    surface: EGLSurface,
    swap_buffers: SwapBuffersFn,
    get_error: Option<GetErrorFn>,
    last_error: EGLint,
    // Keeps the resolved symbols valid; dropped last
    _lib: Library,
}

impl EglSwapTarget {
    /// Bind to an existing display/surface pair using the system libEGL
    pub fn load(display: EGLDisplay, surface: EGLSurface) -> Result<Self> {
        Self::load_from(EGL_LIBRARIES, display, surface)
    }

    /// Same as [`load`](Self::load) with an explicit library search list
    pub fn load_from(
        libraries: &[&CStr],
        display: EGLDisplay,
        surface: EGLSurface,
    ) -> Result<Self> {
        let lib = Library::open_first(libraries)
            .ok_or_else(|| Error::Egl("failed to load libEGL".to_string()))?;

        let swap = lib.symbol(c"eglSwapBuffers");
        if swap.is_null() {
            return Err(Error::Egl("eglSwapBuffers not found".to_string()));
        }
        let get_error = lib.symbol(c"eglGetError");

        info!("EGL swap target bound to surface {:?}", surface);
        Ok(Self {
            display,
            surface,
            swap_buffers: unsafe { std::mem::transmute::<*mut c_void, SwapBuffersFn>(swap) },
            get_error: (!get_error.is_null())
                .then(|| unsafe { std::mem::transmute::<*mut c_void, GetErrorFn>(get_error) }),
            last_error: EGL_SUCCESS,
            _lib: lib,
        })
    }

    /// EGL error code captured after the last failed swap
    pub fn last_error(&self) -> EGLint {
        self.last_error
    }
}

impl SwapTarget for EglSwapTarget {
    fn swap_buffers(&mut self) -> bool {
        let ok = unsafe { (self.swap_buffers)(self.display, self.surface) } != EGL_FALSE;
        if !ok {
            self.last_error = self.get_error.map_or(EGL_SUCCESS, |f| unsafe { f() });
            debug!("eglSwapBuffers failed: 0x{:04x}", self.last_error);
        }
        ok
    }
}

// The handles are only used from the composition thread that owns the target
unsafe impl Send for EglSwapTarget {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_library_is_an_egl_error() {
        let result = EglSwapTarget::load_from(
            &[c"libhwc-vsync-does-not-exist.so"],
            std::ptr::null_mut(),
            std::ptr::null_mut(),
        );
        assert!(matches!(result, Err(Error::Egl(_))));
    }

    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    #[test]
    fn test_library_without_swap_buffers_is_released() {
        let result = EglSwapTarget::load_from(
            &[c"libc.so.6"],
            std::ptr::null_mut(),
            std::ptr::null_mut(),
        );
        match result {
            Err(Error::Egl(msg)) => assert!(msg.contains("eglSwapBuffers")),
            Err(e) => panic!("unexpected error {}", e),
            Ok(_) => panic!("libc has no eglSwapBuffers"),
        }
    }
}
