//! The runtime side of [`NativeEnv`]: one environment per native call, backed by the calling
//! thread's [`ManagedRuntime`].
use super::ManagedRuntime;
use crate::{
    context::ExecutionContext,
    ffi::{NativeEnv, NativeInterface, INTERFACE_VERSION},
    handle::ObjectHandle,
};
use std::ffi::c_void;
use tracing::trace;

static INTERFACE: NativeInterface = NativeInterface {
    get_version,
    resolve_address,
};

/// `NativeEnv` must stay the first field so the table callbacks can recover the runtime.
#[repr(C)]
pub(crate) struct ThreadEnv<'rt> {
    raw: NativeEnv,
    runtime: &'rt ManagedRuntime,
}

impl<'rt> ThreadEnv<'rt> {
    pub(crate) fn new(runtime: &'rt ManagedRuntime) -> Self {
        Self {
            raw: NativeEnv {
                functions: &INTERFACE,
            },
            runtime,
        }
    }

    pub(crate) fn as_raw(&mut self) -> *mut NativeEnv {
        (self as *mut Self).cast()
    }
}

unsafe fn runtime<'a>(env: *mut NativeEnv) -> &'a ManagedRuntime {
    // SAFETY: every NativeEnv pointing at INTERFACE is the head of a live ThreadEnv
    unsafe { (*env.cast::<ThreadEnv<'a>>()).runtime }
}

unsafe extern "system" fn get_version(_env: *mut NativeEnv) -> i32 {
    INTERFACE_VERSION
}

unsafe extern "system" fn resolve_address(env: *mut NativeEnv, obj: ObjectHandle) -> *const c_void {
    let runtime = unsafe { runtime(env) };
    match runtime.resolve(obj) {
        // the returned pointer only reports a location and is never dereferenced
        Ok(addr) => sptr::invalid(addr.get()),
        Err(e) => {
            trace!(?obj, "resolve_address failed: {e}");
            std::ptr::null()
        }
    }
}
