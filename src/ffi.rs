//! C ABI surface: the execution-context layout handed in by the runtime, and the exported
//! native methods of `MyClass`.
#![allow(non_snake_case)]

use crate::{
    context::{ExecutionContext, ResolveError},
    entry,
    handle::{NativeInt, ObjectHandle, RawAddress},
    report::{IdentityReporter, StdoutSink},
};
use std::{
    ffi::c_void,
    panic::{self, AssertUnwindSafe},
    ptr::NonNull,
};
use tracing::{error, warn};

/// Major version in the high half, minor in the low half.
pub const INTERFACE_VERSION: i32 = 0x0001_0000;

/// Function table the runtime exposes to native code.
#[repr(C)]
pub struct NativeInterface {
    pub get_version: unsafe extern "system" fn(env: *mut NativeEnv) -> i32,
    /// Returns the address currently backing `obj`, or null if it cannot be resolved.
    pub resolve_address:
        unsafe extern "system" fn(env: *mut NativeEnv, obj: ObjectHandle) -> *const c_void,
}

/// Per-thread execution context as seen by native code.
#[repr(C)]
pub struct NativeEnv {
    pub functions: *const NativeInterface,
}

/// [`ExecutionContext`] over a runtime-supplied [`NativeEnv`].
pub struct EnvContext {
    env: NonNull<NativeEnv>,
    functions: NonNull<NativeInterface>,
}

impl EnvContext {
    /// Wraps a raw environment pointer, rejecting null pointers and incompatible interface
    /// versions.
    ///
    /// # Safety
    ///
    /// `env` must be null or point to a `NativeEnv` that stays valid, together with its function
    /// table, for the lifetime of the returned value.
    pub unsafe fn from_raw(env: *mut NativeEnv) -> Option<Self> {
        let env = NonNull::new(env)?;
        let functions = NonNull::new(unsafe { env.as_ref() }.functions.cast_mut())?;

        let version = unsafe { (functions.as_ref().get_version)(env.as_ptr()) };
        if version >> 16 != INTERFACE_VERSION >> 16 {
            warn!(
                "incompatible native interface version {:#x}, expected {:#x}",
                version, INTERFACE_VERSION
            );
            return None;
        }
        Some(Self { env, functions })
    }

    pub fn version(&self) -> i32 {
        unsafe { (self.functions.as_ref().get_version)(self.env.as_ptr()) }
    }
}

impl ExecutionContext for EnvContext {
    fn resolve(&self, handle: ObjectHandle) -> Result<RawAddress, ResolveError> {
        // SAFETY: validity of env and its table is the contract of `from_raw`
        let ptr = unsafe { (self.functions.as_ref().resolve_address)(self.env.as_ptr(), handle) };
        if ptr.is_null() {
            Err(ResolveError::Unresolved(handle))
        } else {
            Ok(RawAddress::from_ptr(ptr))
        }
    }
}

/// Runs `f` with a validated context, never letting a panic cross the boundary.
fn with_env<R>(env: *mut NativeEnv, fallback: R, f: impl FnOnce(&EnvContext) -> R) -> R {
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        // SAFETY: the runtime guarantees `env` for the duration of the native call
        unsafe { EnvContext::from_raw(env) }.map(|ctx| f(&ctx))
    }));
    match result {
        Ok(Some(r)) => r,
        Ok(None) => {
            warn!("native method called without a usable environment");
            fallback
        }
        Err(_) => {
            error!("panic inside native method");
            fallback
        }
    }
}

/// `MyClass.printNativeAddress()V`
///
/// # Safety
///
/// Must only be called by the managed runtime, with `env` valid for the current thread and call.
#[no_mangle]
pub unsafe extern "system" fn Java_MyClass_printNativeAddress(
    env: *mut NativeEnv,
    obj: ObjectHandle,
) {
    with_env(env, (), |ctx| {
        entry::print_native_address(ctx, &StdoutSink, &IdentityReporter::default(), obj);
    })
}

/// `MyClass.getNativeAddress()J`
///
/// # Safety
///
/// Must only be called by the managed runtime, with `env` valid for the current thread and call.
#[no_mangle]
pub unsafe extern "system" fn Java_MyClass_getNativeAddress(
    env: *mut NativeEnv,
    obj: ObjectHandle,
) -> NativeInt {
    with_env(env, 0, |ctx| entry::get_native_address(ctx, obj))
}

#[cfg(test)]
mod tests {
    use super::*;

    unsafe extern "system" fn version_1(_env: *mut NativeEnv) -> i32 {
        INTERFACE_VERSION
    }

    unsafe extern "system" fn version_2(_env: *mut NativeEnv) -> i32 {
        0x0002_0000
    }

    unsafe extern "system" fn resolve_token(_env: *mut NativeEnv, obj: ObjectHandle) -> *const c_void {
        if obj.token() == 1 {
            sptr::invalid(0x7ffe_e009_9000)
        } else {
            std::ptr::null()
        }
    }

    #[test]
    fn test_query_through_table() {
        let table = NativeInterface {
            get_version: version_1,
            resolve_address: resolve_token,
        };
        let mut env = NativeEnv { functions: &table };
        unsafe {
            assert_eq!(
                Java_MyClass_getNativeAddress(&mut env, ObjectHandle::from_token(1)),
                0x7ffe_e009_9000
            );
            assert_eq!(
                Java_MyClass_getNativeAddress(&mut env, ObjectHandle::from_token(2)),
                0
            );
        }
    }

    #[test]
    fn test_rejects_missing_or_incompatible_env() {
        unsafe {
            assert_eq!(
                Java_MyClass_getNativeAddress(std::ptr::null_mut(), ObjectHandle::from_token(1)),
                0
            );
        }

        let table = NativeInterface {
            get_version: version_2,
            resolve_address: resolve_token,
        };
        let mut env = NativeEnv { functions: &table };
        assert!(unsafe { EnvContext::from_raw(&mut env) }.is_none());

        let mut empty = NativeEnv {
            functions: std::ptr::null(),
        };
        assert!(unsafe { EnvContext::from_raw(&mut empty) }.is_none());
    }
}
