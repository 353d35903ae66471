//! An embeddable managed runtime that drives the native boundary.
//!
//! A [`ManagedRuntime`] belongs to one thread. Native methods are bound through
//! [`NativeLibraries`] and invoked through libffi with a fresh [`NativeEnv`] and a local
//! receiver handle, both of which stop being valid when the call returns.
//!
//! [`NativeEnv`]: crate::ffi::NativeEnv
use crate::{
    context::{ExecutionContext, ResolveError},
    handle::{ObjectHandle, RawAddress},
};
use libffi::middle::{Arg, Cif, CodePtr, Type};
use std::ffi::c_void;
use tracing::debug;

mod env;
pub mod heap;
pub mod pinvoke;

pub use heap::{ManagedHeap, ManagedObject, RuntimeError};
pub use pinvoke::{InvokeError, NativeKind, NativeLibraries, NativeMethod, NativeReturn};

#[derive(Default)]
pub struct ManagedRuntime {
    heap: ManagedHeap,
}

impl ManagedRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn heap(&self) -> &ManagedHeap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut ManagedHeap {
        &mut self.heap
    }

    pub fn allocate(&mut self, object: ManagedObject) -> ObjectHandle {
        self.heap.allocate(object)
    }

    /// Simulates a compacting collection that moves `handle`'s object.
    pub fn relocate(&mut self, handle: ObjectHandle) -> Result<(), RuntimeError> {
        self.heap.relocate(handle)?;
        self.heap.collect();
        Ok(())
    }

    /// Calls `method` on `receiver` the way managed code calls a native method.
    pub fn invoke(
        &mut self,
        libraries: &NativeLibraries,
        method: &NativeMethod,
        receiver: ObjectHandle,
    ) -> Result<NativeReturn, InvokeError> {
        let target = libraries.bind(method)?;
        debug!(
            "invoking native {}.{}{} on {:?}",
            method.class,
            method.name,
            method.kind.descriptor(),
            receiver
        );

        self.heap.push_frame();
        let result = self.call_in_frame(target, method.kind, receiver);
        self.heap.pop_frame()?;

        debug!("returned {:?} from {}.{}", result, method.class, method.name);
        result
    }

    fn call_in_frame(
        &mut self,
        target: CodePtr,
        kind: NativeKind,
        receiver: ObjectHandle,
    ) -> Result<NativeReturn, InvokeError> {
        // dead or forged receivers are passed through untouched; the native side must cope
        let local = if self.heap.is_live(receiver) {
            self.heap.new_local(receiver)?
        } else {
            debug!(?receiver, "passing non-live receiver to native code");
            receiver
        };

        let mut thread_env = env::ThreadEnv::new(self);
        let env_ptr = thread_env.as_raw();
        let cif = Cif::new([Type::pointer(), Type::pointer()], kind.return_type());
        let args = [Arg::new(&env_ptr), Arg::new(&local)];

        // SAFETY: the Cif matches the (env, receiver) signature of every bound NativeKind, and
        // `thread_env` outlives the call
        let ret = match kind {
            NativeKind::Diagnostic => {
                let _: c_void = unsafe { cif.call(target, &args) };
                NativeReturn::Void
            }
            NativeKind::Query => NativeReturn::Int(unsafe { cif.call::<isize>(target, &args) }),
        };
        Ok(ret)
    }
}

impl ExecutionContext for ManagedRuntime {
    fn resolve(&self, handle: ObjectHandle) -> Result<RawAddress, ResolveError> {
        self.heap.resolve(handle)
    }
}
