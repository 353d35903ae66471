use crate::{
    context::{ExecutionContext, ResolveError},
    handle::{ObjectHandle, RawAddress},
};
use tracing::trace;

/// Turns handles into address snapshots through an [`ExecutionContext`].
///
/// A probe result is only meaningful inside the native call frame that produced it.
pub struct AddressProbe<'ctx, C: ExecutionContext + ?Sized> {
    ctx: &'ctx C,
}

impl<'ctx, C: ExecutionContext + ?Sized> AddressProbe<'ctx, C> {
    pub fn new(ctx: &'ctx C) -> Self {
        Self { ctx }
    }

    pub fn probe(&self, handle: ObjectHandle) -> Result<RawAddress, ResolveError> {
        if handle.is_null() {
            return Err(ResolveError::NullHandle);
        }

        let addr = self.ctx.resolve(handle)?;
        if addr.is_sentinel() {
            return Err(ResolveError::Unresolved(handle));
        }

        trace!(?handle, %addr, "probed object address");
        Ok(addr)
    }

    /// Like [`probe`](Self::probe), but every failure collapses to [`RawAddress::SENTINEL`].
    pub fn probe_or_sentinel(&self, handle: ObjectHandle) -> RawAddress {
        self.probe(handle).unwrap_or(RawAddress::SENTINEL)
    }
}
