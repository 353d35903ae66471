use crate::handle::{ObjectHandle, RawAddress};
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ResolveError {
    #[error("null object handle")]
    NullHandle,
    #[error("handle {0:?} does not refer to a live object")]
    StaleHandle(ObjectHandle),
    #[error("runtime could not resolve an address for {0:?}")]
    Unresolved(ObjectHandle),
}

/// Per-call access into the managed runtime.
///
/// Implementations are borrowed for the duration of a single boundary call. Resolution must not
/// introduce a safepoint, so two resolutions within one call observe the same object placement.
pub trait ExecutionContext {
    /// Resolves a handle to the address currently backing its object.
    fn resolve(&self, handle: ObjectHandle) -> Result<RawAddress, ResolveError>;
}

impl<C: ExecutionContext + ?Sized> ExecutionContext for &C {
    fn resolve(&self, handle: ObjectHandle) -> Result<RawAddress, ResolveError> {
        (**self).resolve(handle)
    }
}
