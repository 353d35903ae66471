//! Native-side address probing for managed objects.
//!
//! A managed runtime calls into native code with an opaque [`ObjectHandle`] and an
//! [`ExecutionContext`]. [`AddressProbe`] resolves the handle to the [`RawAddress`] backing the
//! object *right now*; [`IdentityReporter`] prints or returns that snapshot. A snapshot is only
//! valid inside the native call that took it: the runtime may move the object at its next
//! safepoint.
pub mod context;
pub mod entry;
pub mod ffi;
pub mod handle;
pub mod mangle;
pub mod probe;
pub mod report;

#[cfg(feature = "host")]
pub mod host;

pub use context::{ExecutionContext, ResolveError};
pub use entry::{get_native_address, print_native_address};
pub use handle::{NativeInt, ObjectHandle, RawAddress};
pub use probe::AddressProbe;
pub use report::{CaptureSink, DiagnosticSink, IdentityReporter, ReporterConfig, Sink, StdoutSink};
