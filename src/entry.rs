//! The two boundary operations, independent of any particular calling convention.
//!
//! Neither function fails: resolution errors collapse to the sentinel (query) or to an omitted
//! line (diagnostic), and are only surfaced through `tracing`.
use crate::{
    context::ExecutionContext,
    handle::{NativeInt, ObjectHandle, RawAddress},
    probe::AddressProbe,
    report::{DiagnosticSink, IdentityReporter},
};
use tracing::warn;

/// Diagnostic variant: writes one flushed line describing `obj`'s current address.
///
/// Returns the address that was reported, or `None` if nothing was written.
pub fn print_native_address<C, S>(
    ctx: &C,
    sink: &S,
    reporter: &IdentityReporter,
    obj: ObjectHandle,
) -> Option<RawAddress>
where
    C: ExecutionContext + ?Sized,
    S: DiagnosticSink + ?Sized,
{
    let addr = match AddressProbe::new(ctx).probe(obj) {
        Ok(addr) => addr,
        Err(e) => {
            warn!(?obj, "not reporting address: {e}");
            return None;
        }
    };

    if let Err(e) = reporter.report(sink, addr) {
        warn!(?obj, %addr, "failed to write diagnostic line: {e}");
        return None;
    }
    Some(addr)
}

/// Query variant: the current address of `obj` as a boundary integer, or 0.
pub fn get_native_address<C>(ctx: &C, obj: ObjectHandle) -> NativeInt
where
    C: ExecutionContext + ?Sized,
{
    let addr = AddressProbe::new(ctx)
        .probe(obj)
        .inspect_err(|e| warn!(?obj, "returning sentinel: {e}"))
        .unwrap_or(RawAddress::SENTINEL);
    IdentityReporter::passthrough(addr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{context::ResolveError, report::CaptureSink};
    use std::cell::Cell;

    /// Hands out a new address on every resolution, like a runtime that moves objects
    /// between calls.
    struct MovingContext {
        next: Cell<usize>,
    }

    impl ExecutionContext for MovingContext {
        fn resolve(&self, handle: ObjectHandle) -> Result<RawAddress, ResolveError> {
            if handle.token() != 1 {
                return Err(ResolveError::StaleHandle(handle));
            }
            let addr = self.next.get();
            self.next.set(addr + 0x100);
            Ok(RawAddress::new(addr))
        }
    }

    #[test]
    fn test_print_writes_single_line() {
        let ctx = MovingContext {
            next: Cell::new(0x1000),
        };
        let sink = CaptureSink::new();
        let reported = print_native_address(
            &ctx,
            &sink,
            &IdentityReporter::default(),
            ObjectHandle::from_token(1),
        );
        assert_eq!(reported, Some(RawAddress::new(0x1000)));
        assert_eq!(sink.lines(), vec!["[JNI] Native address of obj: 0x1000"]);
    }

    #[test]
    fn test_print_omits_line_for_bad_handle() {
        let ctx = MovingContext {
            next: Cell::new(0x1000),
        };
        let sink = CaptureSink::new();
        let reporter = IdentityReporter::default();
        assert_eq!(
            print_native_address(&ctx, &sink, &reporter, ObjectHandle::NULL),
            None
        );
        assert_eq!(
            print_native_address(&ctx, &sink, &reporter, ObjectHandle::from_token(5)),
            None
        );
        assert!(sink.lines().is_empty());
        assert_eq!(sink.pending(), 0);
    }

    #[derive(Clone, Default)]
    struct LogBuffer(std::sync::Arc<parking_lot::Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_query_failure_logged_at_warn() {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        let ctx = MovingContext {
            next: Cell::new(0x1000),
        };
        tracing::subscriber::with_default(subscriber, || {
            assert_eq!(get_native_address(&ctx, ObjectHandle::NULL), 0);
        });

        let output = String::from_utf8(logs.0.lock().clone()).unwrap();
        assert!(output.contains("WARN"), "{output}");
        assert!(output.contains("returning sentinel"), "{output}");
    }

    #[test]
    fn test_query_sentinel() {
        let ctx = MovingContext {
            next: Cell::new(0x1000),
        };
        assert_eq!(get_native_address(&ctx, ObjectHandle::NULL), 0);
        assert_eq!(get_native_address(&ctx, ObjectHandle::from_token(3)), 0);
        assert_eq!(get_native_address(&ctx, ObjectHandle::from_token(1)), 0x1000);
    }
}
