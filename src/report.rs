//! Rendering of address snapshots and the sinks they are written to.
use crate::handle::{NativeInt, RawAddress};
use enum_dispatch::enum_dispatch;
use parking_lot::Mutex;
use std::{
    borrow::Cow,
    io::{self, Write},
    sync::Arc,
};

/// Destination for diagnostic lines.
///
/// `write_line` receives a complete line without its terminator and must not split it with
/// output from other writers. Lines only have to become observable after `flush`.
#[enum_dispatch]
pub trait DiagnosticSink {
    fn write_line(&self, line: &str) -> io::Result<()>;
    fn flush(&self) -> io::Result<()>;
}

#[enum_dispatch(DiagnosticSink)]
#[derive(Clone, Debug)]
pub enum Sink {
    StdoutSink,
    CaptureSink,
}

impl Default for Sink {
    fn default() -> Self {
        Sink::StdoutSink(StdoutSink)
    }
}

/// The process standard output stream.
#[derive(Clone, Copy, Debug, Default)]
pub struct StdoutSink;

impl DiagnosticSink for StdoutSink {
    fn write_line(&self, line: &str) -> io::Result<()> {
        let mut buf = String::with_capacity(line.len() + 1);
        buf.push_str(line);
        buf.push('\n');
        io::stdout().lock().write_all(buf.as_bytes())
    }

    fn flush(&self) -> io::Result<()> {
        io::stdout().lock().flush()
    }
}

#[derive(Debug, Default)]
struct CaptureBuffer {
    pending: Vec<String>,
    flushed: Vec<String>,
}

/// In-memory sink. Clones share the same buffer.
#[derive(Clone, Debug, Default)]
pub struct CaptureSink {
    inner: Arc<Mutex<CaptureBuffer>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines that have been flushed, in flush order.
    pub fn lines(&self) -> Vec<String> {
        self.inner.lock().flushed.clone()
    }

    pub fn pending(&self) -> usize {
        self.inner.lock().pending.len()
    }
}

impl DiagnosticSink for CaptureSink {
    fn write_line(&self, line: &str) -> io::Result<()> {
        self.inner.lock().pending.push(line.to_owned());
        Ok(())
    }

    fn flush(&self) -> io::Result<()> {
        let mut buf = self.inner.lock();
        let pending = std::mem::take(&mut buf.pending);
        buf.flushed.extend(pending);
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct ReporterConfig {
    /// Bracketed prefix of every diagnostic line.
    pub tag: Cow<'static, str>,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            tag: Cow::Borrowed(IdentityReporter::DEFAULT_TAG),
        }
    }
}

/// Formats address snapshots. Never resolves anything itself.
#[derive(Clone, Debug, Default)]
pub struct IdentityReporter {
    config: ReporterConfig,
}

impl IdentityReporter {
    pub const DEFAULT_TAG: &'static str = "JNI";
    pub const MESSAGE: &'static str = "Native address of obj: ";

    pub fn new(config: ReporterConfig) -> Self {
        Self { config }
    }

    pub fn with_tag(tag: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ReporterConfig { tag: tag.into() })
    }

    pub fn tag(&self) -> &str {
        &self.config.tag
    }

    pub fn render(&self, addr: RawAddress) -> String {
        format!("[{}] {}{:#x}", self.config.tag, Self::MESSAGE, addr)
    }

    /// Writes the rendered line and flushes before returning.
    pub fn report<S: DiagnosticSink + ?Sized>(&self, sink: &S, addr: RawAddress) -> io::Result<()> {
        sink.write_line(&self.render(addr))?;
        sink.flush()
    }

    pub fn passthrough(addr: RawAddress) -> NativeInt {
        addr.to_native_int()
    }

    /// Recovers the address field from a line produced by [`render`](Self::render).
    pub fn parse_line(&self, line: &str) -> Option<RawAddress> {
        let rest = line.strip_prefix('[')?.strip_prefix(self.tag())?;
        let hex = rest.strip_prefix("] ")?.strip_prefix(Self::MESSAGE)?.strip_prefix("0x")?;
        usize::from_str_radix(hex, 16).ok().map(RawAddress::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_default_tag() {
        let reporter = IdentityReporter::default();
        assert_eq!(
            reporter.render(RawAddress::new(0x7ffe_e001_2340)),
            "[JNI] Native address of obj: 0x7ffee0012340"
        );
    }

    #[test]
    fn test_parse_line() {
        let reporter = IdentityReporter::with_tag("snapshot");
        let line = reporter.render(RawAddress::new(0xdead_beef));
        assert_eq!(reporter.parse_line(&line), Some(RawAddress::new(0xdead_beef)));
        assert_eq!(IdentityReporter::default().parse_line(&line), None);
        assert_eq!(reporter.parse_line("[snapshot] Native address of obj: 0xzz"), None);
    }

    #[test]
    fn test_capture_sink_requires_flush() {
        let sink = CaptureSink::new();
        sink.write_line("a").unwrap();
        assert!(sink.lines().is_empty());
        assert_eq!(sink.pending(), 1);
        sink.flush().unwrap();
        assert_eq!(sink.lines(), vec!["a".to_string()]);
        assert_eq!(sink.pending(), 0);
    }

    #[test]
    fn test_stdout_sink_accepts_lines() {
        let sink = Sink::default();
        assert!(matches!(sink, Sink::StdoutSink(_)));
        IdentityReporter::with_tag("stdout-sink-test")
            .report(&sink, RawAddress::new(0x20))
            .unwrap();
    }

    #[test]
    fn test_report_flushes() {
        let sink = Sink::from(CaptureSink::new());
        IdentityReporter::default()
            .report(&sink, RawAddress::new(0x10))
            .unwrap();
        let Sink::CaptureSink(capture) = sink else {
            unreachable!()
        };
        assert_eq!(capture.lines(), vec!["[JNI] Native address of obj: 0x10"]);
    }
}
