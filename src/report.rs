use super::*;

use std::fmt::Write as _;

/// Capacity of the stack buffer the default reporter formats into.
pub const REPORT_BUFFER_BYTES: usize = 1024;

/// One aggregated record handed to a [`Reporter`].
#[derive(Debug, Clone, Copy)]
pub struct AssertionReport<'a> {
  pub count: u64,
  pub file: &'a str,
  pub line: u32,
  pub text: &'a str,
  pub trace: &'a StackTrace,
}

/// Renders `file:line:count:text:[ addr1 addr2 ... ]`.
impl Display for AssertionReport<'_> {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{}:{}:{}:{}:{}",
      self.file, self.line, self.count, self.text, self.trace
    )
  }
}

/// Sink for aggregated reports.
///
/// Reporters run while the tracker's lock is held and must not call back into
/// the same tracker.
pub trait Reporter: Send + Sync {
  fn report(&self, report: &AssertionReport<'_>);
}

impl<F> Reporter for F
where
  F: Fn(&AssertionReport<'_>) + Send + Sync,
{
  fn report(&self, report: &AssertionReport<'_>) {
    self(report);
  }
}

/// Handler invoked whenever a failure cannot be tracked.
///
/// This is usually the process's real assertion handler, so the tracker stays
/// a transparent layer in front of it.
pub trait FallbackHandler: Send + Sync {
  fn handle(&self, text: &str, file: &str, line: u32);
}

impl<F> FallbackHandler for F
where
  F: Fn(&str, &str, u32) + Send + Sync,
{
  fn handle(&self, text: &str, file: &str, line: u32) {
    self(text, file, line);
  }
}

/// `fmt::Write` over a fixed buffer that keeps as much as fits.
struct Truncating<'a, const N: usize>(&'a mut ArrayString<N>);

impl<const N: usize> fmt::Write for Truncating<'_, N> {
  fn write_str(&mut self, s: &str) -> fmt::Result {
    if self.0.try_push_str(s).is_ok() {
      return Ok(());
    }

    for ch in s.chars() {
      if self.0.try_push(ch).is_err() {
        break;
      }
    }

    Err(fmt::Error)
  }
}

/// Formats a report into `buffer` without touching the heap.
///
/// Returns `false` when the report did not fit and was truncated.
pub(crate) fn format_into<const N: usize>(
  buffer: &mut ArrayString<N>,
  report: &AssertionReport<'_>,
) -> bool {
  write!(Truncating(buffer), "{report}").is_ok()
}

/// Default reporter: emits each record at error severity.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl Reporter for LogReporter {
  fn report(&self, report: &AssertionReport<'_>) {
    let mut buffer = ArrayString::<REPORT_BUFFER_BYTES>::new();
    let complete = format_into(&mut buffer, report);

    tracing::error!(
      target: "assertion_tracker",
      truncated = !complete,
      "{}",
      buffer.as_str()
    );
  }
}

/// Writes one line per report to an arbitrary output sink.
///
/// Write errors are counted and logged, never propagated: reporting runs on
/// the failure path and must not introduce failures of its own.
#[derive(Debug)]
pub struct WriterReporter<W: Write + Send> {
  write_failures: AtomicU64,
  writer: Mutex<W>,
}

impl<W: Write + Send> WriterReporter<W> {
  pub fn into_inner(self) -> W {
    match self.writer.into_inner() {
      Ok(writer) => writer,
      Err(err) => err.into_inner(),
    }
  }

  fn lock_writer(&self) -> MutexGuard<'_, W> {
    match self.writer.lock() {
      Ok(guard) => guard,
      Err(err) => err.into_inner(),
    }
  }

  pub fn new(writer: W) -> Self {
    Self {
      write_failures: AtomicU64::new(0),
      writer: Mutex::new(writer),
    }
  }

  /// Number of reports the sink failed to accept.
  #[must_use]
  pub fn write_failures(&self) -> u64 {
    self.write_failures.load(Ordering::Relaxed)
  }
}

impl<W: Write + Send> Reporter for WriterReporter<W> {
  fn report(&self, report: &AssertionReport<'_>) {
    let mut writer = self.lock_writer();

    if let Err(err) = writeln!(writer, "{report}").and_then(|()| writer.flush())
    {
      self.write_failures.fetch_add(1, Ordering::Relaxed);
      tracing::warn!(
        target: "assertion_tracker",
        error = %err,
        "failed to write assertion report"
      );
    }
  }
}
