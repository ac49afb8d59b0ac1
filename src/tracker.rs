use super::*;

use crate::config::clamp_limit;
use crate::report::AssertionReport;
use crate::snapshot::TrackingSnapshot;
use crate::table::Limits;

static NEXT_TRACKER_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
  /// Trackers the current thread is executing inside of.
  static ACTIVE_TRACKERS: RefCell<Vec<u64>> =
    const { RefCell::new(Vec::new()) };
}

/// Marks the current thread as inside one tracker until dropped.
struct ReentrancyGuard {
  id: u64,
}

impl ReentrancyGuard {
  /// Returns `None` when the thread is already inside tracker `id`, or when
  /// thread-local storage has already been torn down.
  fn enter(id: u64) -> Option<Self> {
    ACTIVE_TRACKERS
      .try_with(|active| {
        let mut active = active.borrow_mut();

        if active.contains(&id) {
          return None;
        }

        active.push(id);
        Some(Self { id })
      })
      .ok()
      .flatten()
  }
}

impl Drop for ReentrancyGuard {
  fn drop(&mut self) {
    let _ = ACTIVE_TRACKERS.try_with(|active| {
      let mut active = active.borrow_mut();

      if let Some(position) = active.iter().rposition(|id| *id == self.id) {
        active.swap_remove(position);
      }
    });
  }
}

/// Builder for [`AssertionTracker`]. The fallback handler is required.
pub struct AssertionTrackerBuilder {
  config: TrackerConfig,
  fallback: Arc<dyn FallbackHandler>,
  reporter: Arc<dyn Reporter>,
  source: Arc<dyn FrameSource>,
}

impl AssertionTrackerBuilder {
  #[must_use]
  pub fn finish(self) -> AssertionTracker {
    let config = self.config.normalized();
    let collector = StackCollector::new(self.source, &config);

    let inner = TrackerInner {
      collector,
      fallback: self.fallback,
      frequency: AtomicU8::new(config.reporting_frequency as u8),
      id: NEXT_TRACKER_ID.fetch_add(1, Ordering::Relaxed),
      max_assertions: AtomicI64::new(config.max_assertions),
      max_locations: AtomicI64::new(config.max_locations),
      max_stack_traces_per_location: AtomicI64::new(
        config.max_stack_traces_per_location,
      ),
      state: Mutex::new(TrackerState {
        reporter: self.reporter,
        table: TrackingTable::new(),
      }),
    };

    AssertionTracker {
      inner: Arc::new(inner),
    }
  }

  /// Replace the stack walker, e.g. with a synthetic source in tests.
  #[must_use]
  pub fn frame_source<S>(mut self, source: S) -> Self
  where
    S: FrameSource + 'static,
  {
    self.source = Arc::new(source);
    self
  }

  #[must_use]
  pub fn max_assertions(mut self, max: i64) -> Self {
    self.config.max_assertions = clamp_limit(max);
    self
  }

  #[must_use]
  pub fn max_locations(mut self, max: i64) -> Self {
    self.config.max_locations = clamp_limit(max);
    self
  }

  #[must_use]
  pub fn max_stack_traces_per_location(mut self, max: i64) -> Self {
    self.config.max_stack_traces_per_location = clamp_limit(max);
    self
  }

  #[must_use]
  pub fn new<F>(fallback: F) -> Self
  where
    F: FallbackHandler + 'static,
  {
    Self {
      config: TrackerConfig::default(),
      fallback: Arc::new(fallback),
      reporter: Arc::new(LogReporter),
      source: Arc::new(BacktraceFrameSource),
    }
  }

  #[must_use]
  pub fn reporter<R>(mut self, reporter: R) -> Self
  where
    R: Reporter + 'static,
  {
    self.reporter = Arc::new(reporter);
    self
  }

  #[must_use]
  pub fn reporting_frequency(mut self, frequency: ReportingFrequency) -> Self {
    self.config.reporting_frequency = frequency;
    self
  }

  #[must_use]
  pub fn with_config(mut self, config: TrackerConfig) -> Self {
    self.config = config;
    self
  }
}

struct TrackerState {
  reporter: Arc<dyn Reporter>,
  table: TrackingTable,
}

struct TrackerInner {
  collector: StackCollector,
  fallback: Arc<dyn FallbackHandler>,
  frequency: AtomicU8,
  id: u64,
  max_assertions: AtomicI64,
  max_locations: AtomicI64,
  max_stack_traces_per_location: AtomicI64,
  state: Mutex<TrackerState>,
}

/// Deduplicating front end for a process's assertion failure handler.
///
/// Every failure is keyed by `(text, file, line)` and by the call stack that
/// reached it. Occurrences that fit within the configured limits are counted
/// and, depending on the reporting frequency, handed to the reporter. Anything
/// that cannot be tracked (a limit is exhausted, or the same thread re-enters
/// the tracker from its own reporter or fallback) goes straight to the
/// fallback handler instead.
///
/// All mutable state lives behind one mutex per tracker. The reporter runs
/// while that mutex is held; the fallback runs after it has been released, so
/// a fallback may query the tracker. Limits and the reporting frequency are
/// read once per occurrence, when the mutex is taken.
#[derive(Clone)]
pub struct AssertionTracker {
  inner: Arc<TrackerInner>,
}

impl fmt::Debug for AssertionTracker {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    f.debug_struct("AssertionTracker")
      .field("id", &self.inner.id)
      .field("max_assertions", &self.max_assertions())
      .field("max_locations", &self.max_locations())
      .field(
        "max_stack_traces_per_location",
        &self.max_stack_traces_per_location(),
      )
      .field("reporting_frequency", &self.reporting_frequency())
      .field("collector", &self.inner.collector)
      .finish_non_exhaustive()
  }
}

impl AssertionTracker {
  /// Occurrences offered so far, including deflected ones.
  #[must_use]
  pub fn assertion_count(&self) -> u64 {
    self.lock_state().table.assertion_count()
  }

  #[must_use]
  pub fn builder<F>(fallback: F) -> AssertionTrackerBuilder
  where
    F: FallbackHandler + 'static,
  {
    AssertionTrackerBuilder::new(fallback)
  }

  fn deflect(&self, text: &str, file: &str, line: u32) {
    self.inner.fallback.handle(text, file, line);
  }

  fn limits(&self) -> Limits {
    Limits {
      max_assertions: self.max_assertions(),
      max_locations: self.max_locations(),
      max_stack_traces_per_location: self.max_stack_traces_per_location(),
    }
  }

  #[must_use]
  pub fn location_count(&self) -> usize {
    self.lock_state().table.location_count()
  }

  fn lock_state(&self) -> MutexGuard<'_, TrackerState> {
    match self.inner.state.lock() {
      Ok(guard) => guard,
      Err(err) => err.into_inner(),
    }
  }

  #[must_use]
  pub fn max_assertions(&self) -> i64 {
    self.inner.max_assertions.load(Ordering::Acquire)
  }

  #[must_use]
  pub fn max_locations(&self) -> i64 {
    self.inner.max_locations.load(Ordering::Acquire)
  }

  #[must_use]
  pub fn max_stack_traces_per_location(&self) -> i64 {
    self.inner.max_stack_traces_per_location.load(Ordering::Acquire)
  }

  /// Tracker with default limits that reports through [`LogReporter`].
  #[must_use]
  pub fn new<F>(fallback: F) -> Self
  where
    F: FallbackHandler + 'static,
  {
    Self::builder(fallback).finish()
  }

  /// Record one assertion failure.
  ///
  /// Never fails: whatever cannot be tracked is forwarded to the fallback
  /// handler with the original arguments.
  pub fn record_failure(&self, text: &str, file: &str, line: u32) {
    let Some(_guard) = ReentrancyGuard::enter(self.inner.id) else {
      tracing::warn!(
        target: "assertion_tracker",
        file,
        line,
        "assertion tracker re-entered on the same thread"
      );
      self.deflect(text, file, line);
      return;
    };

    let mut state = self.lock_state();
    let limits = self.limits();
    let frequency = self.reporting_frequency();
    let collector = &self.inner.collector;

    let admission =
      state
        .table
        .record(text, file, line, limits, || collector.capture());

    let (count, new_location, new_stack, trace) = match admission {
      Admission::Counted {
        count,
        new_location,
        new_stack,
        trace,
      } => (count, new_location, new_stack, trace),
      refused => {
        drop(state);
        tracing::debug!(
          target: "assertion_tracker",
          file,
          line,
          outcome = ?refused,
          "assertion deflected to fallback"
        );
        self.deflect(text, file, line);
        return;
      }
    };

    if new_stack {
      tracing::debug!(
        target: "assertion_tracker",
        file,
        line,
        new_location,
        frames = trace.len(),
        "tracking new assertion stack"
      );
    }

    if frequency.should_report(new_location, new_stack) {
      state.reporter.report(&AssertionReport {
        count,
        file,
        line,
        text,
        trace: &trace,
      });
    }
  }

  /// Report every tracked `(location, stack)` pair with its current count,
  /// in registration order.
  ///
  /// Calling this from inside the tracker's own reporter or fallback does
  /// nothing.
  pub fn report_all_stack_traces(&self) {
    let Some(_guard) = ReentrancyGuard::enter(self.inner.id) else {
      return;
    };

    let state = self.lock_state();

    for (location, counts) in state.table.iter() {
      for (trace, count) in counts {
        state.reporter.report(&AssertionReport {
          count: *count,
          file: &location.file,
          line: location.line,
          text: &location.text,
          trace,
        });
      }
    }
  }

  #[must_use]
  pub fn reporting_callback(&self) -> Arc<dyn Reporter> {
    Arc::clone(&self.lock_state().reporter)
  }

  #[must_use]
  pub fn reporting_frequency(&self) -> ReportingFrequency {
    ReportingFrequency::from_u8(self.inner.frequency.load(Ordering::Acquire))
  }

  /// Values below `-1` are stored as `-1` (unbounded).
  pub fn set_max_assertions(&self, max: i64) {
    self
      .inner
      .max_assertions
      .store(clamp_limit(max), Ordering::Release);
  }

  pub fn set_max_locations(&self, max: i64) {
    self
      .inner
      .max_locations
      .store(clamp_limit(max), Ordering::Release);
  }

  /// Zero disables stack tracking for locations registered afterwards and
  /// refuses new stacks everywhere.
  pub fn set_max_stack_traces_per_location(&self, max: i64) {
    self
      .inner
      .max_stack_traces_per_location
      .store(clamp_limit(max), Ordering::Release);
  }

  /// Replace the reporter for subsequent occurrences.
  pub fn set_reporting_callback<R>(&self, reporter: R)
  where
    R: Reporter + 'static,
  {
    self.lock_state().reporter = Arc::new(reporter);
  }

  pub fn set_reporting_frequency(&self, frequency: ReportingFrequency) {
    self
      .inner
      .frequency
      .store(frequency as u8, Ordering::Release);
  }

  /// Copy of everything tracked so far.
  #[must_use]
  pub fn snapshot(&self) -> TrackingSnapshot {
    TrackingSnapshot::from_table(&self.lock_state().table)
  }
}
