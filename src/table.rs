use super::*;

use crate::config::limit_reached;

/// Per-location stack counters in registration order.
pub type AssertionCounts = IndexMap<StackTrace, u64>;

/// Borrowed lookup key so hits on an existing location never allocate.
///
/// Field order matches `AssertionLocation` so the derived hashes agree.
#[derive(Hash)]
struct LocationKey<'a> {
  file: &'a str,
  line: u32,
  text: &'a str,
}

impl indexmap::Equivalent<AssertionLocation> for LocationKey<'_> {
  fn equivalent(&self, key: &AssertionLocation) -> bool {
    self.line == key.line
      && self.file == key.file.as_ref()
      && self.text == key.text.as_ref()
  }
}

/// Snapshot of the admission limits applied to one occurrence.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Limits {
  pub max_assertions: i64,
  pub max_locations: i64,
  pub max_stack_traces_per_location: i64,
}

impl Default for Limits {
  fn default() -> Self {
    Self {
      max_assertions: UNBOUNDED,
      max_locations: UNBOUNDED,
      max_stack_traces_per_location: UNBOUNDED,
    }
  }
}

/// Outcome of offering one occurrence to the table.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Admission {
  /// The occurrence was counted against `trace`.
  Counted {
    count: u64,
    new_location: bool,
    new_stack: bool,
    trace: StackTrace,
  },
  /// The process-wide occurrence limit is exhausted.
  AssertionLimit,
  /// A new location would exceed the location limit.
  LocationLimit,
  /// A new stack would exceed the per-location stack limit.
  StackLimit,
  /// Stack tracking is disabled for this location.
  StacksDisabled,
}

impl Admission {
  #[must_use]
  pub fn is_counted(&self) -> bool {
    matches!(self, Self::Counted { .. })
  }
}

/// Occurrence counts keyed by location, then by stack.
///
/// Growth is purely admission controlled: entries are never evicted, and a
/// refused occurrence leaves the table untouched apart from the occurrence
/// counter.
#[derive(Debug, Default)]
pub struct TrackingTable {
  assertion_count: u64,
  locations: IndexMap<AssertionLocation, AssertionCounts>,
}

impl TrackingTable {
  /// Total occurrences offered so far, including refused ones.
  #[must_use]
  pub fn assertion_count(&self) -> u64 {
    self.assertion_count
  }

  /// Current count for one `(location, stack)` pair.
  #[must_use]
  pub fn count(&self, location: &AssertionLocation, trace: &StackTrace) -> u64 {
    self
      .locations
      .get(location)
      .and_then(|counts| counts.get(trace))
      .copied()
      .unwrap_or(0)
  }

  /// Locations and their stacks in registration order.
  pub fn iter(
    &self,
  ) -> impl Iterator<Item = (&AssertionLocation, &AssertionCounts)> {
    self.locations.iter()
  }

  #[must_use]
  pub fn location_count(&self) -> usize {
    self.locations.len()
  }

  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  /// Offer one occurrence.
  ///
  /// `capture` runs only once the location has been admitted, so refused
  /// occurrences never pay for a stack walk.
  pub fn record<F>(
    &mut self,
    text: &str,
    file: &str,
    line: u32,
    limits: Limits,
    capture: F,
  ) -> Admission
  where
    F: FnOnce() -> StackTrace,
  {
    self.assertion_count = self.assertion_count.saturating_add(1);

    if limits.max_assertions >= 0
      && self.assertion_count > limits.max_assertions.unsigned_abs()
    {
      return Admission::AssertionLimit;
    }

    let key = LocationKey { file, line, text };
    let mut new_location = false;

    let index = match self.locations.get_index_of(&key) {
      Some(index) => index,
      None => {
        if limit_reached(limits.max_locations, self.locations.len()) {
          return Admission::LocationLimit;
        }

        let location = AssertionLocation::new(text, file, line);
        let (index, _) = self.locations.insert_full(location, IndexMap::new());

        if limits.max_stack_traces_per_location == 0 {
          return Admission::StacksDisabled;
        }

        new_location = true;
        index
      }
    };

    let trace = capture();

    let counts = &mut self.locations[index];

    let new_stack = !counts.contains_key(&trace);

    if new_stack
      && limit_reached(limits.max_stack_traces_per_location, counts.len())
    {
      return Admission::StackLimit;
    }

    let count = counts.entry(trace.clone()).or_insert(0);
    *count = count.saturating_add(1);

    Admission::Counted {
      count: *count,
      new_location,
      new_stack,
      trace,
    }
  }
}
