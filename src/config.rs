use super::*;

use crate::location::ReportingFrequency;

/// Sentinel limit value meaning "no bound".
pub const UNBOUNDED: i64 = -1;

/// Errors produced while loading a tracker configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("failed to parse tracker config: {0}")]
  Parse(#[from] serde_json::Error),
  #[error("initial_capture_frames must be at least 1")]
  ZeroCaptureFrames,
}

/// Controls admission limits, reporting cadence and stack capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
  /// Number of slots the stack capturer starts with before doubling.
  pub initial_capture_frames: usize,
  /// Total accepted occurrences before every further one goes to fallback.
  pub max_assertions: i64,
  /// Upper bound on the capture buffer; deeper stacks are truncated here.
  pub max_capture_frames: usize,
  /// Cap on distinct `(text, file, line)` locations.
  pub max_locations: i64,
  /// Cap on distinct stacks per location. Zero disables stack tracking.
  pub max_stack_traces_per_location: i64,
  pub reporting_frequency: ReportingFrequency,
  /// Innermost frames dropped from every capture.
  pub skip_frames: usize,
}

impl Default for TrackerConfig {
  fn default() -> Self {
    Self {
      initial_capture_frames: 128,
      max_assertions: UNBOUNDED,
      max_capture_frames: 4096,
      max_locations: UNBOUNDED,
      max_stack_traces_per_location: UNBOUNDED,
      reporting_frequency: ReportingFrequency::OnNewStackTrace,
      skip_frames: 0,
    }
  }
}

impl TrackerConfig {
  /// Parse a JSON document, filling missing keys with defaults.
  ///
  /// # Errors
  ///
  /// Returns an error if the document is not valid JSON for this struct or
  /// asks for an empty capture buffer.
  pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
    let config: Self = serde_json::from_str(input)?;

    if config.initial_capture_frames == 0 {
      return Err(ConfigError::ZeroCaptureFrames);
    }

    Ok(config.normalized())
  }

  /// Clamp every limit so values below `-1` read as unbounded.
  #[must_use]
  pub fn normalized(mut self) -> Self {
    self.max_assertions = clamp_limit(self.max_assertions);
    self.max_locations = clamp_limit(self.max_locations);
    self.max_stack_traces_per_location =
      clamp_limit(self.max_stack_traces_per_location);
    self.max_capture_frames =
      self.max_capture_frames.max(self.initial_capture_frames);
    self
  }

  #[must_use]
  pub fn with_max_assertions(mut self, max: i64) -> Self {
    self.max_assertions = clamp_limit(max);
    self
  }

  #[must_use]
  pub fn with_max_locations(mut self, max: i64) -> Self {
    self.max_locations = clamp_limit(max);
    self
  }

  #[must_use]
  pub fn with_max_stack_traces_per_location(mut self, max: i64) -> Self {
    self.max_stack_traces_per_location = clamp_limit(max);
    self
  }

  #[must_use]
  pub fn with_reporting_frequency(
    mut self,
    frequency: ReportingFrequency,
  ) -> Self {
    self.reporting_frequency = frequency;
    self
  }
}

pub(crate) fn clamp_limit(value: i64) -> i64 {
  value.max(UNBOUNDED)
}

/// Whether `len` entries already fill a limit.
pub(crate) fn limit_reached(limit: i64, len: usize) -> bool {
  if limit < 0 {
    return false;
  }

  u64::try_from(len).unwrap_or(u64::MAX) >= limit.unsigned_abs()
}
