use super::*;

use crate::config::TrackerConfig;

/// Primitive that writes the current call stack's return addresses into a
/// caller-provided buffer, innermost frame first.
///
/// Implementations return the number of slots written. Returning
/// `buffer.len()` tells the caller the stack may not have fit.
pub trait FrameSource: Send + Sync {
  fn capture(&self, buffer: &mut [usize]) -> usize;
}

/// Walks the native stack with the `backtrace` unwinder.
#[derive(Debug, Clone, Copy, Default)]
pub struct BacktraceFrameSource;

impl FrameSource for BacktraceFrameSource {
  fn capture(&self, buffer: &mut [usize]) -> usize {
    let mut filled = 0;

    backtrace::trace(|frame| {
      if filled >= buffer.len() {
        return false;
      }

      buffer[filled] = frame.ip() as usize;
      filled += 1;
      true
    });

    filled
  }
}

/// Captures whole stacks, growing its buffer until the stack fits.
pub struct StackCollector {
  initial_frames: usize,
  max_frames: usize,
  skip_frames: usize,
  source: Arc<dyn FrameSource>,
}

impl fmt::Debug for StackCollector {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    f.debug_struct("StackCollector")
      .field("initial_frames", &self.initial_frames)
      .field("max_frames", &self.max_frames)
      .field("skip_frames", &self.skip_frames)
      .finish_non_exhaustive()
  }
}

impl StackCollector {
  /// Capture the current stack.
  ///
  /// The buffer starts at `initial_frames` slots and doubles every time the
  /// source fills it completely, stopping at `max_frames`. A capture that hits
  /// the cap is kept truncated rather than retried.
  #[must_use]
  pub fn capture(&self) -> StackTrace {
    let mut capacity = self.initial_frames;

    loop {
      let mut buffer = vec![0usize; capacity];
      let filled = self.source.capture(&mut buffer).min(capacity);

      if filled < capacity || capacity >= self.max_frames {
        if filled == capacity {
          tracing::debug!(
            target: "assertion_tracker",
            capacity,
            "stack capture truncated at frame cap"
          );
        }

        let skip = self.skip_frames.min(filled);
        return StackTrace::from(&buffer[skip..filled]);
      }

      capacity = capacity.saturating_mul(2).min(self.max_frames);
    }
  }

  #[must_use]
  pub fn new(source: Arc<dyn FrameSource>, config: &TrackerConfig) -> Self {
    let initial_frames = config.initial_capture_frames.max(1);

    Self {
      initial_frames,
      max_frames: config.max_capture_frames.max(initial_frames),
      skip_frames: config.skip_frames,
      source,
    }
  }

  #[must_use]
  pub fn with_backtrace(config: &TrackerConfig) -> Self {
    Self::new(Arc::new(BacktraceFrameSource), config)
  }
}
