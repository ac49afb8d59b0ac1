//! Core library entry point for the in-process assertion failure tracker.
//!
//! The tracker sits between the code that detects a failed assertion and the
//! process's real failure handler. Failures are deduplicated by location and
//! call stack, tracking memory is bounded by admission limits, and aggregated
//! reports are handed to a pluggable reporter.

mod config;
mod location;
mod report;
mod snapshot;
mod stack;
mod stack_capture;
mod table;
mod tracker;

use {
  arrayvec::ArrayString,
  indexmap::IndexMap,
  serde::{Deserialize, Serialize},
  std::{
    cell::RefCell,
    fmt::{self, Display, Formatter},
    io::{self, Write},
    sync::{
      Arc, Mutex, MutexGuard,
      atomic::{AtomicI64, AtomicU8, AtomicU64, Ordering},
    },
  },
};

pub use {
  config::{ConfigError, TrackerConfig, UNBOUNDED},
  location::{AssertionLocation, ReportingFrequency},
  report::{
    AssertionReport, FallbackHandler, LogReporter, REPORT_BUFFER_BYTES,
    Reporter, WriterReporter,
  },
  snapshot::{ExportError, LocationSnapshot, StackSnapshot, TrackingSnapshot},
  stack::StackTrace,
  stack_capture::{BacktraceFrameSource, FrameSource, StackCollector},
  table::{Admission, AssertionCounts, Limits, TrackingTable},
  tracker::{AssertionTracker, AssertionTrackerBuilder},
};
