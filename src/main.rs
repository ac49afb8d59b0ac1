use std::io;

use assertion_tracker::{
  AssertionTracker, ExportError, ReportingFrequency, WriterReporter,
};
use tracing_subscriber::EnvFilter;

fn check(tracker: &AssertionTracker, value: i32) {
  if value <= 0 {
    tracker.record_failure("value > 0", file!(), line!());
  }
}

fn via_helper(tracker: &AssertionTracker, value: i32) {
  check(tracker, value);
}

fn main() -> Result<(), ExportError> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("assertion_tracker=debug")),
    )
    .with_writer(io::stderr)
    .init();

  let tracker = AssertionTracker::builder(|text: &str, file: &str, line: u32| {
    eprintln!("untracked assertion failure: {file}:{line}: {text}");
  })
  .max_locations(2)
  .reporting_frequency(ReportingFrequency::OnNewStackTrace)
  .finish();

  for value in [-1, 0, 3] {
    check(&tracker, value);
    via_helper(&tracker, value);
  }
  tracker.record_failure("ready", "demo.rs", 1);
  tracker.record_failure("overflow", "demo.rs", 2);

  println!("=== all tracked stacks ===");
  tracker.set_reporting_callback(WriterReporter::new(io::stdout()));
  tracker.report_all_stack_traces();

  println!("=== snapshot ===");
  tracker.snapshot().export_json(io::stdout().lock())?;
  println!();

  Ok(())
}
