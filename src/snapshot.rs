use super::*;

use serde::Serializer;

/// Errors that can occur when exporting a snapshot.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
  #[error("i/o error during export: {0}")]
  Io(#[from] io::Error),
  #[error("failed to encode snapshot as json: {0}")]
  Json(#[from] serde_json::Error),
}

/// Counter for one stack under a location.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct StackSnapshot {
  pub count: u64,
  #[serde(serialize_with = "serialize_frames")]
  pub trace: StackTrace,
}

/// All stacks recorded for one location, in registration order.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct LocationSnapshot {
  pub file: Arc<str>,
  pub line: u32,
  pub stacks: Vec<StackSnapshot>,
  pub text: Arc<str>,
}

impl LocationSnapshot {
  /// Sum of the counters across every stack of this location.
  #[must_use]
  pub fn total(&self) -> u64 {
    self
      .stacks
      .iter()
      .fold(0u64, |total, stack| total.saturating_add(stack.count))
  }
}

/// Immutable copy of a tracker's table.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize)]
pub struct TrackingSnapshot {
  assertion_count: u64,
  locations: Vec<LocationSnapshot>,
}

impl TrackingSnapshot {
  /// Occurrences offered to the tracker, including deflected ones.
  #[must_use]
  pub fn assertion_count(&self) -> u64 {
    self.assertion_count
  }

  /// Serialize the snapshot to JSON using the provided writer.
  ///
  /// # Errors
  ///
  /// Returns an error if serialization or the writer fails.
  pub fn export_json<W: Write>(
    &self,
    mut writer: W,
  ) -> Result<(), ExportError> {
    serde_json::to_writer(&mut writer, self)?;
    writer.flush()?;
    Ok(())
  }

  pub(crate) fn from_table(table: &TrackingTable) -> Self {
    let locations = table
      .iter()
      .map(|(location, counts)| LocationSnapshot {
        file: Arc::clone(&location.file),
        line: location.line,
        stacks: counts
          .iter()
          .map(|(trace, count)| StackSnapshot {
            count: *count,
            trace: trace.clone(),
          })
          .collect(),
        text: Arc::clone(&location.text),
      })
      .collect();

    Self {
      assertion_count: table.assertion_count(),
      locations,
    }
  }

  #[must_use]
  pub fn locations(&self) -> &[LocationSnapshot] {
    &self.locations
  }
}

fn serialize_frames<S>(
  trace: &StackTrace,
  serializer: S,
) -> Result<S::Ok, S::Error>
where
  S: Serializer,
{
  serializer
    .collect_seq(trace.frames().iter().map(|frame| format!("{frame:#x}")))
}
