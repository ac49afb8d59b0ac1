use super::*;

/// Identity of a class of assertion failures.
///
/// The assertion text is part of the key: two failures on the same file and
/// line with different expression text are tracked separately.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct AssertionLocation {
  pub file: Arc<str>,
  pub line: u32,
  pub text: Arc<str>,
}

impl AssertionLocation {
  #[must_use]
  pub fn new(text: &str, file: &str, line: u32) -> Self {
    Self {
      file: Arc::from(file),
      line,
      text: Arc::from(text),
    }
  }
}

impl Display for AssertionLocation {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}:{}", self.file, self.line, self.text)
  }
}

/// How often the reporter fires relative to newly discovered data.
#[derive(
  Debug, Clone, Copy, Default, Eq, PartialEq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ReportingFrequency {
  /// Every tracked occurrence is reported.
  OnEachAssertion = 0,
  /// Only the first occurrence of each distinct stack is reported.
  #[default]
  OnNewStackTrace = 1,
  /// Only the first occurrence at each location is reported.
  OnNewLocation = 2,
}

impl ReportingFrequency {
  pub(crate) fn from_u8(value: u8) -> Self {
    match value {
      0 => Self::OnEachAssertion,
      2 => Self::OnNewLocation,
      _ => Self::OnNewStackTrace,
    }
  }

  /// Whether an occurrence with the given novelty should be reported.
  #[must_use]
  pub fn should_report(self, new_location: bool, new_stack: bool) -> bool {
    match self {
      Self::OnEachAssertion => true,
      Self::OnNewStackTrace => new_stack,
      Self::OnNewLocation => new_location,
    }
  }
}
