use super::*;

/// One captured call stack as an ordered list of return addresses.
///
/// Two traces are equal only when every address matches in order.
#[derive(Debug, Clone, Default, Eq, PartialEq, Hash)]
pub struct StackTrace {
  frames: Arc<[usize]>,
}

impl StackTrace {
  #[must_use]
  pub fn frames(&self) -> &[usize] {
    &self.frames
  }

  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.frames.is_empty()
  }

  #[must_use]
  pub fn len(&self) -> usize {
    self.frames.len()
  }

  #[must_use]
  pub fn new<I>(frames: I) -> Self
  where
    I: Into<Vec<usize>>,
  {
    Self {
      frames: Arc::from(frames.into().into_boxed_slice()),
    }
  }
}

impl From<&[usize]> for StackTrace {
  fn from(frames: &[usize]) -> Self {
    Self {
      frames: Arc::from(frames),
    }
  }
}

impl Display for StackTrace {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    f.write_str("[")?;

    for frame in self.frames.iter() {
      write!(f, " {frame:#x}")?;
    }

    f.write_str(" ]")
  }
}
