//! Typed errors recovered by callers.

use std::fmt;
use std::path::PathBuf;

/// An input artifact (contacts or message source) that cannot be interpreted.
///
/// Fatal to the run: nothing partial is sent. Callers that need to
/// distinguish this from infrastructure failures recover it with
/// `err.downcast_ref::<FormatError>()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatError {
    /// The artifact that failed to parse.
    pub path: PathBuf,
    /// Human-readable description of what was expected.
    pub reason: String,
}

impl FormatError {
    pub fn new(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unusable source {}: {}", self.path.display(), self.reason)
    }
}

impl std::error::Error for FormatError {}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn format_error_survives_anyhow_downcast() {
        let err = anyhow!(FormatError::new("contacts.csv", "no identity column"));
        let format = err.downcast_ref::<FormatError>().expect("downcast");
        assert_eq!(format.path, PathBuf::from("contacts.csv"));
        assert!(format.to_string().contains("no identity column"));
    }
}
