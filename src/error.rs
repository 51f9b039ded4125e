use std::fmt::{self, Debug, Display};
use std::io;

/// Provides `EpiError` and maps other errors to
/// convert to an `EpiError`
#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub enum EpiError {
    IoError(io::Error),
    JsonError(serde_json::Error),
    CSVError(csv::Error),
    /// One or more required fields are absent. Holds every missing field name.
    MissingFieldError(Vec<String>),
    /// A required field holds a disallowed value. The detailed variant names the
    /// offending fields; `None` is the terse variant.
    InvalidFieldError(Option<Vec<String>>),
    /// A processing mode was requested that has no implementation.
    UnsupportedModeError(String),
    ConfigurationError(String),
    /// A distribution could not be built from its source (a file path or inline data).
    DistributionError {
        source: String,
        reason: String,
    },
    /// Several validation failures found in a single call.
    Multiple(Vec<EpiError>),
    EpiError(String),
}

impl EpiError {
    #[must_use]
    pub fn missing_fields<S: ToString>(fields: &[S]) -> Self {
        EpiError::MissingFieldError(fields.iter().map(ToString::to_string).collect())
    }

    #[must_use]
    pub fn invalid_fields<S: ToString>(fields: &[S]) -> Self {
        EpiError::InvalidFieldError(Some(fields.iter().map(ToString::to_string).collect()))
    }

    /// Folds a list of errors into a single one. Returns `None` if the list is empty.
    #[must_use]
    pub fn aggregate(mut errors: Vec<EpiError>) -> Option<Self> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(EpiError::Multiple(errors)),
        }
    }
}

impl From<io::Error> for EpiError {
    fn from(error: io::Error) -> Self {
        EpiError::IoError(error)
    }
}

impl From<serde_json::Error> for EpiError {
    fn from(error: serde_json::Error) -> Self {
        EpiError::JsonError(error)
    }
}

impl From<csv::Error> for EpiError {
    fn from(error: csv::Error) -> Self {
        EpiError::CSVError(error)
    }
}

impl From<String> for EpiError {
    fn from(error: String) -> Self {
        EpiError::EpiError(error)
    }
}

impl From<&str> for EpiError {
    fn from(error: &str) -> Self {
        EpiError::EpiError(error.to_string())
    }
}

impl std::error::Error for EpiError {}

impl Display for EpiError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EpiError::MissingFieldError(fields) => {
                write!(f, "missing required fields: {}", fields.join(", "))
            }
            EpiError::InvalidFieldError(Some(fields)) => {
                write!(f, "invalid values in fields: {}", fields.join(", "))
            }
            EpiError::InvalidFieldError(None) => write!(f, "invalid values in required fields"),
            EpiError::UnsupportedModeError(mode) => {
                write!(f, "processing mode `{mode}` is not supported")
            }
            EpiError::ConfigurationError(message) => write!(f, "configuration error: {message}"),
            EpiError::DistributionError { source, reason } => {
                write!(f, "failed to build distribution from {source}: {reason}")
            }
            EpiError::Multiple(errors) => {
                write!(f, "{} errors:", errors.len())?;
                for error in errors {
                    write!(f, "\n  - {error}")?;
                }
                Ok(())
            }
            _ => write!(f, "Error: {self:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_empty_is_none() {
        assert!(EpiError::aggregate(vec![]).is_none());
    }

    #[test]
    fn aggregate_single_is_unwrapped() {
        let error = EpiError::aggregate(vec![EpiError::missing_fields(&["x"])]).unwrap();
        assert!(matches!(error, EpiError::MissingFieldError(fields) if fields == vec!["x"]));
    }

    #[test]
    fn aggregate_many_lists_each() {
        let error = EpiError::aggregate(vec![
            EpiError::missing_fields(&["vx", "vy"]),
            EpiError::invalid_fields(&["x"]),
        ])
        .unwrap();
        let message = error.to_string();
        assert!(message.starts_with("2 errors:"));
        assert!(message.contains("missing required fields: vx, vy"));
        assert!(message.contains("invalid values in fields: x"));
    }

    #[test]
    fn terse_invalid_field_is_generic() {
        assert_eq!(
            EpiError::InvalidFieldError(None).to_string(),
            "invalid values in required fields"
        );
    }
}
