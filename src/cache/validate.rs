//! Validation hooks run against a download before it is promoted

use std::fs;
use std::path::Path;

use crate::error::ValidationError;

/// Inspects a downloaded temp file and decides whether it may replace the cache
///
/// Returning `Err` aborts promotion; the previous cache file stays untouched.
pub trait Validator {
    fn validate(&self, temp_path: &Path) -> Result<(), ValidationError>;
}

impl<F> Validator for F
where
    F: Fn(&Path) -> Result<(), ValidationError>,
{
    fn validate(&self, temp_path: &Path) -> Result<(), ValidationError> {
        self(temp_path)
    }
}

/// Rejects empty downloads
#[derive(Debug, Clone, Copy, Default)]
pub struct NonEmpty;

impl Validator for NonEmpty {
    fn validate(&self, temp_path: &Path) -> Result<(), ValidationError> {
        let len = fs::metadata(temp_path)
            .map_err(|e| ValidationError::new(format!("cannot read download: {}", e)))?
            .len();
        if len == 0 {
            return Err(ValidationError::new("empty response body"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_non_empty_rejects_empty_file() {
        let file = NamedTempFile::new().expect("Failed to create temp file");
        let err = NonEmpty.validate(file.path()).unwrap_err();
        assert_eq!(err.message, "empty response body");
    }

    #[test]
    fn test_non_empty_accepts_content() {
        let file = NamedTempFile::new().expect("Failed to create temp file");
        fs::write(file.path(), b"<eveapi/>").unwrap();
        assert!(NonEmpty.validate(file.path()).is_ok());
    }

    #[test]
    fn test_closure_validator_can_reject_with_code() {
        let file = NamedTempFile::new().expect("Failed to create temp file");
        fs::write(file.path(), b"<error code=\"203\">Authentication failure</error>").unwrap();

        let hook = |path: &Path| -> Result<(), ValidationError> {
            let body = fs::read_to_string(path).map_err(|e| ValidationError::new(e.to_string()))?;
            if body.contains("<error") {
                return Err(ValidationError::with_code(203, "Authentication failure"));
            }
            Ok(())
        };

        let err = hook.validate(file.path()).unwrap_err();
        assert_eq!(err.code, Some(203));
    }
}
