//! Input limits and output naming checks.

use std::path::{Path, PathBuf};

/// Maximum number of chromosomes accepted from any reference input
pub const MAX_CONTIGS: usize = 100_000;

/// Maximum length of an output file prefix
pub const MAX_PREFIX_LENGTH: usize = 200;

/// Check if adding another contig would exceed the maximum allowed.
///
/// Call this with the current count BEFORE adding a new contig.
/// Returns an error message if adding would exceed the limit, None if safe to add.
///
/// # Example
/// ```ignore
/// if check_contig_limit(contigs.len()).is_some() {
///     return Err(...);
/// }
/// contigs.push(new_contig); // Safe to add
/// ```
#[must_use]
pub fn check_contig_limit(count: usize) -> Option<String> {
    if count >= MAX_CONTIGS {
        Some(format!(
            "Too many contigs: adding another would exceed maximum of {MAX_CONTIGS}"
        ))
    } else {
        None
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Output prefix is empty")]
    EmptyPrefix,
    #[error("Output prefix too long: exceeds {MAX_PREFIX_LENGTH} characters")]
    PrefixTooLong,
    #[error("Invalid output prefix '{0}': only letters, digits, '.', '-' and '_' are allowed")]
    InvalidPrefix(String),
    #[error("Output directory {0} does not exist or is not a directory")]
    MissingDirectory(PathBuf),
}

/// Validate a prefix used to name output files inside the output directory
///
/// # Errors
///
/// Returns `ValidationError::EmptyPrefix`, `ValidationError::PrefixTooLong`, or
/// `ValidationError::InvalidPrefix` for path separators, `..` or other
/// characters outside the allowed set.
pub fn validate_prefix(prefix: &str) -> Result<&str, ValidationError> {
    if prefix.trim().is_empty() {
        return Err(ValidationError::EmptyPrefix);
    }
    if prefix.len() > MAX_PREFIX_LENGTH {
        return Err(ValidationError::PrefixTooLong);
    }
    let allowed = prefix
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
    if !allowed || prefix.contains("..") || prefix.starts_with('.') {
        return Err(ValidationError::InvalidPrefix(prefix.to_string()));
    }
    Ok(prefix)
}

/// Check that an output directory exists
///
/// # Errors
///
/// Returns `ValidationError::MissingDirectory` if `dir` is not a directory.
pub fn check_output_dir(dir: &Path) -> Result<(), ValidationError> {
    if dir.is_dir() {
        Ok(())
    } else {
        Err(ValidationError::MissingDirectory(dir.to_path_buf()))
    }
}
