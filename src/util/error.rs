// EnrolSift - util/error.rs
//
// Typed error hierarchy with context-preserving error chains.
// No string-based error propagation between layers.
// All errors preserve the causal chain for diagnostic logging.
//
// Filtering itself cannot fail: unparseable dates exclude the record
// instead of producing an error, so there is no filter error type.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Top-level error type for all EnrolSift operations.
/// Errors are categorised by the subsystem that produced them.
#[derive(Debug)]
pub enum SiftError {
    /// Record collection could not be read.
    Records(RecordSourceError),

    /// Saved configuration operation failed.
    Repository(RepositoryError),

    /// Export operation failed.
    Export(ExportError),

    /// Configuration loading or validation failed.
    Config(ConfigError),
}

impl fmt::Display for SiftError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Records(e) => write!(f, "Record source error: {e}"),
            Self::Repository(e) => write!(f, "Saved configuration error: {e}"),
            Self::Export(e) => write!(f, "Export error: {e}"),
            Self::Config(e) => write!(f, "Configuration error: {e}"),
        }
    }
}

impl std::error::Error for SiftError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Records(e) => Some(e),
            Self::Repository(e) => Some(e),
            Self::Export(e) => Some(e),
            Self::Config(e) => Some(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Record source errors
// ---------------------------------------------------------------------------

/// Errors reading an exported record collection from disk.
#[derive(Debug)]
pub enum RecordSourceError {
    /// I/O error reading the record file.
    Io { path: PathBuf, source: io::Error },

    /// The file is not a JSON array of records.
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl fmt::Display for RecordSourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "Cannot read records '{}': {source}", path.display())
            }
            Self::Json { path, source } => {
                write!(f, "Records '{}' are not valid JSON: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for RecordSourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Json { source, .. } => Some(source),
        }
    }
}

impl From<RecordSourceError> for SiftError {
    fn from(e: RecordSourceError) -> Self {
        Self::Records(e)
    }
}

// ---------------------------------------------------------------------------
// Validation errors
// ---------------------------------------------------------------------------

/// Caller input rejected before any backend write is issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Saved configuration name is empty or whitespace only.
    EmptyName,

    /// Saved configuration name exceeds the maximum length.
    NameTooLong { length: usize, max: usize },

    /// An identifier cannot be used as a store path segment.
    InvalidIdentifier { field: &'static str, value: String },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyName => write!(f, "Configuration name must not be empty"),
            Self::NameTooLong { length, max } => write!(
                f,
                "Configuration name is {length} characters, exceeds maximum of {max}"
            ),
            Self::InvalidIdentifier { field, value } => {
                write!(f, "Invalid {field} '{value}': not usable as a store key")
            }
        }
    }
}

impl std::error::Error for ValidationError {}

// ---------------------------------------------------------------------------
// Persistence errors
// ---------------------------------------------------------------------------

/// Backend read/write/delete failures. Always recoverable: the in-memory
/// filter state is never touched when one of these is returned.
#[derive(Debug)]
pub enum PersistenceError {
    /// Store path is malformed (empty segment, forbidden character, too deep).
    InvalidPath { path: String, reason: &'static str },

    /// A write or update targeted a path whose parent is not an object.
    NotAnObject { path: String },

    /// I/O error on the file backing the store.
    Io {
        path: PathBuf,
        operation: &'static str,
        source: io::Error,
    },

    /// Store document could not be (de)serialised.
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Backend rejected or could not complete the operation.
    Unavailable {
        path: String,
        operation: &'static str,
        reason: String,
    },
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPath { path, reason } => {
                write!(f, "Invalid store path '{path}': {reason}")
            }
            Self::NotAnObject { path } => {
                write!(f, "Store node above '{path}' is not an object")
            }
            Self::Io {
                path,
                operation,
                source,
            } => write!(
                f,
                "I/O error during {operation} on '{}': {source}",
                path.display()
            ),
            Self::Json { path, source } => {
                write!(f, "Store document '{}' is malformed: {source}", path.display())
            }
            Self::Unavailable {
                path,
                operation,
                reason,
            } => write!(f, "Store {operation} on '{path}' failed: {reason}"),
        }
    }
}

impl std::error::Error for PersistenceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Json { source, .. } => Some(source),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Repository errors
// ---------------------------------------------------------------------------

/// Errors surfaced by the saved configuration repository.
#[derive(Debug)]
pub enum RepositoryError {
    /// Input rejected before any write.
    Validation(ValidationError),

    /// Backend failure (transient; the caller may retry).
    Persistence(PersistenceError),

    /// No visible configuration has this id.
    NotFound { id: String },

    /// Every team member's listing failed; `last` is the final failure seen.
    SharedListingFailed {
        members: usize,
        last: PersistenceError,
    },
}

impl RepositoryError {
    /// True for failures a caller may reasonably retry.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Validation(_) | Self::NotFound { .. })
    }
}

impl fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(e) => write!(f, "{e}"),
            Self::Persistence(e) => write!(f, "{e}"),
            Self::NotFound { id } => write!(f, "No saved configuration with id '{id}'"),
            Self::SharedListingFailed { members, last } => write!(
                f,
                "Could not list shared configurations for any of {members} team members \
                 (last error: {last})"
            ),
        }
    }
}

impl std::error::Error for RepositoryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Validation(e) => Some(e),
            Self::Persistence(e) => Some(e),
            Self::NotFound { .. } => None,
            Self::SharedListingFailed { last, .. } => Some(last),
        }
    }
}

impl From<ValidationError> for RepositoryError {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e)
    }
}

impl From<PersistenceError> for RepositoryError {
    fn from(e: PersistenceError) -> Self {
        Self::Persistence(e)
    }
}

impl From<RepositoryError> for SiftError {
    fn from(e: RepositoryError) -> Self {
        Self::Repository(e)
    }
}

impl From<PersistenceError> for SiftError {
    fn from(e: PersistenceError) -> Self {
        Self::Repository(RepositoryError::Persistence(e))
    }
}

// ---------------------------------------------------------------------------
// Export errors
// ---------------------------------------------------------------------------

/// Errors related to export operations.
#[derive(Debug)]
pub enum ExportError {
    /// I/O error writing the export file.
    Io { path: PathBuf, source: io::Error },

    /// CSV serialisation error.
    Csv { path: PathBuf, source: csv::Error },

    /// JSON serialisation error.
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Export would exceed maximum record count.
    TooManyRecords { count: usize, max: usize },
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "Export I/O error '{}': {source}", path.display())
            }
            Self::Csv { path, source } => {
                write!(f, "CSV export error '{}': {source}", path.display())
            }
            Self::Json { path, source } => {
                write!(f, "JSON export error '{}': {source}", path.display())
            }
            Self::TooManyRecords { count, max } => write!(
                f,
                "Export of {count} records exceeds maximum of {max}. \
                 Apply filters to reduce the result set."
            ),
        }
    }
}

impl std::error::Error for ExportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Csv { source, .. } => Some(source),
            Self::Json { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ExportError> for SiftError {
    fn from(e: ExportError) -> Self {
        Self::Export(e)
    }
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

/// Errors related to configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    /// TOML parsing failed.
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// A config value is out of the allowed range.
    ValueOutOfRange {
        field: String,
        value: String,
        expected: String,
    },

    /// I/O error reading config file.
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TomlParse { path, source } => {
                write!(f, "Config parse error '{}': {source}", path.display())
            }
            Self::ValueOutOfRange {
                field,
                value,
                expected,
            } => write!(
                f,
                "Config '{field}' = '{value}' is out of range. Expected: {expected}"
            ),
            Self::Io { path, source } => {
                write!(f, "Config I/O error '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::TomlParse { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ConfigError> for SiftError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

/// Convenience type alias for EnrolSift results.
pub type Result<T> = std::result::Result<T, SiftError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_validation_errors_are_not_transient() {
        let err = RepositoryError::from(ValidationError::EmptyName);
        assert!(!err.is_transient());
    }

    #[test]
    fn test_persistence_errors_are_transient_and_chain() {
        let err = RepositoryError::from(PersistenceError::Io {
            path: PathBuf::from("store.json"),
            operation: "write",
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        });
        assert!(err.is_transient());
        let top = SiftError::from(err);
        let inner = top.source().and_then(|e| e.source());
        assert!(inner.is_some(), "causal chain must reach the I/O error");
        assert!(top.to_string().contains("store.json"));
    }
}
