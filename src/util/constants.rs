// EnrolSift - util/constants.rs
//
// Single source of truth for all named constants, limits, and defaults.
// Every configurable value has a default plus a validated range here.

// =============================================================================
// Application metadata
// =============================================================================

/// Application display name.
pub const APP_NAME: &str = "EnrolSift";

/// Application identifier used for config/data directories.
pub const APP_ID: &str = "EnrolSift";

/// Current application version (updated by release script).
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// Record field conventions
// =============================================================================

/// Placeholder strings the record source uses in place of a real value.
///
/// A field holding one of these (or only whitespace) counts as missing for
/// the has/missing facets.
pub const ABSENT_SENTINELS: &[&str] = &["-", "N/A"];

/// Key of the first named sub-course flag inside `pasiRecords`.
pub const SUB_COURSE_COM1255: &str = "COM1255";

/// Key of the second named sub-course flag inside `pasiRecords`.
pub const SUB_COURSE_INF2020: &str = "INF2020";

/// Valid two-digit month codes accepted by the month facet.
pub const MONTH_CODES: &[&str] = &[
    "01", "02", "03", "04", "05", "06", "07", "08", "09", "10", "11", "12",
];

// =============================================================================
// Filter limits
// =============================================================================

/// Default maximum length (in chars) of the free-text search term.
/// Longer input is truncated before matching.
pub const DEFAULT_MAX_SEARCH_TERM_CHARS: usize = 256;

/// Minimum user-configurable search term limit.
pub const MIN_MAX_SEARCH_TERM_CHARS: usize = 8;

/// Maximum user-configurable search term limit.
pub const ABSOLUTE_MAX_SEARCH_TERM_CHARS: usize = 4_096;

// =============================================================================
// Saved configuration store layout
// =============================================================================

/// Default top-level namespace holding per-owner data.
pub const DEFAULT_OWNER_NAMESPACE: &str = "staff";

/// Path segment under an owner's node that holds saved filter configurations.
pub const SAVED_CONFIGS_SEGMENT: &str = "savedFilterConfigs";

/// Default dataset key (one saved-configuration list per dataset).
pub const DEFAULT_DATASET_KEY: &str = "studentSummaries";

/// Default top-level path of the owner directory (ownerId -> display name).
pub const DEFAULT_OWNER_DIRECTORY: &str = "staffDirectory";

/// Maximum length (in chars) of a saved configuration name.
pub const MAX_CONFIG_NAME_CHARS: usize = 200;

/// Maximum depth of a store path. Guards against runaway path construction.
pub const MAX_STORE_PATH_DEPTH: usize = 32;

/// Characters that may not appear inside a single store path segment.
pub const FORBIDDEN_SEGMENT_CHARS: &[char] = &['.', '#', '$', '[', ']', '/'];

// =============================================================================
// Logging
// =============================================================================

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

// =============================================================================
// Export
// =============================================================================

/// Maximum number of records that can be exported in a single operation.
pub const MAX_EXPORT_RECORDS: usize = 1_000_000;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration file name.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// File name of the JSON document backing the file store
/// (stored in the platform data directory).
pub const STORE_FILE_NAME: &str = "store.json";
