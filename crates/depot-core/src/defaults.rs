//! Centralized default constants for depot.
//!
//! Every crate reads its defaults from here so that the server, the tests and
//! the environment parsing agree on the same values.

// =============================================================================
// STORAGE
// =============================================================================

/// Default storage root directory (relative to the working directory).
pub const STORAGE_ROOT: &str = "db";

/// Placeholder used when a filename sanitizes to nothing.
pub const UNNAMED_FILE: &str = "unnamed_file";

/// Timestamp format used in upload folder names and backup filenames.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Prefix of staging directories created next to an upload destination.
pub const STAGING_PREFIX: &str = ".staging_";

/// Prefix of in-flight single-file uploads before they are renamed.
pub const UPLOAD_TEMP_PREFIX: &str = ".upload_";

// =============================================================================
// CATALOG (upstream metadata service)
// =============================================================================

/// Default base URL of the item metadata service.
pub const CATALOG_URL: &str = "http://localhost:5000/items";

/// Default public view-path prefix prepended to binding paths.
pub const FILE_VIEW_PREFIX: &str = "http://localhost:3000/files/view/";

/// Upstream request timeout in seconds.
pub const CATALOG_TIMEOUT_SECS: u64 = 10;

/// How long a fetched catalog snapshot is considered fresh.
pub const CATALOG_CACHE_TTL_SECS: u64 = 30;

// =============================================================================
// MATCHER
// =============================================================================

/// Score bonus when an id embedded in the filename equals the candidate id.
pub const MATCH_ID_BONUS: f64 = 0.5;

/// Score bonus when the item's details overlap the filename.
pub const MATCH_DETAILS_BONUS: f64 = 0.3;

// =============================================================================
// OPERATIONS (backup / restore)
// =============================================================================

/// Directory name (under the system temp dir) holding operation files.
pub const OPERATION_TEMP_NAMESPACE: &str = "depot-operations";

/// Retention of terminal operations before their files are deleted (1 hour).
pub const OPERATION_RETENTION_SECS: u64 = 3600;

/// Delay after file deletion before the registry entry is removed (5 minutes).
pub const OPERATION_GRACE_SECS: u64 = 300;

/// Request header carrying the declared chunk count of a chunked restore.
pub const TOTAL_CHUNKS_HEADER: &str = "x-total-chunks";

/// Upper bound on declared chunk counts.
pub const MAX_TOTAL_CHUNKS: u64 = 100_000;

// =============================================================================
// SERVER
// =============================================================================

/// Default HTTP server port.
pub const SERVER_PORT: u16 = 3000;

/// Default rate limit: max requests per period.
pub const RATE_LIMIT_REQUESTS: u64 = 100;

/// Default rate limit: period in seconds.
pub const RATE_LIMIT_PERIOD_SECS: u64 = 60;

/// Interval at which idle rate-limit keys are pruned.
pub const RATE_LIMIT_PRUNE_SECS: u64 = 300;

/// Maximum request body size (2 GiB) for uploads and restores.
pub const MAX_UPLOAD_BYTES: usize = 2 * 1024 * 1024 * 1024;
