//! Operation tracker configuration.

use std::path::PathBuf;
use std::time::Duration;

use depot_core::defaults;

/// Where operation files live and how long finished operations are kept.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Parent of the per-operation directories.
    pub temp_dir: PathBuf,
    /// How long a finished operation keeps its files.
    pub retention: Duration,
    /// How long the record outlives its files.
    pub grace: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            temp_dir: std::env::temp_dir().join(defaults::OPERATION_TEMP_NAMESPACE),
            retention: Duration::from_secs(defaults::OPERATION_RETENTION_SECS),
            grace: Duration::from_secs(defaults::OPERATION_GRACE_SECS),
        }
    }
}

impl TrackerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `OPERATION_TEMP_DIR` | `$TMPDIR/depot-operations` | Operation file namespace |
    /// | `OPERATION_RETENTION_SECS` | `3600` | Retention of finished operations |
    /// | `OPERATION_GRACE_SECS` | `300` | Record lifetime after file deletion |
    pub fn from_env() -> Self {
        let base = Self::default();

        let temp_dir = std::env::var("OPERATION_TEMP_DIR")
            .map(PathBuf::from)
            .unwrap_or(base.temp_dir);

        let retention = std::env::var("OPERATION_RETENTION_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(base.retention);

        let grace = std::env::var("OPERATION_GRACE_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(base.grace);

        Self {
            temp_dir,
            retention,
            grace,
        }
    }

    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }
}
