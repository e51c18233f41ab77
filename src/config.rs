//! Run configuration.
//!
//! Everything here has a default matching the survey program's SQL Server
//! target, so an empty YAML document is a valid configuration.

use crate::error::Result;
use crate::geometry::{Dialect, WGS84, ZPolicy};
use crate::gpkg::DEFAULT_BATCH_SIZE;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// What a run does with a record whose mandatory geometry is absent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingGeometry {
    /// Leave the record out and note it in the summary.
    #[default]
    Skip,
    /// Stop the run with [`ExportError::MissingGeometry`](crate::ExportError::MissingGeometry).
    Abort,
}

/// Settings shared by every table of a run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExportConfig {
    /// Target database named in the `USE` statement.
    pub database: String,
    pub dialect: Dialect,
    /// Reference system geometries are requested and constructed in.
    pub epsg: u32,
    pub z_policy: ZPolicy,
    /// Leave a `BEGIN TRANSACTION` open at the top of generated scripts.
    pub open_transaction: bool,
    /// Wrap each statement in `PRINT 'ROW n'` / `GO` batches.
    pub batch_statements: bool,
    pub missing_geometry: MissingGeometry,
    /// Rows fetched per query from a GeoPackage source.
    pub batch_size: u32,
    /// How long direct-write mode waits on a locked database.
    pub busy_timeout_ms: u64,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            database: "ARCN_Sheep".to_string(),
            dialect: Dialect::SqlServer,
            epsg: WGS84,
            z_policy: ZPolicy::Keep,
            open_transaction: true,
            batch_statements: false,
            missing_geometry: MissingGeometry::Skip,
            batch_size: DEFAULT_BATCH_SIZE,
            busy_timeout_ms: 5000,
        }
    }
}

impl ExportConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load a configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}
