//! Turn geospatial survey features into SQL `INSERT` scripts.
//!
//! ## Overview
//!
//! - `FeatureSource` is anything that lists its columns and streams records;
//!   `Gpkg`/`GpkgLayer` read a GeoPackage and `MemorySource` holds rows in memory.
//! - `build_projection` maps declared columns onto the fields to request,
//!   replacing `Shape`/`SHAPE` with the geometry token `Shape@`/`SHAPE@`.
//! - `normalize` renders one attribute value as a SQL literal.
//! - `geography_expression` wraps a geometry's WKT in the target database's
//!   geography constructor.
//! - `TableSchema` describes one target table as data; `preset(name)` loads the
//!   tables of the sheep survey database.
//! - `Translator` turns a `Record` into an `INSERT` statement.
//! - `ScriptEmitter` writes a reviewable script; `DirectWriter` runs the
//!   statements one by one against a `StatementExecutor`.
//!
//! Scripts open a transaction and never close it. The operator commits or
//! rolls back after reviewing the result.
//!
//! ## Short usage
//!
//! ```no_run
//! use survey_sql::{ExportConfig, Gpkg, RunContext, ScriptEmitter, preset};
//!
//! let gpkg = Gpkg::open_read_only("data/NPS.gpkg")?;
//! let layer = gpkg.layer("Animals")?;
//! let schema = preset("animals")?;
//! let context = RunContext::new(ExportConfig::default())
//!     .with_parameter("survey_id", "DENA-2024");
//!
//! let summary = ScriptEmitter::new(&schema, &context)
//!     .emit_to_path(&layer, "Import_Animals.sql")?;
//! println!("{summary}");
//! # Ok::<(), survey_sql::ExportError>(())
//! ```
//!
//! ## Direct write
//!
//! ```no_run
//! use survey_sql::{
//!     DirectWriter, ExportConfig, Gpkg, RunContext, SqliteExecutor, preset,
//! };
//! use survey_sql::geometry::Dialect;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let gpkg = Gpkg::open_read_only("data/GPSPoints.gpkg")?;
//!     let layer = gpkg.layer("GPSPoints")?;
//!     let schema = preset("gps_points")?;
//!     let config = ExportConfig::default().with_dialect(Dialect::Sqlite);
//!     let context = RunContext::new(config.clone()).with_parameter("survey_id", "DENA-2024");
//!
//!     let mut target = SqliteExecutor::open("sheep.sqlite", config.busy_timeout())?;
//!     let log = std::fs::File::create("GPSPoints.log")?;
//!     let summary = DirectWriter::new(&schema, &context).run(&layer, &mut target, log)?;
//!     println!("{} queries failed to execute", summary.failure_count());
//!     Ok(())
//! }
//! ```
mod config;
mod context;
mod conversions;
mod emit;
mod error;
pub mod geometry;
mod gpkg;
mod normalize;
mod ogc_sql;
mod presets;
mod projection;
mod record;
mod schema;
mod source;
mod sql_functions;
mod translate;
mod types;

pub use config::{ExportConfig, MissingGeometry};
pub use context::RunContext;
pub use emit::{
    DirectWriter, FailedStatement, ScriptEmitter, ScriptSummary, SkippedRecord, SqliteExecutor,
    StatementExecutor,
};
pub use error::{ExportError, Result};
pub use geometry::{Dialect, GeographyKind, LineBuilder, ZPolicy, geography_expression};
pub use gpkg::{DEFAULT_BATCH_SIZE, Gpkg, GpkgLayer, GpkgRecordBatchIterator};
pub use normalize::{NULL_MARKERS, NullPolicy, normalize, normalize_text, normalize_with};
pub use presets::{preset, preset_names};
pub use projection::{ProjectedField, Projection, build_projection};
pub use record::Record;
pub use schema::{AggregateLine, ColumnSource, ColumnSpec, Conversion, TableSchema, VariableSpec};
pub use source::{FeatureSource, MemorySource, RecordIter};
pub use sql_functions::register_spatial_functions;
pub use translate::{SkipReason, SourceLabel, Translation, Translator, VariableMode};
pub use types::{FieldRole, FieldSpec, Value};

// Re-export types used in public fields to keep the public API stable.
pub use wkb::reader::{Dimension, GeometryType};
