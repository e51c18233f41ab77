use std::path::PathBuf;
use thiserror::Error;

/// Crate error type for feature export operations.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Wraps errors returned by `rusqlite`.
    #[error(transparent)]
    Sql(#[from] rusqlite::Error),
    /// Wraps errors returned by the `wkb` crate.
    #[error(transparent)]
    Wkb(#[from] wkb::error::WkbError),
    /// Wraps YAML errors raised while loading schemas or configuration.
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
    /// Writing the output script or run log failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// The feature source path does not exist.
    #[error("feature source does not exist: {}", path.display())]
    SourceNotFound { path: PathBuf },
    /// The requested layer is not listed in the feature source.
    #[error("no such layer: {layer_name}")]
    LayerNotFound { layer_name: String },
    /// The source stores geometries in a different spatial reference than requested.
    #[error("layer {layer_name} is stored in srs_id {stored}, but srs_id {requested} was requested")]
    SpatialReferenceMismatch {
        layer_name: String,
        stored: i64,
        requested: u32,
    },
    /// A requested column is not declared by the layer.
    #[error("layer {layer_name} has no column '{column}'")]
    UnknownColumn { layer_name: String, column: String },
    /// A geometry type in metadata could not be mapped to a supported WKB geometry type.
    #[error("unsupported geometry type: {0}")]
    UnsupportedGeometryType(String),
    /// The z/m flags in gpkg_geometry_columns are out of range.
    #[error("invalid dimension flags: z={z}, m={m}")]
    InvalidDimension { z: i8, m: i8 },
    /// A column type declared in SQLite metadata is not supported by this crate.
    #[error("unsupported column type for column '{column}': {declared_type}")]
    UnsupportedColumnType {
        column: String,
        declared_type: String,
    },
    /// Layer schema has multiple primary key columns, which is unsupported.
    #[error("composite primary keys are not supported yet for layer: {layer_name}")]
    CompositePrimaryKeyUnsupported { layer_name: String },
    /// Layer schema has no primary key column.
    #[error("no primary key column found for layer: {layer_name}")]
    MissingPrimaryKeyColumn { layer_name: String },
    /// Invalid GeoPackage geometry flags byte.
    #[error("invalid gpkg geometry flags: {0:#04x}")]
    InvalidGpkgGeometryFlags(u8),
    /// GeoPackage geometry blob is too short for its header and envelope.
    #[error("invalid gpkg geometry length: got {len} bytes, expected at least {minimum}")]
    InvalidGpkgGeometryLength { len: usize, minimum: usize },
    /// A WKT string could not be parsed.
    #[error("invalid WKT '{wkt}': {reason}")]
    InvalidWkt { wkt: String, reason: String },
    /// A geometry shape that has no WKT form in this crate.
    #[error("cannot write {0} geometries as WKT")]
    UnsupportedWktGeometry(&'static str),
    /// A field referenced by the table schema is not in the record.
    #[error("record {row} has no field '{field}'")]
    MissingField { row: usize, field: String },
    /// A value that must be numeric could not be parsed as a number.
    #[error("record {row}: field '{field}' is not numeric: {value}")]
    InvalidNumber {
        row: usize,
        field: String,
        value: String,
    },
    /// A record lacks a geometry the target column requires and the run aborts on it.
    #[error("record {row} has no geometry for mandatory column '{column}'")]
    MissingGeometry { row: usize, column: String },
    /// A run parameter referenced by the table schema was not supplied.
    #[error("missing run parameter: {name}")]
    MissingParameter { name: String },
    /// Unknown built-in table schema name.
    #[error("unknown table preset '{name}'. Available presets: {available}")]
    UnknownPreset { name: String, available: String },
    /// The table schema is structurally invalid.
    #[error("invalid table schema for {table}: {reason}")]
    InvalidSchema { table: String, reason: String },
}

impl ExportError {
    /// Whether the error concerns a single record's data, so a run can leave
    /// that record out and carry on.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ExportError::Wkb(_)
                | ExportError::InvalidWkt { .. }
                | ExportError::UnsupportedWktGeometry(_)
                | ExportError::InvalidGpkgGeometryFlags(_)
                | ExportError::InvalidGpkgGeometryLength { .. }
                | ExportError::InvalidNumber { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ExportError>;
