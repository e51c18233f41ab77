//! Feature sources the export pipeline reads from.

use crate::error::{ExportError, Result};
use crate::geometry::WGS84;
use crate::normalize::is_null_marker;
use crate::projection::Projection;
use crate::record::Record;
use crate::types::{FieldRole, FieldSpec, Value};
use std::str::FromStr;
use wkt::Wkt;

/// Iterator over the records of a source.
pub type RecordIter<'s> = Box<dyn Iterator<Item = Result<Record>> + 's>;

/// A readable set of features with attribute columns and a geometry column.
pub trait FeatureSource {
    /// Human readable provenance (path and layer), written into script headers.
    fn description(&self) -> String;

    /// Short name of the source, usually the file's base name.
    fn name(&self) -> String;

    /// Declared columns, in declared order.
    fn fields(&self) -> Result<Vec<FieldSpec>>;

    /// Stream the records through `projection` with geometries in `epsg`.
    ///
    /// Sources do not reproject. A source stored in another reference system
    /// fails here instead of handing out coordinates in the wrong system.
    fn records<'s>(&'s self, projection: &Projection, epsg: u32) -> Result<RecordIter<'s>>;
}

/// Features held in memory.
///
/// Rows are positional over the declared fields. The geometry field takes WKT
/// text, WKB bytes, or a null value.
///
/// ```
/// use survey_sql::{FieldSpec, MemorySource, Value};
///
/// let mut source = MemorySource::new(
///     "waypoints",
///     vec![FieldSpec::attribute("FID"), FieldSpec::geometry("Shape")],
/// );
/// source.push(vec![Value::from(1_i64), Value::from("POINT(-149.1 63.2)")]);
/// assert_eq!(source.len(), 1);
/// ```
#[derive(Clone, Debug)]
pub struct MemorySource {
    name: String,
    fields: Vec<FieldSpec>,
    srs_id: u32,
    rows: Vec<Vec<Value>>,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, fields: Vec<FieldSpec>) -> Self {
        Self {
            name: name.into(),
            fields,
            srs_id: WGS84,
            rows: Vec::new(),
        }
    }

    /// Declare the reference system the stored coordinates are in.
    pub fn with_srs_id(mut self, srs_id: u32) -> Self {
        self.srs_id = srs_id;
        self
    }

    pub fn push(&mut self, row: Vec<Value>) {
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn record(&self, row_idx: usize, row: &[Value], projection: &Projection) -> Result<Record> {
        let row_number = row_idx + 1;
        let mut values = Vec::with_capacity(projection.len());
        let mut geometry = None;

        for projected in projection.fields() {
            let declared = self
                .fields
                .iter()
                .position(|f| f.name == projected.name)
                .ok_or_else(|| ExportError::MissingField {
                    row: row_number,
                    field: projected.name.clone(),
                })?;
            let value = row.get(declared).cloned().unwrap_or(Value::Null);

            if projected.role == FieldRole::Geometry {
                geometry = geometry_to_wkb(&value)?;
                values.push(Value::Null);
            } else {
                values.push(value);
            }
        }

        Ok(Record::new(row_number, projection, values, geometry))
    }
}

impl FeatureSource for MemorySource {
    fn description(&self) -> String {
        self.name.clone()
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn fields(&self) -> Result<Vec<FieldSpec>> {
        Ok(self.fields.clone())
    }

    fn records<'s>(&'s self, projection: &Projection, epsg: u32) -> Result<RecordIter<'s>> {
        if self.srs_id != epsg {
            return Err(ExportError::SpatialReferenceMismatch {
                layer_name: self.name.clone(),
                stored: i64::from(self.srs_id),
                requested: epsg,
            });
        }
        let projection = projection.clone();
        Ok(Box::new(
            self.rows
                .iter()
                .enumerate()
                .map(move |(idx, row)| self.record(idx, row, &projection)),
        ))
    }
}

fn geometry_to_wkb(value: &Value) -> Result<Option<Vec<u8>>> {
    match value {
        Value::Null => Ok(None),
        Value::Blob(bytes) => Ok(Some(bytes.clone())),
        Value::Text(text) if is_null_marker(text.trim()) => Ok(None),
        Value::Text(text) => {
            let wkt = Wkt::<f64>::from_str(text).map_err(|err| ExportError::InvalidWkt {
                wkt: text.clone(),
                reason: err.to_string(),
            })?;
            let mut buf = Vec::new();
            wkb::writer::write_geometry(&mut buf, &wkt, &Default::default())?;
            Ok(Some(buf))
        }
        other => Err(ExportError::InvalidWkt {
            wkt: other.to_string(),
            reason: format!("expected WKT text or WKB, got {}", other.type_name()),
        }),
    }
}
