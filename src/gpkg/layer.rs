use crate::error::{ExportError, Result};
use crate::ogc_sql::{sql_count_features, sql_select_records};
use crate::projection::Projection;
use crate::record::Record;
use crate::source::{FeatureSource, RecordIter};
use crate::types::{FieldRole, FieldSpec, Value};
use rusqlite::Row;
use tracing::debug;

use super::{Gpkg, gpkg_geometry_to_wkb};

mod batch_iterator;

pub use batch_iterator::GpkgRecordBatchIterator;

/// Rows fetched per round-trip when streaming a layer.
pub const DEFAULT_BATCH_SIZE: u32 = 1000;

#[derive(Debug)]
/// A GeoPackage feature layer with geometry metadata and declared columns.
pub struct GpkgLayer<'a> {
    pub(super) gpkg: &'a Gpkg,
    pub layer_name: String,
    pub geometry_column: String,
    pub primary_key_column: String,
    pub geometry_type: wkb::reader::GeometryType,
    pub geometry_dimension: wkb::reader::Dimension,
    pub srs_id: i64,
    /// Declared columns in table order, the geometry column included.
    pub fields: Vec<FieldSpec>,
    pub(super) batch_size: u32,
}

impl<'a> GpkgLayer<'a> {
    /// Set how many rows each batch fetches.
    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn count(&self) -> Result<usize> {
        let count: i64 = self.gpkg.connection().query_row(
            &sql_count_features(&self.layer_name),
            [],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Iterate over the layer in batches of records, in primary key order.
    ///
    /// Only the columns named in `projection` are selected; the geometry is
    /// handed out as WKB with the GeoPackage header stripped.
    ///
    /// Example:
    /// ```no_run
    /// use survey_sql::{FeatureSource, Gpkg, build_projection};
    ///
    /// let gpkg = Gpkg::open_read_only("data/survey.gpkg")?;
    /// let layer = gpkg.layer("animals")?.with_batch_size(500);
    /// let projection = build_projection(&layer.fields()?);
    /// for batch in layer.record_batches(&projection)? {
    ///     for record in batch? {
    ///         let _species = record?.get("Species").cloned();
    ///     }
    /// }
    /// # Ok::<(), survey_sql::ExportError>(())
    /// ```
    pub fn record_batches(&self, projection: &Projection) -> Result<GpkgRecordBatchIterator<'a>> {
        for field in projection.fields() {
            if !self.fields.iter().any(|declared| declared.name == field.name) {
                return Err(ExportError::UnknownColumn {
                    layer_name: self.layer_name.clone(),
                    column: field.name.clone(),
                });
            }
        }

        let sql = sql_select_records(
            &self.layer_name,
            &self.primary_key_column,
            projection.fields().iter().map(|f| f.name.as_str()),
            self.batch_size,
        );
        debug!(layer = %self.layer_name, %sql, "prepared record query");
        let stmt = self.gpkg.connection().prepare(&sql)?;

        Ok(GpkgRecordBatchIterator {
            stmt,
            projection: projection.clone(),
            batch_size: self.batch_size,
            offset: 0,
            end_or_invalid_state: false,
        })
    }

    fn ensure_srs(&self, epsg: u32) -> Result<()> {
        if self.srs_id != i64::from(epsg) {
            return Err(ExportError::SpatialReferenceMismatch {
                layer_name: self.layer_name.clone(),
                stored: self.srs_id,
                requested: epsg,
            });
        }
        Ok(())
    }
}

impl FeatureSource for GpkgLayer<'_> {
    fn description(&self) -> String {
        format!("{} (layer {})", self.gpkg.path().display(), self.layer_name)
    }

    fn name(&self) -> String {
        self.layer_name.clone()
    }

    fn fields(&self) -> Result<Vec<FieldSpec>> {
        Ok(self.fields.clone())
    }

    fn records<'s>(&'s self, projection: &Projection, epsg: u32) -> Result<RecordIter<'s>> {
        self.ensure_srs(epsg)?;
        let batches = self.record_batches(projection)?;
        Ok(Box::new(batches.flat_map(|batch| match batch {
            Ok(records) => records,
            Err(err) => vec![Err(err)],
        })))
    }
}

/// Read one selected row into a [`Record`]. Columns follow the projection's
/// order, as laid out by `sql_select_records`.
pub(super) fn row_to_record(
    row: &Row<'_>,
    row_number: usize,
    projection: &Projection,
) -> Result<Record> {
    let mut values = Vec::with_capacity(projection.len());
    let mut geometry = None;

    for (idx, field) in projection.fields().iter().enumerate() {
        let value_ref = row.get_ref(idx)?;
        if field.role == FieldRole::Geometry {
            match Value::from(value_ref) {
                Value::Blob(bytes) => {
                    geometry = gpkg_geometry_to_wkb(&bytes)?.map(|wkb| wkb.buf().to_vec());
                }
                Value::Null => geometry = None,
                _ => {
                    return Err(rusqlite::Error::InvalidColumnType(
                        idx,
                        field.name.clone(),
                        value_ref.data_type(),
                    )
                    .into());
                }
            }
            values.push(Value::Null);
        } else {
            values.push(Value::from(value_ref));
        }
    }

    Ok(Record::new(row_number, projection, values, geometry))
}
