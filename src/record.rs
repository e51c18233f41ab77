use crate::error::{ExportError, Result};
use crate::projection::Projection;
use crate::types::Value;
use std::collections::HashMap;
use std::sync::Arc;
use wkb::reader::Wkb;

/// A single feature read from a source: attribute values keyed by field name
/// plus the geometry as WKB bytes.
#[derive(Clone, Debug)]
pub struct Record {
    pub(crate) row: usize,
    pub(crate) values: Vec<Value>,
    pub(crate) geometry: Option<Vec<u8>>,
    pub(crate) index_by_name: Arc<HashMap<String, usize>>,
}

impl Record {
    /// Build a record whose values follow the projection's order.
    pub fn new(
        row: usize,
        projection: &Projection,
        values: Vec<Value>,
        geometry: Option<Vec<u8>>,
    ) -> Self {
        Self {
            row,
            values,
            geometry,
            index_by_name: projection.index_by_name(),
        }
    }

    /// 1-based position of the record in its source.
    pub fn row(&self) -> usize {
        self.row
    }

    /// Read an attribute by field name.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.index_by_name
            .get(field)
            .and_then(|idx| self.values.get(*idx))
    }

    /// Read an attribute by field name, failing if the source has no such field.
    pub fn value(&self, field: &str) -> Result<&Value> {
        self.get(field).ok_or_else(|| ExportError::MissingField {
            row: self.row,
            field: field.to_string(),
        })
    }

    pub fn has_geometry(&self) -> bool {
        self.geometry.is_some()
    }

    /// Decode the geometry, `None` when the feature has none.
    pub fn geometry(&self) -> Result<Option<Wkb<'_>>> {
        match &self.geometry {
            Some(bytes) => Ok(Some(Wkb::try_new(bytes)?)),
            None => Ok(None),
        }
    }
}
