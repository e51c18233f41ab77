use crate::conversions::{column_role_from_str, dimension_from_zm, geometry_type_from_str};
use crate::error::{ExportError, Result};
use crate::ogc_sql::{SQL_LIST_LAYERS, SQL_SELECT_GEOMETRY_COLUMN_META, sql_table_columns};
use crate::sql_functions::register_spatial_functions;
use crate::types::{FieldRole, FieldSpec};
use rusqlite::OpenFlags;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::layer::{DEFAULT_BATCH_SIZE, GpkgLayer};

/// Declared columns of a layer table.
pub(crate) struct LayerColumns {
    pub(crate) primary_key: String,
    pub(crate) fields: Vec<FieldSpec>,
}

/// Geometry column metadata from `gpkg_geometry_columns`.
pub(crate) struct GeometryColumnMeta {
    pub(crate) column: String,
    pub(crate) geometry_type: wkb::reader::GeometryType,
    pub(crate) dimension: wkb::reader::Dimension,
    pub(crate) srs_id: i64,
}

#[derive(Debug)]
/// Read-only GeoPackage connection used as a feature source container.
pub struct Gpkg {
    conn: rusqlite::Connection,
    path: PathBuf,
}

impl Gpkg {
    /// Open a GeoPackage in read-only mode.
    ///
    /// A missing file is reported as [`ExportError::SourceNotFound`] rather
    /// than whatever SQLite makes of it.
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ExportError::SourceNotFound {
                path: path.to_path_buf(),
            });
        }

        let conn = rusqlite::Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        register_spatial_functions(&conn)?;
        debug!(path = %path.display(), "opened GeoPackage");
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// List the names of the feature layers.
    pub fn list_layers(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(SQL_LIST_LAYERS)?;
        let layers = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(layers)
    }

    /// Load a layer definition and metadata by name.
    pub fn layer<'a>(&'a self, layer_name: &str) -> Result<GpkgLayer<'a>> {
        if !self.list_layers()?.iter().any(|name| name == layer_name) {
            return Err(ExportError::LayerNotFound {
                layer_name: layer_name.to_string(),
            });
        }

        let geometry = self.geometry_column_meta(layer_name)?;
        let LayerColumns {
            primary_key,
            mut fields,
        } = self.layer_columns(layer_name)?;
        // Metadata is authoritative for which column holds the geometry.
        for field in fields.iter_mut() {
            field.role = if field.name == geometry.column {
                FieldRole::Geometry
            } else {
                FieldRole::Attribute
            };
        }

        Ok(GpkgLayer {
            gpkg: self,
            layer_name: layer_name.to_string(),
            geometry_column: geometry.column,
            primary_key_column: primary_key,
            geometry_type: geometry.geometry_type,
            geometry_dimension: geometry.dimension,
            srs_id: geometry.srs_id,
            fields,
            batch_size: DEFAULT_BATCH_SIZE,
        })
    }

    pub(crate) fn connection(&self) -> &rusqlite::Connection {
        &self.conn
    }

    /// Resolve the table columns in declared order.
    pub(crate) fn layer_columns(&self, layer_name: &str) -> Result<LayerColumns> {
        let query = sql_table_columns(layer_name);
        let mut stmt = self.conn.prepare(&query)?;

        let rows = stmt
            .query_map([], |row| {
                let name: String = row.get(0)?;
                let column_type: String = row.get(1)?;
                let primary_key: i32 = row.get(2)?;
                Ok((name, column_type, primary_key != 0))
            })?
            .collect::<std::result::Result<Vec<(String, String, bool)>, _>>()?;

        let mut primary_key: Option<String> = None;
        let mut fields = Vec::with_capacity(rows.len());
        for (name, column_type, is_primary_key) in rows {
            let role = column_role_from_str(&column_type).ok_or_else(|| {
                ExportError::UnsupportedColumnType {
                    column: name.clone(),
                    declared_type: column_type.clone(),
                }
            })?;
            if is_primary_key {
                if primary_key.is_some() {
                    return Err(ExportError::CompositePrimaryKeyUnsupported {
                        layer_name: layer_name.to_string(),
                    });
                }
                primary_key = Some(name.clone());
            }
            fields.push(FieldSpec { name, role });
        }

        let primary_key = primary_key.ok_or_else(|| ExportError::MissingPrimaryKeyColumn {
            layer_name: layer_name.to_string(),
        })?;

        Ok(LayerColumns {
            primary_key,
            fields,
        })
    }

    /// Resolve the geometry column metadata and SRS information for a layer.
    pub(crate) fn geometry_column_meta(&self, layer_name: &str) -> Result<GeometryColumnMeta> {
        let mut stmt = self.conn.prepare(SQL_SELECT_GEOMETRY_COLUMN_META)?;

        let (column, geometry_type_str, z, m, srs_id) = stmt
            .query_row([layer_name], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i8>(2)?,
                    row.get::<_, i8>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })
            .map_err(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => ExportError::LayerNotFound {
                    layer_name: layer_name.to_string(),
                },
                other => other.into(),
            })?;

        Ok(GeometryColumnMeta {
            column,
            geometry_type: geometry_type_from_str(&geometry_type_str)?,
            dimension: dimension_from_zm(z, m)?,
            srs_id,
        })
    }
}
