//! GeoPackages written with plain SQL for the integration tests.
//!
//! Geometries go in through `ST_GeomFromText`, so the blobs are the ones the
//! crate's own spatial functions produce.

#![allow(dead_code)]

use rusqlite::{Connection, ToSql};
use std::path::Path;
use survey_sql::{Result, register_spatial_functions};

const GPKG_TABLES: &str = "
CREATE TABLE gpkg_spatial_ref_sys (
  srs_name TEXT NOT NULL,
  srs_id INTEGER PRIMARY KEY,
  organization TEXT NOT NULL,
  organization_coordsys_id INTEGER NOT NULL,
  definition TEXT NOT NULL,
  description TEXT
);
CREATE TABLE gpkg_contents (
  table_name TEXT NOT NULL PRIMARY KEY,
  data_type TEXT NOT NULL,
  identifier TEXT UNIQUE,
  srs_id INTEGER
);
CREATE TABLE gpkg_geometry_columns (
  table_name TEXT NOT NULL,
  column_name TEXT NOT NULL,
  geometry_type_name TEXT NOT NULL,
  srs_id INTEGER NOT NULL,
  z TINYINT NOT NULL,
  m TINYINT NOT NULL,
  CONSTRAINT pk_geom_cols PRIMARY KEY (table_name, column_name)
);
INSERT INTO gpkg_spatial_ref_sys VALUES
  ('WGS 84 geodetic', 4326, 'EPSG', 4326, 'undefined', NULL);
";

pub struct SurveyGpkg {
    conn: Connection,
}

impl SurveyGpkg {
    pub fn create(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        register_spatial_functions(&conn)?;
        conn.execute_batch(GPKG_TABLES)?;
        Ok(Self { conn })
    }

    /// Add a feature table with a `fid` key, a `SHAPE` geometry column and
    /// the given `(name, type)` attributes.
    pub fn layer(&self, name: &str, geometry_type: &str, attributes: &[(&str, &str)]) -> Result<()> {
        let mut columns = vec![
            "fid INTEGER PRIMARY KEY AUTOINCREMENT".to_string(),
            format!("SHAPE {geometry_type}"),
        ];
        columns.extend(attributes.iter().map(|(n, t)| format!(r#""{n}" {t}"#)));
        self.conn
            .execute_batch(&format!(r#"CREATE TABLE "{name}" ({})"#, columns.join(", ")))?;
        self.conn.execute(
            "INSERT INTO gpkg_contents (table_name, data_type, identifier, srs_id) \
             VALUES (?1, 'features', ?1, 4326)",
            [name],
        )?;
        self.conn.execute(
            "INSERT INTO gpkg_geometry_columns VALUES (?1, 'SHAPE', ?2, 4326, 0, 0)",
            [name, geometry_type],
        )?;
        Ok(())
    }

    /// Insert one feature; `wkt` of `None` stores a NULL geometry.
    pub fn feature(
        &self,
        layer: &str,
        wkt: Option<&str>,
        attributes: &[(&str, &dyn ToSql)],
    ) -> Result<()> {
        let mut names = vec!["SHAPE".to_string()];
        names.extend(attributes.iter().map(|(n, _)| format!(r#""{n}""#)));
        let placeholders = std::iter::once("ST_GeomFromText(?1, 4326)".to_string())
            .chain((2..=names.len()).map(|i| format!("?{i}")))
            .collect::<Vec<_>>()
            .join(", ");

        let mut params: Vec<&dyn ToSql> = vec![&wkt];
        params.extend(attributes.iter().map(|(_, v)| *v));
        self.conn.execute(
            &format!(
                r#"INSERT INTO "{layer}" ({}) VALUES ({placeholders})"#,
                names.join(", ")
            ),
            params.as_slice(),
        )?;
        Ok(())
    }

    /// Overwrite one feature's geometry blob with raw bytes.
    pub fn raw_geometry(&self, layer: &str, fid: i64, blob: &[u8]) -> Result<()> {
        self.conn.execute(
            &format!(r#"UPDATE "{layer}" SET SHAPE = ?1 WHERE fid = ?2"#),
            rusqlite::params![blob, fid],
        )?;
        Ok(())
    }
}
