// cf. https://www.geopackage.org/spec140/index.html#table_definition_sql

pub(crate) const SQL_LIST_LAYERS: &str =
    "SELECT table_name FROM gpkg_contents WHERE data_type = 'features' ORDER BY table_name";

pub(crate) const SQL_SELECT_GEOMETRY_COLUMN_META: &str = "
SELECT column_name, geometry_type_name, z, m, srs_id
FROM gpkg_geometry_columns
WHERE table_name = ?
";

pub(crate) fn sql_table_columns(layer_name: &str) -> String {
    format!(
        "SELECT name, type, pk FROM pragma_table_info('{}') ORDER BY cid",
        layer_name.replace('\'', "''")
    )
}

pub(crate) fn sql_count_features(layer_name: &str) -> String {
    format!(r#"SELECT COUNT(*) FROM "{layer_name}""#)
}

/// Select the projected columns in rowid order, one batch at a time.
///
/// The only bound parameter is the batch offset.
pub(crate) fn sql_select_records<'a, I>(
    layer_name: &'a str,
    primary_key_column: &'a str,
    columns: I,
    batch_size: u32,
) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let joined = columns
        .into_iter()
        .map(|name| format!(r#""{}""#, name))
        .collect::<Vec<String>>()
        .join(", ");

    // A projection without columns still yields one row per feature.
    let columns = if joined.is_empty() {
        format!(r#""{primary_key_column}""#)
    } else {
        joined
    };

    format!(
        r#"SELECT {columns} FROM "{layer_name}" ORDER BY "{primary_key_column}" LIMIT {batch_size} OFFSET ?"#,
    )
}

// The tables below are only created by test fixtures; this crate never writes
// GeoPackages.

#[cfg(test)]
pub(crate) const SQL_GPKG_SPATIAL_REF_SYS: &str = "
CREATE TABLE gpkg_spatial_ref_sys (
  srs_name TEXT NOT NULL,
  srs_id INTEGER PRIMARY KEY,
  organization TEXT NOT NULL,
  organization_coordsys_id INTEGER NOT NULL,
  definition  TEXT NOT NULL,
  description TEXT
);
";

#[cfg(test)]
pub(crate) const SQL_GPKG_CONTENTS: &str = "
CREATE TABLE gpkg_contents (
  table_name TEXT NOT NULL PRIMARY KEY,
  data_type TEXT NOT NULL,
  identifier TEXT UNIQUE,
  description TEXT DEFAULT '',
  last_change DATETIME NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
  min_x DOUBLE,
  min_y DOUBLE,
  max_x DOUBLE,
  max_y DOUBLE,
  srs_id INTEGER,
  CONSTRAINT fk_gc_r_srs_id FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys(srs_id)
);
";

#[cfg(test)]
pub(crate) const SQL_GPKG_GEOMETRY_COLUMNS: &str = "
CREATE TABLE gpkg_geometry_columns (
  table_name TEXT NOT NULL,
  column_name TEXT NOT NULL,
  geometry_type_name TEXT NOT NULL,
  srs_id INTEGER NOT NULL,
  z TINYINT NOT NULL,
  m TINYINT NOT NULL,
  CONSTRAINT pk_geom_cols PRIMARY KEY (table_name, column_name),
  CONSTRAINT uk_gc_table_name UNIQUE (table_name),
  CONSTRAINT fk_gc_tn FOREIGN KEY (table_name) REFERENCES gpkg_contents(table_name),
  CONSTRAINT fk_gc_srs FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys (srs_id)
);
";

#[cfg(test)]
pub(crate) fn initialize_gpkg(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    const EPSG4326_WKT: &str = r#"GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563,AUTHORITY["EPSG","7030"]],AUTHORITY["EPSG","6326"]],PRIMEM["Greenwich",0,AUTHORITY["EPSG","8901"]],UNIT["degree",0.0174532925199433,AUTHORITY["EPSG","9122"]],AXIS["Latitude",NORTH],AXIS["Longitude",EAST],AUTHORITY["EPSG","4326"]]"#;

    conn.execute_batch(SQL_GPKG_SPATIAL_REF_SYS)?;
    conn.execute(
        "INSERT INTO gpkg_spatial_ref_sys \
        (srs_name, srs_id, organization, organization_coordsys_id, definition, description) \
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params!["WGS 84", 4326, "EPSG", 4326, EPSG4326_WKT, "WGS 84"],
    )?;
    conn.execute_batch(SQL_GPKG_CONTENTS)?;
    conn.execute_batch(SQL_GPKG_GEOMETRY_COLUMNS)?;
    Ok(())
}
