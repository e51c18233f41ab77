//! Small GeoPackages written for tests.

use crate::Result;
use crate::gpkg::wkb_to_gpkg_geometry;
use crate::ogc_sql::initialize_gpkg;
use crate::types::Value;
use std::path::Path;
use std::str::FromStr;
use wkt::Wkt;

pub(crate) struct FixtureLayer {
    name: String,
    attributes: Vec<String>,
    srs_id: i32,
    rows: Vec<(Option<String>, Vec<Value>)>,
}

impl FixtureLayer {
    /// A point layer with a `fid` key, a `Shape` geometry and TEXT attributes.
    pub(crate) fn points(name: &str, attributes: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            attributes: attributes.iter().map(|a| a.to_string()).collect(),
            srs_id: 4326,
            rows: Vec::new(),
        }
    }

    pub(crate) fn with_srs_id(mut self, srs_id: i32) -> Self {
        self.srs_id = srs_id;
        self
    }

    pub(crate) fn row(mut self, wkt: Option<&str>, values: Vec<Value>) -> Self {
        self.rows.push((wkt.map(str::to_string), values));
        self
    }
}

pub(crate) fn write_fixture(path: &Path, layers: &[FixtureLayer]) -> Result<()> {
    let conn = rusqlite::Connection::open(path)?;
    initialize_gpkg(&conn)?;

    for layer in layers {
        if layer.srs_id != 4326 {
            conn.execute(
                "INSERT OR IGNORE INTO gpkg_spatial_ref_sys \
                (srs_name, srs_id, organization, organization_coordsys_id, definition) \
                VALUES (?1, ?1, 'EPSG', ?1, 'undefined')",
                [layer.srs_id],
            )?;
        }

        let mut column_defs = vec![
            "fid INTEGER PRIMARY KEY AUTOINCREMENT".to_string(),
            r#""Shape" POINT"#.to_string(),
        ];
        column_defs.extend(layer.attributes.iter().map(|a| format!(r#""{a}" TEXT"#)));
        conn.execute_batch(&format!(
            r#"CREATE TABLE "{}" ({})"#,
            layer.name,
            column_defs.join(", ")
        ))?;
        conn.execute(
            "INSERT INTO gpkg_contents (table_name, data_type, identifier, srs_id) \
            VALUES (?1, 'features', ?1, ?2)",
            rusqlite::params![layer.name, layer.srs_id],
        )?;
        conn.execute(
            "INSERT INTO gpkg_geometry_columns \
            (table_name, column_name, geometry_type_name, srs_id, z, m) \
            VALUES (?1, 'Shape', 'POINT', ?2, 2, 0)",
            rusqlite::params![layer.name, layer.srs_id],
        )?;

        let mut columns = vec![r#""Shape""#.to_string()];
        columns.extend(layer.attributes.iter().map(|a| format!(r#""{a}""#)));
        let placeholders = (1..=columns.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<String>>()
            .join(",");
        let insert_sql = format!(
            r#"INSERT INTO "{}" ({}) VALUES ({})"#,
            layer.name,
            columns.join(","),
            placeholders
        );

        for (wkt, values) in &layer.rows {
            let geometry = match wkt {
                Some(wkt) => {
                    let parsed = Wkt::<f64>::from_str(wkt).map_err(|err| {
                        crate::ExportError::InvalidWkt {
                            wkt: wkt.clone(),
                            reason: err.to_string(),
                        }
                    })?;
                    let mut buf = Vec::new();
                    wkb::writer::write_geometry(&mut buf, &parsed, &Default::default())?;
                    Value::Blob(wkb_to_gpkg_geometry(&buf, layer.srs_id))
                }
                None => Value::Null,
            };
            let params = std::iter::once(geometry).chain(values.iter().cloned());
            conn.execute(&insert_sql, rusqlite::params_from_iter(params))?;
        }
    }
    Ok(())
}
