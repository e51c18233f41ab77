use crate::error::{ExportError, Result};
use crate::geometry::{WGS84, ZPolicy, has_coordinates, to_wkt};
use crate::gpkg::{gpkg_geometry_to_wkb, wkb_to_gpkg_geometry};
use rusqlite::functions::{Context, FunctionFlags};
use rusqlite::types::{Type, ValueRef};
use rusqlite::{Connection, Error};
use std::str::FromStr;
use wkb::reader::Wkb;
use wkt::Wkt;

/// Geometry a text constructor accepts.
#[derive(Clone, Copy)]
enum Accepts {
    Any,
    Point,
    LineString,
}

/// Register the spatial SQL functions generated statements rely on.
///
/// `ST_GeomFromText`, `ST_PointFromText` and `ST_LineFromText` take WKT and
/// an optional SRID (4326 when omitted) and return a GeoPackage geometry
/// blob. `ST_AsText`, `ST_SRID` and `ST_IsEmpty` read such blobs back.
///
/// Example:
/// ```
/// use rusqlite::Connection;
/// use survey_sql::register_spatial_functions;
///
/// let conn = Connection::open_in_memory()?;
/// register_spatial_functions(&conn)?;
/// let wkt: String = conn.query_row(
///     "SELECT ST_AsText(ST_PointFromText('POINT(-149.1 63.2)', 4326))",
///     [],
///     |row| row.get(0),
/// )?;
/// assert_eq!(wkt, "POINT(-149.1 63.2)");
/// # Ok::<(), survey_sql::ExportError>(())
/// ```
pub fn register_spatial_functions(conn: &Connection) -> Result<()> {
    register_from_text(conn, "ST_GeomFromText", Accepts::Any)?;
    register_from_text(conn, "ST_PointFromText", Accepts::Point)?;
    register_from_text(conn, "ST_LineFromText", Accepts::LineString)?;
    register_st_astext(conn)?;
    register_st_srid(conn)?;
    register_st_isempty(conn)?;
    Ok(())
}

fn register_from_text(conn: &Connection, name: &str, accepts: Accepts) -> Result<()> {
    for n_arg in [1, 2] {
        conn.create_scalar_function(
            name,
            n_arg,
            FunctionFlags::SQLITE_DETERMINISTIC,
            move |ctx| {
                let wkt = match ctx.get_raw(0) {
                    ValueRef::Null => return Ok(None),
                    ValueRef::Text(text) => String::from_utf8_lossy(text).into_owned(),
                    _ => return Err(Error::InvalidFunctionParameterType(0, Type::Text)),
                };
                let srs_id = if ctx.len() > 1 {
                    ctx.get::<i32>(1)?
                } else {
                    WGS84 as i32
                };
                gpkg_blob_from_wkt(&wkt, srs_id, accepts)
                    .map(Some)
                    .map_err(|err| Error::UserFunctionError(Box::new(err)))
            },
        )?;
    }
    Ok(())
}

pub(crate) fn register_st_astext(conn: &Connection) -> Result<()> {
    conn.create_scalar_function("ST_AsText", 1, FunctionFlags::SQLITE_DETERMINISTIC, |ctx| {
        let wkb = match wkb_from_ctx(ctx)? {
            Some(wkb) => wkb,
            None => return Ok(None),
        };
        to_wkt(&wkb, ZPolicy::Keep).map_err(|err| Error::UserFunctionError(Box::new(err)))
    })?;
    Ok(())
}

pub(crate) fn register_st_srid(conn: &Connection) -> Result<()> {
    conn.create_scalar_function("ST_SRID", 1, FunctionFlags::SQLITE_DETERMINISTIC, |ctx| {
        match ctx.get_raw(0) {
            ValueRef::Null => Ok(None),
            ValueRef::Blob(blob) if blob.len() >= 8 => {
                let srs_id = [blob[4], blob[5], blob[6], blob[7]];
                // Bit 0 of the flags byte selects the byte order of the header.
                let srs_id = if blob[3] & 0x01 == 0x01 {
                    i32::from_le_bytes(srs_id)
                } else {
                    i32::from_be_bytes(srs_id)
                };
                Ok(Some(i64::from(srs_id)))
            }
            _ => Err(Error::InvalidFunctionParameterType(0, Type::Blob)),
        }
    })?;
    Ok(())
}

pub(crate) fn register_st_isempty(conn: &Connection) -> Result<()> {
    conn.create_scalar_function(
        "ST_IsEmpty",
        1,
        FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            if let ValueRef::Null = ctx.get_raw(0) {
                return Ok(None);
            }
            let is_empty = match wkb_from_ctx(ctx)? {
                Some(wkb) => !has_coordinates(&wkb),
                None => true,
            };
            Ok(Some(i64::from(is_empty)))
        },
    )?;
    Ok(())
}

fn gpkg_blob_from_wkt(wkt: &str, srs_id: i32, accepts: Accepts) -> Result<Vec<u8>> {
    let parsed = Wkt::<f64>::from_str(wkt).map_err(|err| ExportError::InvalidWkt {
        wkt: wkt.to_string(),
        reason: err.to_string(),
    })?;
    let matches = match (accepts, &parsed) {
        (Accepts::Any, _) => true,
        (Accepts::Point, Wkt::Point(_)) => true,
        (Accepts::LineString, Wkt::LineString(_)) => true,
        _ => false,
    };
    if !matches {
        let expected = match accepts {
            Accepts::Point => "POINT",
            _ => "LINESTRING",
        };
        return Err(ExportError::InvalidWkt {
            wkt: wkt.to_string(),
            reason: format!("expected a {expected}"),
        });
    }

    let mut buf = Vec::new();
    wkb::writer::write_geometry(&mut buf, &parsed, &Default::default())?;
    Ok(wkb_to_gpkg_geometry(&buf, srs_id))
}

fn wkb_from_ctx<'a>(ctx: &'a Context<'a>) -> std::result::Result<Option<Wkb<'a>>, Error> {
    let value = ctx.get_raw(0);
    match value {
        ValueRef::Null => Ok(None),
        ValueRef::Blob(blob) => {
            gpkg_geometry_to_wkb(blob).map_err(|err| Error::UserFunctionError(Box::new(err)))
        }
        _ => Err(Error::InvalidFunctionParameterType(0, Type::Blob)),
    }
}

#[cfg(test)]
mod tests {
    use super::register_spatial_functions;
    use rusqlite::Connection;

    fn connection() -> crate::Result<Connection> {
        let conn = Connection::open_in_memory()?;
        register_spatial_functions(&conn)?;
        Ok(conn)
    }

    #[test]
    fn point_from_text_round_trips() -> crate::Result<()> {
        let conn = connection()?;
        let (wkt, srid, empty): (String, i64, i64) = conn.query_row(
            "SELECT ST_AsText(g), ST_SRID(g), ST_IsEmpty(g) \
             FROM (SELECT ST_PointFromText('POINT(-149.1 63.2)', 4326) AS g)",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        assert_eq!(wkt, "POINT(-149.1 63.2)");
        assert_eq!(srid, 4326);
        assert_eq!(empty, 0);
        Ok(())
    }

    #[test]
    fn srid_defaults_to_wgs84() -> crate::Result<()> {
        let conn = connection()?;
        let srid: i64 = conn.query_row(
            "SELECT ST_SRID(ST_GeomFromText('POLYGON((0 0, 1 0, 1 1, 0 0))'))",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(srid, 4326);
        Ok(())
    }

    #[test]
    fn line_from_text_keeps_vertex_order() -> crate::Result<()> {
        let conn = connection()?;
        let wkt: String = conn.query_row(
            "SELECT ST_AsText(ST_LineFromText('LINESTRING(1 2, 3 4, 5 6)', 4326))",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(wkt, "LINESTRING(1 2, 3 4, 5 6)");
        Ok(())
    }

    #[test]
    fn constructors_reject_the_wrong_shape() -> crate::Result<()> {
        let conn = connection()?;
        let result: rusqlite::Result<Vec<u8>> = conn.query_row(
            "SELECT ST_PointFromText('LINESTRING(1 2, 3 4)', 4326)",
            [],
            |row| row.get(0),
        );
        assert!(result.is_err());
        Ok(())
    }

    #[test]
    fn null_text_gives_null_geometry() -> crate::Result<()> {
        let conn = connection()?;
        let (geom, empty): (Option<Vec<u8>>, Option<i64>) = conn.query_row(
            "SELECT ST_GeomFromText(NULL, 4326), ST_IsEmpty(NULL)",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        assert!(geom.is_none());
        assert!(empty.is_none());
        Ok(())
    }

    #[test]
    fn empty_geometry_is_reported() -> crate::Result<()> {
        let conn = connection()?;
        let empty: i64 = conn.query_row(
            "SELECT ST_IsEmpty(ST_GeomFromText('LINESTRING EMPTY', 4326))",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(empty, 1);
        Ok(())
    }
}
