use crate::error::ExportError;
use crate::types::FieldRole;

#[inline]
pub(crate) fn geometry_type_from_str(
    geometry_type_str: &str,
) -> Result<wkb::reader::GeometryType, ExportError> {
    let s = geometry_type_str;
    if s.eq_ignore_ascii_case("GEOMETRY") || s.eq_ignore_ascii_case("GEOMETRYCOLLECTION") {
        Ok(wkb::reader::GeometryType::GeometryCollection)
    } else if s.eq_ignore_ascii_case("POINT") {
        Ok(wkb::reader::GeometryType::Point)
    } else if s.eq_ignore_ascii_case("LINESTRING") {
        Ok(wkb::reader::GeometryType::LineString)
    } else if s.eq_ignore_ascii_case("POLYGON") {
        Ok(wkb::reader::GeometryType::Polygon)
    } else if s.eq_ignore_ascii_case("MULTIPOINT") {
        Ok(wkb::reader::GeometryType::MultiPoint)
    } else if s.eq_ignore_ascii_case("MULTILINESTRING") {
        Ok(wkb::reader::GeometryType::MultiLineString)
    } else if s.eq_ignore_ascii_case("MULTIPOLYGON") {
        Ok(wkb::reader::GeometryType::MultiPolygon)
    } else {
        Err(ExportError::UnsupportedGeometryType(
            geometry_type_str.to_string(),
        ))
    }
}

#[inline]
pub(crate) fn dimension_from_zm(z: i8, m: i8) -> Result<wkb::reader::Dimension, ExportError> {
    // 0: prohibited, 1: mandatory, 2: optional. Optional ordinates are read
    // as present; the blobs themselves say whether they carry them.
    let has = |flag: i8| match flag {
        0 => Some(false),
        1 | 2 => Some(true),
        _ => None,
    };
    match (has(z), has(m)) {
        (Some(false), Some(false)) => Ok(wkb::reader::Dimension::Xy),
        (Some(true), Some(false)) => Ok(wkb::reader::Dimension::Xyz),
        (Some(false), Some(true)) => Ok(wkb::reader::Dimension::Xym),
        (Some(true), Some(true)) => Ok(wkb::reader::Dimension::Xyzm),
        _ => Err(ExportError::InvalidDimension { z, m }),
    }
}

/// Role of a column from its declared SQLite type, `None` when the type is
/// not one GeoPackage allows.
// cf. https://www.geopackage.org/spec140/index.html#_sqlite_container
#[inline]
pub(crate) fn column_role_from_str(column_type_str: &str) -> Option<FieldRole> {
    // TEXT(32), BLOB(1024) and friends carry a maximum length we don't need.
    let s = column_type_str
        .split_once('(')
        .map_or(column_type_str, |(base, _)| base)
        .trim();
    if s.eq_ignore_ascii_case("TINYINT")
        || s.eq_ignore_ascii_case("SMALLINT")
        || s.eq_ignore_ascii_case("MEDIUMINT")
        || s.eq_ignore_ascii_case("INT")
        || s.eq_ignore_ascii_case("INTEGER")
        || s.eq_ignore_ascii_case("DOUBLE")
        || s.eq_ignore_ascii_case("FLOAT")
        || s.eq_ignore_ascii_case("REAL")
        || s.eq_ignore_ascii_case("TEXT")
        || s.eq_ignore_ascii_case("BOOLEAN")
        || s.eq_ignore_ascii_case("DATE")
        || s.eq_ignore_ascii_case("DATETIME")
        || s.eq_ignore_ascii_case("BLOB")
    {
        Some(FieldRole::Attribute)
    } else if s.eq_ignore_ascii_case("GEOMETRY")
        || s.eq_ignore_ascii_case("POINT")
        || s.eq_ignore_ascii_case("LINESTRING")
        || s.eq_ignore_ascii_case("POLYGON")
        || s.eq_ignore_ascii_case("MULTIPOINT")
        || s.eq_ignore_ascii_case("MULTILINESTRING")
        || s.eq_ignore_ascii_case("MULTIPOLYGON")
        || s.eq_ignore_ascii_case("GEOMETRYCOLLECTION")
    {
        Some(FieldRole::Geometry)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::{column_role_from_str, dimension_from_zm, geometry_type_from_str};
    use crate::types::FieldRole;
    use wkb::reader::{Dimension, GeometryType};

    #[test]
    fn column_roles() {
        assert_eq!(column_role_from_str("INTEGER"), Some(FieldRole::Attribute));
        assert_eq!(column_role_from_str("text(50)"), Some(FieldRole::Attribute));
        assert_eq!(column_role_from_str("DATETIME"), Some(FieldRole::Attribute));
        assert_eq!(column_role_from_str("POINT"), Some(FieldRole::Geometry));
        assert_eq!(column_role_from_str("VARCHAR"), None);
    }

    #[test]
    fn optional_ordinates_read_as_present() {
        assert!(matches!(dimension_from_zm(2, 0), Ok(Dimension::Xyz)));
        assert!(matches!(dimension_from_zm(0, 0), Ok(Dimension::Xy)));
        assert!(dimension_from_zm(3, 0).is_err());
    }

    #[test]
    fn geometry_types_are_case_insensitive() {
        assert!(matches!(
            geometry_type_from_str("multiPolygon"),
            Ok(GeometryType::MultiPolygon)
        ));
        assert!(geometry_type_from_str("CURVE").is_err());
    }
}
