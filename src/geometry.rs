//! Geometry to SQL geography expressions.
//!
//! Geometries are written as WKT straight from `geo_traits` and embedded in
//! the target database's geography constructor together with the EPSG code
//! they were read in.

use crate::error::{ExportError, Result};
use crate::normalize::escape_quotes;
use geo_traits::{
    CoordTrait, Dimensions, GeometryCollectionTrait, GeometryTrait, LineStringTrait,
    MultiLineStringTrait, MultiPointTrait, MultiPolygonTrait, PointTrait, PolygonTrait,
};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// EPSG code of WGS84, the reference system of every survey dataset.
pub const WGS84: u32 = 4326;

/// Which geography constructor a column uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeographyKind {
    Point,
    Shape,
    Line,
}

/// SQL flavour of the generated statements.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    /// `geography::STGeomFromText(...)` and T-SQL script boilerplate.
    #[default]
    SqlServer,
    /// `ST_GeomFromText(...)`, resolved by [`crate::register_spatial_functions`].
    Sqlite,
}

impl Dialect {
    pub fn constructor(self, kind: GeographyKind) -> &'static str {
        match (self, kind) {
            (Dialect::SqlServer, GeographyKind::Point) => "geography::STPointFromText",
            (Dialect::SqlServer, GeographyKind::Shape) => "geography::STGeomFromText",
            (Dialect::SqlServer, GeographyKind::Line) => "geography::STLineFromText",
            (Dialect::Sqlite, GeographyKind::Point) => "ST_PointFromText",
            (Dialect::Sqlite, GeographyKind::Shape) => "ST_GeomFromText",
            (Dialect::Sqlite, GeographyKind::Line) => "ST_LineFromText",
        }
    }
}

/// What to do with Z (and M) ordinates when writing WKT.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZPolicy {
    /// Write every ordinate with the OGC dimension tag (`POINT Z (1 2 3)`).
    #[default]
    Keep,
    /// Write every ordinate without the tag (`POINT(1 2 3)`), the form SQL
    /// Server's geography parser reads elevation from.
    Untagged,
    /// Write x and y only.
    Flatten,
}

/// Wrap a WKT string in the geography constructor for `kind`.
pub fn wrap_wkt(wkt: &str, epsg: u32, kind: GeographyKind, dialect: Dialect) -> String {
    format!(
        "{}('{}', {epsg})",
        dialect.constructor(kind),
        escape_quotes(wkt)
    )
}

/// Convert an optional geometry into a geography expression.
///
/// Absent and empty geometries produce the literal `NULL`; callers decide
/// whether that is acceptable for the target column.
pub fn geography_expression<G: GeometryTrait<T = f64>>(
    geometry: Option<&G>,
    epsg: u32,
    kind: GeographyKind,
    dialect: Dialect,
    z_policy: ZPolicy,
) -> Result<String> {
    let Some(geometry) = geometry else {
        return Ok("NULL".to_string());
    };
    match to_wkt(geometry, z_policy)? {
        Some(wkt) => Ok(wrap_wkt(&wkt, epsg, kind, dialect)),
        None => Ok("NULL".to_string()),
    }
}

/// Write a geometry as WKT, `None` when it has no coordinates.
pub fn to_wkt<G: GeometryTrait<T = f64>>(geometry: &G, z_policy: ZPolicy) -> Result<Option<String>> {
    if !has_coordinates(geometry) {
        return Ok(None);
    }
    let mut out = String::new();
    write_geometry(&mut out, geometry, z_policy)?;
    Ok(Some(out))
}

/// Accumulates point locations into a single `LINESTRING`.
#[derive(Clone, Debug, Default)]
pub struct LineBuilder {
    coords: Vec<(f64, f64)>,
}

impl LineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, lon: f64, lat: f64) {
        self.coords.push((lon, lat));
    }

    /// Append the location of a point geometry. Returns `false` for empty or
    /// non-point geometries, which are left out of the line.
    pub fn push_point<G: GeometryTrait<T = f64>>(&mut self, geometry: &G) -> bool {
        use geo_traits::GeometryType as GeoType;

        if let GeoType::Point(point) = geometry.as_type() {
            if let Some(coord) = point.coord() {
                self.push(coord.x(), coord.y());
                return true;
            }
        }
        false
    }

    pub fn len(&self) -> usize {
        self.coords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    /// The accumulated line, `None` when no point was pushed.
    pub fn wkt(&self) -> Option<String> {
        if self.coords.is_empty() {
            return None;
        }
        let pairs = self
            .coords
            .iter()
            .map(|(lon, lat)| format!("{lon} {lat}"))
            .collect::<Vec<String>>()
            .join(", ");
        Some(format!("LINESTRING({pairs})"))
    }

    pub fn expression(&self, epsg: u32, dialect: Dialect) -> String {
        match self.wkt() {
            Some(wkt) => wrap_wkt(&wkt, epsg, GeographyKind::Line, dialect),
            None => "NULL".to_string(),
        }
    }
}

pub(crate) fn has_coordinates<G: GeometryTrait<T = f64>>(geometry: &G) -> bool {
    use geo_traits::GeometryType as GeoType;

    match geometry.as_type() {
        GeoType::Point(point) => point.coord().is_some(),
        GeoType::LineString(line) => line.coords().next().is_some(),
        GeoType::Polygon(poly) => poly
            .exterior()
            .is_some_and(|ring| ring.coords().next().is_some()),
        GeoType::MultiPoint(multi) => multi.points().any(|p| p.coord().is_some()),
        GeoType::MultiLineString(multi) => multi
            .line_strings()
            .any(|line| line.coords().next().is_some()),
        GeoType::MultiPolygon(multi) => multi.polygons().any(|poly| {
            poly.exterior()
                .is_some_and(|ring| ring.coords().next().is_some())
        }),
        GeoType::GeometryCollection(collection) => {
            collection.geometries().any(|g| has_coordinates(&g))
        }
        GeoType::Rect(_) | GeoType::Triangle(_) | GeoType::Line(_) => true,
    }
}

fn write_geometry<G: GeometryTrait<T = f64>>(
    out: &mut String,
    geometry: &G,
    z_policy: ZPolicy,
) -> Result<()> {
    use geo_traits::GeometryType as GeoType;

    let dim = geometry.dim();
    let tag = dimension_tag(dim, z_policy);
    let ordinates = ordinate_count(dim, z_policy);

    match geometry.as_type() {
        GeoType::Point(point) => {
            out.push_str("POINT");
            out.push_str(tag);
            match point.coord() {
                Some(coord) => {
                    out.push('(');
                    write_coord(out, &coord, ordinates);
                    out.push(')');
                }
                None => out.push_str(" EMPTY"),
            }
        }
        GeoType::LineString(line) => {
            out.push_str("LINESTRING");
            out.push_str(tag);
            write_line_string(out, line, ordinates);
        }
        GeoType::Polygon(poly) => {
            out.push_str("POLYGON");
            out.push_str(tag);
            write_polygon(out, poly, ordinates);
        }
        GeoType::MultiPoint(multi) => {
            out.push_str("MULTIPOINT");
            out.push_str(tag);
            let points = multi
                .points()
                .filter_map(|p| {
                    p.coord().map(|coord| {
                        let mut s = String::from("(");
                        write_coord(&mut s, &coord, ordinates);
                        s.push(')');
                        s
                    })
                })
                .collect::<Vec<String>>();
            write_parts(out, points);
        }
        GeoType::MultiLineString(multi) => {
            out.push_str("MULTILINESTRING");
            out.push_str(tag);
            let lines = multi
                .line_strings()
                .map(|line| {
                    let mut s = String::new();
                    write_line_string(&mut s, &line, ordinates);
                    s
                })
                .collect::<Vec<String>>();
            write_parts(out, lines);
        }
        GeoType::MultiPolygon(multi) => {
            out.push_str("MULTIPOLYGON");
            out.push_str(tag);
            let polygons = multi
                .polygons()
                .map(|poly| {
                    let mut s = String::new();
                    write_polygon(&mut s, &poly, ordinates);
                    s
                })
                .collect::<Vec<String>>();
            write_parts(out, polygons);
        }
        GeoType::GeometryCollection(collection) => {
            out.push_str("GEOMETRYCOLLECTION");
            out.push_str(tag);
            let mut members = Vec::new();
            for member in collection.geometries() {
                let mut s = String::new();
                write_geometry(&mut s, &member, z_policy)?;
                members.push(s);
            }
            write_parts(out, members);
        }
        GeoType::Rect(_) => return Err(ExportError::UnsupportedWktGeometry("rect")),
        GeoType::Triangle(_) => return Err(ExportError::UnsupportedWktGeometry("triangle")),
        GeoType::Line(_) => return Err(ExportError::UnsupportedWktGeometry("line")),
    }
    Ok(())
}

fn write_parts(out: &mut String, parts: Vec<String>) {
    if parts.is_empty() {
        out.push_str(" EMPTY");
    } else {
        out.push('(');
        out.push_str(&parts.join(", "));
        out.push(')');
    }
}

fn write_line_string<L: LineStringTrait<T = f64>>(out: &mut String, line: &L, ordinates: usize) {
    let coords = line
        .coords()
        .map(|coord| {
            let mut s = String::new();
            write_coord(&mut s, &coord, ordinates);
            s
        })
        .collect::<Vec<String>>();
    write_parts(out, coords);
}

fn write_polygon<P: PolygonTrait<T = f64>>(out: &mut String, poly: &P, ordinates: usize) {
    let mut rings = Vec::new();
    if let Some(exterior) = poly.exterior() {
        let mut s = String::new();
        write_line_string(&mut s, &exterior, ordinates);
        rings.push(s);
    }
    for interior in poly.interiors() {
        let mut s = String::new();
        write_line_string(&mut s, &interior, ordinates);
        rings.push(s);
    }
    write_parts(out, rings);
}

fn write_coord<C: CoordTrait<T = f64>>(out: &mut String, coord: &C, ordinates: usize) {
    for n in 0..ordinates {
        let Some(value) = coord.nth(n) else {
            break;
        };
        if n > 0 {
            out.push(' ');
        }
        // Writing into a String cannot fail.
        let _ = write!(out, "{value}");
    }
}

fn dimension_tag(dim: Dimensions, z_policy: ZPolicy) -> &'static str {
    if z_policy != ZPolicy::Keep {
        return "";
    }
    match dim {
        Dimensions::Xyz => " Z ",
        Dimensions::Xym => " M ",
        Dimensions::Xyzm => " ZM ",
        _ => "",
    }
}

fn ordinate_count(dim: Dimensions, z_policy: ZPolicy) -> usize {
    if z_policy == ZPolicy::Flatten {
        return 2;
    }
    match dim {
        Dimensions::Xy => 2,
        Dimensions::Xyz | Dimensions::Xym => 3,
        Dimensions::Xyzm => 4,
        Dimensions::Unknown(n) => n,
    }
}

#[cfg(test)]
mod tests {
    use super::{Dialect, GeographyKind, LineBuilder, ZPolicy, geography_expression, to_wkt, wrap_wkt};
    use crate::Result;
    use geo_types::{LineString, MultiPolygon, Point, Polygon, polygon};
    use std::str::FromStr;
    use wkb::reader::Wkb;
    use wkt::Wkt;

    fn wkb_of<G: geo_traits::GeometryTrait<T = f64>>(geometry: &G) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        wkb::writer::write_geometry(&mut buf, geometry, &Default::default())?;
        Ok(buf)
    }

    #[test]
    fn point_expression_for_sql_server() -> Result<()> {
        let point = Point::new(-149.1, 63.2);
        let expr = geography_expression(
            Some(&point),
            4326,
            GeographyKind::Point,
            Dialect::SqlServer,
            ZPolicy::Keep,
        )?;
        assert_eq!(expr, "geography::STPointFromText('POINT(-149.1 63.2)', 4326)");
        Ok(())
    }

    #[test]
    fn absent_geometry_is_null() -> Result<()> {
        let expr = geography_expression::<Point>(
            None,
            4326,
            GeographyKind::Shape,
            Dialect::SqlServer,
            ZPolicy::Keep,
        )?;
        assert_eq!(expr, "NULL");
        Ok(())
    }

    #[test]
    fn empty_geometry_is_null() -> Result<()> {
        let line: LineString<f64> = LineString::new(Vec::new());
        let expr = geography_expression(
            Some(&line),
            4326,
            GeographyKind::Shape,
            Dialect::Sqlite,
            ZPolicy::Keep,
        )?;
        assert_eq!(expr, "NULL");
        Ok(())
    }

    #[test]
    fn polygon_from_wkb() -> Result<()> {
        let poly: Polygon<f64> = polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 0.0)];
        let buf = wkb_of(&poly)?;
        let wkb = Wkb::try_new(&buf)?;
        let wkt = to_wkt(&wkb, ZPolicy::Keep)?;
        assert_eq!(wkt.as_deref(), Some("POLYGON((0 0, 1 0, 1 1, 0 0))"));
        Ok(())
    }

    #[test]
    fn multipolygon_writes_every_member() -> Result<()> {
        let a: Polygon<f64> = polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 0.0, y: 1.0), (x: 0.0, y: 0.0)];
        let b: Polygon<f64> = polygon![(x: 5.0, y: 5.0), (x: 6.0, y: 5.0), (x: 5.0, y: 6.0), (x: 5.0, y: 5.0)];
        let multi = MultiPolygon(vec![a, b]);
        let wkt = to_wkt(&multi, ZPolicy::Keep)?;
        assert_eq!(
            wkt.as_deref(),
            Some("MULTIPOLYGON(((0 0, 1 0, 0 1, 0 0)), ((5 5, 6 5, 5 6, 5 5)))")
        );
        Ok(())
    }

    #[test]
    fn z_ordinates_follow_policy() -> Result<()> {
        let point = Wkt::<f64>::from_str("POINT Z (-150.5 64.25 1200)").map_err(|e| {
            crate::ExportError::InvalidWkt {
                wkt: "POINT Z".to_string(),
                reason: e.to_string(),
            }
        })?;
        let buf = wkb_of(&point)?;
        let wkb = Wkb::try_new(&buf)?;

        assert_eq!(
            to_wkt(&wkb, ZPolicy::Keep)?.as_deref(),
            Some("POINT Z (-150.5 64.25 1200)")
        );
        assert_eq!(
            to_wkt(&wkb, ZPolicy::Untagged)?.as_deref(),
            Some("POINT(-150.5 64.25 1200)")
        );
        assert_eq!(
            to_wkt(&wkb, ZPolicy::Flatten)?.as_deref(),
            Some("POINT(-150.5 64.25)")
        );
        Ok(())
    }

    #[test]
    fn line_builder_keeps_input_order() {
        let mut builder = LineBuilder::new();
        let points = [(-149.0, 63.0), (-149.5, 63.25), (-150.0, 63.5)];
        for (lon, lat) in points {
            builder.push(lon, lat);
        }
        let wkt = builder.wkt().expect("line");
        assert_eq!(wkt, "LINESTRING(-149 63, -149.5 63.25, -150 63.5)");
        assert!(!wkt.contains(",)"));
        assert_eq!(wkt.matches(',').count(), points.len() - 1);
        assert_eq!(
            builder.expression(4326, Dialect::SqlServer),
            "geography::STLineFromText('LINESTRING(-149 63, -149.5 63.25, -150 63.5)', 4326)"
        );
    }

    #[test]
    fn line_builder_collects_point_geometries() -> Result<()> {
        let mut builder = LineBuilder::new();
        for i in 0..5 {
            let buf = wkb_of(&Point::new(-149.0 - f64::from(i), 63.0))?;
            let wkb = Wkb::try_new(&buf)?;
            assert!(builder.push_point(&wkb));
        }
        let line: LineString<f64> = LineString::from(vec![(0.0, 0.0), (1.0, 1.0)]);
        assert!(!builder.push_point(&line));
        assert_eq!(builder.len(), 5);
        Ok(())
    }

    #[test]
    fn empty_line_builder_is_null() {
        let builder = LineBuilder::new();
        assert!(builder.wkt().is_none());
        assert_eq!(builder.expression(4326, Dialect::SqlServer), "NULL");
    }

    #[test]
    fn constructor_follows_dialect() {
        assert_eq!(
            wrap_wkt("POINT(1 2)", 4326, GeographyKind::Shape, Dialect::Sqlite),
            "ST_GeomFromText('POINT(1 2)', 4326)"
        );
        assert_eq!(
            wrap_wkt("POINT(1 2)", 4269, GeographyKind::Shape, Dialect::SqlServer),
            "geography::STGeomFromText('POINT(1 2)', 4269)"
        );
    }
}
