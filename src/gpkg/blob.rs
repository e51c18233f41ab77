use crate::error::{ExportError, Result};
use wkb::reader::Wkb;

const HEADER_LEN: usize = 8;
const EMPTY_GEOMETRY_FLAG: u8 = 0b0001_0000;

/// Strip GeoPackage header and envelope bytes to access raw WKB.
///
/// Returns `None` when the header marks the geometry as empty.
// cf. https://www.geopackage.org/spec140/index.html#gpb_format
pub(crate) fn gpkg_geometry_to_wkb(b: &[u8]) -> Result<Option<Wkb<'_>>> {
    if b.len() < HEADER_LEN {
        return Err(ExportError::InvalidGpkgGeometryLength {
            len: b.len(),
            minimum: HEADER_LEN,
        });
    }
    let flags = b[3];
    let envelope_size: usize = match flags & 0b00001110 {
        0b00000000 => 0,  // no envelope
        0b00000010 => 32, // envelope is [minx, maxx, miny, maxy], 32 bytes
        0b00000100 => 48, // envelope is [minx, maxx, miny, maxy, minz, maxz], 48 bytes
        0b00000110 => 48, // envelope is [minx, maxx, miny, maxy, minm, maxm], 48 bytes
        0b00001000 => 64, // envelope is [minx, maxx, miny, maxy, minz, maxz, minm, maxm], 64 bytes
        _ => {
            return Err(ExportError::InvalidGpkgGeometryFlags(flags));
        }
    };
    let offset = HEADER_LEN + envelope_size;
    if b.len() <= offset {
        return Err(ExportError::InvalidGpkgGeometryLength {
            len: b.len(),
            minimum: offset + 1,
        });
    }

    if flags & EMPTY_GEOMETRY_FLAG != 0 {
        return Ok(None);
    }

    Ok(Some(Wkb::try_new(&b[offset..])?))
}

// cf. https://www.geopackage.org/spec140/index.html#gpb_format
pub(crate) fn wkb_to_gpkg_geometry(wkb: &[u8], srs_id: i32) -> Vec<u8> {
    let mut geom = Vec::with_capacity(wkb.len() + HEADER_LEN);
    geom.extend_from_slice(&[
        0x47u8, // magic
        0x50u8, // magic
        0x00u8, // version
        0x01u8, // flags (little endian SRS ID, no envelope)
    ]);
    geom.extend_from_slice(&srs_id.to_le_bytes());
    geom.extend_from_slice(wkb);
    geom
}
