//! Read-only GeoPackage feature source backed by rusqlite.
//!
//! Layers are streamed in primary key order, one bounded batch at a time,
//! and handed to the export pipeline as [`Record`](crate::Record)s.

mod blob;
#[cfg(test)]
pub(crate) mod fixtures;
mod gpkg;
mod layer;

pub use gpkg::Gpkg;
pub use layer::{DEFAULT_BATCH_SIZE, GpkgLayer, GpkgRecordBatchIterator};

pub(crate) use blob::{gpkg_geometry_to_wkb, wkb_to_gpkg_geometry};
