//! Table schemas of the sheep survey database, built into the crate.

use crate::error::{ExportError, Result};
use crate::schema::TableSchema;

const PRESETS: &[(&str, &str)] = &[
    ("animals", include_str!("../schemas/animals.yaml")),
    ("buffers", include_str!("../schemas/buffers.yaml")),
    ("flat_areas", include_str!("../schemas/flat_areas.yaml")),
    ("gps_points", include_str!("../schemas/gps_points.yaml")),
    ("legacy_units", include_str!("../schemas/legacy_units.yaml")),
    ("legacy_units_1974", include_str!("../schemas/legacy_units_1974.yaml")),
    ("pilot_tracklog", include_str!("../schemas/pilot_tracklog.yaml")),
    ("pilot_waypoints", include_str!("../schemas/pilot_waypoints.yaml")),
    ("transect_points", include_str!("../schemas/transect_points.yaml")),
    ("transect_tracklog", include_str!("../schemas/transect_tracklog.yaml")),
    ("transects", include_str!("../schemas/transects.yaml")),
];

/// Names of the built-in schemas, sorted.
pub fn preset_names() -> Vec<&'static str> {
    PRESETS.iter().map(|(name, _)| *name).collect()
}

/// Load a built-in schema by name.
///
/// ```
/// let schema = survey_sql::preset("animals")?;
/// assert_eq!(schema.table, "Animals");
/// # Ok::<(), survey_sql::ExportError>(())
/// ```
pub fn preset(name: &str) -> Result<TableSchema> {
    let (_, yaml) = PRESETS
        .iter()
        .find(|(preset, _)| *preset == name)
        .ok_or_else(|| ExportError::UnknownPreset {
            name: name.to_string(),
            available: preset_names().join(", "),
        })?;
    TableSchema::from_yaml_str(yaml)
}

#[cfg(test)]
mod tests {
    use super::{preset, preset_names};
    use crate::error::ExportError;
    use crate::schema::ColumnSource;

    #[test]
    fn every_preset_parses() -> crate::Result<()> {
        for name in preset_names() {
            let schema = preset(name)?;
            assert!(!schema.columns.is_empty(), "{name}");
        }
        Ok(())
    }

    #[test]
    fn names_are_sorted() {
        let names = preset_names();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
    }

    #[test]
    fn unknown_preset_lists_the_alternatives() {
        let err = preset("sheep").expect_err("no such preset");
        match err {
            ExportError::UnknownPreset { name, available } => {
                assert_eq!(name, "sheep");
                assert!(available.contains("animals"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn tracklog_segments_remap_segment_types() -> crate::Result<()> {
        let schema = preset("transect_tracklog")?;
        let remap = schema
            .columns
            .iter()
            .find_map(|c| match &c.source {
                ColumnSource::Field { remap, .. } if c.column == "SegmentType" => Some(remap),
                _ => None,
            })
            .expect("SegmentType column");
        assert_eq!(remap.get("OnTransect").map(String::as_str), Some("On Transect"));
        assert_eq!(remap.get("OffTransect").map(String::as_str), Some("Off Transect"));
        Ok(())
    }

    #[test]
    fn pilot_tracklog_needs_its_run_parameters() -> crate::Result<()> {
        let schema = preset("pilot_tracklog")?;
        assert_eq!(
            schema.referenced_parameters(),
            vec![
                "survey_id",
                "pilot_name",
                "tail_no",
                "tracklog_source",
                "sop_number",
                "sop_version"
            ]
        );
        assert!(schema.aggregate_line.is_some());
        Ok(())
    }
}
