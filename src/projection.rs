//! Read projection requested from a feature source.
//!
//! Geometry columns are requested through an access token (`Shape@`) rather
//! than their plain name, so the reader hands back a geometry object instead
//! of the raw column. Downstream code looks fields up by name; position in
//! the projection only fixes the order values are read in.

use crate::types::{FieldRole, FieldSpec};
use std::collections::HashMap;
use std::sync::Arc;

/// Spellings of the geometry column produced by the survey data collection tools.
pub const GEOMETRY_FIELD_NAMES: [&str; 2] = ["Shape", "SHAPE"];

/// Suffix that turns a geometry column name into its access token.
pub const GEOMETRY_TOKEN_SUFFIX: char = '@';

/// One entry of a projection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProjectedField {
    /// Name as declared by the source.
    pub name: String,
    /// Identifier requested from the reader.
    pub token: String,
    pub role: FieldRole,
}

/// Ordered, name-keyed read projection.
#[derive(Clone, Debug)]
pub struct Projection {
    fields: Vec<ProjectedField>,
    index_by_name: Arc<HashMap<String, usize>>,
    geometry: Option<usize>,
}

/// Build the read projection for a source's declared fields.
///
/// A field named `Shape` or `SHAPE`, or declared with the geometry role, is
/// requested through its geometry access token (`Shape@`, `SHAPE@`). All other
/// fields pass through unchanged and in order.
pub fn build_projection(fields: &[FieldSpec]) -> Projection {
    let mut projected = Vec::with_capacity(fields.len());
    let mut index_by_name = HashMap::with_capacity(fields.len());
    let mut geometry = None;

    for (idx, field) in fields.iter().enumerate() {
        let is_geometry = field.role == FieldRole::Geometry
            || GEOMETRY_FIELD_NAMES.contains(&field.name.as_str());
        let (token, role) = if is_geometry {
            if geometry.is_none() {
                geometry = Some(idx);
            }
            (
                format!("{}{GEOMETRY_TOKEN_SUFFIX}", field.name),
                FieldRole::Geometry,
            )
        } else {
            (field.name.clone(), FieldRole::Attribute)
        };
        index_by_name.insert(field.name.clone(), idx);
        projected.push(ProjectedField {
            name: field.name.clone(),
            token,
            role,
        });
    }

    Projection {
        fields: projected,
        index_by_name: Arc::new(index_by_name),
        geometry,
    }
}

impl Projection {
    /// Identifiers to request from the reader, in order.
    pub fn tokens(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.token.as_str()).collect()
    }

    pub fn fields(&self) -> &[ProjectedField] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Position of a field, looked up by declared name or by access token.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        if let Some(idx) = self.index_by_name.get(name) {
            return Some(*idx);
        }
        self.fields.iter().position(|f| f.token == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    /// The geometry field, if the source has one.
    pub fn geometry_field(&self) -> Option<&ProjectedField> {
        self.geometry.map(|idx| &self.fields[idx])
    }

    pub(crate) fn index_by_name(&self) -> Arc<HashMap<String, usize>> {
        Arc::clone(&self.index_by_name)
    }
}

#[cfg(test)]
mod tests {
    use super::build_projection;
    use crate::types::{FieldRole, FieldSpec};

    fn attributes(names: &[&str]) -> Vec<FieldSpec> {
        names.iter().map(|n| FieldSpec::attribute(*n)).collect()
    }

    #[test]
    fn replaces_shape_with_token() {
        let projection = build_projection(&attributes(&["FID", "Shape", "Species", "Comments"]));
        assert_eq!(projection.tokens(), vec!["FID", "Shape@", "Species", "Comments"]);
        assert_eq!(projection.geometry_field().map(|f| f.name.as_str()), Some("Shape"));
    }

    #[test]
    fn replaces_upper_case_shape_with_token() {
        let projection =
            build_projection(&attributes(&["OBJECTID", "SHAPE", "TransectID", "SegType"]));
        assert_eq!(
            projection.tokens(),
            vec!["OBJECTID", "SHAPE@", "TransectID", "SegType"]
        );
        assert_eq!(projection.fields()[1].role, FieldRole::Geometry);
    }

    #[test]
    fn declared_geometry_role_gets_a_token() {
        let fields = vec![
            FieldSpec::attribute("fid"),
            FieldSpec::geometry("geom"),
            FieldSpec::attribute("name"),
        ];
        let projection = build_projection(&fields);
        assert_eq!(projection.tokens(), vec!["fid", "geom@", "name"]);
    }

    #[test]
    fn fields_without_geometry_pass_through() {
        let names = ["a", "shape", "Shape_Length", "c"];
        let projection = build_projection(&attributes(&names));
        assert_eq!(projection.tokens(), names.to_vec());
        assert!(projection.geometry_field().is_none());
    }

    #[test]
    fn lookup_is_by_name_or_token() {
        let projection = build_projection(&attributes(&["FID", "Shape", "Species"]));
        assert_eq!(projection.index_of("Species"), Some(2));
        assert_eq!(projection.index_of("Shape"), Some(1));
        assert_eq!(projection.index_of("Shape@"), Some(1));
        assert_eq!(projection.index_of("Missing"), None);
    }
}
