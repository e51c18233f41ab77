//! Target table schemas.
//!
//! A [`TableSchema`] is data: the target table, its columns in statement
//! order, and where each column's value comes from. One translator serves
//! every table.

use crate::error::{ExportError, Result};
use crate::geometry::{GeographyKind, ZPolicy};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

/// Mapping of one feature layer onto one target table.
///
/// ```
/// use survey_sql::TableSchema;
///
/// let schema = TableSchema::from_yaml_str(
///     r#"
/// table: Animals
/// columns:
///   - column: Species
///     kind: field
///     field: Species
///     quoted: true
///   - column: Location
///     kind: geometry
///     geography: point
/// "#,
/// )?;
/// assert_eq!(schema.table, "Animals");
/// assert_eq!(schema.referenced_fields(), vec!["Species"]);
/// # Ok::<(), survey_sql::ExportError>(())
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub table: String,
    /// First header line; defaults to a transfer note naming the source and
    /// target database.
    #[serde(default)]
    pub title: Option<String>,
    /// What the section comment calls the inserted rows.
    #[serde(default = "default_section")]
    pub section: String,
    /// T-SQL variables declared at the top of the script.
    #[serde(default)]
    pub variables: Vec<VariableSpec>,
    pub columns: Vec<ColumnSpec>,
    /// Fold every record into a single statement carrying one `LINESTRING`.
    #[serde(default)]
    pub aggregate_line: Option<AggregateLine>,
    #[serde(default)]
    pub open_transaction: Option<bool>,
    #[serde(default)]
    pub batch_statements: Option<bool>,
    #[serde(default)]
    pub z_policy: Option<ZPolicy>,
}

/// One target column.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub column: String,
    #[serde(flatten)]
    pub source: ColumnSource,
}

/// Where a column's value comes from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ColumnSource {
    /// A record attribute through the normalizer.
    Field {
        field: String,
        #[serde(default)]
        quoted: bool,
        #[serde(default)]
        null_to_zero: bool,
        #[serde(default)]
        convert: Option<Conversion>,
        /// Accepted-but-nonconforming tokens and their replacement. Values
        /// not listed pass through.
        #[serde(default)]
        remap: BTreeMap<String, String>,
    },
    /// The record geometry.
    Geometry {
        #[serde(default = "default_geography")]
        geography: GeographyKind,
        /// Whether a record without geometry still gets a statement.
        #[serde(default)]
        nullable: bool,
    },
    /// A point built from coordinate attributes.
    PointFromFields {
        longitude: String,
        latitude: String,
        #[serde(default)]
        elevation: Option<String>,
    },
    /// Correlated subquery resolving a transect key from the survey
    /// identifier and a generated transect id held in `field`.
    TransectLookup {
        field: String,
        #[serde(default = "default_lookup_table")]
        table: String,
        #[serde(default = "default_lookup_key")]
        key: String,
        #[serde(default = "default_lookup_match")]
        match_column: String,
        #[serde(default = "default_lookup_survey_column")]
        survey_column: String,
        /// Declared variable holding the survey identifier.
        #[serde(default = "default_survey_variable")]
        survey_variable: String,
        /// Whether the generated id is compared as text.
        #[serde(default = "default_true")]
        quoted: bool,
    },
    /// SQL written as-is.
    Literal { sql: String },
    /// A quoted constant.
    Text { value: String },
    /// A run parameter.
    Parameter {
        name: String,
        #[serde(default = "default_true")]
        quoted: bool,
    },
    /// A declared variable.
    Variable { name: String },
    /// The source's base name, or its full description.
    SourceName {
        #[serde(default)]
        full_path: bool,
    },
    /// `{FIELD}` placeholders filled from the record. `{@source}` is the
    /// source's base name.
    Template {
        template: String,
        #[serde(default = "default_true")]
        quoted: bool,
    },
    /// Yes/no attribute as `1`/`0`.
    Flag {
        field: String,
        #[serde(default = "default_true_values")]
        true_values: Vec<String>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Conversion {
    FeetToMeters,
}

impl Conversion {
    pub const FEET_TO_METERS: f64 = 0.3048;

    pub fn apply(self, value: f64) -> f64 {
        match self {
            Conversion::FeetToMeters => value * Self::FEET_TO_METERS,
        }
    }
}

/// A T-SQL variable set from a run parameter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VariableSpec {
    pub name: String,
    pub sql_type: String,
    pub parameter: String,
    #[serde(default = "default_true")]
    pub quoted: bool,
    #[serde(default)]
    pub comment: Option<String>,
}

/// Where the vertices of an aggregated line come from. Without coordinate
/// fields the point geometries are used.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateLine {
    #[serde(default)]
    pub longitude: Option<String>,
    #[serde(default)]
    pub latitude: Option<String>,
}

fn default_section() -> String {
    "records".to_string()
}

fn default_geography() -> GeographyKind {
    GeographyKind::Shape
}

fn default_lookup_table() -> String {
    "Transect_or_Unit_Information".to_string()
}

fn default_lookup_key() -> String {
    "TransectID".to_string()
}

fn default_lookup_match() -> String {
    "GeneratedTransectID".to_string()
}

fn default_lookup_survey_column() -> String {
    "SurveyID".to_string()
}

fn default_survey_variable() -> String {
    "SurveyID".to_string()
}

fn default_true() -> bool {
    true
}

fn default_true_values() -> Vec<String> {
    vec!["Y".to_string()]
}

impl TableSchema {
    /// Parse and validate a schema document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let schema: TableSchema = serde_yaml::from_str(yaml)?;
        schema.validate()?;
        Ok(schema)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    /// Check the structural rules a document must follow.
    pub fn validate(&self) -> Result<()> {
        if self.table.trim().is_empty() {
            return Err(self.invalid("the table name is empty"));
        }
        if self.columns.is_empty() {
            return Err(self.invalid("no columns are declared"));
        }

        let mut seen = HashSet::new();
        for column in &self.columns {
            if !seen.insert(column.column.as_str()) {
                return Err(self.invalid(format!("column '{}' is declared twice", column.column)));
            }
        }

        let declared: HashSet<&str> = self.variables.iter().map(|v| v.name.as_str()).collect();
        for column in &self.columns {
            let variable = match &column.source {
                ColumnSource::Variable { name } => name,
                ColumnSource::TransectLookup {
                    survey_variable, ..
                } => survey_variable,
                _ => continue,
            };
            if !declared.contains(variable.as_str()) {
                return Err(self.invalid(format!(
                    "column '{}' uses undeclared variable @{variable}",
                    column.column
                )));
            }
        }

        if let Some(line) = &self.aggregate_line {
            if line.longitude.is_some() != line.latitude.is_some() {
                return Err(self.invalid("aggregate_line needs both longitude and latitude"));
            }
            let has_line = self.columns.iter().any(|c| {
                matches!(
                    c.source,
                    ColumnSource::Geometry {
                        geography: GeographyKind::Line,
                        ..
                    }
                )
            });
            if !has_line {
                return Err(self.invalid("aggregate_line needs a geometry column of kind line"));
            }
        }

        Ok(())
    }

    /// Attribute fields the schema reads, in first-use order.
    pub fn referenced_fields(&self) -> Vec<&str> {
        let mut fields: Vec<&str> = Vec::new();
        for column in &self.columns {
            match &column.source {
                ColumnSource::Field { field, .. }
                | ColumnSource::TransectLookup { field, .. }
                | ColumnSource::Flag { field, .. } => push_unique(&mut fields, field),
                ColumnSource::PointFromFields {
                    longitude,
                    latitude,
                    elevation,
                } => {
                    push_unique(&mut fields, longitude);
                    push_unique(&mut fields, latitude);
                    if let Some(elevation) = elevation {
                        push_unique(&mut fields, elevation);
                    }
                }
                ColumnSource::Template { template, .. } => {
                    for name in template_fields(template) {
                        push_unique(&mut fields, name);
                    }
                }
                _ => {}
            }
        }
        if let Some(AggregateLine {
            longitude: Some(longitude),
            latitude: Some(latitude),
        }) = &self.aggregate_line
        {
            push_unique(&mut fields, longitude);
            push_unique(&mut fields, latitude);
        }
        fields
    }

    /// Run parameters the schema needs, from parameter columns and variables.
    pub fn referenced_parameters(&self) -> Vec<&str> {
        let mut names = Vec::new();
        let columns = self.columns.iter().filter_map(|c| match &c.source {
            ColumnSource::Parameter { name, .. } => Some(name.as_str()),
            _ => None,
        });
        let variables = self.variables.iter().map(|v| v.parameter.as_str());
        for name in columns.chain(variables) {
            push_unique(&mut names, name);
        }
        names
    }

    /// Whether any column reads the record geometry. A line aggregated from
    /// coordinate fields does not.
    pub fn reads_geometry(&self) -> bool {
        let field_line = self
            .aggregate_line
            .as_ref()
            .is_some_and(|line| line.longitude.is_some());
        let columns = self.columns.iter().any(|c| match c.source {
            ColumnSource::Geometry { geography, .. } => {
                !(field_line && geography == GeographyKind::Line)
            }
            _ => false,
        });
        columns || (self.aggregate_line.is_some() && !field_line)
    }

    pub fn variable(&self, name: &str) -> Option<&VariableSpec> {
        self.variables.iter().find(|v| v.name == name)
    }

    fn invalid(&self, reason: impl Into<String>) -> ExportError {
        ExportError::InvalidSchema {
            table: self.table.clone(),
            reason: reason.into(),
        }
    }
}

fn push_unique<'a>(names: &mut Vec<&'a str>, name: &'a str) {
    if !names.contains(&name) {
        names.push(name);
    }
}

/// Placeholder naming the source rather than a record field.
pub(crate) const SOURCE_PLACEHOLDER: &str = "@source";

/// Field names inside `{...}` placeholders, in order of appearance.
pub(crate) fn template_fields(template: &str) -> Vec<&str> {
    template_segments(template)
        .into_iter()
        .filter_map(|segment| match segment {
            TemplateSegment::Placeholder(name) if name != SOURCE_PLACEHOLDER => Some(name),
            _ => None,
        })
        .collect()
}

/// One piece of a column template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TemplateSegment<'t> {
    Literal(&'t str),
    Placeholder(&'t str),
}

/// Split a template into literal text and `{name}` placeholders. An
/// unterminated `{` is literal text.
pub(crate) fn template_segments(template: &str) -> Vec<TemplateSegment<'_>> {
    let mut segments = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            break;
        };
        if start > 0 {
            segments.push(TemplateSegment::Literal(&rest[..start]));
        }
        segments.push(TemplateSegment::Placeholder(&after[..end]));
        rest = &after[end + 1..];
    }
    if !rest.is_empty() {
        segments.push(TemplateSegment::Literal(rest));
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::{
        ColumnSource, Conversion, TableSchema, TemplateSegment, template_fields,
        template_segments,
    };
    use crate::error::ExportError;
    use crate::geometry::GeographyKind;

    const TRACKLOG: &str = r#"
table: PilotTracklogs
section: tracklog
variables:
  - name: SurveyID
    sql_type: nvarchar(50)
    parameter: survey_id
  - name: SOPNumber
    sql_type: int
    parameter: sop_number
    quoted: false
columns:
  - column: PilotName
    kind: parameter
    name: pilot_name
  - column: Altitude
    kind: field
    field: altitude
    convert: feet_to_meters
  - column: SOPNumber
    kind: variable
    name: SOPNumber
  - column: Tracklog
    kind: geometry
    geography: line
  - column: SurveyID
    kind: variable
    name: SurveyID
aggregate_line:
  longitude: Lon
  latitude: Lat
"#;

    #[test]
    fn parses_defaults_and_tags() -> crate::Result<()> {
        let schema = TableSchema::from_yaml_str(TRACKLOG)?;
        assert_eq!(schema.section, "tracklog");
        assert!(schema.title.is_none());
        assert_eq!(schema.columns.len(), 5);
        assert!(matches!(
            schema.columns[1].source,
            ColumnSource::Field {
                convert: Some(Conversion::FeetToMeters),
                quoted: false,
                ..
            }
        ));
        assert!(matches!(
            schema.columns[3].source,
            ColumnSource::Geometry {
                geography: GeographyKind::Line,
                nullable: false
            }
        ));
        assert!(schema.variables[0].quoted);
        assert!(!schema.variables[1].quoted);
        Ok(())
    }

    #[test]
    fn lists_fields_and_parameters() -> crate::Result<()> {
        let schema = TableSchema::from_yaml_str(TRACKLOG)?;
        assert_eq!(schema.referenced_fields(), vec!["altitude", "Lon", "Lat"]);
        assert_eq!(
            schema.referenced_parameters(),
            vec!["pilot_name", "survey_id", "sop_number"]
        );
        assert!(!schema.reads_geometry());
        Ok(())
    }

    #[test]
    fn rejects_undeclared_variables() {
        let err = TableSchema::from_yaml_str(
            "table: Buffers\n\
             columns:\n\
             \x20 - column: TransectID\n\
             \x20   kind: transect_lookup\n\
             \x20   field: GeneratedTransectID\n",
        )
        .expect_err("no SurveyID variable");
        assert!(matches!(err, ExportError::InvalidSchema { table, .. } if table == "Buffers"));
    }

    #[test]
    fn rejects_duplicate_columns() {
        let err = TableSchema::from_yaml_str(
            "table: T\n\
             columns:\n\
             \x20 - {column: A, kind: literal, sql: '1'}\n\
             \x20 - {column: A, kind: literal, sql: '2'}\n",
        )
        .expect_err("duplicate");
        assert!(err.to_string().contains("declared twice"));
    }

    #[test]
    fn aggregation_needs_a_line_column() {
        let err = TableSchema::from_yaml_str(
            "table: T\n\
             columns:\n\
             \x20 - {column: G, kind: geometry, geography: point}\n\
             aggregate_line: {}\n",
        )
        .expect_err("no line column");
        assert!(err.to_string().contains("kind line"));
    }

    #[test]
    fn template_placeholders_are_found_in_order() {
        assert_eq!(template_fields("{DATE_} {TIME_}"), vec!["DATE_", "TIME_"]);
        assert_eq!(template_fields("DENA92-{MAJUNIT}"), vec!["MAJUNIT"]);
        assert_eq!(template_fields("{@source}-{GeneratedTransectID}"), vec!["GeneratedTransectID"]);
        assert!(template_fields("no fields {here").is_empty());
    }

    #[test]
    fn template_segments_keep_literal_text() {
        assert_eq!(
            template_segments("DENA92-{MAJUNIT} ({@source}"),
            vec![
                TemplateSegment::Literal("DENA92-"),
                TemplateSegment::Placeholder("MAJUNIT"),
                TemplateSegment::Literal(" ({@source}"),
            ]
        );
    }
}
