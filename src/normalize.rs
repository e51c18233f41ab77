//! Null and value normalization for SQL literals.
//!
//! Feature source drivers report missing values in several ways: an empty
//! string, the literal `None`, `<Null>` or `NULL`. All of them collapse to a
//! single SQL `NULL` here.

use crate::types::Value;

/// Textual forms that mean "no value".
pub const NULL_MARKERS: [&str; 4] = ["", "None", "<Null>", "NULL"];

/// How a value is rendered once normalized.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NullPolicy {
    /// Wrap non-null values in single quotes.
    pub quoted: bool,
    /// Render `0` instead of `NULL`.
    pub null_to_zero: bool,
}

impl NullPolicy {
    pub const TEXT: NullPolicy = NullPolicy {
        quoted: true,
        null_to_zero: false,
    };
    pub const NUMBER: NullPolicy = NullPolicy {
        quoted: false,
        null_to_zero: false,
    };
    pub const COUNT: NullPolicy = NullPolicy {
        quoted: false,
        null_to_zero: true,
    };
}

/// Normalize a value into a SQL literal.
///
/// ```
/// use survey_sql::{Value, normalize};
///
/// assert_eq!(normalize(&Value::from("O'Brien"), true, false), "'O''Brien'");
/// assert_eq!(normalize(&Value::from("<Null>"), true, false), "NULL");
/// assert_eq!(normalize(&Value::Null, false, true), "0");
/// ```
pub fn normalize(value: &Value, quoted: bool, null_to_zero: bool) -> String {
    normalize_text(&value.to_string(), quoted, null_to_zero)
}

/// Same as [`normalize`], for a value already in textual form.
pub fn normalize_text(text: &str, quoted: bool, null_to_zero: bool) -> String {
    let escaped = escape_quotes(text.trim());
    if is_null_marker(&escaped) {
        return if null_to_zero {
            "0".to_string()
        } else {
            "NULL".to_string()
        };
    }
    if quoted {
        format!("'{escaped}'")
    } else {
        escaped
    }
}

/// Normalize with a [`NullPolicy`].
pub fn normalize_with(value: &Value, policy: NullPolicy) -> String {
    normalize(value, policy.quoted, policy.null_to_zero)
}

/// Double every single quote so the text is safe inside a SQL string literal.
pub fn escape_quotes(text: &str) -> String {
    text.replace('\'', "''")
}

/// Wrap arbitrary text in a SQL string literal.
pub fn quote(text: &str) -> String {
    format!("'{}'", escape_quotes(text))
}

pub fn is_null_marker(text: &str) -> bool {
    NULL_MARKERS.contains(&text)
}
