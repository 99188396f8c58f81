//! Type normalization.
//!
//! Maps the many spellings a database (or a declaration) can use for a type
//! onto a small canonical set, and separately onto a *storage spelling*
//! that keeps storage widths apart (`integer` vs `bigint`).

use std::fmt;

use serde::{Serialize, Serializer};
use thiserror::Error;

/// Errors raised by [`normalize`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeError {
    /// The type name is not one of the supported spellings.
    #[error("unknown column type {0:?}")]
    Unknown(String),

    /// An array type was reported without an element type.
    #[error("array type {0:?} has no base type")]
    MissingArrayBaseType(String),

    /// Arrays of arrays are not supported.
    #[error("nested array type {0:?} is not supported")]
    NestedArray(String),
}

/// Canonical scalar types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScalarType {
    /// Variable-length text.
    Varchar,
    /// Integer of any width.
    Integer,
    /// Floating point.
    Float,
    /// Boolean.
    Boolean,
    /// Timestamp with or without time zone.
    Timestamp,
    /// JSON document.
    Json,
}

impl ScalarType {
    /// Canonical lowercase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Varchar => "varchar",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Timestamp => "timestamp",
            Self::Json => "json",
        }
    }

    /// Storage spelling used when a declaration does not pick one.
    #[must_use]
    pub const fn default_spelling(self) -> &'static str {
        match self {
            Self::Varchar => "varchar",
            Self::Integer => "integer",
            Self::Float => "double precision",
            Self::Boolean => "boolean",
            Self::Timestamp => "timestamptz",
            Self::Json => "jsonb",
        }
    }
}

/// Canonical data type. Array elements are always scalars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DataType {
    /// A scalar value.
    Scalar(ScalarType),
    /// An array of scalars.
    Array(ScalarType),
}

impl DataType {
    /// Returns the element type for arrays.
    #[must_use]
    pub const fn array_base(self) -> Option<ScalarType> {
        match self {
            Self::Scalar(_) => None,
            Self::Array(base) => Some(base),
        }
    }

    /// Returns true for array types.
    #[must_use]
    pub const fn is_array(self) -> bool {
        matches!(self, Self::Array(_))
    }

    /// Storage spelling used when a declaration does not pick one.
    #[must_use]
    pub fn default_spelling(self) -> String {
        match self {
            Self::Scalar(s) => s.default_spelling().to_string(),
            Self::Array(s) => format!("{}[]", s.default_spelling()),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(s) => f.write_str(s.name()),
            Self::Array(s) => write!(f, "{}[]", s.name()),
        }
    }
}

impl Serialize for DataType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A canonical type plus nullability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ColumnType {
    /// Canonical data type.
    pub data_type: DataType,
    /// Whether NULL is allowed.
    pub nullable: bool,
}

/// Inputs to [`normalize`] besides the raw type name.
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizeOptions<'a> {
    /// Whether the column allows NULL.
    pub is_nullable: bool,
    /// Element type for array columns. A leading `_` (catalog array UDT
    /// naming) is stripped.
    pub base_type_name: Option<&'a str>,
}

/// A resolved type: canonical form plus storage spelling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedType {
    /// Canonical data type.
    pub data_type: DataType,
    /// Lowercase storage spelling, e.g. `bigint` or `varchar[]`.
    pub spelling: String,
}

/// Normalizes a raw type name into a [`ColumnType`].
///
/// # Errors
///
/// Returns [`TypeError::Unknown`] for unsupported names and
/// [`TypeError::MissingArrayBaseType`] when an array has no base type.
pub fn normalize(raw: &str, options: &NormalizeOptions<'_>) -> Result<ColumnType, TypeError> {
    let resolved = resolve(raw, options.base_type_name)?;
    Ok(ColumnType {
        data_type: resolved.data_type,
        nullable: options.is_nullable,
    })
}

/// Resolves a raw type name into its canonical type and storage spelling.
///
/// # Errors
///
/// Same as [`normalize`].
pub fn resolve(raw: &str, base_type_name: Option<&str>) -> Result<ResolvedType, TypeError> {
    let name = collapse(raw);

    if let Some(element) = name.strip_suffix("[]") {
        let (base, spelling) = resolve_scalar(element.trim_end(), raw)?;
        return Ok(ResolvedType {
            data_type: DataType::Array(base),
            spelling: format!("{spelling}[]"),
        });
    }

    if name == "array" {
        let base = base_type_name
            .map(|b| b.trim().trim_start_matches('_'))
            .filter(|b| !b.is_empty())
            .ok_or_else(|| TypeError::MissingArrayBaseType(raw.to_string()))?;
        let (base, spelling) = resolve_scalar(&collapse(base), raw)?;
        return Ok(ResolvedType {
            data_type: DataType::Array(base),
            spelling: format!("{spelling}[]"),
        });
    }

    let (scalar, spelling) = resolve_scalar(&name, raw)?;
    Ok(ResolvedType {
        data_type: DataType::Scalar(scalar),
        spelling: spelling.to_string(),
    })
}

fn collapse(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_lowercase()
}

fn resolve_scalar(name: &str, raw: &str) -> Result<(ScalarType, &'static str), TypeError> {
    let resolved = match name {
        "character varying" | "varchar" => (ScalarType::Varchar, "varchar"),
        "text" | "string" => (ScalarType::Varchar, "text"),
        "int" | "integer" | "int4" => (ScalarType::Integer, "integer"),
        "bigint" | "int8" => (ScalarType::Integer, "bigint"),
        "smallint" | "int2" => (ScalarType::Integer, "smallint"),
        "float" | "float8" | "double precision" => (ScalarType::Float, "double precision"),
        "boolean" | "bool" => (ScalarType::Boolean, "boolean"),
        "json" => (ScalarType::Json, "json"),
        "jsonb" => (ScalarType::Json, "jsonb"),
        "timestamp" | "timestamp without time zone" => (ScalarType::Timestamp, "timestamp"),
        "timestamptz" | "timestamp with time zone" => (ScalarType::Timestamp, "timestamptz"),
        "array" => return Err(TypeError::NestedArray(raw.to_string())),
        n if n.ends_with("[]") => return Err(TypeError::NestedArray(raw.to_string())),
        _ => return Err(TypeError::Unknown(raw.to_string())),
    };
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar(raw: &str) -> DataType {
        normalize(raw, &NormalizeOptions::default()).unwrap().data_type
    }

    #[test]
    fn test_synonyms_collapse() {
        assert_eq!(scalar("character varying"), DataType::Scalar(ScalarType::Varchar));
        assert_eq!(scalar("STRING"), DataType::Scalar(ScalarType::Varchar));
        assert_eq!(scalar("Text"), DataType::Scalar(ScalarType::Varchar));
        assert_eq!(scalar("int8"), DataType::Scalar(ScalarType::Integer));
        assert_eq!(scalar("smallint"), DataType::Scalar(ScalarType::Integer));
        assert_eq!(scalar("double   precision"), DataType::Scalar(ScalarType::Float));
        assert_eq!(scalar("bool"), DataType::Scalar(ScalarType::Boolean));
        assert_eq!(scalar("jsonb"), DataType::Scalar(ScalarType::Json));
        assert_eq!(
            scalar("timestamp with time zone"),
            DataType::Scalar(ScalarType::Timestamp)
        );
    }

    #[test]
    fn test_nullability_passes_through() {
        let ty = normalize(
            "integer",
            &NormalizeOptions {
                is_nullable: true,
                base_type_name: None,
            },
        )
        .unwrap();
        assert!(ty.nullable);
    }

    #[test]
    fn test_array_uses_base_type_name() {
        let ty = normalize(
            "ARRAY",
            &NormalizeOptions {
                is_nullable: false,
                base_type_name: Some("_int8"),
            },
        )
        .unwrap();
        assert_eq!(ty.data_type, DataType::Array(ScalarType::Integer));
        assert_eq!(resolve("ARRAY", Some("_int8")).unwrap().spelling, "bigint[]");
    }

    #[test]
    fn test_bracket_suffix_is_an_array() {
        let resolved = resolve("STRING[]", None).unwrap();
        assert_eq!(resolved.data_type, DataType::Array(ScalarType::Varchar));
        assert_eq!(resolved.spelling, "text[]");
    }

    #[test]
    fn test_array_without_base_is_fatal() {
        assert_eq!(
            normalize("array", &NormalizeOptions::default()),
            Err(TypeError::MissingArrayBaseType(String::from("array")))
        );
        assert!(matches!(
            resolve("ARRAY", Some("")),
            Err(TypeError::MissingArrayBaseType(_))
        ));
    }

    #[test]
    fn test_unknown_and_nested_types_fail() {
        assert_eq!(
            normalize("geometry", &NormalizeOptions::default()),
            Err(TypeError::Unknown(String::from("geometry")))
        );
        assert!(matches!(resolve("int[][]", None), Err(TypeError::NestedArray(_))));
        assert!(matches!(resolve("array", Some("array")), Err(TypeError::NestedArray(_))));
    }

    #[test]
    fn test_storage_spelling_keeps_widths_apart() {
        assert_eq!(resolve("int4", None).unwrap().spelling, "integer");
        assert_eq!(resolve("BIGINT", None).unwrap().spelling, "bigint");
        assert_eq!(resolve("timestamp with time zone", None).unwrap().spelling, "timestamptz");
        assert_eq!(resolve("character varying", None).unwrap().spelling, "varchar");
    }

    #[test]
    fn test_display_and_default_spelling() {
        assert_eq!(DataType::Array(ScalarType::Integer).to_string(), "integer[]");
        assert_eq!(DataType::Scalar(ScalarType::Float).default_spelling(), "double precision");
        assert_eq!(DataType::Array(ScalarType::Json).default_spelling(), "jsonb[]");
    }
}
