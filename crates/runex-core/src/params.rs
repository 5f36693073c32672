use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::errors::{ErrorInfo, RunexError};

/// Scalar value a campaign parameter can take.
///
/// The untagged representation keeps persisted records identical to the
/// plain JSON scalars callers write in override documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Boolean flag; `true` renders as `--name`, `false` is omitted.
    Bool(bool),
    /// Signed integer value.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// String value; strings naming an existing path are absolutized
    /// during grid expansion.
    Str(String),
}

impl Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(v) => write!(f, "{v}"),
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Float(v) => write!(f, "{v}"),
            ParamValue::Str(v) => write!(f, "{v}"),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Int(value.into())
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Str(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Str(value)
    }
}

/// Fully resolved assignment of a concrete value to every declared field.
pub type ParameterSet = BTreeMap<String, ParamValue>;

/// Declaration of a single campaign parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Field name as passed to the external script (`--name`).
    pub name: String,
    /// Default value; `None` marks the field as required.
    pub default: Option<ParamValue>,
}

impl FieldSpec {
    /// Declares a required field without a default.
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
        }
    }

    /// Declares a field with the provided default value.
    pub fn with_default(name: impl Into<String>, default: impl Into<ParamValue>) -> Self {
        Self {
            name: name.into(),
            default: Some(default.into()),
        }
    }
}

/// Ordered set of parameter declarations for a campaign.
///
/// Declaration order is preserved and drives the ordering of expanded
/// parameter combinations; it is immutable once a campaign is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DefaultSpec {
    /// Parameter declarations in declaration order.
    pub fields: Vec<FieldSpec>,
}

impl DefaultSpec {
    /// Builds a spec from an ordered list of field declarations.
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    /// Returns the declared field names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|field| field.name.as_str())
    }

    /// Returns the declaration for the named field, if present.
    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Returns true if the named field is declared.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Number of declared fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if no fields are declared.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Rejects specs that declare the same field name twice.
    pub fn ensure_unique_names(&self) -> Result<(), RunexError> {
        let mut seen = std::collections::BTreeSet::new();
        for field in &self.fields {
            if !seen.insert(field.name.as_str()) {
                return Err(RunexError::Config(
                    ErrorInfo::new("duplicate-field", "field declared more than once")
                        .with_context("field", field.name.clone()),
                ));
            }
        }
        Ok(())
    }
}

/// One or many values supplied for a field in an override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OverrideValue {
    /// A single scalar, equivalent to a one-element list.
    One(ParamValue),
    /// A list of scalars swept as a grid axis.
    Many(Vec<ParamValue>),
}

impl OverrideValue {
    /// Wraps a single scalar value.
    pub fn one(value: impl Into<ParamValue>) -> Self {
        OverrideValue::One(value.into())
    }

    /// Wraps a list of scalar values.
    pub fn many<V: Into<ParamValue>>(values: impl IntoIterator<Item = V>) -> Self {
        OverrideValue::Many(values.into_iter().map(Into::into).collect())
    }

    /// Returns the contained values as a slice-like list.
    pub fn values(&self) -> Vec<&ParamValue> {
        match self {
            OverrideValue::One(value) => vec![value],
            OverrideValue::Many(values) => values.iter().collect(),
        }
    }
}

/// Caller supplied narrowing of the parameter space.
///
/// A `Grid` maps a subset of declared fields to one or many values and
/// expands to the Cartesian product over its axes; a `Union` concatenates
/// the expansions of its elements (an OR of grids, never a product across
/// them).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Override {
    /// Product grid over a subset of the declared fields.
    Grid(BTreeMap<String, OverrideValue>),
    /// Concatenation of the grids produced by each element.
    Union(Vec<Override>),
}

impl Override {
    /// An empty grid: every field falls back to its declared default.
    pub fn empty() -> Self {
        Override::Grid(BTreeMap::new())
    }

    /// Builds a grid override from `(name, values)` pairs.
    pub fn grid<K: Into<String>>(entries: impl IntoIterator<Item = (K, OverrideValue)>) -> Self {
        Override::Grid(
            entries
                .into_iter()
                .map(|(name, value)| (name.into(), value))
                .collect(),
        )
    }
}

impl Default for Override {
    fn default() -> Self {
        Override::empty()
    }
}
