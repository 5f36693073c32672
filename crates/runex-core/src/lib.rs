#![deny(missing_docs)]
#![doc = "Core error and parameter types for the runex campaign engine."]

pub mod errors;
mod params;
pub mod provenance;

pub use errors::{ErrorInfo, RunexError};
pub use params::{DefaultSpec, FieldSpec, Override, OverrideValue, ParamValue, ParameterSet};
pub use provenance::SchemaVersion;
