use runex_core::errors::{ErrorInfo, RunexError};
use runex_core::{DefaultSpec, Override, ParamValue, ParameterSet};

use crate::paths::abs_if_existing;

/// Expands a default spec plus a caller override into the concrete
/// sequence of fully resolved parameter sets.
///
/// A grid override produces the Cartesian product over its axes in field
/// declaration order; a union override concatenates the expansions of its
/// elements. Every produced set assigns a value to every declared field.
pub fn expand(defaults: &DefaultSpec, sweep: &Override) -> Result<Vec<ParameterSet>, RunexError> {
    match sweep {
        Override::Union(elements) => {
            let mut outputs = Vec::new();
            for element in elements {
                outputs.extend(expand(defaults, element)?);
            }
            Ok(outputs)
        }
        Override::Grid(entries) => {
            let unknown: Vec<&str> = entries
                .keys()
                .map(String::as_str)
                .filter(|&name| !defaults.contains(name))
                .collect();
            if !unknown.is_empty() {
                return Err(RunexError::Params(
                    ErrorInfo::new("unknown-parameter", "override references undeclared fields")
                        .with_context("fields", unknown.join(", ")),
                ));
            }

            let mut axes: Vec<(&str, Vec<ParamValue>)> = Vec::with_capacity(defaults.len());
            for field in &defaults.fields {
                let values: Vec<ParamValue> = match entries.get(&field.name) {
                    Some(supplied) => supplied.values().into_iter().cloned().collect(),
                    None => match &field.default {
                        Some(default) => vec![default.clone()],
                        None => {
                            return Err(RunexError::Params(
                                ErrorInfo::new(
                                    "missing-required-parameter",
                                    "required field has no default and was not supplied",
                                )
                                .with_context("field", field.name.clone()),
                            ));
                        }
                    },
                };
                let values = values.into_iter().map(absolutize_value).collect();
                axes.push((field.name.as_str(), values));
            }

            let mut outputs = Vec::new();
            expand_axes(&axes, 0, ParameterSet::new(), &mut outputs);
            Ok(outputs)
        }
    }
}

fn expand_axes(
    axes: &[(&str, Vec<ParamValue>)],
    idx: usize,
    current: ParameterSet,
    outputs: &mut Vec<ParameterSet>,
) {
    if idx == axes.len() {
        outputs.push(current);
        return;
    }
    let (name, values) = &axes[idx];
    for value in values {
        let mut next = current.clone();
        next.insert((*name).to_string(), value.clone());
        expand_axes(axes, idx + 1, next, outputs);
    }
}

fn absolutize_value(value: ParamValue) -> ParamValue {
    match value {
        ParamValue::Str(s) => ParamValue::Str(abs_if_existing(&s)),
        other => other,
    }
}
