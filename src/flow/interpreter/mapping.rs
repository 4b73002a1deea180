//! Data mapping across sub-flow and service boundaries

use crate::base::instance::Payload;
use crate::base::payload::copy_path;
use crate::flow::definition::{DataMapping, MappingScope, Variable};

/// Payload handed to a callee: every Input mapping read from `data`.
pub fn map_input(mappings: &[DataMapping], data: &Payload) -> Payload {
    let mut input = Payload::new();
    for m in mappings.iter().filter(|m| m.scope == MappingScope::Input) {
        if !copy_path(data, &m.from, &mut input, &m.to) {
            log::debug!("Input mapping '{}' has no value", m.from);
        }
    }
    input
}

/// Copy a callee's reply into `data` through the Output mappings.
pub fn map_output(mappings: &[DataMapping], output: &Payload, data: &mut Payload) {
    for m in mappings.iter().filter(|m| m.scope == MappingScope::Output) {
        if !copy_path(output, &m.from, data, &m.to) {
            log::debug!("Output mapping '{}' has no value", m.from);
        }
    }
}

/// Copy same-named variables from `source` to `target`.
pub fn copy_variables<'a>(
    variables: impl Iterator<Item = &'a Variable>,
    source: &Payload,
    target: &mut Payload,
) {
    for v in variables {
        copy_path(source, &v.name, target, &v.name);
    }
}
