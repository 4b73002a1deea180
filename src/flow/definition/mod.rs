// SPDX-License-Identifier: MIT

//! Flow definitions: the declarative model, the YAML loader and the
//! compiler that validates a flow and derives its route table.

pub mod compiled;
pub mod loader;
pub mod types;

pub use compiled::CompiledFlow;
pub use loader::AppLoader;
pub use types::{
    App, Asset, Condition, ConnectingObject, DataMapping, Flow, FlowObject, FlowObjectKind,
    MappingScope, Variable, VariableScope,
};
