// SPDX-License-Identifier: MIT

//! YAML schema types for apps and flow definitions
//!
//! Every named definition object embeds an [`Asset`]. Flow objects are a
//! closed set of kinds, tagged by `kind` in YAML:
//!
//! ```yaml
//! - id: check
//!   kind: DecisionGateway
//!   conditions:
//!     - id: big
//!       when: "x > 5"
//!       connect_to: check_b
//!     - id: otherwise
//!       connect_to: check_c
//! ```

use crate::base::instance::{FlowMetadata, FlowType};
use serde::{Deserialize, Serialize};

/// Identity shared by apps, flows and flow objects
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
pub struct Asset {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl Asset {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }
}

/// A deployable unit: a set of flows sharing one step address space
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct App {
    #[serde(flatten)]
    pub asset: Asset,
    #[serde(default)]
    pub locked: bool,
    /// Not consumed by the engine
    #[serde(default = "default_shared_lock_timeout_ms")]
    pub shared_lock_timeout_ms: u64,
    #[serde(default)]
    pub flows: Vec<Flow>,
}

fn default_shared_lock_timeout_ms() -> u64 {
    5000
}

impl App {
    pub fn id(&self) -> &str {
        &self.asset.id
    }

    pub fn flow(&self, flow_id: &str) -> Option<&Flow> {
        self.flows.iter().find(|f| f.asset.id == flow_id)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Flow {
    #[serde(flatten)]
    pub asset: Asset,
    #[serde(default)]
    pub flow_type: FlowType,
    #[serde(default)]
    pub variables: Vec<Variable>,
    #[serde(default)]
    pub flow_objects: Vec<FlowObject>,
    #[serde(default)]
    pub connecting_objects: Vec<ConnectingObject>,
}

impl Flow {
    pub fn id(&self) -> &str {
        &self.asset.id
    }

    pub fn metadata(&self, app_id: &str) -> FlowMetadata {
        FlowMetadata::new(app_id, self.asset.id.clone(), self.flow_type)
    }

    pub fn flow_object(&self, id: &str) -> Option<&FlowObject> {
        self.flow_objects.iter().find(|fo| fo.asset.id == id)
    }

    pub fn variables_in(&self, scope: VariableScope) -> impl Iterator<Item = &Variable> {
        self.variables.iter().filter(move |v| v.scope == scope)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
pub enum VariableScope {
    Input,
    Output,
    #[default]
    Private,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Variable {
    pub name: String,
    #[serde(default)]
    pub scope: VariableScope,
}

impl Variable {
    pub fn new(name: impl Into<String>, scope: VariableScope) -> Self {
        Self {
            name: name.into(),
            scope,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum MappingScope {
    /// Caller `data` -> callee input
    Input,
    /// Callee output -> caller `data`
    Output,
}

/// Copies one dot-path across a sub-flow or service boundary
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DataMapping {
    pub from: String,
    pub to: String,
    pub scope: MappingScope,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ConnectingObject {
    #[serde(flatten)]
    pub asset: Asset,
    pub from: String,
    pub to: String,
}

/// One branch of a decision gateway. The `when` of the last condition is
/// ignored when there are two or more: it is the fallback.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Condition {
    pub id: String,
    #[serde(default)]
    pub when: Option<String>,
    pub connect_to: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FlowObject {
    #[serde(flatten)]
    pub asset: Asset,
    #[serde(flatten)]
    pub kind: FlowObjectKind,
    #[serde(default)]
    pub data_mappings: Vec<DataMapping>,
}

impl FlowObject {
    pub fn new(id: impl Into<String>, kind: FlowObjectKind) -> Self {
        Self {
            asset: Asset::new(id),
            kind,
            data_mappings: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.asset.id
    }

    pub fn mappings(&self, scope: MappingScope) -> impl Iterator<Item = &DataMapping> {
        self.data_mappings.iter().filter(move |m| m.scope == scope)
    }

    /// Flow id recorded on route edges that lead into this object.
    pub fn referenced_flow_id(&self) -> Option<String> {
        match &self.kind {
            FlowObjectKind::SubFlowRef { sub_flow_id, .. } => Some(sub_flow_id.clone()),
            FlowObjectKind::ViewRef { ref_view_id } => Some(ref_view_id.clone()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind")]
pub enum FlowObjectKind {
    StartEvent,
    EndEvent,
    DecisionGateway {
        conditions: Vec<Condition>,
    },
    /// Calls another flow of the app, or an external service when
    /// `address` names a registered action
    SubFlowRef {
        sub_flow_id: String,
        #[serde(default)]
        address: Option<String>,
    },
    /// Pauses the token for a person
    ViewRef {
        ref_view_id: String,
    },
    InlineAction {
        #[serde(default)]
        action: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_referenced_flow_id() {
        let sub = FlowObject::new(
            "a",
            FlowObjectKind::SubFlowRef {
                sub_flow_id: "S".into(),
                address: None,
            },
        );
        assert_eq!(sub.referenced_flow_id().as_deref(), Some("S"));

        let view = FlowObject::new(
            "v",
            FlowObjectKind::ViewRef {
                ref_view_id: "form".into(),
            },
        );
        assert_eq!(view.referenced_flow_id().as_deref(), Some("form"));

        let start = FlowObject::new("s", FlowObjectKind::StartEvent);
        assert!(start.referenced_flow_id().is_none());
    }

    #[test]
    fn test_variables_by_scope() {
        let flow = Flow {
            asset: Asset::new("S"),
            flow_type: FlowType::MicroService,
            variables: vec![
                Variable::new("amount", VariableScope::Input),
                Variable::new("total", VariableScope::Output),
                Variable::new("scratch", VariableScope::Private),
            ],
            flow_objects: vec![],
            connecting_objects: vec![],
        };
        let inputs: Vec<_> = flow
            .variables_in(VariableScope::Input)
            .map(|v| v.name.as_str())
            .collect();
        assert_eq!(inputs, vec!["amount"]);
        assert_eq!(flow.metadata("loans").flow_type, FlowType::MicroService);
    }
}
