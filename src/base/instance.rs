// SPDX-License-Identifier: MIT

//! Flow instance payloads
//!
//! A [`FlowInstance`] is what travels between the engine and step handlers.
//! It is a plain serde value so it can be passed by move in-process or
//! encoded as JSON for the wire transport.

use crate::base::error::DefinitionError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Id of a persisted vertex (root instance record or token).
pub type TokenId = u64;

/// Working memory and staging areas of an instance.
pub type Payload = Map<String, Value>;

/// Kind of flow. Only processes get a durable root record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum FlowType {
    #[default]
    Process,
    InteractiveService,
    MicroService,
}

impl FlowType {
    pub fn persistence_enabled(&self) -> bool {
        matches!(self, FlowType::Process)
    }
}

impl fmt::Display for FlowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowType::Process => write!(f, "Process"),
            FlowType::InteractiveService => write!(f, "InteractiveService"),
            FlowType::MicroService => write!(f, "MicroService"),
        }
    }
}

/// Identifies a flow definition inside an app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowMetadata {
    pub flow_id: String,
    pub app_id: String,
    #[serde(default)]
    pub flow_type: FlowType,
}

impl FlowMetadata {
    pub fn new(app_id: impl Into<String>, flow_id: impl Into<String>, flow_type: FlowType) -> Self {
        Self {
            flow_id: flow_id.into(),
            app_id: app_id.into(),
            flow_type,
        }
    }

    pub fn persistence_enabled(&self) -> bool {
        self.flow_type.persistence_enabled()
    }

    pub fn validate(&self) -> Result<(), DefinitionError> {
        if self.app_id.trim().is_empty() {
            return Err(DefinitionError::InvalidMetadata("app id is empty".into()));
        }
        if self.flow_id.trim().is_empty() {
            return Err(DefinitionError::InvalidMetadata("flow id is empty".into()));
        }
        Ok(())
    }
}

/// Token descriptor: where an instance currently is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FlowInstanceStep {
    pub flow_object_id: String,
    /// Persisted vertex id, once the token has been created
    #[serde(default)]
    pub flow_object_instance_id: Option<TokenId>,
    /// Branch index assigned by a split
    #[serde(default)]
    pub step_index: usize,
    #[serde(default)]
    pub sub_flow_id: Option<String>,
    /// Outgoing connections chosen by a decision step
    #[serde(default)]
    pub connecting_object_ids: Vec<String>,
}

impl FlowInstanceStep {
    /// Synthetic step used only to look up a route.
    pub fn lookup(flow_object_id: impl Into<String>) -> Self {
        Self {
            flow_object_id: flow_object_id.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowInstanceMetadata {
    #[serde(flatten)]
    pub flow: FlowMetadata,
    /// Root instance vertex; `None` for transient instances
    #[serde(default)]
    pub instance_id: Option<TokenId>,
    #[serde(default)]
    pub parent_flow_object_id: Option<String>,
    #[serde(default)]
    pub parent_flow_object_instance_id: Option<TokenId>,
    #[serde(default)]
    pub current_step: Option<FlowInstanceStep>,
}

impl FlowInstanceMetadata {
    pub fn new(flow: FlowMetadata) -> Self {
        Self {
            flow,
            instance_id: None,
            parent_flow_object_id: None,
            parent_flow_object_instance_id: None,
            current_step: None,
        }
    }

    /// Instances carry a root vertex id only when their top-level flow is
    /// persistence-enabled. Sub-flows inherit it.
    pub fn persistence_enabled(&self) -> bool {
        self.instance_id.is_some()
    }

    pub fn is_sub_flow(&self) -> bool {
        self.parent_flow_object_id.is_some()
    }

    /// Persisted token id of the current step, if any.
    pub fn current_token(&self) -> Option<TokenId> {
        self.current_step
            .as_ref()
            .and_then(|step| step.flow_object_instance_id)
    }
}

impl fmt::Display for FlowInstanceMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "app={} flow={}", self.flow.app_id, self.flow.flow_id)?;
        if let Some(id) = self.instance_id {
            write!(f, " instance={}", id)?;
        }
        if let Some(step) = &self.current_step {
            write!(f, " step={}", step.flow_object_id)?;
            if let Some(token) = step.flow_object_instance_id {
                write!(f, "#{}", token)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowInstance {
    pub metadata: FlowInstanceMetadata,
    #[serde(default)]
    pub data: Payload,
    #[serde(default)]
    pub input_data: Option<Payload>,
    #[serde(default)]
    pub output_data: Option<Payload>,
}

impl FlowInstance {
    pub fn new(metadata: FlowInstanceMetadata) -> Self {
        Self {
            metadata,
            data: Payload::new(),
            input_data: None,
            output_data: None,
        }
    }

    pub fn with_input(mut self, input: Option<Payload>) -> Self {
        self.input_data = input;
        self
    }

    pub fn current_step_mut(&mut self) -> Option<&mut FlowInstanceStep> {
        self.metadata.current_step.as_mut()
    }
}

/// Status of a persisted token vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenStatus {
    New,
    InProgress,
    UserInteracting,
    Completed,
    Failed,
}

impl TokenStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TokenStatus::Completed | TokenStatus::Failed)
    }
}

impl fmt::Display for TokenStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenStatus::New => write!(f, "New"),
            TokenStatus::InProgress => write!(f, "In progress"),
            TokenStatus::UserInteracting => write!(f, "User interacting"),
            TokenStatus::Completed => write!(f, "Completed"),
            TokenStatus::Failed => write!(f, "Failed"),
        }
    }
}
