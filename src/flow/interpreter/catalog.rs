// SPDX-License-Identifier: MIT

//! Deployed steps, addressed by `(appId, flowObjectId)`

use crate::base::instance::FlowType;
use crate::flow::definition::{App, Flow, FlowObject, FlowObjectKind, Variable, VariableScope};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A flow object plus what it needs from its flow and app at runtime
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub app_id: String,
    pub flow_id: String,
    pub flow_object: FlowObject,
    pub variables: Vec<Variable>,
    /// Type of the referenced sub-flow, when it is part of the app
    pub sub_flow_type: Option<FlowType>,
}

impl Step {
    pub fn new(app: &App, flow: &Flow, flow_object: &FlowObject) -> Self {
        let sub_flow_type = match &flow_object.kind {
            FlowObjectKind::SubFlowRef { sub_flow_id, .. } => {
                app.flow(sub_flow_id).map(|f| f.flow_type)
            }
            _ => None,
        };
        Self {
            app_id: app.id().to_string(),
            flow_id: flow.id().to_string(),
            flow_object: flow_object.clone(),
            variables: flow.variables.clone(),
            sub_flow_type,
        }
    }

    pub fn id(&self) -> &str {
        self.flow_object.id()
    }

    pub fn variables_in(&self, scope: VariableScope) -> impl Iterator<Item = &Variable> {
        self.variables.iter().filter(move |v| v.scope == scope)
    }
}

#[derive(Clone, Default)]
pub struct StepCatalog {
    steps: Arc<RwLock<HashMap<(String, String), Arc<Step>>>>,
}

impl StepCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every flow object of an app. Returns the number of steps.
    pub async fn register_app(&self, app: &App) -> usize {
        let mut steps = self.steps.write().await;
        let mut count = 0;
        for flow in &app.flows {
            for fo in &flow.flow_objects {
                let key = (app.id().to_string(), fo.id().to_string());
                steps.insert(key, Arc::new(Step::new(app, flow, fo)));
                count += 1;
            }
        }
        log::info!("Registered {} steps for app '{}'", count, app.id());
        count
    }

    pub async fn unregister_app(&self, app_id: &str) -> usize {
        let mut steps = self.steps.write().await;
        let before = steps.len();
        steps.retain(|(app, _), _| app != app_id);
        before - steps.len()
    }

    pub async fn get(&self, app_id: &str, flow_object_id: &str) -> Option<Arc<Step>> {
        let steps = self.steps.read().await;
        steps
            .get(&(app_id.to_string(), flow_object_id.to_string()))
            .cloned()
    }
}
