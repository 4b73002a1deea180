// SPDX-License-Identifier: MIT

use super::{execute, resume, ActionRegistry, NextAction, StepCatalog, StepContext};
use crate::base::dispatch::{Dispatcher, Envelope};
use crate::base::instance::FlowInstance;
use std::sync::Arc;

/// Receives instances at step addresses, runs the step and dispatches the
/// outcome back to the engine.
#[derive(Clone)]
pub struct StepRunner {
    catalog: StepCatalog,
    actions: ActionRegistry,
    dispatcher: Arc<dyn Dispatcher>,
}

impl StepRunner {
    pub fn new(
        catalog: StepCatalog,
        actions: ActionRegistry,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        Self {
            catalog,
            actions,
            dispatcher,
        }
    }

    pub async fn run(&self, app_id: &str, flow_object_id: &str, mut instance: FlowInstance) {
        let next = match self.catalog.get(app_id, flow_object_id).await {
            Some(step) => {
                log::debug!("Running step {}:{} ({})", app_id, flow_object_id, instance.metadata);
                let mut ctx = StepContext {
                    instance: &mut instance,
                    actions: &self.actions,
                };
                execute(&step, &mut ctx).await
            }
            None => NextAction::Fail(format!("No step deployed at {}:{}", app_id, flow_object_id)),
        };
        self.dispatch(next, instance).await;
    }

    /// Sub-flow return point of a step
    pub async fn resume(&self, app_id: &str, flow_object_id: &str, mut instance: FlowInstance) {
        let next = match self.catalog.get(app_id, flow_object_id).await {
            Some(step) => {
                log::debug!("Resuming step {}:{} ({})", app_id, flow_object_id, instance.metadata);
                resume(&step, &mut instance)
            }
            None => NextAction::Fail(format!("No step deployed at {}:{}", app_id, flow_object_id)),
        };
        self.dispatch(next, instance).await;
    }

    async fn dispatch(&self, next: NextAction, instance: FlowInstance) {
        let mut envelope = Envelope::new(next.address(), instance);
        if let NextAction::Fail(cause) = next {
            log::warn!("Step failed: {}", cause);
            envelope = envelope.with_cause(cause);
        }
        if let Err(e) = self.dispatcher.send(envelope).await {
            log::error!("Failed to dispatch step outcome: {}", e);
        }
    }
}
