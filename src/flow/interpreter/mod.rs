// SPDX-License-Identifier: MIT

//! Step interpreter
//!
//! Every flow object kind has one behaviour. [`execute`] runs it against the
//! instance and returns the [`NextAction`] telling the engine what to do
//! with the token. [`resume`] is the return point of a sub-flow step.

pub mod action;
pub mod catalog;
pub mod mapping;
mod runner;

pub use action::{Action, ActionRegistry};
pub use catalog::{Step, StepCatalog};
pub use runner::StepRunner;

use crate::base::dispatch::Address;
use crate::base::instance::{FlowInstance, FlowType, Payload};
use crate::flow::condition;
use crate::flow::definition::{Condition, FlowObjectKind, VariableScope};
use mapping::{copy_variables, map_input, map_output};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextAction {
    /// Advance the token
    Hop,
    /// Enter the sub-flow named by the current step
    HopInto,
    /// Park the token until a person picks up the task
    AwaitInteraction,
    /// Record that a person is working on the view
    StartInteractionView,
    Fail(String),
}

impl NextAction {
    pub fn address(&self) -> Address {
        match self {
            NextAction::Hop => Address::Hop,
            NextAction::HopInto => Address::HopInto,
            NextAction::AwaitInteraction => Address::AwaitInteraction,
            NextAction::StartInteractionView => Address::StartInteractionView,
            NextAction::Fail(_) => Address::Fail,
        }
    }
}

pub struct StepContext<'a> {
    pub instance: &'a mut FlowInstance,
    pub actions: &'a ActionRegistry,
}

pub async fn execute(step: &Step, ctx: &mut StepContext<'_>) -> NextAction {
    match &step.flow_object.kind {
        FlowObjectKind::StartEvent => {
            if let Some(input) = ctx.instance.input_data.take() {
                copy_variables(
                    step.variables_in(VariableScope::Input),
                    &input,
                    &mut ctx.instance.data,
                );
            }
            NextAction::Hop
        }
        FlowObjectKind::EndEvent => {
            if step.variables_in(VariableScope::Output).next().is_some() {
                let mut output = Payload::new();
                copy_variables(
                    step.variables_in(VariableScope::Output),
                    &ctx.instance.data,
                    &mut output,
                );
                ctx.instance.output_data = Some(output);
            }
            NextAction::Hop
        }
        FlowObjectKind::DecisionGateway { conditions } => decide(step, conditions, ctx.instance),
        FlowObjectKind::SubFlowRef {
            address: Some(address),
            ..
        } => call_service(step, address, ctx).await,
        FlowObjectKind::SubFlowRef { .. } => {
            let input = map_input(&step.flow_object.data_mappings, &ctx.instance.data);
            ctx.instance.input_data = Some(input);
            match step.sub_flow_type {
                Some(FlowType::InteractiveService) => NextAction::AwaitInteraction,
                _ => NextAction::HopInto,
            }
        }
        FlowObjectKind::ViewRef { .. } => NextAction::StartInteractionView,
        FlowObjectKind::InlineAction { action } => match action {
            Some(name) => run_inline(name, ctx).await,
            None => NextAction::Hop,
        },
    }
}

/// Return point of a sub-flow step: copy the sub-flow's output into `data`.
pub fn resume(step: &Step, instance: &mut FlowInstance) -> NextAction {
    if !matches!(step.flow_object.kind, FlowObjectKind::SubFlowRef { .. }) {
        return NextAction::Fail(format!("'{}' does not call a sub-flow", step.id()));
    }
    let output = instance.output_data.take().unwrap_or_default();
    map_output(&step.flow_object.data_mappings, &output, &mut instance.data);
    instance.input_data = None;
    NextAction::Hop
}

/// With two or more conditions the first `n-1` are tried in order and the
/// last one is the fallback. A single condition is taken unconditionally.
fn decide(step: &Step, conditions: &[Condition], instance: &mut FlowInstance) -> NextAction {
    let chosen = match conditions.split_last() {
        None => return NextAction::Fail(format!("Gateway '{}' has no conditions", step.id())),
        Some((only, [])) => only,
        Some((fallback, guarded)) => {
            let mut chosen = fallback;
            for cond in guarded {
                let when = cond.when.as_deref().unwrap_or_default();
                match condition::parse(when) {
                    Ok(expr) if condition::evaluate(&expr, &instance.data) => {
                        chosen = cond;
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        return NextAction::Fail(format!(
                            "Gateway '{}' condition '{}': {}",
                            step.id(),
                            cond.id,
                            e
                        ))
                    }
                }
            }
            chosen
        }
    };

    match instance.current_step_mut() {
        Some(current) => {
            log::info!(
                "Gateway '{}' chose '{}' via '{}'",
                step.id(),
                chosen.id,
                chosen.connect_to
            );
            current.connecting_object_ids = vec![chosen.connect_to.clone()];
            NextAction::Hop
        }
        None => NextAction::Fail(format!("Gateway '{}' ran without a current step", step.id())),
    }
}

async fn call_service(step: &Step, address: &str, ctx: &mut StepContext<'_>) -> NextAction {
    let Some(action) = ctx.actions.get(address).await else {
        return NextAction::Fail(format!("No service registered at '{}'", address));
    };

    let mappings = &step.flow_object.data_mappings;
    let input = map_input(mappings, &ctx.instance.data);
    match action.execute(Value::Object(input)).await {
        Ok(Value::Object(reply)) => {
            map_output(mappings, &reply, &mut ctx.instance.data);
            NextAction::Hop
        }
        Ok(other) => NextAction::Fail(format!(
            "Service '{}' replied with a non-object: {}",
            address, other
        )),
        Err(e) => NextAction::Fail(format!("Service '{}' failed: {}", address, e)),
    }
}

async fn run_inline(name: &str, ctx: &mut StepContext<'_>) -> NextAction {
    let Some(action) = ctx.actions.get(name).await else {
        return NextAction::Fail(format!("No action registered as '{}'", name));
    };

    match action.execute(Value::Object(ctx.instance.data.clone())).await {
        Ok(Value::Object(data)) => {
            ctx.instance.data = data;
            NextAction::Hop
        }
        Ok(other) => NextAction::Fail(format!(
            "Action '{}' returned a non-object: {}",
            name, other
        )),
        Err(e) => NextAction::Fail(format!("Action '{}' failed: {}", name, e)),
    }
}
