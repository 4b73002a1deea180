// SPDX-License-Identifier: MIT

//! Flow instance engine
//!
//! Owns the token lifecycle. Every operation takes the instance by value,
//! talks to the stores through their traits and hands the instance on to the
//! next address through the [`Dispatcher`]. Nothing is held across calls:
//! the stores are the only shared state.
//!
//! Hop, hop-into, fail and the interaction notifications are
//! fire-and-forget. Problems are recorded against the instance through
//! [`FlowEngine::fail_instance`] and surface only as lifecycle events and
//! log records.

mod interaction;

use crate::base::broadcast::{LifecycleBroadcaster, LifecycleEvent, LifecycleEventType};
use crate::base::dispatch::{Address, Dispatcher, Envelope};
use crate::base::error::Failure;
use crate::base::instance::{
    FlowInstance, FlowInstanceMetadata, FlowInstanceStep, FlowMetadata, Payload, TokenId,
    TokenStatus,
};
use crate::base::route::{Next, START_STEP};
use crate::flow::store::{InstanceStore, RouteResolver, TaskStore};
use futures::future::join_all;
use std::sync::Arc;

#[derive(Clone)]
pub struct FlowEngine {
    routes: Arc<dyn RouteResolver>,
    instances: Arc<dyn InstanceStore>,
    tasks: Arc<dyn TaskStore>,
    dispatcher: Arc<dyn Dispatcher>,
    broadcaster: LifecycleBroadcaster,
    default_assignee: String,
}

impl FlowEngine {
    pub fn new(
        routes: Arc<dyn RouteResolver>,
        instances: Arc<dyn InstanceStore>,
        tasks: Arc<dyn TaskStore>,
        dispatcher: Arc<dyn Dispatcher>,
        broadcaster: LifecycleBroadcaster,
        default_assignee: impl Into<String>,
    ) -> Self {
        Self {
            routes,
            instances,
            tasks,
            dispatcher,
            broadcaster,
            default_assignee: default_assignee.into(),
        }
    }

    /// Start an instance of a flow. Returns the root instance id when the
    /// flow type is persistence-enabled.
    pub async fn start(
        &self,
        metadata: FlowMetadata,
        input: Option<Payload>,
    ) -> Result<Option<TokenId>, Failure> {
        metadata
            .validate()
            .map_err(|e| Failure::StartInstance(e.to_string()))?;

        let mut instance_metadata = FlowInstanceMetadata::new(metadata.clone());
        if metadata.persistence_enabled() {
            let id = self
                .instances
                .create_instance(&metadata)
                .await
                .map_err(|e| Failure::StartInstance(e.to_string()))?;
            instance_metadata.instance_id = Some(id);
        }

        let instance = FlowInstance::new(instance_metadata).with_input(input);
        let instance_id = instance.metadata.instance_id;
        log::info!("Starting flow instance ({})", instance.metadata);
        self.broadcast(LifecycleEvent::new(LifecycleEventType::Start, &instance));
        self.start_token(instance).await;
        Ok(instance_id)
    }

    /// Enter a flow at its start step. With a current step set this is the
    /// dive into the sub-flow that step references.
    pub async fn start_token(&self, instance: FlowInstance) {
        let flow_id = match &instance.metadata.current_step {
            Some(step) => step.sub_flow_id.clone(),
            None => Some(instance.metadata.flow.flow_id.clone()),
        };
        let Some(flow_id) = flow_id else {
            let failure = Failure::InvalidRoute(format!(
                "Step '{}' references no sub-flow",
                instance
                    .metadata
                    .current_step
                    .as_ref()
                    .map(|s| s.flow_object_id.as_str())
                    .unwrap_or_default()
            ));
            return self.fail_instance(instance, failure).await;
        };

        let route = self
            .routes
            .next_route(&flow_id, &FlowInstanceStep::lookup(START_STEP))
            .await;
        if !route.valid {
            let failure = Failure::InvalidRoute(format!("Flow '{}' has no start route", flow_id));
            return self.fail_instance(instance, failure).await;
        }

        match route.first().cloned() {
            Some(next) => self.prepare_and_run_step(instance, next, 0, true).await,
            None => {
                let failure =
                    Failure::InvalidRoute(format!("Flow '{}' starts at its end", flow_id));
                self.fail_instance(instance, failure).await
            }
        }
    }

    /// Advance a token from its current step.
    pub async fn move_token(&self, instance: FlowInstance) {
        let Some(current) = instance.metadata.current_step.clone() else {
            let failure = Failure::InvalidRoute("Instance has no current step".into());
            return self.fail_instance(instance, failure).await;
        };

        let flow_id = instance.metadata.flow.flow_id.clone();
        let route = self.routes.next_route(&flow_id, &current).await;
        if !route.valid {
            let failure = Failure::InvalidRoute(format!(
                "No route from '{}' in flow '{}'",
                current.flow_object_id, flow_id
            ));
            return self.fail_instance(instance, failure).await;
        }

        if route.end {
            self.complete_instance(instance).await;
        } else if route.is_split() {
            // Branches are not joined again
            log::info!(
                "Splitting '{}' into {} branches ({})",
                current.flow_object_id,
                route.next_list.len(),
                instance.metadata
            );
            let branches = route
                .next_list
                .iter()
                .enumerate()
                .map(|(index, next)| {
                    self.prepare_and_run_step(instance.clone(), next.clone(), index, false)
                });
            join_all(branches).await;
        } else if let Some(next) = route.first().cloned() {
            self.prepare_and_run_step(instance, next, 0, false).await;
        } else {
            let failure = Failure::InvalidRoute(format!(
                "Route from '{}' has no destination",
                current.flow_object_id
            ));
            self.fail_instance(instance, failure).await;
        }
    }

    /// Create the token for `next`, make it the current step and dispatch
    /// the instance to the step's address.
    pub async fn prepare_and_run_step(
        &self,
        mut instance: FlowInstance,
        next: Next,
        step_index: usize,
        is_start: bool,
    ) {
        let mut token = None;
        if instance.metadata.persistence_enabled() {
            match self
                .instances
                .create_flow_object_instance(&instance, &next, is_start)
                .await
            {
                Ok(id) => token = Some(id),
                Err(e) => {
                    // TODO: decide whether a failed token write should fail the instance
                    log::error!(
                        "Unable to create token for '{}' ({}): {}",
                        next.flow_object_id,
                        instance.metadata,
                        e
                    );
                    return;
                }
            }
        }

        if is_start && instance.metadata.current_step.is_some() {
            enter_sub_flow(&mut instance);
        }

        instance.metadata.current_step = Some(FlowInstanceStep {
            flow_object_id: next.flow_object_id.clone(),
            flow_object_instance_id: token,
            step_index,
            sub_flow_id: next.sub_flow_id,
            connecting_object_ids: Vec::new(),
        });

        let address = Address::step(instance.metadata.flow.app_id.clone(), next.flow_object_id);
        self.send(Envelope::new(address, instance)).await;
    }

    /// Close the current token. A completed sub-flow hands its output back to
    /// the parent step's hop-out address.
    pub async fn complete_instance(&self, instance: FlowInstance) {
        if instance.metadata.persistence_enabled() {
            if let Err(e) = self.instances.complete_instance(&instance).await {
                return self
                    .fail_instance(instance, Failure::CloseToken(e.to_string()))
                    .await;
            }
        }

        log::info!("Flow instance completed ({})", instance.metadata);
        self.broadcast(LifecycleEvent::new(LifecycleEventType::Complete, &instance));

        if instance.metadata.is_sub_flow() {
            self.return_to_parent(instance).await;
        }
    }

    async fn return_to_parent(&self, instance: FlowInstance) {
        let parent_flow_object_id = instance
            .metadata
            .parent_flow_object_id
            .clone()
            .unwrap_or_default();
        let Some(parent_token) = instance.metadata.parent_flow_object_instance_id else {
            let fatal = Failure::ParentNotFound(format!(
                "'{}' has no persisted token ({})",
                parent_flow_object_id, instance.metadata
            ));
            log::error!("FATAL: {}", fatal);
            return;
        };

        let mut parent = match self.instances.get_instance_at(parent_token).await {
            Ok(parent) => parent,
            Err(e) => {
                let fatal = Failure::ParentNotFound(format!("token {}: {}", parent_token, e));
                log::error!("FATAL: {} ({})", fatal, instance.metadata);
                return;
            }
        };
        parent.output_data = instance.output_data;

        if let Err(e) = self
            .tasks
            .update_task(parent_token, TokenStatus::Completed)
            .await
        {
            log::error!("Unable to close task of token {}: {}", parent_token, e);
        }

        let address = Address::hop_out(parent.metadata.flow.app_id.clone(), parent_flow_object_id);
        self.send(Envelope::new(address, parent)).await;
    }

    /// Record a failure on the current token, or on the root when no token
    /// exists yet. Ancestors of a sub-flow are left untouched.
    pub async fn fail_instance(&self, instance: FlowInstance, failure: Failure) {
        log::error!("Flow instance failed ({}): {}", instance.metadata, failure);

        if instance.metadata.persistence_enabled() {
            if let Err(e) = self
                .instances
                .fail_instance(&instance, &failure.to_string())
                .await
            {
                let fatal = Failure::RecordFailure(format!("{} while recording '{}'", e, failure));
                log::error!("FATAL: {} ({})", fatal, instance.metadata);
                return;
            }
        }

        self.broadcast(LifecycleEvent::new(LifecycleEventType::Fail, &instance).with_failure(&failure));
    }

    fn broadcast(&self, event: LifecycleEvent) {
        self.broadcaster.publish(event);
    }

    async fn send(&self, envelope: Envelope) {
        let address = envelope.address.to_string();
        if let Err(e) = self.dispatcher.send(envelope).await {
            log::error!("Unable to dispatch to {}: {}", address, e);
        }
    }
}

/// Link the metadata to the step that dives and isolate the sub-flow's data.
fn enter_sub_flow(instance: &mut FlowInstance) {
    let metadata = &mut instance.metadata;
    if let Some(current) = &metadata.current_step {
        metadata.parent_flow_object_id = Some(current.flow_object_id.clone());
        metadata.parent_flow_object_instance_id = current.flow_object_instance_id;
        if let Some(sub_flow_id) = &current.sub_flow_id {
            metadata.flow.flow_id = sub_flow_id.clone();
        }
    }
    instance.data = Payload::new();
}
