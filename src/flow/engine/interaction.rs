// SPDX-License-Identifier: MIT

//! Human interaction: a token parks in `New`, a person picks the task up,
//! works on a view in `UserInteracting` and finally completes it.

use super::FlowEngine;
use crate::base::broadcast::{LifecycleEvent, LifecycleEventType};
use crate::base::error::Failure;
use crate::base::instance::{FlowInstance, TokenId, TokenStatus};

impl FlowEngine {
    /// Park the token and put it in the default assignee's inbox.
    pub async fn await_user_interaction(&self, instance: FlowInstance) {
        if let Err(e) = self
            .instances
            .save_instance(&instance, TokenStatus::New, true)
            .await
        {
            return self
                .fail_instance(instance, Failure::AwaitInteraction(e.to_string()))
                .await;
        }

        let Some(token) = instance.metadata.current_token() else {
            let failure = Failure::AwaitInteraction("Token was not persisted".into());
            return self.fail_instance(instance, failure).await;
        };
        if let Err(e) = self.tasks.assign_task(&self.default_assignee, token).await {
            return self
                .fail_instance(instance, Failure::AwaitInteraction(e.to_string()))
                .await;
        }

        log::info!(
            "Token {} waiting for '{}' ({})",
            token,
            self.default_assignee,
            instance.metadata
        );
        self.broadcast(LifecycleEvent::new(
            LifecycleEventType::WaitInteraction,
            &instance,
        ));
    }

    /// Pick up a waiting task: dive into the interactive sub-flow of the
    /// token's step.
    pub async fn start_user_interaction(&self, token: TokenId) -> Result<(), Failure> {
        let instance = self.get_flow_instance_task(token).await?;
        if let Err(e) = self.tasks.update_task(token, TokenStatus::InProgress).await {
            log::error!("Unable to update task of token {}: {}", token, e);
        }
        self.start_token(instance).await;
        Ok(())
    }

    /// A view step was reached. The token stays put until the person saves
    /// or completes it.
    pub async fn start_view(&self, instance: FlowInstance) {
        self.update_view(
            instance,
            TokenStatus::UserInteracting,
            LifecycleEventType::StartInteraction,
            false,
        )
        .await;
    }

    pub async fn save_interaction_task(&self, view: FlowInstance) -> Result<(), Failure> {
        self.save_or_complete_interaction(
            view,
            TokenStatus::UserInteracting,
            LifecycleEventType::SaveInteraction,
            false,
        )
        .await
    }

    pub async fn complete_interaction_task(&self, view: FlowInstance) -> Result<(), Failure> {
        self.save_or_complete_interaction(
            view,
            TokenStatus::Completed,
            LifecycleEventType::CompleteInteraction,
            true,
        )
        .await
    }

    /// Load the persisted instance at the view's token and overlay the
    /// view's data on it.
    pub async fn save_or_complete_interaction(
        &self,
        view: FlowInstance,
        status: TokenStatus,
        event: LifecycleEventType,
        advance: bool,
    ) -> Result<(), Failure> {
        let token = view
            .metadata
            .current_token()
            .ok_or_else(|| Failure::TaskNotFound("View instance has no token".into()))?;
        let mut instance = self.get_flow_instance_task(token).await?;
        instance.data.extend(view.data);

        self.update_view(instance, status, event, advance).await;
        Ok(())
    }

    pub async fn get_flow_instance_task(&self, token: TokenId) -> Result<FlowInstance, Failure> {
        self.instances
            .get_instance_at(token)
            .await
            .map_err(|e| Failure::TaskNotFound(format!("token {}: {}", token, e)))
    }

    async fn update_view(
        &self,
        instance: FlowInstance,
        status: TokenStatus,
        event: LifecycleEventType,
        advance: bool,
    ) {
        if let Err(e) = self.instances.save_instance(&instance, status, true).await {
            return self
                .fail_instance(instance, Failure::InteractionView(e.to_string()))
                .await;
        }

        self.broadcast(LifecycleEvent::new(event, &instance));
        if advance {
            self.move_token(instance).await;
        }
    }
}
