// SPDX-License-Identifier: MIT

//! Kernel: wires store, dispatcher, engine and step runner together
//!
//! One message loop receives every envelope and handles each on its own
//! tokio task. Instances share nothing but the store.

use crate::base::broadcast::{LifecycleBroadcaster, LifecycleEvent};
use crate::base::dispatch::{Address, Dispatcher, Envelope, LocalDispatcher, WireDispatcher};
use crate::base::error::{DefinitionError, Failure, TokenflowError};
use crate::base::instance::{FlowInstance, FlowMetadata, Payload, TokenId};
use crate::flow::config::{EngineConfig, Transport};
use crate::flow::definition::{App, CompiledFlow};
use crate::flow::engine::FlowEngine;
use crate::flow::interpreter::{ActionRegistry, StepCatalog, StepRunner};
use crate::flow::registry::AppRegistry;
use crate::flow::store::{
    FlowDefinitionStore, GraphStore, InstanceStore, Task, TaskStore, Vertex,
};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

pub struct KernelBuilder {
    config: EngineConfig,
    instances: Option<Arc<dyn InstanceStore>>,
    actions: ActionRegistry,
}

impl KernelBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            instances: None,
            actions: ActionRegistry::new(),
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the token store. Routes and tasks stay in the graph store.
    pub fn instance_store(mut self, instances: Arc<dyn InstanceStore>) -> Self {
        self.instances = Some(instances);
        self
    }

    pub fn actions(mut self, actions: ActionRegistry) -> Self {
        self.actions = actions;
        self
    }

    /// Build the kernel and start its message loop.
    pub async fn spawn(self) -> Result<Kernel, TokenflowError> {
        let config = self.config;
        let store = GraphStore::new();
        store.register_subject(&config.default_assignee).await?;

        let (dispatcher, receiver): (Arc<dyn Dispatcher>, mpsc::UnboundedReceiver<Envelope>) =
            match config.transport {
                Transport::Local => {
                    let (dispatcher, receiver) = LocalDispatcher::channel();
                    (Arc::new(dispatcher), receiver)
                }
                Transport::Wire => {
                    let (dispatcher, receiver) = WireDispatcher::channel();
                    (Arc::new(dispatcher), receiver)
                }
            };

        let broadcaster =
            LifecycleBroadcaster::new(config.event_capacity, config.publish_lifecycle_events);
        let instances = self
            .instances
            .unwrap_or_else(|| Arc::new(store.clone()) as Arc<dyn InstanceStore>);
        let engine = FlowEngine::new(
            Arc::new(store.clone()),
            instances,
            Arc::new(store.clone()),
            dispatcher.clone(),
            broadcaster.clone(),
            config.default_assignee.clone(),
        );
        let catalog = StepCatalog::new();
        let runner = StepRunner::new(catalog.clone(), self.actions.clone(), dispatcher);

        let message_loop = tokio::spawn(run_message_loop(receiver, engine.clone(), runner));
        log::info!("Kernel started with {} transport", config.transport);

        Ok(Kernel {
            config,
            store,
            engine,
            catalog,
            actions: self.actions,
            apps: AppRegistry::new(),
            broadcaster,
            message_loop,
        })
    }
}

impl Default for KernelBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Kernel {
    config: EngineConfig,
    store: GraphStore,
    engine: FlowEngine,
    catalog: StepCatalog,
    actions: ActionRegistry,
    apps: AppRegistry,
    broadcaster: LifecycleBroadcaster,
    message_loop: JoinHandle<()>,
}

impl Kernel {
    pub fn builder() -> KernelBuilder {
        KernelBuilder::new()
    }

    /// Validate, persist the routes of, and register every flow of an app.
    /// Returns the number of deployed steps. Nothing stays registered when
    /// deployment fails.
    pub async fn deploy_app(&self, app: &App) -> Result<usize, TokenflowError> {
        if !self.apps.try_register(app).await {
            return Err(DefinitionError::AppAlreadyDeployed(app.id().to_string()).into());
        }

        match self.install(app).await {
            Ok(steps) => {
                log::info!("Deployed app '{}' ({} steps)", app.id(), steps);
                Ok(steps)
            }
            Err(e) => {
                log::error!("Deployment of app '{}' failed: {}", app.id(), e);
                self.apps.unregister(app.id()).await;
                Err(e)
            }
        }
    }

    async fn install(&self, app: &App) -> Result<usize, TokenflowError> {
        let compiled = CompiledFlow::compile_app(app)?;

        let deployed = self.store.flows().await?;
        for flow in &compiled {
            if let Some(other) = deployed
                .iter()
                .find(|m| m.flow_id == flow.metadata.flow_id && m.app_id != app.id())
            {
                return Err(DefinitionError::FlowAlreadyDeployed {
                    flow_id: other.flow_id.clone(),
                    app_id: other.app_id.clone(),
                }
                .into());
            }
        }

        let mut saved: Vec<&str> = Vec::new();
        for flow in &compiled {
            if let Err(e) = self
                .store
                .save_flow(&flow.metadata, flow.edges.clone())
                .await
            {
                for flow_id in saved {
                    if let Err(e) = self.store.delete_flow(flow_id).await {
                        log::error!("Unable to roll back flow '{}': {}", flow_id, e);
                    }
                }
                return Err(e.into());
            }
            saved.push(&flow.metadata.flow_id);
        }

        Ok(self.catalog.register_app(app).await)
    }

    pub async fn undeploy_app(&self, app_id: &str) -> Result<(), TokenflowError> {
        let app = self
            .apps
            .unregister(app_id)
            .await
            .ok_or_else(|| DefinitionError::AppNotDeployed(app_id.to_string()))?;

        for flow in &app.flows {
            self.store.delete_flow(flow.id()).await?;
        }
        let steps = self.catalog.unregister_app(app_id).await;
        log::info!("Undeployed app '{}' ({} steps)", app_id, steps);
        Ok(())
    }

    /// Start a flow of a deployed app.
    pub async fn start(
        &self,
        app_id: &str,
        flow_id: &str,
        input: Option<Payload>,
    ) -> Result<Option<TokenId>, TokenflowError> {
        let app = self
            .apps
            .get(app_id)
            .await
            .ok_or_else(|| DefinitionError::AppNotDeployed(app_id.to_string()))?;
        let flow = app
            .flow(flow_id)
            .ok_or_else(|| DefinitionError::UnknownFlow(flow_id.to_string()))?;
        self.start_flow(flow.metadata(app_id), input).await
    }

    /// Start an instance from bare metadata, deployed or not.
    pub async fn start_flow(
        &self,
        metadata: FlowMetadata,
        input: Option<Payload>,
    ) -> Result<Option<TokenId>, TokenflowError> {
        Ok(self.engine.start(metadata, input).await?)
    }

    pub async fn start_interaction_task(&self, token: TokenId) -> Result<(), TokenflowError> {
        Ok(self.engine.start_user_interaction(token).await?)
    }

    pub async fn save_interaction_task(&self, view: FlowInstance) -> Result<(), TokenflowError> {
        Ok(self.engine.save_interaction_task(view).await?)
    }

    pub async fn complete_interaction_task(
        &self,
        view: FlowInstance,
    ) -> Result<(), TokenflowError> {
        Ok(self.engine.complete_interaction_task(view).await?)
    }

    pub async fn get_flow_instance_task(&self, token: TokenId) -> Result<FlowInstance, TokenflowError> {
        Ok(self.engine.get_flow_instance_task(token).await?)
    }

    /// Open tasks of the default assignee
    pub async fn inbox(&self, page: usize, page_size: usize) -> Result<Vec<Task>, TokenflowError> {
        Ok(self
            .store
            .inbox(&self.config.default_assignee, page, page_size)
            .await?)
    }

    pub async fn flows(&self) -> Result<Vec<FlowMetadata>, TokenflowError> {
        Ok(self.store.flows().await?)
    }

    pub async fn token_trail(&self, instance_id: TokenId) -> Result<Vec<Vertex>, TokenflowError> {
        Ok(self.store.token_trail(instance_id).await?)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.broadcaster.subscribe()
    }

    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    pub fn actions(&self) -> &ActionRegistry {
        &self.actions
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn shutdown(&self) {
        self.message_loop.abort();
        log::info!("Kernel stopped");
    }
}

impl Drop for Kernel {
    fn drop(&mut self) {
        self.message_loop.abort();
    }
}

async fn run_message_loop(
    mut receiver: mpsc::UnboundedReceiver<Envelope>,
    engine: FlowEngine,
    runner: StepRunner,
) {
    while let Some(envelope) = receiver.recv().await {
        let engine = engine.clone();
        let runner = runner.clone();
        tokio::spawn(async move { handle(envelope, &engine, &runner).await });
    }
    log::info!("Message loop stopped");
}

async fn handle(envelope: Envelope, engine: &FlowEngine, runner: &StepRunner) {
    let Envelope {
        address,
        instance,
        cause,
    } = envelope;
    log::debug!("{} <- {}", address, instance.metadata);

    match address {
        Address::Hop => engine.move_token(instance).await,
        Address::HopInto => engine.start_token(instance).await,
        Address::Fail => {
            let cause = cause.unwrap_or_else(|| "no cause given".to_string());
            engine.fail_instance(instance, Failure::StepFailed(cause)).await
        }
        Address::AwaitInteraction => engine.await_user_interaction(instance).await,
        Address::StartInteractionView => engine.start_view(instance).await,
        Address::SaveInteractionTask => {
            if let Err(e) = engine.save_interaction_task(instance).await {
                log::error!("Unable to save interaction task: {}", e);
            }
        }
        Address::CompleteInteractionTask => {
            if let Err(e) = engine.complete_interaction_task(instance).await {
                log::error!("Unable to complete interaction task: {}", e);
            }
        }
        Address::Step {
            app_id,
            flow_object_id,
        } => runner.run(&app_id, &flow_object_id, instance).await,
        Address::HopOut {
            app_id,
            flow_object_id,
        } => runner.resume(&app_id, &flow_object_id, instance).await,
    }
}
