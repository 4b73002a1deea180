// SPDX-License-Identifier: MIT

//! Actions: named async functions steps can call
//!
//! An inline action step hands its whole `data` to an action and replaces
//! `data` with the reply. A sub-flow step with an `address` calls an action
//! as an external service with its input-mapped payload.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;
use tokio::sync::RwLock;

#[async_trait]
pub trait Action: Send + Sync {
    fn name(&self) -> &str;
    async fn execute(&self, input: Value) -> Result<Value, Box<dyn Error + Send + Sync>>;
}

#[derive(Clone)]
pub struct ActionRegistry {
    actions: Arc<RwLock<HashMap<String, Arc<dyn Action>>>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self {
            actions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn register(&self, action: Arc<dyn Action>) {
        let mut actions = self.actions.write().await;
        if actions
            .insert(action.name().to_string(), action.clone())
            .is_some()
        {
            log::warn!("Action '{}' replaced", action.name());
        }
    }

    pub async fn get(&self, name: &str) -> Option<Arc<dyn Action>> {
        let actions = self.actions.read().await;
        actions.get(name).cloned()
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
