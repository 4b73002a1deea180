// SPDX-License-Identifier: MIT

use crate::flow::definition::App;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Deployed apps by id
#[derive(Clone)]
pub struct AppRegistry {
    apps: Arc<RwLock<HashMap<String, Arc<App>>>>,
}

impl AppRegistry {
    pub fn new() -> Self {
        Self {
            apps: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register an app unless its id is already taken.
    pub async fn try_register(&self, app: &App) -> bool {
        let mut apps = self.apps.write().await;
        if apps.contains_key(app.id()) {
            return false;
        }
        apps.insert(app.id().to_string(), Arc::new(app.clone()));
        true
    }

    pub async fn unregister(&self, app_id: &str) -> Option<Arc<App>> {
        let mut apps = self.apps.write().await;
        apps.remove(app_id)
    }

    pub async fn get(&self, app_id: &str) -> Option<Arc<App>> {
        let apps = self.apps.read().await;
        apps.get(app_id).cloned()
    }

    pub async fn app_ids(&self) -> Vec<String> {
        let apps = self.apps.read().await;
        let mut ids: Vec<String> = apps.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl Default for AppRegistry {
    fn default() -> Self {
        Self::new()
    }
}
