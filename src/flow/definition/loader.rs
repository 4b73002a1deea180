//! App loader - YAML file loading and parsing

use super::types::App;
use crate::base::error::TokenflowError;
use std::fs;
use std::path::Path;

/// Loads app definitions from YAML files
pub struct AppLoader;

impl AppLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load an app definition from a YAML file
    pub fn load_app<P: AsRef<Path>>(&self, path: P) -> Result<App, TokenflowError> {
        let path = path.as_ref();
        log::info!("Loading app definition from {}", path.display());
        let content = fs::read_to_string(path)?;
        Self::parse_yaml(&content)
    }

    /// Parse an app definition from a YAML string
    pub fn parse_yaml(content: &str) -> Result<App, TokenflowError> {
        let app: App = serde_yaml::from_str(content)?;
        Ok(app)
    }
}

impl Default for AppLoader {
    fn default() -> Self {
        Self::new()
    }
}
