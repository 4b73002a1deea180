// SPDX-License-Identifier: MIT

//! Route table
//!
//! Route edges are indexed by `(flowId, fromStepId)`, so resolving a route
//! is one lookup plus the connecting-object filter.

use super::graph::GraphStore;
use super::{FlowDefinitionStore, RouteResolver};
use crate::base::error::StoreError;
use crate::base::instance::{FlowInstanceStep, FlowMetadata};
use crate::base::route::{Next, Route, RouteEdge};
use async_trait::async_trait;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    index: HashMap<(String, String), Vec<RouteEdge>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, edge: RouteEdge) {
        let key = (
            edge.route_flow_id.clone(),
            edge.current_flow_object_id.clone(),
        );
        self.index.entry(key).or_default().push(edge);
    }

    /// Remove every edge of a flow and hand them back.
    pub fn take_flow(&mut self, flow_id: &str) -> Vec<RouteEdge> {
        let keys: Vec<(String, String)> = self
            .index
            .keys()
            .filter(|(flow, _)| flow == flow_id)
            .cloned()
            .collect();
        keys.into_iter()
            .filter_map(|key| self.index.remove(&key))
            .flatten()
            .collect()
    }

    pub fn edges(&self, flow_id: &str, from: &str) -> &[RouteEdge] {
        self.index
            .get(&(flow_id.to_string(), from.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Resolve the route out of `current`. When the step recorded selected
    /// connecting objects, only edges through them count. A route is valid
    /// only if at least one edge matched.
    pub fn resolve(&self, flow_id: &str, current: &FlowInstanceStep) -> Route {
        let mut route = Route::new(current.flow_object_id.clone());
        let selected = &current.connecting_object_ids;

        for edge in self.edges(flow_id, &current.flow_object_id) {
            if !selected.is_empty() && !selected.contains(&edge.connecting_object_id) {
                continue;
            }
            if edge.is_end() {
                route.mark_end();
            } else {
                route.add_next(Next::new(
                    edge.next_flow_object_id.clone(),
                    edge.sub_flow_id.clone(),
                ));
            }
        }
        route
    }
}

#[async_trait]
impl RouteResolver for GraphStore {
    async fn next_route(&self, flow_id: &str, current: &FlowInstanceStep) -> Route {
        let result = self
            .read(|graph| Ok(graph.routes().resolve(flow_id, current)))
            .await;

        match result {
            Ok(route) => {
                if !route.valid {
                    log::warn!(
                        "No route from '{}' in flow '{}'",
                        current.flow_object_id,
                        flow_id
                    );
                }
                route
            }
            Err(e) => {
                log::error!("Route lookup failed for flow '{}': {}", flow_id, e);
                Route::invalid(current.flow_object_id.clone())
            }
        }
    }
}

#[async_trait]
impl FlowDefinitionStore for GraphStore {
    async fn save_flow(
        &self,
        metadata: &FlowMetadata,
        edges: Vec<RouteEdge>,
    ) -> Result<(), StoreError> {
        let flow_id = metadata.flow_id.clone();
        let count = edges.len();
        if let Some(edge) = edges.iter().find(|e| e.route_flow_id != flow_id) {
            return Err(StoreError::Other(format!(
                "edge of flow '{}' saved under '{}'",
                edge.route_flow_id, flow_id
            )));
        }
        self.transaction("save_flow", |graph| {
            graph.replace_flow(metadata.clone(), edges);
            Ok(())
        })
        .await?;

        log::info!("Saved {} route edges for flow '{}'", count, metadata.flow_id);
        Ok(())
    }

    async fn delete_flow(&self, flow_id: &str) -> Result<(), StoreError> {
        let removed = self
            .transaction("delete_flow", |graph| Ok(graph.remove_flow(flow_id)))
            .await?;
        log::info!("Deleted {} route edges for flow '{}'", removed, flow_id);
        Ok(())
    }

    async fn flows(&self) -> Result<Vec<FlowMetadata>, StoreError> {
        self.read(|graph| Ok(graph.flows().cloned().collect()))
            .await
    }
}
