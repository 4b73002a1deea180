// SPDX-License-Identifier: MIT

//! Persistence contracts and the graph-backed implementation
//!
//! The engine depends only on the traits in this module. [`GraphStore`]
//! implements all of them over one transactional in-memory graph; tests
//! swap in mocks to exercise persistence failures.

pub mod graph;
mod instances;
pub mod routes;
mod tasks;

pub use graph::{Assignment, Edge, EdgeKind, Graph, GraphStore, Vertex};
pub use routes::RouteTable;

use crate::base::error::StoreError;
use crate::base::instance::{
    FlowInstance, FlowInstanceStep, FlowMetadata, TokenId, TokenStatus,
};
use crate::base::route::{Next, Route, RouteEdge};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Resolves where a token goes next. Lookup problems produce an invalid
/// route; this never fails.
#[async_trait]
pub trait RouteResolver: Send + Sync {
    async fn next_route(&self, flow_id: &str, current: &FlowInstanceStep) -> Route;
}

/// Persisted route table and flow metadata records
#[async_trait]
pub trait FlowDefinitionStore: Send + Sync {
    /// Replace the routes and metadata of a flow.
    async fn save_flow(&self, metadata: &FlowMetadata, edges: Vec<RouteEdge>)
        -> Result<(), StoreError>;
    async fn delete_flow(&self, flow_id: &str) -> Result<(), StoreError>;
    async fn flows(&self) -> Result<Vec<FlowMetadata>, StoreError>;
}

/// Token vertices. Every call is one transaction.
#[async_trait]
pub trait InstanceStore: Send + Sync {
    /// Create the root instance vertex and return its id.
    async fn create_instance(&self, metadata: &FlowMetadata) -> Result<TokenId, StoreError>;

    /// Close the predecessor of `next` and create its token.
    async fn create_flow_object_instance(
        &self,
        instance: &FlowInstance,
        next: &Next,
        is_start: bool,
    ) -> Result<TokenId, StoreError>;

    async fn save_instance(
        &self,
        instance: &FlowInstance,
        status: TokenStatus,
        save_metadata: bool,
    ) -> Result<(), StoreError>;

    async fn complete_instance(&self, instance: &FlowInstance) -> Result<(), StoreError>;

    async fn fail_instance(&self, instance: &FlowInstance, cause: &str) -> Result<(), StoreError>;

    /// Load the instance saved on a token.
    async fn get_instance_at(&self, token: TokenId) -> Result<FlowInstance, StoreError>;
}

/// A token waiting in a subject's inbox
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub subject: String,
    pub token: TokenId,
    pub flow_object_id: String,
    pub status: TokenStatus,
    pub assigned_on: DateTime<Utc>,
}

/// Human task assignment
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn register_subject(&self, subject: &str) -> Result<(), StoreError>;

    async fn assign_task(&self, subject: &str, token: TokenId) -> Result<(), StoreError>;

    /// Returns `false` when the token has no assignment.
    async fn update_task(&self, token: TokenId, status: TokenStatus) -> Result<bool, StoreError>;

    /// Open tasks (`New` or `InProgress`), newest first. Pages start at 1.
    async fn inbox(
        &self,
        subject: &str,
        page: usize,
        page_size: usize,
    ) -> Result<Vec<Task>, StoreError>;
}
