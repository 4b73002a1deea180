// SPDX-License-Identifier: MIT

//! In-memory graph store
//!
//! Holds every persisted record: token vertices and their edges, the route
//! table, flow metadata, subjects and task assignments. All writes go
//! through [`GraphStore::transaction`], which runs a synchronous closure
//! under the write lock. Every mutation made through [`Graph`] records how
//! to undo itself, so a failed closure rolls back only what it touched. No
//! transaction spans an `.await`.

use super::routes::RouteTable;
use crate::base::error::StoreError;
use crate::base::instance::{FlowMetadata, TokenId, TokenStatus};
use crate::base::route::RouteEdge;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

/// A root instance record or a token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub id: TokenId,
    pub flow_object_id: String,
    pub status: TokenStatus,
    pub instance_id: Option<TokenId>,
    /// JSON of the instance metadata
    pub metadata: Option<String>,
    pub data: Option<String>,
    pub input_data: Option<String>,
    pub output_data: Option<String>,
    pub sub_flow_id: Option<String>,
    pub cause: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeKind {
    /// Advance within a flow
    FlowTo,
    /// Dive into a sub-flow
    FlowInto,
    /// Return from a sub-flow to the calling token
    FlowOut,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub from: TokenId,
    pub to: TokenId,
    pub kind: EdgeKind,
}

/// A token assigned to a subject for human interaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub subject: String,
    pub token: TokenId,
    pub status: TokenStatus,
    pub assigned_on: DateTime<Utc>,
}

/// One step back towards the state at the start of a transaction.
#[derive(Debug)]
enum Undo {
    VertexAdded(TokenId),
    VertexChanged(Vertex),
    EdgeAdded(TokenId),
    FlowReplaced {
        flow_id: String,
        metadata: Option<FlowMetadata>,
        routes: Vec<RouteEdge>,
    },
    SubjectAdded(String),
    AssignmentAdded,
    AssignmentChanged { index: usize, status: TokenStatus },
}

#[derive(Debug, Default)]
struct Journal {
    next_id: TokenId,
    /// Vertices already saved (or created) in this transaction
    touched: BTreeSet<TokenId>,
    undo: Vec<Undo>,
}

#[derive(Debug, Default)]
pub struct Graph {
    next_id: TokenId,
    vertices: BTreeMap<TokenId, Vertex>,
    /// Outgoing edges by source vertex, in insertion order
    edges: BTreeMap<TokenId, Vec<Edge>>,
    routes: RouteTable,
    flows: BTreeMap<String, FlowMetadata>,
    subjects: BTreeSet<String>,
    assignments: Vec<Assignment>,
    journal: Journal,
}

impl Graph {
    pub fn add_vertex(
        &mut self,
        flow_object_id: &str,
        status: TokenStatus,
        instance_id: Option<TokenId>,
        sub_flow_id: Option<String>,
    ) -> TokenId {
        self.next_id += 1;
        let id = self.next_id;
        self.vertices.insert(
            id,
            Vertex {
                id,
                flow_object_id: flow_object_id.to_string(),
                status,
                instance_id,
                metadata: None,
                data: None,
                input_data: None,
                output_data: None,
                sub_flow_id,
                cause: None,
            },
        );
        self.journal.touched.insert(id);
        self.journal.undo.push(Undo::VertexAdded(id));
        id
    }

    pub fn vertex(&self, id: TokenId) -> Result<&Vertex, StoreError> {
        self.vertices.get(&id).ok_or(StoreError::VertexNotFound(id))
    }

    /// Mutable access to a vertex. The first access in a transaction saves
    /// the vertex for rollback.
    pub fn vertex_mut(&mut self, id: TokenId) -> Result<&mut Vertex, StoreError> {
        let vertex = self
            .vertices
            .get_mut(&id)
            .ok_or(StoreError::VertexNotFound(id))?;
        if self.journal.touched.insert(id) {
            self.journal.undo.push(Undo::VertexChanged(vertex.clone()));
        }
        Ok(vertex)
    }

    pub fn add_edge(&mut self, from: TokenId, to: TokenId, kind: EdgeKind) -> Result<(), StoreError> {
        self.vertex(from)?;
        self.vertex(to)?;
        self.edges.entry(from).or_default().push(Edge { from, to, kind });
        self.journal.undo.push(Undo::EdgeAdded(from));
        Ok(())
    }

    pub fn outgoing(&self, from: TokenId) -> impl Iterator<Item = &Edge> {
        self.edges.get(&from).into_iter().flatten()
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn flows(&self) -> impl Iterator<Item = &FlowMetadata> {
        self.flows.values()
    }

    /// Replace the metadata and route edges of a flow.
    pub fn replace_flow(&mut self, metadata: FlowMetadata, edges: Vec<RouteEdge>) {
        let flow_id = metadata.flow_id.clone();
        let routes = self.routes.take_flow(&flow_id);
        let previous = self.flows.insert(flow_id.clone(), metadata);
        self.journal.undo.push(Undo::FlowReplaced {
            flow_id,
            metadata: previous,
            routes,
        });
        for edge in edges {
            self.routes.insert(edge);
        }
    }

    /// Drop a flow's metadata and route edges. Returns how many edges went.
    pub fn remove_flow(&mut self, flow_id: &str) -> usize {
        let routes = self.routes.take_flow(flow_id);
        let removed = routes.len();
        let previous = self.flows.remove(flow_id);
        self.journal.undo.push(Undo::FlowReplaced {
            flow_id: flow_id.to_string(),
            metadata: previous,
            routes,
        });
        removed
    }

    pub fn has_subject(&self, subject: &str) -> bool {
        self.subjects.contains(subject)
    }

    pub fn add_subject(&mut self, subject: &str) {
        if self.subjects.insert(subject.to_string()) {
            self.journal
                .undo
                .push(Undo::SubjectAdded(subject.to_string()));
        }
    }

    pub fn assignments(&self) -> &[Assignment] {
        &self.assignments
    }

    pub fn add_assignment(&mut self, assignment: Assignment) {
        self.assignments.push(assignment);
        self.journal.undo.push(Undo::AssignmentAdded);
    }

    /// Set the status of every assignment of a token. Returns whether any
    /// assignment matched.
    pub fn set_assignment_status(&mut self, token: TokenId, status: TokenStatus) -> bool {
        let mut updated = false;
        for (index, assignment) in self.assignments.iter_mut().enumerate() {
            if assignment.token != token {
                continue;
            }
            self.journal.undo.push(Undo::AssignmentChanged {
                index,
                status: assignment.status,
            });
            assignment.status = status;
            updated = true;
        }
        updated
    }

    /// Number of undo records held by the running transaction.
    pub(crate) fn pending_undo(&self) -> usize {
        self.journal.undo.len()
    }

    fn begin(&mut self) {
        self.journal = Journal {
            next_id: self.next_id,
            ..Journal::default()
        };
    }

    fn commit(&mut self) {
        self.journal = Journal::default();
    }

    fn rollback(&mut self) {
        let journal = std::mem::take(&mut self.journal);
        for undo in journal.undo.into_iter().rev() {
            match undo {
                Undo::VertexAdded(id) => {
                    self.vertices.remove(&id);
                }
                Undo::VertexChanged(vertex) => {
                    self.vertices.insert(vertex.id, vertex);
                }
                Undo::EdgeAdded(from) => {
                    if let Some(edges) = self.edges.get_mut(&from) {
                        edges.pop();
                        if edges.is_empty() {
                            self.edges.remove(&from);
                        }
                    }
                }
                Undo::FlowReplaced {
                    flow_id,
                    metadata,
                    routes,
                } => {
                    self.routes.take_flow(&flow_id);
                    for edge in routes {
                        self.routes.insert(edge);
                    }
                    match metadata {
                        Some(metadata) => {
                            self.flows.insert(flow_id, metadata);
                        }
                        None => {
                            self.flows.remove(&flow_id);
                        }
                    }
                }
                Undo::SubjectAdded(subject) => {
                    self.subjects.remove(&subject);
                }
                Undo::AssignmentAdded => {
                    self.assignments.pop();
                }
                Undo::AssignmentChanged { index, status } => {
                    if let Some(assignment) = self.assignments.get_mut(index) {
                        assignment.status = status;
                    }
                }
            }
        }
        self.next_id = journal.next_id;
    }
}

#[derive(Clone, Default)]
pub struct GraphStore {
    graph: Arc<RwLock<Graph>>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` as one transaction: commit on `Ok`, roll back on `Err`.
    pub async fn transaction<T, F>(&self, label: &str, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Graph) -> Result<T, StoreError>,
    {
        let mut graph = self.graph.write().await;
        graph.begin();
        match f(&mut graph) {
            Ok(value) => {
                graph.commit();
                Ok(value)
            }
            Err(e) => {
                graph.rollback();
                log::warn!("Transaction '{}' rolled back: {}", label, e);
                Err(e)
            }
        }
    }

    /// Run a read-only query under the read lock.
    pub async fn read<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Graph) -> Result<T, StoreError>,
    {
        let graph = self.graph.read().await;
        f(&graph)
    }

    /// Read-only snapshot of a vertex.
    pub async fn vertex(&self, id: TokenId) -> Option<Vertex> {
        self.graph.read().await.vertices.get(&id).cloned()
    }

    /// Tokens reachable from a root through advance and dive edges, in
    /// creation order. The root itself is not included.
    pub async fn token_trail(&self, root: TokenId) -> Result<Vec<Vertex>, StoreError> {
        let graph = self.graph.read().await;
        graph.vertex(root)?;

        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([root]);
        while let Some(id) = queue.pop_front() {
            for edge in graph.outgoing(id) {
                if edge.kind != EdgeKind::FlowOut && seen.insert(edge.to) {
                    queue.push_back(edge.to);
                }
            }
        }

        Ok(seen
            .into_iter()
            .filter_map(|id| graph.vertices.get(&id).cloned())
            .collect())
    }

    /// Edges leaving a vertex, in insertion order.
    pub async fn edges_from(&self, id: TokenId) -> Vec<Edge> {
        self.graph.read().await.outgoing(id).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_commit_keeps_changes() {
        let store = GraphStore::new();
        let id = store
            .transaction("create", |g| {
                Ok(g.add_vertex("P1", TokenStatus::InProgress, None, None))
            })
            .await
            .unwrap();

        let vertex = store.vertex(id).await.unwrap();
        assert_eq!(vertex.flow_object_id, "P1");
        assert_eq!(vertex.status, TokenStatus::InProgress);
    }

    #[tokio::test]
    async fn test_rollback_restores_previous_state() {
        let store = GraphStore::new();
        let root = store
            .transaction("create", |g| {
                Ok(g.add_vertex("P1", TokenStatus::InProgress, None, None))
            })
            .await
            .unwrap();

        let result: Result<(), StoreError> = store
            .transaction("half-done", |g| {
                g.vertex_mut(root)?.status = TokenStatus::Completed;
                let token = g.add_vertex("a", TokenStatus::InProgress, Some(root), None);
                g.add_edge(root, token, EdgeKind::FlowTo)?;
                g.add_edge(token, 999, EdgeKind::FlowTo)
            })
            .await;

        assert!(matches!(result, Err(StoreError::VertexNotFound(999))));
        assert_eq!(
            store.vertex(root).await.unwrap().status,
            TokenStatus::InProgress
        );
        assert!(store.vertex(root + 1).await.is_none());
        assert!(store.edges_from(root).await.is_empty());

        // Ids are reused after rollback
        let next = store
            .transaction("create", |g| Ok(g.add_vertex("b", TokenStatus::New, None, None)))
            .await
            .unwrap();
        assert_eq!(next, root + 1);
    }

    #[tokio::test]
    async fn test_rollback_only_saves_touched_records() {
        let store = GraphStore::new();
        let ids = store
            .transaction("history", |g| {
                let ids: Vec<TokenId> = (0..500)
                    .map(|i| g.add_vertex(&format!("t{}", i), TokenStatus::Completed, None, None))
                    .collect();
                for pair in ids.windows(2) {
                    g.add_edge(pair[0], pair[1], EdgeKind::FlowTo)?;
                }
                Ok(ids)
            })
            .await
            .unwrap();
        let (first, last) = (ids[0], ids[ids.len() - 1]);

        let result: Result<(), StoreError> = store
            .transaction("touch-two", |g| {
                g.vertex_mut(first)?.status = TokenStatus::Failed;
                g.vertex_mut(first)?.cause = Some("boom".into());
                g.vertex_mut(last)?.data = Some("{}".into());
                let token = g.add_vertex("next", TokenStatus::InProgress, None, None);
                g.vertex_mut(token)?.status = TokenStatus::New;
                g.add_edge(last, token, EdgeKind::FlowTo)?;
                // two saved vertices, one new vertex, one new edge
                assert_eq!(g.pending_undo(), 4);
                Err(StoreError::Other("abort".into()))
            })
            .await;

        assert!(result.is_err());
        let restored = store.vertex(first).await.unwrap();
        assert_eq!(restored.status, TokenStatus::Completed);
        assert_eq!(restored.cause, None);
        assert_eq!(store.vertex(last).await.unwrap().data, None);
        assert!(store.vertex(last + 1).await.is_none());
        assert!(store.edges_from(last).await.is_empty());
        assert_eq!(store.edges_from(first).await.len(), 1);
        assert_eq!(store.token_trail(first).await.unwrap().len(), 499);
    }

    #[tokio::test]
    async fn test_rollback_restores_replaced_flow() {
        let store = GraphStore::new();
        let metadata = FlowMetadata::new("loans", "P1", crate::base::instance::FlowType::Process);
        let edge = RouteEdge::new("P1", "0", "s", "0");
        store
            .transaction("save", |g| {
                g.replace_flow(metadata.clone(), vec![edge.clone()]);
                Ok(())
            })
            .await
            .unwrap();

        let result: Result<(), StoreError> = store
            .transaction("resave", |g| {
                g.replace_flow(metadata.clone(), vec![]);
                g.add_subject("admin");
                Err(StoreError::Other("abort".into()))
            })
            .await;

        assert!(result.is_err());
        store
            .read(|g| {
                assert_eq!(g.routes().edges("P1", "0"), &[edge.clone()]);
                assert_eq!(g.flows().count(), 1);
                assert!(!g.has_subject("admin"));
                Ok(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_token_trail_skips_return_edges() {
        let store = GraphStore::new();
        let root = store
            .transaction("trail", |g| {
                let root = g.add_vertex("P", TokenStatus::InProgress, None, None);
                let a = g.add_vertex("a", TokenStatus::InProgress, Some(root), None);
                let s = g.add_vertex("s2", TokenStatus::Completed, Some(root), None);
                let e = g.add_vertex("e2", TokenStatus::Completed, Some(root), None);
                g.add_edge(root, a, EdgeKind::FlowTo)?;
                g.add_edge(a, s, EdgeKind::FlowInto)?;
                g.add_edge(s, e, EdgeKind::FlowTo)?;
                g.add_edge(e, a, EdgeKind::FlowOut)?;
                Ok(root)
            })
            .await
            .unwrap();

        let trail: Vec<String> = store
            .token_trail(root)
            .await
            .unwrap()
            .into_iter()
            .map(|v| v.flow_object_id)
            .collect();
        assert_eq!(trail, vec!["a", "s2", "e2"]);
    }

    #[tokio::test]
    async fn test_token_trail_unknown_root() {
        let store = GraphStore::new();
        assert!(store.token_trail(42).await.is_err());
    }
}
