// SPDX-License-Identifier: MIT

use super::graph::{EdgeKind, Graph, GraphStore, Vertex};
use super::InstanceStore;
use crate::base::error::StoreError;
use crate::base::instance::{
    FlowInstance, FlowInstanceMetadata, FlowMetadata, Payload, TokenId, TokenStatus,
};
use crate::base::route::Next;
use async_trait::async_trait;

fn to_blob<T: serde::Serialize>(value: &T) -> Result<String, StoreError> {
    Ok(serde_json::to_string(value)?)
}

fn non_empty(payload: Option<&Payload>) -> Option<&Payload> {
    payload.filter(|p| !p.is_empty())
}

/// Write status and, when asked, the metadata blob; payload blobs are only
/// written when they carry something.
fn update_properties(
    vertex: &mut Vertex,
    instance: &FlowInstance,
    status: TokenStatus,
    save_metadata: bool,
) -> Result<(), StoreError> {
    vertex.status = status;
    if save_metadata {
        vertex.metadata = Some(to_blob(&instance.metadata)?);
        vertex.instance_id = instance.metadata.instance_id;
    }
    if !instance.data.is_empty() {
        vertex.data = Some(to_blob(&instance.data)?);
    }
    if let Some(input) = non_empty(instance.input_data.as_ref()) {
        vertex.input_data = Some(to_blob(input)?);
    }
    if let Some(output) = non_empty(instance.output_data.as_ref()) {
        vertex.output_data = Some(to_blob(output)?);
    }
    Ok(())
}

fn current_token(instance: &FlowInstance) -> Result<TokenId, StoreError> {
    instance
        .metadata
        .current_token()
        .ok_or(StoreError::MissingCurrentStep)
}

fn root_id(instance: &FlowInstance) -> Result<TokenId, StoreError> {
    instance.metadata.instance_id.ok_or(StoreError::NotPersisted)
}

fn read_payload(blob: &Option<String>) -> Result<Option<Payload>, StoreError> {
    blob.as_deref()
        .map(serde_json::from_str)
        .transpose()
        .map_err(StoreError::from)
}

fn load_instance(graph: &Graph, token: TokenId) -> Result<FlowInstance, StoreError> {
    let vertex = graph.vertex(token)?;
    let metadata: FlowInstanceMetadata = vertex
        .metadata
        .as_deref()
        .map(serde_json::from_str)
        .transpose()?
        .ok_or(StoreError::MissingMetadata(token))?;

    Ok(FlowInstance {
        metadata,
        data: read_payload(&vertex.data)?.unwrap_or_default(),
        input_data: read_payload(&vertex.input_data)?,
        output_data: read_payload(&vertex.output_data)?,
    })
}

#[async_trait]
impl InstanceStore for GraphStore {
    async fn create_instance(&self, metadata: &FlowMetadata) -> Result<TokenId, StoreError> {
        let id = self
            .transaction("create_instance", |graph| {
                let id = graph.add_vertex(&metadata.flow_id, TokenStatus::InProgress, None, None);
                graph.vertex_mut(id)?.instance_id = Some(id);
                Ok(id)
            })
            .await?;
        log::info!("Created instance {} of flow '{}'", id, metadata.flow_id);
        Ok(id)
    }

    async fn create_flow_object_instance(
        &self,
        instance: &FlowInstance,
        next: &Next,
        is_start: bool,
    ) -> Result<TokenId, StoreError> {
        let root = root_id(instance)?;
        let current = instance.metadata.current_step.as_ref();

        self.transaction("create_flow_object_instance", |graph| {
            let from = match current {
                None => {
                    graph.vertex(root)?;
                    root
                }
                Some(step) => {
                    let token = step
                        .flow_object_instance_id
                        .ok_or(StoreError::MissingCurrentStep)?;
                    let vertex = graph.vertex_mut(token)?;
                    if is_start {
                        // The caller's state is restored from here when the
                        // sub-flow returns
                        update_properties(vertex, instance, TokenStatus::InProgress, true)?;
                    } else {
                        update_properties(vertex, instance, TokenStatus::Completed, false)?;
                    }
                    token
                }
            };

            let token = graph.add_vertex(
                &next.flow_object_id,
                TokenStatus::InProgress,
                Some(root),
                next.sub_flow_id.clone(),
            );
            let kind = if is_start && current.is_some() {
                EdgeKind::FlowInto
            } else {
                EdgeKind::FlowTo
            };
            graph.add_edge(from, token, kind)?;
            Ok(token)
        })
        .await
    }

    async fn save_instance(
        &self,
        instance: &FlowInstance,
        status: TokenStatus,
        save_metadata: bool,
    ) -> Result<(), StoreError> {
        let token = current_token(instance)?;
        self.transaction("save_instance", |graph| {
            update_properties(graph.vertex_mut(token)?, instance, status, save_metadata)
        })
        .await
    }

    async fn complete_instance(&self, instance: &FlowInstance) -> Result<(), StoreError> {
        let token = current_token(instance)?;
        let root = root_id(instance)?;
        let parent = instance.metadata.parent_flow_object_instance_id;

        self.transaction("complete_instance", |graph| {
            update_properties(
                graph.vertex_mut(token)?,
                instance,
                TokenStatus::Completed,
                false,
            )?;
            match parent {
                None => graph.vertex_mut(root)?.status = TokenStatus::Completed,
                Some(parent) => graph.add_edge(token, parent, EdgeKind::FlowOut)?,
            }
            Ok(())
        })
        .await
    }

    async fn fail_instance(&self, instance: &FlowInstance, cause: &str) -> Result<(), StoreError> {
        let root = root_id(instance)?;
        let token = instance.metadata.current_token();

        self.transaction("fail_instance", |graph| {
            let vertex = graph.vertex_mut(token.unwrap_or(root))?;
            update_properties(vertex, instance, TokenStatus::Failed, true)?;
            vertex.cause = Some(cause.to_string());
            Ok(())
        })
        .await
    }

    async fn get_instance_at(&self, token: TokenId) -> Result<FlowInstance, StoreError> {
        self.read(|graph| load_instance(graph, token)).await
    }
}
