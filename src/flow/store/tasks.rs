// SPDX-License-Identifier: MIT

use super::graph::{Assignment, GraphStore};
use super::{Task, TaskStore};
use crate::base::error::StoreError;
use crate::base::instance::{TokenId, TokenStatus};
use async_trait::async_trait;
use chrono::Utc;

#[async_trait]
impl TaskStore for GraphStore {
    async fn register_subject(&self, subject: &str) -> Result<(), StoreError> {
        self.transaction("register_subject", |graph| {
            graph.add_subject(subject);
            Ok(())
        })
        .await
    }

    async fn assign_task(&self, subject: &str, token: TokenId) -> Result<(), StoreError> {
        self.transaction("assign_task", |graph| {
            if !graph.has_subject(subject) {
                return Err(StoreError::SubjectNotFound(subject.to_string()));
            }
            graph.vertex(token)?;
            graph.add_assignment(Assignment {
                subject: subject.to_string(),
                token,
                status: TokenStatus::New,
                assigned_on: Utc::now(),
            });
            Ok(())
        })
        .await?;
        log::info!("Assigned token {} to '{}'", token, subject);
        Ok(())
    }

    async fn update_task(&self, token: TokenId, status: TokenStatus) -> Result<bool, StoreError> {
        let updated = self
            .transaction("update_task", |graph| {
                Ok(graph.set_assignment_status(token, status))
            })
            .await?;

        if !updated {
            log::info!("Token {} has no task assignment", token);
        }
        Ok(updated)
    }

    async fn inbox(
        &self,
        subject: &str,
        page: usize,
        page_size: usize,
    ) -> Result<Vec<Task>, StoreError> {
        self.read(|graph| {
            if !graph.has_subject(subject) {
                return Err(StoreError::SubjectNotFound(subject.to_string()));
            }

            let mut open: Vec<&Assignment> = graph
                .assignments()
                .iter()
                .filter(|a| a.subject == subject)
                .filter(|a| matches!(a.status, TokenStatus::New | TokenStatus::InProgress))
                .collect();
            // Newest first; ties broken by token id
            open.sort_by(|a, b| {
                b.assigned_on
                    .cmp(&a.assigned_on)
                    .then_with(|| b.token.cmp(&a.token))
            });

            let skip = page.saturating_sub(1).saturating_mul(page_size);
            open.into_iter()
                .skip(skip)
                .take(page_size)
                .map(|a| {
                    Ok(Task {
                        subject: a.subject.clone(),
                        token: a.token,
                        flow_object_id: graph.vertex(a.token)?.flow_object_id.clone(),
                        status: a.status,
                        assigned_on: a.assigned_on,
                    })
                })
                .collect()
        })
        .await
    }
}
