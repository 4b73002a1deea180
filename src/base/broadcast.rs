// SPDX-License-Identifier: MIT

//! Lifecycle broadcaster
//!
//! Fire-and-forget publication of instance lifecycle events over a tokio
//! broadcast channel. Publishing never fails: with no subscribers the event
//! is dropped.

use crate::base::error::Failure;
use crate::base::instance::{FlowInstance, TokenId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleEventType {
    Start,
    Complete,
    Fail,
    /// Token is waiting for a person to pick up the task
    WaitInteraction,
    StartInteraction,
    SaveInteraction,
    CompleteInteraction,
}

impl LifecycleEventType {
    /// Start, complete and fail can be switched off by configuration.
    /// Interaction events are always published.
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            LifecycleEventType::Start | LifecycleEventType::Complete | LifecycleEventType::Fail
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub event_type: LifecycleEventType,
    pub app_id: String,
    pub flow_id: String,
    pub instance_id: Option<TokenId>,
    /// Step that dived into this instance's flow
    #[serde(default)]
    pub parent_flow_object_id: Option<String>,
    pub parent_flow_object_instance_id: Option<TokenId>,
    pub flow_object_instance_id: Option<TokenId>,
    pub failure_code: Option<u32>,
    pub cause: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl LifecycleEvent {
    pub fn new(event_type: LifecycleEventType, instance: &FlowInstance) -> Self {
        let metadata = &instance.metadata;
        Self {
            event_type,
            app_id: metadata.flow.app_id.clone(),
            flow_id: metadata.flow.flow_id.clone(),
            instance_id: metadata.instance_id,
            parent_flow_object_id: metadata.parent_flow_object_id.clone(),
            parent_flow_object_instance_id: metadata.parent_flow_object_instance_id,
            flow_object_instance_id: metadata.current_token(),
            failure_code: None,
            cause: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_failure(mut self, failure: &Failure) -> Self {
        self.failure_code = Some(failure.code());
        self.cause = Some(failure.to_string());
        self
    }

    /// True for events of a top-level instance. Sub-flows of transient
    /// flows have no parent token, so the parent step decides.
    pub fn is_top_level(&self) -> bool {
        self.parent_flow_object_id.is_none()
    }
}

#[derive(Clone)]
pub struct LifecycleBroadcaster {
    sender: broadcast::Sender<LifecycleEvent>,
    publish_lifecycle: bool,
}

impl LifecycleBroadcaster {
    pub fn new(capacity: usize, publish_lifecycle: bool) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            publish_lifecycle,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: LifecycleEvent) {
        if event.event_type.is_lifecycle() && !self.publish_lifecycle {
            log::debug!("Lifecycle event {:?} not published", event.event_type);
            return;
        }
        if self.sender.send(event).is_err() {
            log::debug!("No lifecycle subscribers");
        }
    }
}
