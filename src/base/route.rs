// SPDX-License-Identifier: MIT

//! Routes and persisted route edges

use serde::{Deserialize, Serialize};

/// Step id of the synthetic entry point of every flow.
pub const START_STEP: &str = "0";

/// Step id marking the end of a flow.
pub const END_STEP: &str = "-1";

/// Connecting object id used by the synthetic start and end edges.
pub const SYNTHETIC_CONNECTION: &str = "0";

/// One persisted row of the route table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteEdge {
    pub route_flow_id: String,
    pub current_flow_object_id: String,
    pub next_flow_object_id: String,
    pub connecting_object_id: String,
    #[serde(default)]
    pub sub_flow_id: Option<String>,
}

impl RouteEdge {
    pub fn new(
        route_flow_id: impl Into<String>,
        current_flow_object_id: impl Into<String>,
        next_flow_object_id: impl Into<String>,
        connecting_object_id: impl Into<String>,
    ) -> Self {
        Self {
            route_flow_id: route_flow_id.into(),
            current_flow_object_id: current_flow_object_id.into(),
            next_flow_object_id: next_flow_object_id.into(),
            connecting_object_id: connecting_object_id.into(),
            sub_flow_id: None,
        }
    }

    pub fn with_sub_flow(mut self, sub_flow_id: Option<String>) -> Self {
        self.sub_flow_id = sub_flow_id;
        self
    }

    pub fn is_end(&self) -> bool {
        self.next_flow_object_id == END_STEP
    }
}

/// One destination of a resolved route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Next {
    pub flow_object_id: String,
    #[serde(default)]
    pub sub_flow_id: Option<String>,
}

impl Next {
    pub fn new(flow_object_id: impl Into<String>, sub_flow_id: Option<String>) -> Self {
        Self {
            flow_object_id: flow_object_id.into(),
            sub_flow_id,
        }
    }
}

/// Result of resolving where a token goes next. Never persisted.
///
/// `end` implies an empty `next_list`: an end edge clears any collected
/// destinations and later ones are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub previous_flow_object_id: String,
    pub valid: bool,
    pub end: bool,
    pub next_list: Vec<Next>,
}

impl Route {
    /// An empty, not yet valid route.
    pub fn new(previous_flow_object_id: impl Into<String>) -> Self {
        Self {
            previous_flow_object_id: previous_flow_object_id.into(),
            valid: false,
            end: false,
            next_list: Vec::new(),
        }
    }

    pub fn invalid(previous_flow_object_id: impl Into<String>) -> Self {
        Self::new(previous_flow_object_id)
    }

    pub fn mark_end(&mut self) {
        self.valid = true;
        self.end = true;
        self.next_list.clear();
    }

    pub fn add_next(&mut self, next: Next) {
        self.valid = true;
        if !self.end {
            self.next_list.push(next);
        }
    }

    pub fn is_split(&self) -> bool {
        self.next_list.len() > 1
    }

    pub fn first(&self) -> Option<&Next> {
        self.next_list.first()
    }
}
