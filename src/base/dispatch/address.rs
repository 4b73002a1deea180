// SPDX-License-Identifier: MIT

//! Message addresses
//!
//! Engine operations live at fixed names. Steps are addressed per app as
//! `<appId>:<flowObjectId>` and a sub-flow step's return point as
//! `<appId>:<flowObjectId>-hopOut`.

use crate::base::error::DispatchError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

const HOP: &str = "engine.hop";
const HOP_INTO: &str = "engine.hopInto";
const FAIL: &str = "engine.fail";
const AWAIT_INTERACTION: &str = "engine.awaitInteraction";
const START_INTERACTION_VIEW: &str = "engine.startInteractionView";
const SAVE_INTERACTION_TASK: &str = "engine.saveInteractionTask";
const COMPLETE_INTERACTION_TASK: &str = "engine.completeInteractionTask";
const HOP_OUT_SUFFIX: &str = "-hopOut";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Address {
    /// Advance the token (`moveToken`)
    Hop,
    /// Enter the sub-flow referenced by the current step (`startToken`)
    HopInto,
    Fail,
    AwaitInteraction,
    StartInteractionView,
    SaveInteractionTask,
    CompleteInteractionTask,
    /// Run a deployed step
    Step {
        app_id: String,
        flow_object_id: String,
    },
    /// Return point of a step that dove into a sub-flow
    HopOut {
        app_id: String,
        flow_object_id: String,
    },
}

impl Address {
    pub fn step(app_id: impl Into<String>, flow_object_id: impl Into<String>) -> Self {
        Address::Step {
            app_id: app_id.into(),
            flow_object_id: flow_object_id.into(),
        }
    }

    pub fn hop_out(app_id: impl Into<String>, flow_object_id: impl Into<String>) -> Self {
        Address::HopOut {
            app_id: app_id.into(),
            flow_object_id: flow_object_id.into(),
        }
    }

    /// True for addresses handled by the engine rather than a step.
    pub fn is_engine(&self) -> bool {
        !matches!(self, Address::Step { .. } | Address::HopOut { .. })
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Hop => write!(f, "{}", HOP),
            Address::HopInto => write!(f, "{}", HOP_INTO),
            Address::Fail => write!(f, "{}", FAIL),
            Address::AwaitInteraction => write!(f, "{}", AWAIT_INTERACTION),
            Address::StartInteractionView => write!(f, "{}", START_INTERACTION_VIEW),
            Address::SaveInteractionTask => write!(f, "{}", SAVE_INTERACTION_TASK),
            Address::CompleteInteractionTask => write!(f, "{}", COMPLETE_INTERACTION_TASK),
            Address::Step {
                app_id,
                flow_object_id,
            } => write!(f, "{}:{}", app_id, flow_object_id),
            Address::HopOut {
                app_id,
                flow_object_id,
            } => write!(f, "{}:{}{}", app_id, flow_object_id, HOP_OUT_SUFFIX),
        }
    }
}

impl FromStr for Address {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            HOP => return Ok(Address::Hop),
            HOP_INTO => return Ok(Address::HopInto),
            FAIL => return Ok(Address::Fail),
            AWAIT_INTERACTION => return Ok(Address::AwaitInteraction),
            START_INTERACTION_VIEW => return Ok(Address::StartInteractionView),
            SAVE_INTERACTION_TASK => return Ok(Address::SaveInteractionTask),
            COMPLETE_INTERACTION_TASK => return Ok(Address::CompleteInteractionTask),
            _ => {}
        }

        let (app_id, target) = s
            .split_once(':')
            .filter(|(app, target)| !app.is_empty() && !target.is_empty())
            .ok_or_else(|| DispatchError::UnknownAddress(s.to_string()))?;

        match target.strip_suffix(HOP_OUT_SUFFIX) {
            Some("") => Err(DispatchError::UnknownAddress(s.to_string())),
            Some(flow_object_id) => Ok(Address::hop_out(app_id, flow_object_id)),
            None => Ok(Address::step(app_id, target)),
        }
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
