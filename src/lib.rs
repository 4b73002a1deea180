// SPDX-License-Identifier: MIT

//! tokenflow - a flow instance execution engine
//!
//! Flows are declarative process definitions. Every running instance is a
//! chain of persisted tokens that the engine advances one hop at a time,
//! diving into sub-flows, pausing for people and reporting failures through
//! lifecycle events.

pub mod base;
pub mod flow;
