// SPDX-License-Identifier: MIT

pub mod condition;
pub mod config;
pub mod definition;
pub mod engine;
pub mod interpreter;
pub mod kernel;
pub mod registry;
pub mod store;
