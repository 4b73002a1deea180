// SPDX-License-Identifier: MIT

//! Foundation types shared by the store, the interpreter and the engine.

pub mod broadcast;
pub mod dispatch;
pub mod error;
pub mod instance;
pub mod payload;
pub mod route;
