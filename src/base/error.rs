// SPDX-License-Identifier: MIT

//! Typed error handling for tokenflow
//!
//! `TokenflowError` is what library callers see. The engine itself never
//! returns errors from fire-and-forget operations; it converts whatever went
//! wrong into a [`Failure`] and records it against the instance.

use crate::base::instance::TokenId;
use thiserror::Error;

/// Top-level error type for tokenflow
#[derive(Debug, Error)]
pub enum TokenflowError {
    /// Configuration errors (unreadable file, bad env override)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Structural problems in an app or flow definition
    #[error("Definition error: {0}")]
    Definition(#[from] DefinitionError),

    /// Persistence errors surfaced by a store transaction
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Message transport errors
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// A request/reply engine operation was refused
    #[error("Engine failure {0}")]
    Failure(#[from] Failure),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error("{0}")]
    Other(String),
}

/// Problems found while validating or deploying flow definitions
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DefinitionError {
    #[error("Flow '{0}' has no start event")]
    MissingStartEvent(String),

    #[error("Flow '{0}' has more than one start event")]
    MultipleStartEvents(String),

    #[error("Flow '{0}' has no end event")]
    MissingEndEvent(String),

    #[error("Connecting object '{connecting_object_id}' references unknown flow object '{flow_object_id}'")]
    UnknownFlowObject {
        connecting_object_id: String,
        flow_object_id: String,
    },

    #[error("Flow object '{0}' is defined more than once in the app")]
    DuplicateFlowObject(String),

    #[error("Decision gateway '{0}' has no conditions")]
    EmptyGateway(String),

    #[error("Decision gateway '{gateway_id}' has an invalid condition '{when}': {reason}")]
    InvalidCondition {
        gateway_id: String,
        when: String,
        reason: String,
    },

    #[error("Flow object '{flow_object_id}' references unknown sub-flow '{sub_flow_id}'")]
    UnknownSubFlow {
        flow_object_id: String,
        sub_flow_id: String,
    },

    #[error("Flow '{0}' is not part of the app")]
    UnknownFlow(String),

    #[error("Flow '{flow_id}' is already deployed by app '{app_id}'")]
    FlowAlreadyDeployed { flow_id: String, app_id: String },

    #[error("App is already deployed: {0}")]
    AppAlreadyDeployed(String),

    #[error("App is not deployed: {0}")]
    AppNotDeployed(String),

    #[error("Invalid flow metadata: {0}")]
    InvalidMetadata(String),
}

/// Errors raised inside a store transaction. The transaction is rolled back
/// before the error is returned.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Vertex not found: {0}")]
    VertexNotFound(TokenId),

    #[error("Instance has no persisted identity")]
    NotPersisted,

    #[error("Instance has no current step")]
    MissingCurrentStep,

    #[error("Token {0} has no saved metadata")]
    MissingMetadata(TokenId),

    #[error("Subject not found: {0}")]
    SubjectNotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Errors raised by a dispatcher
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Dispatcher channel is closed")]
    Closed,

    #[error("Unknown address: {0}")]
    UnknownAddress(String),

    #[error("Wire encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// How a failure is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Structural flow-definition error (bad route)
    Validation,
    /// A store transaction failed and was rolled back
    Persistence,
    /// The failure cannot be recorded against any instance
    FatalInconsistency,
}

/// Engine failures. Each carries a stable numeric code.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Failure {
    #[error("3000: Unable to start flow instance: {0}")]
    StartInstance(String),

    #[error("3001: Unable to await user interaction: {0}")]
    AwaitInteraction(String),

    #[error("3002: Flow instance user interaction view failure: {0}")]
    InteractionView(String),

    #[error("3003: Unable to close token and complete instance: {0}")]
    CloseToken(String),

    #[error("3004: Unable to record instance failure: {0}")]
    RecordFailure(String),

    #[error("3005: Invalid route for instance: {0}")]
    InvalidRoute(String),

    #[error("3006: Parent of completed sub-flow not found: {0}")]
    ParentNotFound(String),

    #[error("3007: Flow instance task not found: {0}")]
    TaskNotFound(String),

    #[error("3008: Step failed: {0}")]
    StepFailed(String),
}

impl Failure {
    pub fn code(&self) -> u32 {
        match self {
            Self::StartInstance(_) => 3000,
            Self::AwaitInteraction(_) => 3001,
            Self::InteractionView(_) => 3002,
            Self::CloseToken(_) => 3003,
            Self::RecordFailure(_) => 3004,
            Self::InvalidRoute(_) => 3005,
            Self::ParentNotFound(_) => 3006,
            Self::TaskNotFound(_) => 3007,
            Self::StepFailed(_) => 3008,
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::InvalidRoute(_) | Self::StepFailed(_) | Self::TaskNotFound(_) => {
                FailureKind::Validation
            }
            Self::RecordFailure(_) | Self::ParentNotFound(_) => FailureKind::FatalInconsistency,
            _ => FailureKind::Persistence,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.kind() == FailureKind::FatalInconsistency
    }
}

impl TokenflowError {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create from a generic error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

impl From<&str> for TokenflowError {
    fn from(s: &str) -> Self {
        Self::Other(s.to_string())
    }
}

impl From<String> for TokenflowError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_codes_are_stable() {
        assert_eq!(Failure::StartInstance("x".into()).code(), 3000);
        assert_eq!(Failure::AwaitInteraction("x".into()).code(), 3001);
        assert_eq!(Failure::InteractionView("x".into()).code(), 3002);
        assert_eq!(Failure::CloseToken("x".into()).code(), 3003);
        assert_eq!(Failure::RecordFailure("x".into()).code(), 3004);
        assert_eq!(Failure::InvalidRoute("x".into()).code(), 3005);
    }

    #[test]
    fn test_failure_display_leads_with_code() {
        let failure = Failure::InvalidRoute("flow P1".into());
        assert_eq!(failure.to_string(), "3005: Invalid route for instance: flow P1");
    }

    #[test]
    fn test_failure_kinds() {
        assert_eq!(
            Failure::InvalidRoute(String::new()).kind(),
            FailureKind::Validation
        );
        assert_eq!(
            Failure::CloseToken(String::new()).kind(),
            FailureKind::Persistence
        );
        assert!(Failure::ParentNotFound(String::new()).is_fatal());
        assert!(Failure::RecordFailure(String::new()).is_fatal());
        assert!(!Failure::AwaitInteraction(String::new()).is_fatal());
    }

    #[test]
    fn test_definition_error_wraps_into_top_level() {
        let err: TokenflowError = DefinitionError::AppAlreadyDeployed("loans".into()).into();
        assert_eq!(
            err.to_string(),
            "Definition error: App is already deployed: loans"
        );
    }
}
