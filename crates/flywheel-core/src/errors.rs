//! Errores del core.
//!
//! Cada variante pertenece a un `ErrorKind` con código textual estable; la
//! capa de borde (HTTP, CLI) traduce el kind sin conocer las variantes.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

/// Clasificación estable de errores expuesta en el borde.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Forbidden,
    NotFound,
    WorkflowReferenced,
    UnknownState,
    StateExisted,
    TransitionExisted,
    StateInvalid,
    InvalidTransition,
    ArchiveStatusInvalid,
    AffectedRowMismatch,
    BadParam,
    Internal,
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Forbidden => "common.forbidden",
            ErrorKind::NotFound => "common.not_found",
            ErrorKind::WorkflowReferenced => "workflow.referenced",
            ErrorKind::UnknownState => "workflow.unknown_state",
            ErrorKind::StateExisted => "workflow.state_existed",
            ErrorKind::TransitionExisted => "workflow.transition_existed",
            ErrorKind::StateInvalid => "workflow.state_invalid",
            ErrorKind::InvalidTransition => "work.invalid_transition",
            ErrorKind::ArchiveStatusInvalid => "work.archive_status_invalid",
            ErrorKind::AffectedRowMismatch => "common.affected_row_mismatch",
            ErrorKind::BadParam => "common.bad_param",
            ErrorKind::Internal => "common.internal",
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FlywheelError {
    #[error("forbidden")]
    Forbidden,
    #[error("{0} not found")]
    NotFound(String),
    #[error("workflow {0} is referenced by works or process steps")]
    WorkflowReferenced(String),
    #[error("unknown state: {0}")]
    UnknownState(String),
    #[error("state already exists: {0}")]
    StateExisted(String),
    #[error("transition already exists: {from} -> {to}")]
    TransitionExisted { from: String, to: String },
    #[error("invalid state: {0}")]
    StateInvalid(String),
    #[error("transition from {from} to {to} is invalid")]
    InvalidTransition { from: String, to: String },
    #[error("archived work can not be changed")]
    ArchiveStatusInvalid,
    #[error("expected affected row is {expected}, but actual is {actual}")]
    AffectedRowMismatch { expected: usize, actual: usize },
    #[error("bad param: {0}")]
    BadParam(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("event sink error: {0}")]
    EventSink(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl FlywheelError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FlywheelError::Forbidden => ErrorKind::Forbidden,
            FlywheelError::NotFound(_) => ErrorKind::NotFound,
            FlywheelError::WorkflowReferenced(_) => ErrorKind::WorkflowReferenced,
            FlywheelError::UnknownState(_) => ErrorKind::UnknownState,
            FlywheelError::StateExisted(_) => ErrorKind::StateExisted,
            FlywheelError::TransitionExisted { .. } => ErrorKind::TransitionExisted,
            FlywheelError::StateInvalid(_) => ErrorKind::StateInvalid,
            FlywheelError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            FlywheelError::ArchiveStatusInvalid => ErrorKind::ArchiveStatusInvalid,
            FlywheelError::AffectedRowMismatch { .. } => ErrorKind::AffectedRowMismatch,
            FlywheelError::BadParam(_) => ErrorKind::BadParam,
            FlywheelError::Storage(_) | FlywheelError::EventSink(_) | FlywheelError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn code(&self) -> &'static str {
        self.kind().code()
    }

    /// Payload opcional con detalles estructurados del error.
    pub fn data(&self) -> Option<Value> {
        match self {
            FlywheelError::UnknownState(name) | FlywheelError::StateExisted(name) | FlywheelError::StateInvalid(name) => {
                Some(json!({ "state": name }))
            }
            FlywheelError::TransitionExisted { from, to } | FlywheelError::InvalidTransition { from, to } => {
                Some(json!({ "from": from, "to": to }))
            }
            FlywheelError::AffectedRowMismatch { expected, actual } => {
                Some(json!({ "expected": expected, "actual": actual }))
            }
            _ => None,
        }
    }

    /// Verifica que una operación condicional afectó exactamente `expected` filas.
    pub fn expect_affected(expected: usize, actual: usize) -> Result<(), FlywheelError> {
        if expected == actual {
            Ok(())
        } else {
            Err(FlywheelError::AffectedRowMismatch { expected, actual })
        }
    }
}

/// Representación serializable de un error para la capa de borde.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl From<&FlywheelError> for ErrorBody {
    fn from(err: &FlywheelError) -> Self {
        Self { code: err.code().to_string(),
               message: err.to_string(),
               data: err.data() }
    }
}
