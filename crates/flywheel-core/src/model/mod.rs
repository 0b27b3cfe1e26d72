//! Entidades persistidas por el motor.
//!
//! Son datos planos: el mapeo a filas de base de datos vive en los adaptadores
//! de `Store`. Los instantes "no definidos" se modelan como `None`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::Id;
use crate::state::{StateCategory, StateMachine};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub id: Id,
    pub name: String,
    pub project_id: Id,
    pub theme_color: String,
    pub theme_icon: String,
    pub create_time: DateTime<Utc>,
}

/// Workflow junto a su máquina de estados materializada.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDetail {
    #[serde(flatten)]
    pub workflow: Workflow,
    pub state_machine: StateMachine,
}

/// Fila de `workflow_states`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowStateRecord {
    pub workflow_id: Id,
    pub name: String,
    pub category: StateCategory,
    pub order: i32,
    pub create_time: DateTime<Utc>,
}

/// Fila de `workflow_state_transitions`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowTransitionRecord {
    pub workflow_id: Id,
    pub name: String,
    pub from_state: String,
    pub to_state: String,
    pub create_time: DateTime<Utc>,
}

/// Work item: su posición en el workflow es un snapshot nombre+categoría.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Work {
    pub id: Id,
    pub name: String,
    pub project_id: Id,
    pub flow_id: Id,
    pub create_time: DateTime<Utc>,
    pub state_name: String,
    pub state_category: StateCategory,
    pub state_begin_time: Option<DateTime<Utc>>,
    pub process_begin_time: Option<DateTime<Utc>>,
    pub process_end_time: Option<DateTime<Utc>>,
    pub archive_time: Option<DateTime<Utc>>,
}

impl Work {
    pub fn is_archived(&self) -> bool {
        self.archive_time.is_some()
    }
}

/// Intervalo `[begin_time, end_time)` en el que un work estuvo en un estado.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessStep {
    pub work_id: Id,
    pub flow_id: Id,
    pub state_name: String,
    pub state_category: StateCategory,
    pub begin_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub next_state_name: Option<String>,
    pub next_state_category: Option<StateCategory>,
    pub creator_id: Id,
    pub creator_name: String,
}

impl ProcessStep {
    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }
}

/// Registro inmutable de una transición aplicada.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateTransitionLog {
    pub id: Id,
    pub create_time: DateTime<Utc>,
    pub creator_id: Id,
    pub work_id: Id,
    pub flow_id: Id,
    pub from_state: String,
    pub to_state: String,
}
