//! Definición de workflows: entradas de las operaciones y el manager.

mod manager;

use serde::{Deserialize, Serialize};

use crate::ids::Id;
use crate::state::{StateCategory, StateMachine, Transition};

pub use manager::WorkflowManager;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowQuery {
    #[serde(default)]
    pub project_id: Option<Id>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowCreation {
    pub name: String,
    pub project_id: Id,
    pub theme_color: String,
    pub theme_icon: String,
    pub state_machine: StateMachine,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowBaseUpdating {
    pub name: String,
    pub theme_color: String,
    pub theme_icon: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateCreating {
    pub name: String,
    pub category: StateCategory,
    pub order: i32,
    #[serde(default)]
    pub transitions: Vec<Transition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStateUpdating {
    pub origin_name: String,
    pub name: String,
    #[serde(default)]
    pub order: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateOrderRangeUpdating {
    pub state: String,
    pub new_order: i32,
}
