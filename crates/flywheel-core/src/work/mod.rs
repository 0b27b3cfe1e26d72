//! Work items: transiciones de estado e historial de process steps.

mod engine;

use serde::{Deserialize, Serialize};

use crate::ids::Id;

pub use engine::WorkProcessEngine;

/// Petición de transición de un work item entre dos estados de su workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkStateTransitionBrief {
    pub work_id: Id,
    pub flow_id: Id,
    pub from_state: String,
    pub to_state: String,
}

impl WorkStateTransitionBrief {
    pub fn new(work_id: Id, flow_id: Id, from_state: impl Into<String>, to_state: impl Into<String>) -> Self {
        Self { work_id,
               flow_id,
               from_state: from_state.into(),
               to_state: to_state.into() }
    }
}
