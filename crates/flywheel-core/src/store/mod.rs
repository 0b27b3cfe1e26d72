//! Puerto de persistencia.
//!
//! `Store::run` delimita una unidad de trabajo: commit si el closure devuelve
//! `Ok`, rollback si devuelve `Err` o entra en pánico (el pánico se propaga
//! tras el rollback). `UnitOfWork` expone las operaciones tipadas sobre las
//! tablas; todas las comparaciones de nombres son por igualdad exacta.
//!
//! Adaptadores:
//! - `memory::InMemoryStore` (tests, herramientas locales).
//! - `flywheel-persistence` (Postgres vía Diesel).

pub mod memory;

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::errors::FlywheelError;
use crate::event::EventRecord;
use crate::ids::Id;
use crate::model::{ProcessStep, StateTransitionLog, Work, Workflow, WorkflowStateRecord, WorkflowTransitionRecord};
use crate::state::StateCategory;

type Result<T> = std::result::Result<T, FlywheelError>;

/// Filtro de consulta de workflows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkflowFilter {
    pub project_id: Option<Id>,
    /// Subcadena literal, comparada sin distinguir mayúsculas.
    pub name: Option<String>,
    /// Proyectos visibles para el caller; nunca vacío al llegar al store.
    pub visible_projects: Vec<Id>,
}

/// Cierre de un process step abierto.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessStepClosing<'a> {
    pub work_id: Id,
    pub flow_id: Id,
    pub state_name: &'a str,
    pub end_time: DateTime<Utc>,
    pub next_state_name: &'a str,
    pub next_state_category: StateCategory,
}

/// Operaciones disponibles dentro de una unidad de trabajo.
pub trait UnitOfWork {
    // workflows
    fn insert_workflow(&mut self, workflow: &Workflow) -> Result<()>;
    fn find_workflow(&mut self, id: Id) -> Result<Option<Workflow>>;
    fn query_workflows(&mut self, filter: &WorkflowFilter) -> Result<Vec<Workflow>>;
    fn update_workflow_base(&mut self, id: Id, name: &str, theme_color: &str, theme_icon: &str) -> Result<usize>;
    fn delete_workflow(&mut self, id: Id) -> Result<usize>;

    // workflow_states
    fn insert_state(&mut self, state: &WorkflowStateRecord) -> Result<()>;
    /// Estados ordenados por `order` ascendente; empates en orden de inserción.
    fn list_states(&mut self, workflow_id: Id) -> Result<Vec<WorkflowStateRecord>>;
    fn find_state(&mut self, workflow_id: Id, name: &str) -> Result<Option<WorkflowStateRecord>>;
    /// Renombra y reordena en sitio conservando la identidad de la fila.
    fn update_state(&mut self, workflow_id: Id, origin_name: &str, name: &str, order: i32) -> Result<usize>;
    fn update_state_order(&mut self, workflow_id: Id, name: &str, order: i32) -> Result<usize>;
    fn delete_states(&mut self, workflow_id: Id) -> Result<usize>;

    // workflow_state_transitions
    fn insert_transition(&mut self, transition: &WorkflowTransitionRecord) -> Result<()>;
    fn list_transitions(&mut self, workflow_id: Id) -> Result<Vec<WorkflowTransitionRecord>>;
    fn delete_transition(&mut self, workflow_id: Id, from_state: &str, to_state: &str) -> Result<usize>;
    fn delete_transitions(&mut self, workflow_id: Id) -> Result<usize>;
    fn rename_transition_from(&mut self, workflow_id: Id, origin_name: &str, name: &str) -> Result<usize>;
    fn rename_transition_to(&mut self, workflow_id: Id, origin_name: &str, name: &str) -> Result<usize>;

    // works
    fn insert_work(&mut self, work: &Work) -> Result<()>;
    fn find_work(&mut self, id: Id) -> Result<Option<Work>>;
    /// `UPDATE works SET state_* WHERE id = work_id AND state_name = from_state`.
    fn transit_work_state(&mut self,
                          work_id: Id,
                          from_state: &str,
                          to_state: &str,
                          to_category: StateCategory,
                          at: DateTime<Utc>)
                          -> Result<usize>;
    fn set_work_process_begin(&mut self, work_id: Id, at: Option<DateTime<Utc>>) -> Result<usize>;
    fn set_work_process_end(&mut self, work_id: Id, at: Option<DateTime<Utc>>) -> Result<usize>;
    fn rename_work_states(&mut self, flow_id: Id, origin_name: &str, name: &str, category: StateCategory) -> Result<usize>;
    fn work_exists_for_flow(&mut self, flow_id: Id) -> Result<bool>;

    // work_process_steps
    fn insert_process_step(&mut self, step: &ProcessStep) -> Result<()>;
    /// Cierra el step abierto (`end_time` vacío) del estado indicado.
    fn close_process_step(&mut self, closing: &ProcessStepClosing<'_>) -> Result<usize>;
    /// Steps de un work ordenados por `begin_time` ascendente.
    fn list_process_steps(&mut self, work_id: Id) -> Result<Vec<ProcessStep>>;
    fn rename_process_step_states(&mut self,
                                  flow_id: Id,
                                  origin_name: &str,
                                  name: &str,
                                  category: StateCategory)
                                  -> Result<usize>;
    fn rename_process_step_next_states(&mut self,
                                       flow_id: Id,
                                       origin_name: &str,
                                       name: &str,
                                       category: StateCategory)
                                       -> Result<usize>;
    fn process_step_exists_for_flow(&mut self, flow_id: Id) -> Result<bool>;

    // work_state_transitions
    fn insert_transition_log(&mut self, log: &StateTransitionLog) -> Result<()>;
    fn list_transition_logs(&mut self, work_id: Id) -> Result<Vec<StateTransitionLog>>;

    // event_outbox
    fn append_outbox(&mut self, event: &EventRecord) -> Result<()>;
    /// Eventos sin despachar, por id ascendente.
    fn pending_outbox(&mut self, limit: usize) -> Result<Vec<EventRecord>>;
    fn mark_outbox_dispatched(&mut self, id: Id, at: DateTime<Utc>) -> Result<usize>;

    /// `WorkflowReferenced` si algún work o process step apunta al workflow.
    fn is_workflow_referenced(&mut self, workflow_id: Id) -> Result<()> {
        if self.work_exists_for_flow(workflow_id)? || self.process_step_exists_for_flow(workflow_id)? {
            return Err(FlywheelError::WorkflowReferenced(workflow_id.to_string()));
        }
        Ok(())
    }
}

/// Almacenamiento transaccional compartible entre hilos.
pub trait Store: Send + Sync {
    fn run<T, F>(&self, f: F) -> Result<T>
        where F: FnOnce(&mut dyn UnitOfWork) -> Result<T>;
}

impl<S: Store + ?Sized> Store for Arc<S> {
    fn run<T, F>(&self, f: F) -> Result<T>
        where F: FnOnce(&mut dyn UnitOfWork) -> Result<T>
    {
        (**self).run(f)
    }
}
