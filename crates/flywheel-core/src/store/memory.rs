//! Implementación en memoria del `Store`.
//!
//! Cada unidad de trabajo opera sobre una copia de las tablas tomada bajo el
//! lock global; al terminar con `Ok` la copia reemplaza al estado vigente.
//! Las unidades de trabajo quedan serializadas, lo que satisface (y excede)
//! el aislamiento read-committed que exige el motor.
//!
//! Abrir una unidad de trabajo desde dentro de otra en el mismo hilo (p.ej.
//! un `EventHandler` que escribe en el store que lo está drenando) falla
//! con `FlywheelError::Internal` en vez de bloquearse sobre el lock.

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Mutex;
use std::thread::{self, ThreadId};

use chrono::{DateTime, Utc};
use log::debug;

use super::{ProcessStepClosing, Store, UnitOfWork, WorkflowFilter};
use crate::errors::FlywheelError;
use crate::event::EventRecord;
use crate::ids::Id;
use crate::model::{ProcessStep, StateTransitionLog, Work, Workflow, WorkflowStateRecord, WorkflowTransitionRecord};
use crate::state::StateCategory;

type Result<T> = std::result::Result<T, FlywheelError>;

#[derive(Debug, Clone)]
struct StoredState {
    seq: u64,
    record: WorkflowStateRecord,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    workflows: BTreeMap<Id, Workflow>,
    states: Vec<StoredState>,
    next_state_seq: u64,
    transitions: Vec<WorkflowTransitionRecord>,
    works: BTreeMap<Id, Work>,
    steps: Vec<ProcessStep>,
    logs: Vec<StateTransitionLog>,
    outbox: BTreeMap<Id, EventRecord>,
}

fn unique_violation(what: impl std::fmt::Display) -> FlywheelError {
    FlywheelError::Storage(format!("unique violation: {what}"))
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
    /// Hilo que tiene abierta la unidad de trabajo en curso.
    holder: Mutex<Option<ThreadId>>,
}

/// Libera la marca de `holder` al terminar la unidad de trabajo.
struct HolderMark<'a>(&'a Mutex<Option<ThreadId>>);

impl Drop for HolderMark<'_> {
    fn drop(&mut self) {
        *self.0.lock().unwrap_or_else(|p| p.into_inner()) = None;
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for InMemoryStore {
    fn run<T, F>(&self, f: F) -> Result<T>
        where F: FnOnce(&mut dyn UnitOfWork) -> Result<T>
    {
        let current = thread::current().id();
        if *self.holder.lock().unwrap_or_else(|p| p.into_inner()) == Some(current) {
            return Err(FlywheelError::Internal("nested unit of work on the same in-memory store".into()));
        }
        let mut guard = self.tables.lock().unwrap_or_else(|p| p.into_inner());
        *self.holder.lock().unwrap_or_else(|p| p.into_inner()) = Some(current);
        let mark = HolderMark(&self.holder);
        let mut working = guard.clone();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                          let mut uow = MemoryUnitOfWork { tables: &mut working };
                          f(&mut uow)
                      }));
        match outcome {
            Ok(Ok(value)) => {
                *guard = working;
                Ok(value)
            }
            Ok(Err(e)) => {
                debug!("memory:rollback err={e}");
                Err(e)
            }
            Err(payload) => {
                drop(mark);
                drop(guard);
                panic::resume_unwind(payload)
            }
        }
    }
}

struct MemoryUnitOfWork<'a> {
    tables: &'a mut Tables,
}

impl MemoryUnitOfWork<'_> {
    fn states_of(&mut self, workflow_id: Id) -> impl Iterator<Item = &mut StoredState> {
        self.tables.states.iter_mut().filter(move |s| s.record.workflow_id == workflow_id)
    }
}

impl UnitOfWork for MemoryUnitOfWork<'_> {
    fn insert_workflow(&mut self, workflow: &Workflow) -> Result<()> {
        if self.tables.workflows.contains_key(&workflow.id) {
            return Err(unique_violation(format!("workflows.id={}", workflow.id)));
        }
        self.tables.workflows.insert(workflow.id, workflow.clone());
        Ok(())
    }

    fn find_workflow(&mut self, id: Id) -> Result<Option<Workflow>> {
        Ok(self.tables.workflows.get(&id).cloned())
    }

    fn query_workflows(&mut self, filter: &WorkflowFilter) -> Result<Vec<Workflow>> {
        let needle = filter.name.as_ref().map(|n| n.to_lowercase());
        Ok(self.tables
               .workflows
               .values()
               .filter(|w| filter.project_id.map_or(true, |p| w.project_id == p))
               .filter(|w| needle.as_ref().map_or(true, |n| w.name.to_lowercase().contains(n.as_str())))
               .filter(|w| filter.visible_projects.contains(&w.project_id))
               .cloned()
               .collect())
    }

    fn update_workflow_base(&mut self, id: Id, name: &str, theme_color: &str, theme_icon: &str) -> Result<usize> {
        Ok(match self.tables.workflows.get_mut(&id) {
            Some(w) => {
                w.name = name.to_string();
                w.theme_color = theme_color.to_string();
                w.theme_icon = theme_icon.to_string();
                1
            }
            None => 0,
        })
    }

    fn delete_workflow(&mut self, id: Id) -> Result<usize> {
        Ok(usize::from(self.tables.workflows.remove(&id).is_some()))
    }

    fn insert_state(&mut self, state: &WorkflowStateRecord) -> Result<()> {
        let exists = self.tables
                         .states
                         .iter()
                         .any(|s| s.record.workflow_id == state.workflow_id && s.record.name == state.name);
        if exists {
            return Err(unique_violation(format!("workflow_states({}, {})", state.workflow_id, state.name)));
        }
        self.tables.next_state_seq += 1;
        let seq = self.tables.next_state_seq;
        self.tables.states.push(StoredState { seq, record: state.clone() });
        Ok(())
    }

    fn list_states(&mut self, workflow_id: Id) -> Result<Vec<WorkflowStateRecord>> {
        let mut rows: Vec<&StoredState> =
            self.tables.states.iter().filter(|s| s.record.workflow_id == workflow_id).collect();
        rows.sort_by_key(|s| (s.record.order, s.seq));
        Ok(rows.into_iter().map(|s| s.record.clone()).collect())
    }

    fn find_state(&mut self, workflow_id: Id, name: &str) -> Result<Option<WorkflowStateRecord>> {
        Ok(self.tables
               .states
               .iter()
               .find(|s| s.record.workflow_id == workflow_id && s.record.name == name)
               .map(|s| s.record.clone()))
    }

    fn update_state(&mut self, workflow_id: Id, origin_name: &str, name: &str, order: i32) -> Result<usize> {
        if origin_name != name && self.find_state(workflow_id, name)?.is_some() {
            return Err(unique_violation(format!("workflow_states({workflow_id}, {name})")));
        }
        let mut affected = 0;
        for s in self.states_of(workflow_id).filter(|s| s.record.name == origin_name) {
            s.record.name = name.to_string();
            s.record.order = order;
            affected += 1;
        }
        Ok(affected)
    }

    fn update_state_order(&mut self, workflow_id: Id, name: &str, order: i32) -> Result<usize> {
        let mut affected = 0;
        for s in self.states_of(workflow_id).filter(|s| s.record.name == name) {
            s.record.order = order;
            affected += 1;
        }
        Ok(affected)
    }

    fn delete_states(&mut self, workflow_id: Id) -> Result<usize> {
        let before = self.tables.states.len();
        self.tables.states.retain(|s| s.record.workflow_id != workflow_id);
        Ok(before - self.tables.states.len())
    }

    fn insert_transition(&mut self, transition: &WorkflowTransitionRecord) -> Result<()> {
        let exists = self.tables.transitions.iter().any(|t| {
                                                    t.workflow_id == transition.workflow_id
                                                    && t.from_state == transition.from_state
                                                    && t.to_state == transition.to_state
                                                });
        if exists {
            return Err(unique_violation(format!("workflow_state_transitions({}, {}, {})",
                                                transition.workflow_id, transition.from_state, transition.to_state)));
        }
        self.tables.transitions.push(transition.clone());
        Ok(())
    }

    fn list_transitions(&mut self, workflow_id: Id) -> Result<Vec<WorkflowTransitionRecord>> {
        Ok(self.tables.transitions.iter().filter(|t| t.workflow_id == workflow_id).cloned().collect())
    }

    fn delete_transition(&mut self, workflow_id: Id, from_state: &str, to_state: &str) -> Result<usize> {
        let before = self.tables.transitions.len();
        self.tables
            .transitions
            .retain(|t| !(t.workflow_id == workflow_id && t.from_state == from_state && t.to_state == to_state));
        Ok(before - self.tables.transitions.len())
    }

    fn delete_transitions(&mut self, workflow_id: Id) -> Result<usize> {
        let before = self.tables.transitions.len();
        self.tables.transitions.retain(|t| t.workflow_id != workflow_id);
        Ok(before - self.tables.transitions.len())
    }

    fn rename_transition_from(&mut self, workflow_id: Id, origin_name: &str, name: &str) -> Result<usize> {
        let mut affected = 0;
        for t in self.tables
                     .transitions
                     .iter_mut()
                     .filter(|t| t.workflow_id == workflow_id && t.from_state == origin_name)
        {
            t.from_state = name.to_string();
            affected += 1;
        }
        Ok(affected)
    }

    fn rename_transition_to(&mut self, workflow_id: Id, origin_name: &str, name: &str) -> Result<usize> {
        let mut affected = 0;
        for t in self.tables
                     .transitions
                     .iter_mut()
                     .filter(|t| t.workflow_id == workflow_id && t.to_state == origin_name)
        {
            t.to_state = name.to_string();
            affected += 1;
        }
        Ok(affected)
    }

    fn insert_work(&mut self, work: &Work) -> Result<()> {
        if self.tables.works.contains_key(&work.id) {
            return Err(unique_violation(format!("works.id={}", work.id)));
        }
        self.tables.works.insert(work.id, work.clone());
        Ok(())
    }

    fn find_work(&mut self, id: Id) -> Result<Option<Work>> {
        Ok(self.tables.works.get(&id).cloned())
    }

    fn transit_work_state(&mut self,
                          work_id: Id,
                          from_state: &str,
                          to_state: &str,
                          to_category: StateCategory,
                          at: DateTime<Utc>)
                          -> Result<usize> {
        Ok(match self.tables.works.get_mut(&work_id) {
            Some(w) if w.state_name == from_state => {
                w.state_name = to_state.to_string();
                w.state_category = to_category;
                w.state_begin_time = Some(at);
                1
            }
            _ => 0,
        })
    }

    fn set_work_process_begin(&mut self, work_id: Id, at: Option<DateTime<Utc>>) -> Result<usize> {
        Ok(match self.tables.works.get_mut(&work_id) {
            Some(w) => {
                w.process_begin_time = at;
                1
            }
            None => 0,
        })
    }

    fn set_work_process_end(&mut self, work_id: Id, at: Option<DateTime<Utc>>) -> Result<usize> {
        Ok(match self.tables.works.get_mut(&work_id) {
            Some(w) => {
                w.process_end_time = at;
                1
            }
            None => 0,
        })
    }

    fn rename_work_states(&mut self, flow_id: Id, origin_name: &str, name: &str, category: StateCategory) -> Result<usize> {
        let mut affected = 0;
        for w in self.tables
                     .works
                     .values_mut()
                     .filter(|w| w.flow_id == flow_id && w.state_name == origin_name)
        {
            w.state_name = name.to_string();
            w.state_category = category;
            affected += 1;
        }
        Ok(affected)
    }

    fn work_exists_for_flow(&mut self, flow_id: Id) -> Result<bool> {
        Ok(self.tables.works.values().any(|w| w.flow_id == flow_id))
    }

    fn insert_process_step(&mut self, step: &ProcessStep) -> Result<()> {
        let exists = self.tables.steps.iter().any(|s| {
                                              s.work_id == step.work_id
                                              && s.flow_id == step.flow_id
                                              && s.state_name == step.state_name
                                              && s.begin_time == step.begin_time
                                          });
        if exists {
            return Err(unique_violation(format!("work_process_steps({}, {}, {})",
                                                step.work_id, step.state_name, step.begin_time)));
        }
        self.tables.steps.push(step.clone());
        Ok(())
    }

    fn close_process_step(&mut self, closing: &ProcessStepClosing<'_>) -> Result<usize> {
        let mut affected = 0;
        for s in self.tables.steps.iter_mut().filter(|s| {
                                                 s.work_id == closing.work_id
                                                 && s.flow_id == closing.flow_id
                                                 && s.state_name == closing.state_name
                                                 && s.end_time.is_none()
                                             })
        {
            s.end_time = Some(closing.end_time);
            s.next_state_name = Some(closing.next_state_name.to_string());
            s.next_state_category = Some(closing.next_state_category);
            affected += 1;
        }
        Ok(affected)
    }

    fn list_process_steps(&mut self, work_id: Id) -> Result<Vec<ProcessStep>> {
        let mut steps: Vec<ProcessStep> = self.tables.steps.iter().filter(|s| s.work_id == work_id).cloned().collect();
        steps.sort_by_key(|s| s.begin_time);
        Ok(steps)
    }

    fn rename_process_step_states(&mut self,
                                  flow_id: Id,
                                  origin_name: &str,
                                  name: &str,
                                  category: StateCategory)
                                  -> Result<usize> {
        let mut affected = 0;
        for s in self.tables
                     .steps
                     .iter_mut()
                     .filter(|s| s.flow_id == flow_id && s.state_name == origin_name)
        {
            s.state_name = name.to_string();
            s.state_category = category;
            affected += 1;
        }
        Ok(affected)
    }

    fn rename_process_step_next_states(&mut self,
                                       flow_id: Id,
                                       origin_name: &str,
                                       name: &str,
                                       category: StateCategory)
                                       -> Result<usize> {
        let mut affected = 0;
        for s in self.tables
                     .steps
                     .iter_mut()
                     .filter(|s| s.flow_id == flow_id && s.next_state_name.as_deref() == Some(origin_name))
        {
            s.next_state_name = Some(name.to_string());
            s.next_state_category = Some(category);
            affected += 1;
        }
        Ok(affected)
    }

    fn process_step_exists_for_flow(&mut self, flow_id: Id) -> Result<bool> {
        Ok(self.tables.steps.iter().any(|s| s.flow_id == flow_id))
    }

    fn insert_transition_log(&mut self, log: &StateTransitionLog) -> Result<()> {
        if self.tables.logs.iter().any(|l| l.id == log.id) {
            return Err(unique_violation(format!("work_state_transitions.id={}", log.id)));
        }
        self.tables.logs.push(log.clone());
        Ok(())
    }

    fn list_transition_logs(&mut self, work_id: Id) -> Result<Vec<StateTransitionLog>> {
        Ok(self.tables.logs.iter().filter(|l| l.work_id == work_id).cloned().collect())
    }

    fn append_outbox(&mut self, event: &EventRecord) -> Result<()> {
        if self.tables.outbox.contains_key(&event.id) {
            return Err(unique_violation(format!("event_outbox.id={}", event.id)));
        }
        self.tables.outbox.insert(event.id, event.clone());
        Ok(())
    }

    fn pending_outbox(&mut self, limit: usize) -> Result<Vec<EventRecord>> {
        Ok(self.tables
               .outbox
               .values()
               .filter(|e| e.dispatch_time.is_none())
               .take(limit)
               .cloned()
               .collect())
    }

    fn mark_outbox_dispatched(&mut self, id: Id, at: DateTime<Utc>) -> Result<usize> {
        Ok(match self.tables.outbox.get_mut(&id) {
            Some(e) if e.dispatch_time.is_none() => {
                e.dispatch_time = Some(at);
                1
            }
            _ => 0,
        })
    }
}
