//! `WorkflowManager`: ciclo de vida de workflows y de su máquina de estados.
//!
//! Cada operación pública corre en una única unidad de trabajo y verifica
//! autorización antes de escribir:
//! - crear workflow, crear estado y reordenar estados exigen algún rol en el
//!   proyecto;
//! - el resto de mutaciones exige el rol manager.
//!
//! Renombrar un estado es una actualización en sitio seguida de la cascada
//! del nombre sobre transiciones, works y process steps del mismo workflow.

use std::collections::HashSet;
use std::sync::Arc;

use log::debug;

use super::{StateCreating, StateOrderRangeUpdating, WorkflowBaseUpdating, WorkflowCreation, WorkflowQuery,
            WorkflowStateUpdating};
use crate::clock::Clock;
use crate::constants::STATE_ORDER_BASE;
use crate::errors::FlywheelError;
use crate::ids::{Id, IdProvider};
use crate::model::{Workflow, WorkflowDetail, WorkflowStateRecord, WorkflowTransitionRecord};
use crate::session::Session;
use crate::state::{State, StateMachine, Transition};
use crate::store::{Store, UnitOfWork, WorkflowFilter};

type Result<T> = std::result::Result<T, FlywheelError>;

pub struct WorkflowManager<S: Store> {
    store: Arc<S>,
    ids: Arc<dyn IdProvider>,
    clock: Arc<dyn Clock>,
}

impl<S: Store> WorkflowManager<S> {
    pub fn new(store: Arc<S>, ids: Arc<dyn IdProvider>, clock: Arc<dyn Clock>) -> Self {
        Self { store, ids, clock }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Workflows visibles para el caller que cumplen el filtro.
    ///
    /// Sin proyectos visibles devuelve una lista vacía sin tocar el store.
    pub fn query(&self, query: &WorkflowQuery, session: &Session) -> Result<Vec<Workflow>> {
        let visible: Vec<Id> = session.visible_projects().into_iter().collect();
        if visible.is_empty() {
            return Ok(Vec::new());
        }
        let filter = WorkflowFilter { project_id: query.project_id,
                                      name: query.name.clone().filter(|n| !n.is_empty()),
                                      visible_projects: visible };
        self.store.run(|uow| uow.query_workflows(&filter))
    }

    /// Crea el workflow con todos sus estados (orden re-estampado) y
    /// transiciones de forma atómica.
    pub fn create(&self, creation: &WorkflowCreation, session: &Session) -> Result<WorkflowDetail> {
        session.require_access(creation.project_id)?;
        if creation.name.trim().is_empty() {
            return Err(FlywheelError::BadParam("workflow name is required".into()));
        }
        creation.state_machine.validate()?;

        let mut state_machine = creation.state_machine.clone();
        state_machine.restamp_orders(STATE_ORDER_BASE);
        let detail = WorkflowDetail { workflow: Workflow { id: self.ids.next_id(),
                                                           name: creation.name.clone(),
                                                           project_id: creation.project_id,
                                                           theme_color: creation.theme_color.clone(),
                                                           theme_icon: creation.theme_icon.clone(),
                                                           create_time: self.clock.now() },
                                      state_machine };
        debug!("workflow:create:start id={} project_id={} states={} transitions={}",
               detail.workflow.id,
               detail.workflow.project_id,
               detail.state_machine.states.len(),
               detail.state_machine.transitions.len());

        self.store.run(|uow| {
                      let wf = &detail.workflow;
                      uow.insert_workflow(wf)?;
                      for s in &detail.state_machine.states {
                          uow.insert_state(&state_record(wf.id, s, wf.create_time))?;
                      }
                      for t in &detail.state_machine.transitions {
                          uow.insert_transition(&transition_record(wf.id, t, wf.create_time))?;
                      }
                      Ok(())
                  })?;
        debug!("workflow:create:done id={}", detail.workflow.id);
        Ok(detail)
    }

    pub fn detail(&self, id: Id, session: &Session) -> Result<WorkflowDetail> {
        self.store.run(|uow| self.detail_in(uow, id, session))
    }

    /// Materializa el workflow dentro de una unidad de trabajo ya abierta.
    ///
    /// Los estados quedan ordenados por `order`; una transición almacenada
    /// que apunte a un estado inexistente es corrupción (`StateInvalid`).
    pub fn detail_in(&self, uow: &mut dyn UnitOfWork, id: Id, session: &Session) -> Result<WorkflowDetail> {
        let workflow = load_workflow(uow, id)?;
        session.require_access(workflow.project_id)?;

        let states: Vec<State> = uow.list_states(workflow.id)?
                                    .into_iter()
                                    .map(|r| State { name: r.name,
                                                     category: r.category,
                                                     order: r.order })
                                    .collect();
        let mut state_machine = StateMachine::new(states, Vec::new());
        for record in uow.list_transitions(workflow.id)? {
            for endpoint in [&record.from_state, &record.to_state] {
                if state_machine.find_state(endpoint).is_none() {
                    return Err(FlywheelError::StateInvalid(endpoint.clone()));
                }
            }
            state_machine.transitions.push(Transition::new(record.name, record.from_state, record.to_state));
        }
        Ok(WorkflowDetail { workflow, state_machine })
    }

    pub fn update_base(&self, id: Id, updating: &WorkflowBaseUpdating, session: &Session) -> Result<Workflow> {
        self.store.run(|uow| {
                      let workflow = load_workflow(uow, id)?;
                      session.require_manage(workflow.project_id)?;
                      let affected =
                          uow.update_workflow_base(id, &updating.name, &updating.theme_color, &updating.theme_icon)?;
                      FlywheelError::expect_affected(1, affected)?;
                      load_workflow(uow, id)
                  })
    }

    /// Elimina el workflow con sus estados y transiciones; falla con
    /// `WorkflowReferenced` si algún work o process step lo referencia.
    pub fn delete(&self, id: Id, session: &Session) -> Result<()> {
        self.store.run(|uow| {
                      let workflow = load_workflow(uow, id)?;
                      session.require_manage(workflow.project_id)?;
                      uow.is_workflow_referenced(id)?;

                      uow.delete_workflow(id)?;
                      let states = uow.delete_states(id)?;
                      let transitions = uow.delete_transitions(id)?;
                      debug!("workflow:delete id={id} states={states} transitions={transitions}");
                      Ok(())
                  })
    }

    pub fn add_transitions(&self, id: Id, transitions: &[Transition], session: &Session) -> Result<()> {
        let now = self.clock.now();
        self.store.run(|uow| {
                      let workflow = load_workflow(uow, id)?;
                      session.require_manage(workflow.project_id)?;
                      let states: HashSet<String> = uow.list_states(id)?.into_iter().map(|s| s.name).collect();
                      insert_transitions(uow, id, &states, transitions, now)
                  })
    }

    /// Borra las transiciones `(from, to)` indicadas; las inexistentes se
    /// ignoran.
    pub fn remove_transitions(&self, id: Id, transitions: &[Transition], session: &Session) -> Result<()> {
        self.store.run(|uow| {
                      let workflow = load_workflow(uow, id)?;
                      session.require_manage(workflow.project_id)?;
                      for t in transitions {
                          let affected = uow.delete_transition(id, &t.from, &t.to)?;
                          debug!("workflow:remove_transition id={id} from={} to={} affected={affected}", t.from, t.to);
                      }
                      Ok(())
                  })
    }

    /// Inserta un estado y luego sus transiciones entrantes/salientes.
    pub fn create_state(&self, workflow_id: Id, creating: &StateCreating, session: &Session) -> Result<()> {
        if creating.name.trim().is_empty() {
            return Err(FlywheelError::BadParam("state name is required".into()));
        }
        let now = self.clock.now();
        self.store.run(|uow| {
                      let workflow = load_workflow(uow, workflow_id)?;
                      session.require_access(workflow.project_id)?;
                      if uow.find_state(workflow_id, &creating.name)?.is_some() {
                          return Err(FlywheelError::StateExisted(creating.name.clone()));
                      }
                      uow.insert_state(&WorkflowStateRecord { workflow_id,
                                                              name: creating.name.clone(),
                                                              category: creating.category,
                                                              order: creating.order,
                                                              create_time: now })?;

                      let states: HashSet<String> =
                          uow.list_states(workflow_id)?.into_iter().map(|s| s.name).collect();
                      insert_transitions(uow, workflow_id, &states, &creating.transitions, now)
                  })
    }

    /// Renombra y/o reordena un estado en sitio y propaga el nombre nuevo.
    pub fn update_state(&self, workflow_id: Id, updating: &WorkflowStateUpdating, session: &Session) -> Result<()> {
        if updating.name.trim().is_empty() {
            return Err(FlywheelError::BadParam("state name is required".into()));
        }
        self.store.run(|uow| {
                      let workflow = load_workflow(uow, workflow_id)?;
                      session.require_manage(workflow.project_id)?;

                      let origin = uow.find_state(workflow_id, &updating.origin_name)?
                                      .ok_or_else(|| FlywheelError::NotFound(format!("state {}", updating.origin_name)))?;
                      let renamed = origin.name != updating.name;
                      if renamed && uow.find_state(workflow_id, &updating.name)?.is_some() {
                          return Err(FlywheelError::StateExisted(updating.name.clone()));
                      }

                      let affected = uow.update_state(workflow_id, &origin.name, &updating.name, updating.order)?;
                      FlywheelError::expect_affected(1, affected)?;
                      if renamed {
                          cascade_rename(uow, &origin, &updating.name)?;
                      }
                      Ok(())
                  })
    }

    /// Fija `order = new_order` por estado; cada entrada debe afectar
    /// exactamente una fila.
    pub fn update_state_range_orders(&self,
                                     workflow_id: Id,
                                     orders: &[StateOrderRangeUpdating],
                                     session: &Session)
                                     -> Result<()> {
        if orders.is_empty() {
            return Ok(());
        }
        self.store.run(|uow| {
                      let workflow = load_workflow(uow, workflow_id)?;
                      session.require_access(workflow.project_id)?;
                      for o in orders {
                          let affected = uow.update_state_order(workflow_id, &o.state, o.new_order)?;
                          FlywheelError::expect_affected(1, affected)?;
                      }
                      Ok(())
                  })
    }
}

fn load_workflow(uow: &mut dyn UnitOfWork, id: Id) -> Result<Workflow> {
    uow.find_workflow(id)?.ok_or_else(|| FlywheelError::NotFound(format!("workflow {id}")))
}

fn state_record(workflow_id: Id, state: &State, at: chrono::DateTime<chrono::Utc>) -> WorkflowStateRecord {
    WorkflowStateRecord { workflow_id,
                          name: state.name.clone(),
                          category: state.category,
                          order: state.order,
                          create_time: at }
}

fn transition_record(workflow_id: Id, t: &Transition, at: chrono::DateTime<chrono::Utc>) -> WorkflowTransitionRecord {
    WorkflowTransitionRecord { workflow_id,
                               name: t.name.clone(),
                               from_state: t.from.clone(),
                               to_state: t.to.clone(),
                               create_time: at }
}

/// Valida extremos y duplicados contra el estado actual antes de insertar.
fn insert_transitions(uow: &mut dyn UnitOfWork,
                      workflow_id: Id,
                      states: &HashSet<String>,
                      transitions: &[Transition],
                      at: chrono::DateTime<chrono::Utc>)
                      -> Result<()> {
    let mut existing: HashSet<(String, String)> = uow.list_transitions(workflow_id)?
                                                     .into_iter()
                                                     .map(|t| (t.from_state, t.to_state))
                                                     .collect();
    for t in transitions {
        for endpoint in [&t.from, &t.to] {
            if !states.contains(endpoint) {
                return Err(FlywheelError::UnknownState(endpoint.clone()));
            }
        }
        if !existing.insert((t.from.clone(), t.to.clone())) {
            return Err(FlywheelError::TransitionExisted { from: t.from.clone(),
                                                          to: t.to.clone() });
        }
        uow.insert_transition(&transition_record(workflow_id, t, at))?;
    }
    Ok(())
}

/// Propaga el renombre a todas las tablas que guardan el nombre del estado.
/// La categoría se toma del estado de origen.
fn cascade_rename(uow: &mut dyn UnitOfWork, origin: &WorkflowStateRecord, name: &str) -> Result<()> {
    let wf = origin.workflow_id;
    let from = uow.rename_transition_from(wf, &origin.name, name)?;
    let to = uow.rename_transition_to(wf, &origin.name, name)?;
    let works = uow.rename_work_states(wf, &origin.name, name, origin.category)?;
    let steps = uow.rename_process_step_states(wf, &origin.name, name, origin.category)?;
    let next_steps = uow.rename_process_step_next_states(wf, &origin.name, name, origin.category)?;
    debug!("workflow:rename_state id={wf} origin={} name={name} transitions_from={from} transitions_to={to} \
            works={works} steps={steps} next_steps={next_steps}",
           origin.name);
    Ok(())
}
