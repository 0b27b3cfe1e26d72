use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, warn};

use super::WorkStateTransitionBrief;
use crate::clock::Clock;
use crate::constants::{EVENT_CATEGORY_PROPERTY_UPDATED, EVENT_SOURCE_WORK, PROPERTY_STATE_NAME};
use crate::errors::FlywheelError;
use crate::event::{EventRecord, EventSink, PropertyUpdated};
use crate::ids::{Id, IdProvider};
use crate::model::{ProcessStep, StateTransitionLog, Work};
use crate::session::Session;
use crate::state::{State, StateCategory};
use crate::store::{ProcessStepClosing, Store, UnitOfWork};
use crate::workflow::WorkflowManager;

type Result<T> = std::result::Result<T, FlywheelError>;

/// Motor de transiciones de work items.
///
/// Una transición es una única unidad de trabajo: validación contra la
/// máquina de estados, update condicional del work, evento `StateName`,
/// tiempos derivados, log de transición y process steps. El instante `now`
/// se captura una vez al entrar.
pub struct WorkProcessEngine<S: Store, K: EventSink> {
    workflows: Arc<WorkflowManager<S>>,
    sink: K,
    ids: Arc<dyn IdProvider>,
    clock: Arc<dyn Clock>,
}

impl<S: Store, K: EventSink> WorkProcessEngine<S, K> {
    pub fn new(workflows: Arc<WorkflowManager<S>>, sink: K, ids: Arc<dyn IdProvider>, clock: Arc<dyn Clock>) -> Self {
        Self { workflows,
               sink,
               ids,
               clock }
    }

    pub fn transition(&self, brief: &WorkStateTransitionBrief, session: &Session) -> Result<StateTransitionLog> {
        let now = self.clock.now();
        debug!("work:transition:start work_id={} flow_id={} from={} to={}",
               brief.work_id, brief.flow_id, brief.from_state, brief.to_state);
        let log = self.workflows.store().run(|uow| self.transition_in(uow, brief, session, now))?;
        debug!("work:transition:done work_id={} log_id={}", log.work_id, log.id);
        Ok(log)
    }

    fn transition_in(&self,
                     uow: &mut dyn UnitOfWork,
                     brief: &WorkStateTransitionBrief,
                     session: &Session,
                     now: DateTime<Utc>)
                     -> Result<StateTransitionLog> {
        let detail = self.workflows.detail_in(uow, brief.flow_id, session)?;
        let machine = &detail.state_machine;
        if machine.available_transitions(&brief.from_state, &brief.to_state).len() != 1 {
            return Err(FlywheelError::InvalidTransition { from: brief.from_state.clone(),
                                                          to: brief.to_state.clone() });
        }
        let from = resolve_state(machine.find_state(&brief.from_state), &brief.from_state)?;
        let to = resolve_state(machine.find_state(&brief.to_state), &brief.to_state)?;

        let work = uow.find_work(brief.work_id)?
                      .ok_or_else(|| FlywheelError::NotFound(format!("work {}", brief.work_id)))?;
        session.require_access(work.project_id)?;
        if work.is_archived() {
            return Err(FlywheelError::ArchiveStatusInvalid);
        }
        if work.flow_id != brief.flow_id {
            return Err(FlywheelError::BadParam(format!("work {} is not bound to workflow {}",
                                                       work.id, brief.flow_id)));
        }

        let affected = uow.transit_work_state(work.id, &from.name, &to.name, to.category, now)?;
        FlywheelError::expect_affected(1, affected)?;

        self.sink.emit(uow, &self.state_changed_event(&work, &from, &to, session, now))?;

        update_process_times(uow, &work, to.category, now)?;

        let log = StateTransitionLog { id: self.ids.next_id(),
                                       create_time: now,
                                       creator_id: session.identity.id,
                                       work_id: work.id,
                                       flow_id: brief.flow_id,
                                       from_state: from.name.clone(),
                                       to_state: to.name.clone() };
        uow.insert_transition_log(&log)?;

        if from.category != StateCategory::Done {
            let closed = uow.close_process_step(&ProcessStepClosing { work_id: work.id,
                                                                      flow_id: brief.flow_id,
                                                                      state_name: &from.name,
                                                                      end_time: now,
                                                                      next_state_name: &to.name,
                                                                      next_state_category: to.category })?;
            if closed == 0 {
                warn!("work:transition no open process step work_id={} state={}", work.id, from.name);
            }
        }
        if to.category != StateCategory::Done {
            uow.insert_process_step(&ProcessStep { work_id: work.id,
                                                   flow_id: brief.flow_id,
                                                   state_name: to.name.clone(),
                                                   state_category: to.category,
                                                   begin_time: now,
                                                   end_time: None,
                                                   next_state_name: None,
                                                   next_state_category: None,
                                                   creator_id: session.identity.id,
                                                   creator_name: session.identity.nickname.clone() })?;
        }
        Ok(log)
    }

    /// Historial de process steps de un work, por `begin_time` ascendente.
    ///
    /// Un work inexistente o fuera de los proyectos del caller devuelve una
    /// lista vacía.
    pub fn query_process_steps(&self, work_id: Id, session: &Session) -> Result<Vec<ProcessStep>> {
        self.workflows.store().run(|uow| {
                                   let Some(work) = uow.find_work(work_id)? else {
                                       return Ok(Vec::new());
                                   };
                                   if !session.may_access(work.project_id) {
                                       return Ok(Vec::new());
                                   }
                                   uow.list_process_steps(work_id)
                               })
    }

    fn state_changed_event(&self,
                           work: &Work,
                           from: &State,
                           to: &State,
                           session: &Session,
                           now: DateTime<Utc>)
                           -> EventRecord {
        EventRecord { id: self.ids.next_id(),
                      source_id: work.id,
                      source_type: EVENT_SOURCE_WORK.to_string(),
                      source_desc: work.name.clone(),
                      category: EVENT_CATEGORY_PROPERTY_UPDATED.to_string(),
                      updated_properties: vec![PropertyUpdated::plain(PROPERTY_STATE_NAME, &from.name, &to.name)],
                      creator_id: session.identity.id,
                      creator_name: session.identity.nickname.clone(),
                      create_time: now,
                      dispatch_time: None }
    }
}

fn resolve_state(state: Option<&State>, name: &str) -> Result<State> {
    state.cloned().ok_or_else(|| FlywheelError::StateInvalid(name.to_string()))
}

/// `process_begin_time` se fija al salir del backlog; `process_end_time` se
/// fija al llegar a DONE y se limpia al reabrir.
fn update_process_times(uow: &mut dyn UnitOfWork, work: &Work, target: StateCategory, now: DateTime<Utc>) -> Result<()> {
    if work.process_begin_time.is_none() && target != StateCategory::InBacklog {
        FlywheelError::expect_affected(1, uow.set_work_process_begin(work.id, Some(now))?)?;
    }
    match (work.process_end_time, target) {
        (None, StateCategory::Done) => {
            FlywheelError::expect_affected(1, uow.set_work_process_end(work.id, Some(now))?)?;
        }
        (Some(_), category) if category != StateCategory::Done => {
            FlywheelError::expect_affected(1, uow.set_work_process_end(work.id, None)?)?;
        }
        _ => {}
    }
    Ok(())
}
