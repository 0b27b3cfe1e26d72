//! `UnitOfWork` sobre una conexión Postgres dentro de una transacción abierta.
//!
//! Todas las comparaciones de nombres de estado son por igualdad; la búsqueda
//! de workflows por nombre usa `ILIKE` con los comodines escapados.

use chrono::{DateTime, Utc};
use diesel::dsl::exists;
use diesel::pg::PgConnection;
use diesel::prelude::*;

use flywheel_core::event::EventRecord;
use flywheel_core::model::{ProcessStep, StateTransitionLog, Work, Workflow, WorkflowStateRecord,
                           WorkflowTransitionRecord};
use flywheel_core::store::{ProcessStepClosing, UnitOfWork, WorkflowFilter};
use flywheel_core::{FlywheelError, Id, StateCategory};

use super::rows::{NewProcessStepRow, NewStateRow, NewTransitionRow, OutboxRow, ProcessStepRow, StateRow,
                  TransitionLogRow, TransitionRow, WorkRow, WorkflowRow};
use crate::error::PersistenceError;
use crate::schema::{event_outbox, work_process_steps, work_state_transitions, workflow_state_transitions,
                    workflow_states, workflows, works};

type Result<T> = std::result::Result<T, FlywheelError>;

fn db(err: diesel::result::Error) -> FlywheelError {
    PersistenceError::from(err).into()
}

/// Escapa `\`, `%` y `_` para que el patrón `LIKE` sea literal.
pub(crate) fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

pub struct PgUnitOfWork<'c> {
    pub(crate) conn: &'c mut PgConnection,
}

impl UnitOfWork for PgUnitOfWork<'_> {
    fn insert_workflow(&mut self, workflow: &Workflow) -> Result<()> {
        diesel::insert_into(workflows::table).values(WorkflowRow::from(workflow))
                                             .execute(self.conn)
                                             .map_err(db)?;
        Ok(())
    }

    fn find_workflow(&mut self, id: Id) -> Result<Option<Workflow>> {
        let row: Option<WorkflowRow> = workflows::table.find(id.0).first(self.conn).optional().map_err(db)?;
        Ok(row.map(Workflow::from))
    }

    fn query_workflows(&mut self, filter: &WorkflowFilter) -> Result<Vec<Workflow>> {
        let visible: Vec<i64> = filter.visible_projects.iter().map(|p| p.0).collect();
        let mut query = workflows::table.filter(workflows::project_id.eq_any(visible)).into_boxed();
        if let Some(project) = filter.project_id {
            query = query.filter(workflows::project_id.eq(project.0));
        }
        if let Some(name) = &filter.name {
            query = query.filter(workflows::name.ilike(format!("%{}%", escape_like(name))));
        }
        let rows: Vec<WorkflowRow> = query.order(workflows::id.asc()).load(self.conn).map_err(db)?;
        Ok(rows.into_iter().map(Workflow::from).collect())
    }

    fn update_workflow_base(&mut self, id: Id, name: &str, theme_color: &str, theme_icon: &str) -> Result<usize> {
        diesel::update(workflows::table.find(id.0)).set((workflows::name.eq(name),
                                                         workflows::theme_color.eq(theme_color),
                                                         workflows::theme_icon.eq(theme_icon)))
                                                   .execute(self.conn)
                                                   .map_err(db)
    }

    fn delete_workflow(&mut self, id: Id) -> Result<usize> {
        diesel::delete(workflows::table.find(id.0)).execute(self.conn).map_err(db)
    }

    fn insert_state(&mut self, state: &WorkflowStateRecord) -> Result<()> {
        diesel::insert_into(workflow_states::table).values(NewStateRow::from(state))
                                                   .execute(self.conn)
                                                   .map_err(db)?;
        Ok(())
    }

    fn list_states(&mut self, workflow_id: Id) -> Result<Vec<WorkflowStateRecord>> {
        let rows: Vec<StateRow> = workflow_states::table.filter(workflow_states::workflow_id.eq(workflow_id.0))
                                                        .order((workflow_states::sort_order.asc(),
                                                                workflow_states::seq.asc()))
                                                        .load(self.conn)
                                                        .map_err(db)?;
        rows.into_iter().map(StateRow::into_record).collect()
    }

    fn find_state(&mut self, workflow_id: Id, name: &str) -> Result<Option<WorkflowStateRecord>> {
        let row: Option<StateRow> = workflow_states::table.filter(workflow_states::workflow_id.eq(workflow_id.0))
                                                          .filter(workflow_states::name.eq(name))
                                                          .first(self.conn)
                                                          .optional()
                                                          .map_err(db)?;
        row.map(StateRow::into_record).transpose()
    }

    fn update_state(&mut self, workflow_id: Id, origin_name: &str, name: &str, order: i32) -> Result<usize> {
        let target = workflow_states::table.filter(workflow_states::workflow_id.eq(workflow_id.0))
                                           .filter(workflow_states::name.eq(origin_name));
        diesel::update(target).set((workflow_states::name.eq(name), workflow_states::sort_order.eq(order)))
                              .execute(self.conn)
                              .map_err(db)
    }

    fn update_state_order(&mut self, workflow_id: Id, name: &str, order: i32) -> Result<usize> {
        let target = workflow_states::table.filter(workflow_states::workflow_id.eq(workflow_id.0))
                                           .filter(workflow_states::name.eq(name));
        diesel::update(target).set(workflow_states::sort_order.eq(order))
                              .execute(self.conn)
                              .map_err(db)
    }

    fn delete_states(&mut self, workflow_id: Id) -> Result<usize> {
        diesel::delete(workflow_states::table.filter(workflow_states::workflow_id.eq(workflow_id.0)))
            .execute(self.conn)
            .map_err(db)
    }

    fn insert_transition(&mut self, transition: &WorkflowTransitionRecord) -> Result<()> {
        diesel::insert_into(workflow_state_transitions::table).values(NewTransitionRow::from(transition))
                                                              .execute(self.conn)
                                                              .map_err(db)?;
        Ok(())
    }

    fn list_transitions(&mut self, workflow_id: Id) -> Result<Vec<WorkflowTransitionRecord>> {
        let rows: Vec<TransitionRow> =
            workflow_state_transitions::table.filter(workflow_state_transitions::workflow_id.eq(workflow_id.0))
                                             .order(workflow_state_transitions::seq.asc())
                                             .load(self.conn)
                                             .map_err(db)?;
        Ok(rows.into_iter().map(WorkflowTransitionRecord::from).collect())
    }

    fn delete_transition(&mut self, workflow_id: Id, from_state: &str, to_state: &str) -> Result<usize> {
        let target =
            workflow_state_transitions::table.filter(workflow_state_transitions::workflow_id.eq(workflow_id.0))
                                             .filter(workflow_state_transitions::from_state.eq(from_state))
                                             .filter(workflow_state_transitions::to_state.eq(to_state));
        diesel::delete(target).execute(self.conn).map_err(db)
    }

    fn delete_transitions(&mut self, workflow_id: Id) -> Result<usize> {
        let target =
            workflow_state_transitions::table.filter(workflow_state_transitions::workflow_id.eq(workflow_id.0));
        diesel::delete(target).execute(self.conn).map_err(db)
    }

    fn rename_transition_from(&mut self, workflow_id: Id, origin_name: &str, name: &str) -> Result<usize> {
        let target =
            workflow_state_transitions::table.filter(workflow_state_transitions::workflow_id.eq(workflow_id.0))
                                             .filter(workflow_state_transitions::from_state.eq(origin_name));
        diesel::update(target).set(workflow_state_transitions::from_state.eq(name))
                              .execute(self.conn)
                              .map_err(db)
    }

    fn rename_transition_to(&mut self, workflow_id: Id, origin_name: &str, name: &str) -> Result<usize> {
        let target =
            workflow_state_transitions::table.filter(workflow_state_transitions::workflow_id.eq(workflow_id.0))
                                             .filter(workflow_state_transitions::to_state.eq(origin_name));
        diesel::update(target).set(workflow_state_transitions::to_state.eq(name))
                              .execute(self.conn)
                              .map_err(db)
    }

    fn insert_work(&mut self, work: &Work) -> Result<()> {
        diesel::insert_into(works::table).values(WorkRow::from(work)).execute(self.conn).map_err(db)?;
        Ok(())
    }

    fn find_work(&mut self, id: Id) -> Result<Option<Work>> {
        let row: Option<WorkRow> = works::table.find(id.0).first(self.conn).optional().map_err(db)?;
        row.map(WorkRow::into_work).transpose()
    }

    fn transit_work_state(&mut self,
                          work_id: Id,
                          from_state: &str,
                          to_state: &str,
                          to_category: StateCategory,
                          at: DateTime<Utc>)
                          -> Result<usize> {
        let target = works::table.filter(works::id.eq(work_id.0)).filter(works::state_name.eq(from_state));
        diesel::update(target).set((works::state_name.eq(to_state),
                                    works::state_category.eq(to_category.as_str()),
                                    works::state_begin_time.eq(Some(at))))
                              .execute(self.conn)
                              .map_err(db)
    }

    fn set_work_process_begin(&mut self, work_id: Id, at: Option<DateTime<Utc>>) -> Result<usize> {
        diesel::update(works::table.find(work_id.0)).set(works::process_begin_time.eq(at))
                                                    .execute(self.conn)
                                                    .map_err(db)
    }

    fn set_work_process_end(&mut self, work_id: Id, at: Option<DateTime<Utc>>) -> Result<usize> {
        diesel::update(works::table.find(work_id.0)).set(works::process_end_time.eq(at))
                                                    .execute(self.conn)
                                                    .map_err(db)
    }

    fn rename_work_states(&mut self, flow_id: Id, origin_name: &str, name: &str, category: StateCategory) -> Result<usize> {
        let target = works::table.filter(works::flow_id.eq(flow_id.0)).filter(works::state_name.eq(origin_name));
        diesel::update(target).set((works::state_name.eq(name), works::state_category.eq(category.as_str())))
                              .execute(self.conn)
                              .map_err(db)
    }

    fn work_exists_for_flow(&mut self, flow_id: Id) -> Result<bool> {
        diesel::select(exists(works::table.filter(works::flow_id.eq(flow_id.0)))).get_result(self.conn)
                                                                                 .map_err(db)
    }

    fn insert_process_step(&mut self, step: &ProcessStep) -> Result<()> {
        diesel::insert_into(work_process_steps::table).values(NewProcessStepRow::from(step))
                                                      .execute(self.conn)
                                                      .map_err(db)?;
        Ok(())
    }

    fn close_process_step(&mut self, closing: &ProcessStepClosing<'_>) -> Result<usize> {
        let target = work_process_steps::table.filter(work_process_steps::work_id.eq(closing.work_id.0))
                                              .filter(work_process_steps::flow_id.eq(closing.flow_id.0))
                                              .filter(work_process_steps::state_name.eq(closing.state_name))
                                              .filter(work_process_steps::end_time.is_null());
        diesel::update(target).set((work_process_steps::end_time.eq(Some(closing.end_time)),
                                    work_process_steps::next_state_name.eq(Some(closing.next_state_name)),
                                    work_process_steps::next_state_category.eq(Some(closing.next_state_category
                                                                                            .as_str()))))
                              .execute(self.conn)
                              .map_err(db)
    }

    fn list_process_steps(&mut self, work_id: Id) -> Result<Vec<ProcessStep>> {
        let rows: Vec<ProcessStepRow> =
            work_process_steps::table.filter(work_process_steps::work_id.eq(work_id.0))
                                     .order((work_process_steps::begin_time.asc(), work_process_steps::id.asc()))
                                     .load(self.conn)
                                     .map_err(db)?;
        rows.into_iter().map(ProcessStepRow::into_step).collect()
    }

    fn rename_process_step_states(&mut self,
                                  flow_id: Id,
                                  origin_name: &str,
                                  name: &str,
                                  category: StateCategory)
                                  -> Result<usize> {
        let target = work_process_steps::table.filter(work_process_steps::flow_id.eq(flow_id.0))
                                              .filter(work_process_steps::state_name.eq(origin_name));
        diesel::update(target).set((work_process_steps::state_name.eq(name),
                                    work_process_steps::state_category.eq(category.as_str())))
                              .execute(self.conn)
                              .map_err(db)
    }

    fn rename_process_step_next_states(&mut self,
                                       flow_id: Id,
                                       origin_name: &str,
                                       name: &str,
                                       category: StateCategory)
                                       -> Result<usize> {
        let target = work_process_steps::table.filter(work_process_steps::flow_id.eq(flow_id.0))
                                              .filter(work_process_steps::next_state_name.eq(origin_name));
        diesel::update(target).set((work_process_steps::next_state_name.eq(Some(name)),
                                    work_process_steps::next_state_category.eq(Some(category.as_str()))))
                              .execute(self.conn)
                              .map_err(db)
    }

    fn process_step_exists_for_flow(&mut self, flow_id: Id) -> Result<bool> {
        diesel::select(exists(work_process_steps::table.filter(work_process_steps::flow_id.eq(flow_id.0))))
            .get_result(self.conn)
            .map_err(db)
    }

    fn insert_transition_log(&mut self, log: &StateTransitionLog) -> Result<()> {
        diesel::insert_into(work_state_transitions::table).values(TransitionLogRow::from(log))
                                                          .execute(self.conn)
                                                          .map_err(db)?;
        Ok(())
    }

    fn list_transition_logs(&mut self, work_id: Id) -> Result<Vec<StateTransitionLog>> {
        let rows: Vec<TransitionLogRow> =
            work_state_transitions::table.filter(work_state_transitions::work_id.eq(work_id.0))
                                         .order((work_state_transitions::create_time.asc(),
                                                 work_state_transitions::id.asc()))
                                         .load(self.conn)
                                         .map_err(db)?;
        Ok(rows.into_iter().map(StateTransitionLog::from).collect())
    }

    fn append_outbox(&mut self, event: &EventRecord) -> Result<()> {
        diesel::insert_into(event_outbox::table).values(OutboxRow::from_event(event)?)
                                                .execute(self.conn)
                                                .map_err(db)?;
        Ok(())
    }

    /// Bloquea las filas leídas (`SKIP LOCKED`) para que dos dispatchers no
    /// entreguen el mismo evento en paralelo.
    fn pending_outbox(&mut self, limit: usize) -> Result<Vec<EventRecord>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows: Vec<OutboxRow> = event_outbox::table.filter(event_outbox::dispatch_time.is_null())
                                                      .order(event_outbox::id.asc())
                                                      .limit(limit)
                                                      .for_update()
                                                      .skip_locked()
                                                      .load(self.conn)
                                                      .map_err(db)?;
        rows.into_iter().map(OutboxRow::into_event).collect()
    }

    fn mark_outbox_dispatched(&mut self, id: Id, at: DateTime<Utc>) -> Result<usize> {
        let target = event_outbox::table.filter(event_outbox::id.eq(id.0))
                                        .filter(event_outbox::dispatch_time.is_null());
        diesel::update(target).set(event_outbox::dispatch_time.eq(Some(at)))
                              .execute(self.conn)
                              .map_err(db)
    }
}

#[cfg(test)]
mod tests {
    use super::escape_like;

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("dev_flow%"), "dev\\_flow\\%");
        assert_eq!(escape_like("a\\b"), "a\\\\b");
        assert_eq!(escape_like("plain"), "plain");
    }
}
