//! Filas Diesel y su mapeo desde/hacia las entidades del core.
//!
//! Las categorías se guardan como texto estable (`IN_BACKLOG`, ...); un
//! valor desconocido al leer es una fila corrupta.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;

use flywheel_core::event::{EventRecord, PropertyUpdated};
use flywheel_core::model::{ProcessStep, StateTransitionLog, Work, Workflow, WorkflowStateRecord,
                           WorkflowTransitionRecord};
use flywheel_core::{FlywheelError, Id, StateCategory};

use crate::error::PersistenceError;
use crate::schema::{event_outbox, work_process_steps, work_state_transitions, workflow_state_transitions,
                    workflow_states, workflows, works};

type Result<T> = std::result::Result<T, FlywheelError>;

fn category(raw: &str) -> Result<StateCategory> {
    raw.parse()
       .map_err(|_| PersistenceError::CorruptedRow(format!("unknown state category {raw:?}")).into())
}

fn optional_category(raw: Option<&str>) -> Result<Option<StateCategory>> {
    raw.map(category).transpose()
}

#[derive(Queryable, Insertable, Debug)]
#[diesel(table_name = workflows)]
pub struct WorkflowRow {
    pub id: i64,
    pub name: String,
    pub project_id: i64,
    pub theme_color: String,
    pub theme_icon: String,
    pub create_time: DateTime<Utc>,
}

impl From<&Workflow> for WorkflowRow {
    fn from(w: &Workflow) -> Self {
        Self { id: w.id.0,
               name: w.name.clone(),
               project_id: w.project_id.0,
               theme_color: w.theme_color.clone(),
               theme_icon: w.theme_icon.clone(),
               create_time: w.create_time }
    }
}

impl From<WorkflowRow> for Workflow {
    fn from(r: WorkflowRow) -> Self {
        Self { id: Id(r.id),
               name: r.name,
               project_id: Id(r.project_id),
               theme_color: r.theme_color,
               theme_icon: r.theme_icon,
               create_time: r.create_time }
    }
}

/// `seq` sólo desempata el orden de listado; no sale del adaptador.
#[derive(Queryable, Debug)]
pub struct StateRow {
    pub seq: i64,
    pub workflow_id: i64,
    pub name: String,
    pub category: String,
    pub sort_order: i32,
    pub create_time: DateTime<Utc>,
}

impl StateRow {
    pub fn into_record(self) -> Result<WorkflowStateRecord> {
        Ok(WorkflowStateRecord { workflow_id: Id(self.workflow_id),
                                 category: category(&self.category)?,
                                 name: self.name,
                                 order: self.sort_order,
                                 create_time: self.create_time })
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = workflow_states)]
pub struct NewStateRow<'a> {
    pub workflow_id: i64,
    pub name: &'a str,
    pub category: &'a str,
    pub sort_order: i32,
    pub create_time: DateTime<Utc>,
}

impl<'a> From<&'a WorkflowStateRecord> for NewStateRow<'a> {
    fn from(s: &'a WorkflowStateRecord) -> Self {
        Self { workflow_id: s.workflow_id.0,
               name: &s.name,
               category: s.category.as_str(),
               sort_order: s.order,
               create_time: s.create_time }
    }
}

#[derive(Queryable, Debug)]
pub struct TransitionRow {
    pub seq: i64,
    pub workflow_id: i64,
    pub name: String,
    pub from_state: String,
    pub to_state: String,
    pub create_time: DateTime<Utc>,
}

impl From<TransitionRow> for WorkflowTransitionRecord {
    fn from(r: TransitionRow) -> Self {
        Self { workflow_id: Id(r.workflow_id),
               name: r.name,
               from_state: r.from_state,
               to_state: r.to_state,
               create_time: r.create_time }
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = workflow_state_transitions)]
pub struct NewTransitionRow<'a> {
    pub workflow_id: i64,
    pub name: &'a str,
    pub from_state: &'a str,
    pub to_state: &'a str,
    pub create_time: DateTime<Utc>,
}

impl<'a> From<&'a WorkflowTransitionRecord> for NewTransitionRow<'a> {
    fn from(t: &'a WorkflowTransitionRecord) -> Self {
        Self { workflow_id: t.workflow_id.0,
               name: &t.name,
               from_state: &t.from_state,
               to_state: &t.to_state,
               create_time: t.create_time }
    }
}

#[derive(Queryable, Insertable, Debug)]
#[diesel(table_name = works)]
pub struct WorkRow {
    pub id: i64,
    pub name: String,
    pub project_id: i64,
    pub flow_id: i64,
    pub create_time: DateTime<Utc>,
    pub state_name: String,
    pub state_category: String,
    pub state_begin_time: Option<DateTime<Utc>>,
    pub process_begin_time: Option<DateTime<Utc>>,
    pub process_end_time: Option<DateTime<Utc>>,
    pub archive_time: Option<DateTime<Utc>>,
}

impl From<&Work> for WorkRow {
    fn from(w: &Work) -> Self {
        Self { id: w.id.0,
               name: w.name.clone(),
               project_id: w.project_id.0,
               flow_id: w.flow_id.0,
               create_time: w.create_time,
               state_name: w.state_name.clone(),
               state_category: w.state_category.as_str().to_string(),
               state_begin_time: w.state_begin_time,
               process_begin_time: w.process_begin_time,
               process_end_time: w.process_end_time,
               archive_time: w.archive_time }
    }
}

impl WorkRow {
    pub fn into_work(self) -> Result<Work> {
        Ok(Work { id: Id(self.id),
                  name: self.name,
                  project_id: Id(self.project_id),
                  flow_id: Id(self.flow_id),
                  create_time: self.create_time,
                  state_category: category(&self.state_category)?,
                  state_name: self.state_name,
                  state_begin_time: self.state_begin_time,
                  process_begin_time: self.process_begin_time,
                  process_end_time: self.process_end_time,
                  archive_time: self.archive_time })
    }
}

#[derive(Queryable, Debug)]
pub struct ProcessStepRow {
    pub id: i64,
    pub work_id: i64,
    pub flow_id: i64,
    pub state_name: String,
    pub state_category: String,
    pub begin_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub next_state_name: Option<String>,
    pub next_state_category: Option<String>,
    pub creator_id: i64,
    pub creator_name: String,
}

impl ProcessStepRow {
    pub fn into_step(self) -> Result<ProcessStep> {
        Ok(ProcessStep { work_id: Id(self.work_id),
                         flow_id: Id(self.flow_id),
                         state_category: category(&self.state_category)?,
                         state_name: self.state_name,
                         begin_time: self.begin_time,
                         end_time: self.end_time,
                         next_state_category: optional_category(self.next_state_category.as_deref())?,
                         next_state_name: self.next_state_name,
                         creator_id: Id(self.creator_id),
                         creator_name: self.creator_name })
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = work_process_steps)]
pub struct NewProcessStepRow<'a> {
    pub work_id: i64,
    pub flow_id: i64,
    pub state_name: &'a str,
    pub state_category: &'a str,
    pub begin_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub next_state_name: Option<&'a str>,
    pub next_state_category: Option<&'a str>,
    pub creator_id: i64,
    pub creator_name: &'a str,
}

impl<'a> From<&'a ProcessStep> for NewProcessStepRow<'a> {
    fn from(s: &'a ProcessStep) -> Self {
        Self { work_id: s.work_id.0,
               flow_id: s.flow_id.0,
               state_name: &s.state_name,
               state_category: s.state_category.as_str(),
               begin_time: s.begin_time,
               end_time: s.end_time,
               next_state_name: s.next_state_name.as_deref(),
               next_state_category: s.next_state_category.map(|c| c.as_str()),
               creator_id: s.creator_id.0,
               creator_name: &s.creator_name }
    }
}

#[derive(Queryable, Insertable, Debug)]
#[diesel(table_name = work_state_transitions)]
pub struct TransitionLogRow {
    pub id: i64,
    pub create_time: DateTime<Utc>,
    pub creator_id: i64,
    pub work_id: i64,
    pub flow_id: i64,
    pub from_state: String,
    pub to_state: String,
}

impl From<&StateTransitionLog> for TransitionLogRow {
    fn from(l: &StateTransitionLog) -> Self {
        Self { id: l.id.0,
               create_time: l.create_time,
               creator_id: l.creator_id.0,
               work_id: l.work_id.0,
               flow_id: l.flow_id.0,
               from_state: l.from_state.clone(),
               to_state: l.to_state.clone() }
    }
}

impl From<TransitionLogRow> for StateTransitionLog {
    fn from(r: TransitionLogRow) -> Self {
        Self { id: Id(r.id),
               create_time: r.create_time,
               creator_id: Id(r.creator_id),
               work_id: Id(r.work_id),
               flow_id: Id(r.flow_id),
               from_state: r.from_state,
               to_state: r.to_state }
    }
}

/// Fila del outbox; las propiedades cambiadas viajan como JSONB.
#[derive(Queryable, Insertable, Debug)]
#[diesel(table_name = event_outbox)]
pub struct OutboxRow {
    pub id: i64,
    pub source_id: i64,
    pub source_type: String,
    pub source_desc: String,
    pub category: String,
    pub updated_properties: Value,
    pub creator_id: i64,
    pub creator_name: String,
    pub create_time: DateTime<Utc>,
    pub dispatch_time: Option<DateTime<Utc>>,
}

impl OutboxRow {
    pub fn from_event(e: &EventRecord) -> Result<Self> {
        let updated_properties = serde_json::to_value(&e.updated_properties)
            .map_err(|err| FlywheelError::Internal(format!("serialize updated properties: {err}")))?;
        Ok(Self { id: e.id.0,
                  source_id: e.source_id.0,
                  source_type: e.source_type.clone(),
                  source_desc: e.source_desc.clone(),
                  category: e.category.clone(),
                  updated_properties,
                  creator_id: e.creator_id.0,
                  creator_name: e.creator_name.clone(),
                  create_time: e.create_time,
                  dispatch_time: e.dispatch_time })
    }

    pub fn into_event(self) -> Result<EventRecord> {
        let id = self.id;
        let updated_properties: Vec<PropertyUpdated> =
            serde_json::from_value(self.updated_properties).map_err(|err| {
                let corrupted = PersistenceError::CorruptedRow(format!("outbox {id} properties: {err}"));
                FlywheelError::from(corrupted)
            })?;
        Ok(EventRecord { id: Id(self.id),
                         source_id: Id(self.source_id),
                         source_type: self.source_type,
                         source_desc: self.source_desc,
                         category: self.category,
                         updated_properties,
                         creator_id: Id(self.creator_id),
                         creator_name: self.creator_name,
                         create_time: self.create_time,
                         dispatch_time: self.dispatch_time })
    }
}
