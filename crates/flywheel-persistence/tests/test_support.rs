#![allow(dead_code)]

use std::sync::Arc;

use chrono::Utc;
use flywheel_core::workflow::WorkflowCreation;
use flywheel_core::{Clock, Id, IdProvider, Identity, OutboxEventSink, ProcessStep, Session, SnowflakeIdWorker, State,
                    StateCategory, StateMachine, Store, SystemClock, Transition, Work, WorkProcessEngine,
                    WorkflowManager};
use flywheel_persistence::{build_pool, DbConfig, PgPool, PgStore, PoolProvider};
use once_cell::sync::Lazy;

pub static TEST_POOL: Lazy<Option<PgPool>> = Lazy::new(|| {
    let cfg = DbConfig::from_env().ok()?;
    match build_pool(&cfg.url, 1, 4) {
        Ok(p) => Some(p),
        Err(e) => {
            eprintln!("No se pudo construir pool de test: {e}");
            None
        }
    }
});

/// Un único generador para todo el binario de tests: varias instancias con
/// el mismo machine id podrían repetir ids dentro del mismo milisegundo.
static IDS: Lazy<Arc<SnowflakeIdWorker>> = Lazy::new(|| Arc::new(SnowflakeIdWorker::new(7)));

pub type TestStore = PgStore<PoolProvider>;

pub struct PgFixture {
    pub ids: Arc<SnowflakeIdWorker>,
    pub clock: Arc<SystemClock>,
    pub store: Arc<TestStore>,
    pub workflows: Arc<WorkflowManager<TestStore>>,
    pub engine: WorkProcessEngine<TestStore, OutboxEventSink>,
    /// Proyecto exclusivo del test para aislarlo de ejecuciones previas.
    pub project: Id,
}

/// `None` (y el test se omite) cuando no hay `DATABASE_URL`.
pub fn fixture() -> Option<PgFixture> {
    let Some(pool) = TEST_POOL.as_ref() else {
        eprintln!("skip (no DATABASE_URL)");
        return None;
    };
    let ids = IDS.clone();
    let clock = Arc::new(SystemClock);
    let store = Arc::new(PgStore::from_pool(pool.clone()));
    let workflows = Arc::new(WorkflowManager::new(store.clone(), ids.clone(), clock.clone()));
    let engine = WorkProcessEngine::new(workflows.clone(), OutboxEventSink, ids.clone(), clock.clone());
    let project = ids.next_id();
    Some(PgFixture { ids,
                     clock,
                     store,
                     workflows,
                     engine,
                     project })
}

impl PgFixture {
    pub fn manager(&self) -> Session {
        self.session("manager")
    }

    pub fn member(&self) -> Session {
        self.session("member")
    }

    fn session(&self, role: &str) -> Session {
        Session::from_role_strings(Identity { id: Id(42),
                                              nickname: "alice".into() },
                                   [format!("{role}_{}", self.project)])
    }

    pub fn creation(&self) -> WorkflowCreation {
        WorkflowCreation { name: format!("wf-{}", self.project),
                           project_id: self.project,
                           theme_color: "#fff".into(),
                           theme_icon: "i".into(),
                           state_machine: StateMachine::new(vec![State::new("PENDING", StateCategory::InBacklog),
                                                                 State::new("DOING", StateCategory::InProcess),
                                                                 State::new("DONE", StateCategory::Done)],
                                                            vec![Transition::between("PENDING", "DOING"),
                                                                 Transition::between("DOING", "DONE")]) }
    }

    pub fn seed_work(&self, flow_id: Id) -> Id {
        let now = self.clock.now();
        let id = self.ids.next_id();
        let work = Work { id,
                          name: format!("work-{id}"),
                          project_id: self.project,
                          flow_id,
                          create_time: now,
                          state_name: "PENDING".into(),
                          state_category: StateCategory::InBacklog,
                          state_begin_time: Some(now),
                          process_begin_time: None,
                          process_end_time: None,
                          archive_time: None };
        let step = ProcessStep { work_id: id,
                                 flow_id,
                                 state_name: "PENDING".into(),
                                 state_category: StateCategory::InBacklog,
                                 begin_time: now - chrono::Duration::seconds(1),
                                 end_time: None,
                                 next_state_name: None,
                                 next_state_category: None,
                                 creator_id: Id(42),
                                 creator_name: "alice".into() };
        self.store
            .run(|uow| {
                uow.insert_work(&work)?;
                uow.insert_process_step(&step)
            })
            .expect("seed work");
        id
    }

    pub fn work(&self, id: Id) -> Work {
        self.store.run(|uow| uow.find_work(id)).expect("find work").expect("work exists")
    }
}

pub fn now_ms() -> chrono::DateTime<Utc> {
    SystemClock.now()
}
