//! flywheel: ensamblado de la aplicación.
//!
//! Une el core (`flywheel-core`) con un `Store` concreto y las dependencias
//! de proceso (generador de ids, reloj, outbox) en una única estructura
//! `App`. Puede usarse desde la CLI o desde otros clientes.

pub mod config;
pub mod errors;

use std::sync::Arc;

use flywheel_core::{Clock, IdProvider, OutboxDispatcher, OutboxEventSink, SnowflakeIdWorker, Store, SystemClock,
                    WorkProcessEngine, WorkflowManager};
use flywheel_persistence::{build_pool_from_config, PgStore, PoolProvider};
use log::debug;

pub use config::AppConfig;
pub use errors::ConfigError;

/// Servicios listos para usar sobre un mismo store.
pub struct App<S: Store> {
    pub store: Arc<S>,
    pub workflows: Arc<WorkflowManager<S>>,
    pub engine: WorkProcessEngine<S, OutboxEventSink>,
    pub dispatcher: OutboxDispatcher<S>,
}

impl<S: Store> App<S> {
    /// Ensambla los servicios con ids snowflake del nodo `machine_id` y el
    /// reloj del sistema.
    pub fn with_store(store: Arc<S>, machine_id: u16) -> Self {
        Self::assemble(store,
                       Arc::new(SnowflakeIdWorker::new(machine_id)),
                       Arc::new(SystemClock))
    }

    pub fn assemble(store: Arc<S>, ids: Arc<dyn IdProvider>, clock: Arc<dyn Clock>) -> Self {
        let workflows = Arc::new(WorkflowManager::new(store.clone(), ids.clone(), clock.clone()));
        let engine = WorkProcessEngine::new(workflows.clone(), OutboxEventSink, ids, clock.clone());
        let dispatcher = OutboxDispatcher::new(store.clone(), clock);
        Self { store,
               workflows,
               engine,
               dispatcher }
    }
}

pub type PgApp = App<PgStore<PoolProvider>>;

impl PgApp {
    /// Construye el pool (aplicando migraciones pendientes) y ensambla la app.
    pub fn connect(cfg: &AppConfig) -> Result<Self, ConfigError> {
        let pool = build_pool_from_config(&cfg.database)?;
        debug!("app:connect machine_id={} max_connections={}", cfg.machine_id, cfg.database.max_connections);
        Ok(Self::with_store(Arc::new(PgStore::from_pool(pool)), cfg.machine_id))
    }
}
