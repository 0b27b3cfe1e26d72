//! Implementación Postgres (Diesel) del `Store` del core.
//!
//! - Una unidad de trabajo es una transacción `READ COMMITTED` read-write
//!   sobre una conexión tomada del pool.
//! - Commit si el closure devuelve `Ok`; rollback si devuelve `Err` o entra
//!   en pánico (el pánico se relanza tras el rollback).
//! - El checkout de conexión se reintenta con backoff corto sólo ante
//!   errores transitorios; la transacción en sí nunca se repite.

mod rows;
mod unit_of_work;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager};
use log::{debug, error, warn};

use flywheel_core::store::{Store, UnitOfWork};
use flywheel_core::FlywheelError;

use crate::config::DbConfig;
use crate::error::PersistenceError;
use crate::migrations::run_pending_migrations;

pub use unit_of_work::PgUnitOfWork;

/// Alias de tipo para el pool r2d2 de conexiones Postgres.
pub type PgPool = r2d2::Pool<ConnectionManager<PgConnection>>;

pub type PgPooledConnection = r2d2::PooledConnection<ConnectionManager<PgConnection>>;

/// Proveedor abstracto de conexiones.
///
/// Contrato: devuelve una conexión válida o `PersistenceError::TransientIo`
/// en caso de error.
pub trait ConnectionProvider: Send + Sync + 'static {
    fn connection(&self) -> Result<PgPooledConnection, PersistenceError>;
}

/// Implementación concreta de `ConnectionProvider` respaldada por un `PgPool`.
#[derive(Clone)]
pub struct PoolProvider {
    pub pool: PgPool,
}

impl ConnectionProvider for PoolProvider {
    fn connection(&self) -> Result<PgPooledConnection, PersistenceError> {
        self.pool
            .get()
            .map_err(|e| PersistenceError::TransientIo(format!("pool error: {e}")))
    }
}

/// Retry simple con backoff lineal muy pequeño (hasta 3 reintentos).
///
/// Política:
/// - Backoff: 15ms, 30ms, 45ms.
/// - Logs: se emite `warn!` por intento.
fn with_retry<F, T>(mut f: F) -> Result<T, PersistenceError>
    where F: FnMut() -> Result<T, PersistenceError>
{
    let mut attempts = 0;
    loop {
        match f() {
            Err(e) if e.is_retryable() && attempts < 3 => {
                let delay_ms = 15 * ((attempts + 1) as u64);
                warn!("retryable error (attempt {}): {:?} -> sleeping {}ms", attempts + 1, e, delay_ms);
                std::thread::sleep(std::time::Duration::from_millis(delay_ms));
                attempts += 1;
            }
            r => return r,
        }
    }
}

/// Resultado de la transacción: distingue errores del dominio, de Diesel y
/// pánicos capturados para relanzarlos tras el rollback.
enum TxError {
    Domain(FlywheelError),
    Diesel(diesel::result::Error),
    Panic(Box<dyn Any + Send + 'static>),
}

impl From<diesel::result::Error> for TxError {
    fn from(err: diesel::result::Error) -> Self {
        TxError::Diesel(err)
    }
}

/// `Store` sobre Postgres.
pub struct PgStore<P: ConnectionProvider> {
    provider: P,
}

impl<P: ConnectionProvider> PgStore<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

impl PgStore<PoolProvider> {
    pub fn from_pool(pool: PgPool) -> Self {
        Self::new(PoolProvider { pool })
    }
}

impl<P: ConnectionProvider> Store for PgStore<P> {
    fn run<T, F>(&self, f: F) -> Result<T, FlywheelError>
        where F: FnOnce(&mut dyn UnitOfWork) -> Result<T, FlywheelError>
    {
        let mut conn = with_retry(|| self.provider.connection())?;
        let body = |tx: &mut PgConnection| {
            let attempt = panic::catch_unwind(AssertUnwindSafe(|| f(&mut PgUnitOfWork { conn: tx })));
            match attempt {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(TxError::Domain(e)),
                Err(payload) => Err(TxError::Panic(payload)),
            }
        };
        let outcome = conn.build_transaction().read_committed().read_write().run(body);
        match outcome {
            Ok(value) => Ok(value),
            Err(TxError::Domain(e)) => {
                debug!("pg:rollback err={e}");
                Err(e)
            }
            Err(TxError::Diesel(e)) => {
                error!("pg:transaction error err={e}");
                Err(PersistenceError::from(e).into())
            }
            Err(TxError::Panic(payload)) => {
                warn!("pg:rollback after panic");
                panic::resume_unwind(payload)
            }
        }
    }
}

/// Construye un pool Postgres r2d2 a partir de URL y ejecuta las migraciones
/// pendientes.
///
/// Si `min_size > max_size` se usa `min_size = max_size`; tamaños 0 se
/// elevan a 1.
pub fn build_pool(database_url: &str, min_size: u32, max_size: u32) -> Result<PgPool, PersistenceError> {
    let validated_min = min_size.max(1);
    let validated_max = max_size.max(1);
    if validated_min > validated_max {
        warn!("pool: min_size > max_size ({validated_min} > {validated_max}), ajustando min=max");
    }
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = r2d2::Pool::builder().min_idle(Some(validated_min.min(validated_max)))
                                    .max_size(validated_max)
                                    .build(manager)
                                    .map_err(|e| PersistenceError::TransientIo(format!("pool build: {e}")))?;
    {
        let mut conn = pool.get()
                           .map_err(|e| PersistenceError::TransientIo(format!("pool get for migrations: {e}")))?;
        run_pending_migrations(&mut conn)?;
    }
    Ok(pool)
}

pub fn build_pool_from_config(cfg: &DbConfig) -> Result<PgPool, PersistenceError> {
    build_pool(&cfg.url, cfg.min_connections, cfg.max_connections)
}

/// Helper de desarrollo: carga `.env`, lee configuración (DATABASE_URL,
/// tamaños) y construye un pool ya migrado.
pub fn build_dev_pool_from_env() -> Result<PgPool, PersistenceError> {
    let cfg = DbConfig::from_env()?;
    build_pool_from_config(&cfg)
}
