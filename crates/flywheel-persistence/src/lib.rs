//! flywheel-persistence
//!
//! Adaptador Postgres (Diesel + r2d2) del puerto `Store` de `flywheel-core`.
//!
//! Módulos:
//! - `pg`: `PgStore` y su unidad de trabajo transaccional.
//! - `migrations`: runner embebido de migraciones Diesel.
//! - `config`: carga de configuración desde .env.
//! - `schema`: tablas Diesel declaradas para compilar queries.

pub mod config;
pub mod error;
pub mod migrations;
pub mod pg;
pub mod schema;

pub use config::{init_dotenv, DbConfig};
pub use error::PersistenceError;
pub use migrations::{migrate_url, run_pending_migrations};
pub use pg::{build_dev_pool_from_env, build_pool, build_pool_from_config, ConnectionProvider, PgPool, PgStore, PoolProvider};
