//! Migraciones Diesel embebidas (`migrations/` de este crate). Se ejecutan
//! una vez al construir el pool.

use diesel::pg::PgConnection;
use diesel::Connection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use log::debug;

use crate::error::PersistenceError;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Aplica las migraciones pendientes; devuelve cuántas se aplicaron.
pub fn run_pending_migrations(conn: &mut PgConnection) -> Result<usize, PersistenceError> {
    let applied = conn.run_pending_migrations(MIGRATIONS)
                      .map_err(|e| PersistenceError::Unknown(format!("migration error: {e}")))?;
    debug!("migrations:applied count={}", applied.len());
    Ok(applied.len())
}

/// Abre una conexión directa (sin pool) y aplica las migraciones pendientes.
pub fn migrate_url(database_url: &str) -> Result<usize, PersistenceError> {
    let mut conn = PgConnection::establish(database_url)
        .map_err(|e| PersistenceError::TransientIo(format!("connect for migrations: {e}")))?;
    run_pending_migrations(&mut conn)
}
