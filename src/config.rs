//! Configuración central de la aplicación.
//! Carga variables de entorno (.env) una sola vez y produce un `AppConfig`
//! inmutable con la conexión a base de datos y el nodo del generador de ids.
use std::env;

use flywheel_persistence::config::{DEFAULT_MAX_CONNECTIONS, DEFAULT_MIN_CONNECTIONS};
use flywheel_persistence::{init_dotenv, DbConfig};

use crate::errors::ConfigError;

pub const DEFAULT_MACHINE_ID: u16 = 1;

/// Configuración global de la aplicación.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Configuración específica de base de datos.
    pub database: DbConfig,
    /// Nodo del generador de ids (`FLYWHEEL_MACHINE_ID`).
    pub machine_id: u16,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        init_dotenv();
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Igual que `from_env` pero leyendo de una fuente arbitraria.
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
        where F: Fn(&str) -> Option<String>
    {
        let url = lookup("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let min_connections = parse_or(&lookup, "DATABASE_MIN_CONNECTIONS", DEFAULT_MIN_CONNECTIONS)?;
        let max_connections = parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?;
        let machine_id = parse_or(&lookup, "FLYWHEEL_MACHINE_ID", DEFAULT_MACHINE_ID)?;
        Ok(Self { database: DbConfig { url,
                                       min_connections,
                                       max_connections },
                  machine_id })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
    where F: Fn(&str) -> Option<String>,
          T: std::str::FromStr
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim()
                        .parse()
                        .map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}
