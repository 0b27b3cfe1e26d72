use flywheel_persistence::PersistenceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Variable de entorno requerida no definida: {0}")]
    Missing(&'static str),
    #[error("Valor inválido para {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
    #[error("Error de persistencia: {0}")]
    Persistence(#[from] PersistenceError),
}
