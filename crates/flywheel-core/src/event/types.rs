//! Tipos de evento.
//!
//! Un `EventRecord` se escribe en el outbox dentro de la misma unidad de
//! trabajo que produjo el cambio; `dispatch_time` queda vacío hasta que el
//! dispatcher lo entrega.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::Id;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyUpdated {
    pub property_name: String,
    pub property_desc: String,
    pub old_value: String,
    pub old_value_desc: String,
    pub new_value: String,
    pub new_value_desc: String,
}

impl PropertyUpdated {
    /// Cambio de una propiedad cuyo valor y descripción coinciden.
    pub fn plain(property: &str, old_value: &str, new_value: &str) -> Self {
        Self { property_name: property.to_string(),
               property_desc: property.to_string(),
               old_value: old_value.to_string(),
               old_value_desc: old_value.to_string(),
               new_value: new_value.to_string(),
               new_value_desc: new_value.to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub id: Id,
    pub source_id: Id,
    pub source_type: String,
    pub source_desc: String,
    pub category: String,
    pub updated_properties: Vec<PropertyUpdated>,
    pub creator_id: Id,
    pub creator_name: String,
    pub create_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatch_time: Option<DateTime<Utc>>,
}
