//! Constantes del motor.

/// Base para re-estampar el `order` de los estados al crear un workflow:
/// el estado en la posición `i` recibe `STATE_ORDER_BASE + i + 1`.
pub const STATE_ORDER_BASE: i32 = 10000;

/// Rol que habilita la administración de un proyecto (`manager_<projectId>`).
pub const PROJECT_ROLE_MANAGER: &str = "manager";

/// Nombre de la propiedad reportada cuando cambia el estado de un work.
pub const PROPERTY_STATE_NAME: &str = "StateName";

/// Tipo de fuente de los eventos emitidos por el motor.
pub const EVENT_SOURCE_WORK: &str = "WORK";

/// Categoría de evento para cambios de propiedades.
pub const EVENT_CATEGORY_PROPERTY_UPDATED: &str = "PropertyUpdated";
