//! flywheel-core: motor de workflows y transiciones de work items.
//!
//! Contiene el dominio (máquina de estados, work items, process steps), los
//! puertos de persistencia (`Store` / `UnitOfWork`) y eventos (`EventSink`),
//! y los dos servicios principales:
//! - `WorkflowManager`: ciclo de vida de workflows y su máquina de estados.
//! - `WorkProcessEngine`: valida y aplica transiciones sobre work items.
//!
//! Todas las dependencias (store, sink, ids, reloj) se inyectan en la
//! construcción; no existen singletons de proceso.
pub mod clock;
pub mod constants;
pub mod errors;
pub mod event;
pub mod ids;
pub mod model;
pub mod session;
pub mod state;
pub mod store;
pub mod work;
pub mod workflow;

pub use clock::{Clock, FixedClock, SystemClock};
pub use errors::{ErrorBody, ErrorKind, FlywheelError};
pub use event::{EventHandler, EventRecord, EventSink, OutboxDispatcher, OutboxEventSink, PropertyUpdated};
pub use ids::{Id, IdProvider, SequentialIdProvider, SnowflakeIdWorker};
pub use model::{ProcessStep, StateTransitionLog, Work, Workflow, WorkflowDetail};
pub use session::{Identity, ProjectRole, Session};
pub use state::{State, StateCategory, StateMachine, Transition};
pub use store::memory::InMemoryStore;
pub use store::{Store, UnitOfWork};
pub use work::{WorkProcessEngine, WorkStateTransitionBrief};
pub use workflow::WorkflowManager;

/// Alias de resultado usado en todo el core.
pub type Result<T> = std::result::Result<T, FlywheelError>;
