//! Eventos emitidos por el motor y su entrega transaccional (outbox).

mod dispatcher;
mod sink;
mod types;

pub use dispatcher::{EventHandler, OutboxDispatcher};
pub use sink::{EventSink, OutboxEventSink};
pub use types::{EventRecord, PropertyUpdated};
