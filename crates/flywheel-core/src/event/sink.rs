use std::sync::Arc;

use log::debug;

use super::EventRecord;
use crate::errors::FlywheelError;
use crate::store::UnitOfWork;

/// Receptor de eventos del motor.
///
/// Se invoca dentro de la unidad de trabajo en curso: un error aborta la
/// transacción completa y ningún evento de una transacción revertida llega a
/// publicarse.
pub trait EventSink: Send + Sync {
    fn emit(&self, uow: &mut dyn UnitOfWork, event: &EventRecord) -> Result<(), FlywheelError>;
}

impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    fn emit(&self, uow: &mut dyn UnitOfWork, event: &EventRecord) -> Result<(), FlywheelError> {
        (**self).emit(uow, event)
    }
}

/// Sink de producción: escribe el evento en la tabla outbox.
#[derive(Debug, Default, Clone, Copy)]
pub struct OutboxEventSink;

impl EventSink for OutboxEventSink {
    fn emit(&self, uow: &mut dyn UnitOfWork, event: &EventRecord) -> Result<(), FlywheelError> {
        debug!("outbox:append id={} source={} category={}", event.id, event.source_id, event.category);
        uow.append_outbox(event)
    }
}
