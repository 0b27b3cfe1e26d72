use std::sync::Arc;

use log::{debug, warn};

use super::EventRecord;
use crate::clock::Clock;
use crate::errors::FlywheelError;
use crate::store::Store;

/// Consumidor final de eventos del outbox.
pub trait EventHandler {
    fn handle(&self, event: &EventRecord) -> Result<(), FlywheelError>;
}

impl<F> EventHandler for F where F: Fn(&EventRecord) -> Result<(), FlywheelError>
{
    fn handle(&self, event: &EventRecord) -> Result<(), FlywheelError> {
        self(event)
    }
}

/// Drena el outbox hacia un `EventHandler`.
///
/// Entrega al-menos-una-vez: lectura, entrega y marcado ocurren en la misma
/// unidad de trabajo; si el handler falla se revierte y los registros quedan
/// pendientes para el siguiente `drain`.
pub struct OutboxDispatcher<S: Store> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S: Store> OutboxDispatcher<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Entrega hasta `limit` eventos pendientes en orden de id; devuelve
    /// cuántos se marcaron como despachados.
    ///
    /// El handler corre dentro de la unidad de trabajo del drenado: no debe
    /// abrir otra sobre el mismo store (`InMemoryStore` lo rechaza con
    /// `Internal`; en Postgres usaría otra conexión del pool).
    pub fn drain<H: EventHandler + ?Sized>(&self, handler: &H, limit: usize) -> Result<usize, FlywheelError> {
        if limit == 0 {
            return Ok(0);
        }
        let now = self.clock.now();
        let delivered = self.store.run(|uow| {
                                      let pending = uow.pending_outbox(limit)?;
                                      for event in &pending {
                                          handler.handle(event)?;
                                          let affected = uow.mark_outbox_dispatched(event.id, now)?;
                                          FlywheelError::expect_affected(1, affected)?;
                                      }
                                      Ok(pending.len())
                                  });
        match &delivered {
            Ok(n) => debug!("outbox:drain delivered={n}"),
            Err(e) => warn!("outbox:drain aborted err={e}"),
        }
        delivered
    }
}
