//! Identificadores de 64 bits y sus generadores.
//!
//! `Id` se serializa como string decimal en el borde (JSON) y como `BIGINT`
//! en la base de datos.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use chrono::Utc;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::FlywheelError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Id(pub i64);

impl Id {
    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Id {
    fn from(v: i64) -> Self {
        Id(v)
    }
}

impl FromStr for Id {
    type Err = FlywheelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
         .parse::<i64>()
         .map(Id)
         .map_err(|e| FlywheelError::BadParam(format!("invalid id '{s}': {e}")))
    }
}

impl Serialize for Id {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

struct IdVisitor;

impl<'de> Visitor<'de> for IdVisitor {
    type Value = Id;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a 64-bit identifier as decimal string or integer")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Id, E> {
        Ok(Id(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Id, E> {
        i64::try_from(v).map(Id).map_err(|_| E::custom(format!("id out of range: {v}")))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Id, E> {
        v.parse::<Id>().map_err(E::custom)
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(IdVisitor)
    }
}

/// Fuente de identificadores únicos y monótonos dentro del proceso.
pub trait IdProvider: Send + Sync {
    fn next_id(&self) -> Id;
}

// Layout estilo sonyflake: 39 bits de tiempo (unidades de 10ms),
// 8 bits de secuencia, 16 bits de máquina. Siempre positivo.
const BITS_SEQUENCE: u32 = 8;
const BITS_MACHINE: u32 = 16;
const SEQUENCE_MASK: i64 = (1 << BITS_SEQUENCE) - 1;
const TIME_UNIT_MS: i64 = 10;
/// 2014-09-01T00:00:00Z en milisegundos.
const DEFAULT_EPOCH_MS: i64 = 1_409_529_600_000;

struct WorkerState {
    elapsed: i64,
    sequence: i64,
}

/// Generador distribuible de ids: tiempo + secuencia + id de máquina.
///
/// Si el reloj retrocede o la secuencia se agota dentro de la misma unidad
/// de tiempo, el tiempo lógico avanza en vez de bloquear, manteniendo la
/// monotonicidad.
pub struct SnowflakeIdWorker {
    machine_id: u16,
    epoch_ms: i64,
    state: Mutex<WorkerState>,
}

impl SnowflakeIdWorker {
    pub fn new(machine_id: u16) -> Self {
        Self::with_epoch(machine_id, DEFAULT_EPOCH_MS)
    }

    pub fn with_epoch(machine_id: u16, epoch_ms: i64) -> Self {
        Self { machine_id,
               epoch_ms,
               state: Mutex::new(WorkerState { elapsed: 0, sequence: 0 }) }
    }

    fn current_elapsed(&self) -> i64 {
        (Utc::now().timestamp_millis() - self.epoch_ms).max(0) / TIME_UNIT_MS
    }
}

impl IdProvider for SnowflakeIdWorker {
    fn next_id(&self) -> Id {
        let current = self.current_elapsed();
        let mut st = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if st.elapsed < current {
            st.elapsed = current;
            st.sequence = 0;
        } else {
            st.sequence = (st.sequence + 1) & SEQUENCE_MASK;
            if st.sequence == 0 {
                st.elapsed += 1;
            }
        }
        Id((st.elapsed << (BITS_SEQUENCE + BITS_MACHINE)) | (st.sequence << BITS_MACHINE) | i64::from(self.machine_id))
    }
}

/// Generador secuencial (tests y herramientas locales).
pub struct SequentialIdProvider {
    next: AtomicI64,
}

impl SequentialIdProvider {
    pub fn starting_at(first: i64) -> Self {
        Self { next: AtomicI64::new(first) }
    }
}

impl Default for SequentialIdProvider {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

impl IdProvider for SequentialIdProvider {
    fn next_id(&self) -> Id {
        Id(self.next.fetch_add(1, Ordering::SeqCst))
    }
}
