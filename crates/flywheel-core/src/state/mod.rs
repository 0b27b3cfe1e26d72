//! Máquina de estados de un workflow (tipo valor).
//!
//! Los estados se mantienen en orden de presentación; las transiciones se
//! identifican por el par `(from, to)` y su nombre es sólo una etiqueta.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::FlywheelError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StateCategory {
    InBacklog,
    InProcess,
    Done,
}

impl StateCategory {
    /// Representación estable (persistencia y borde).
    pub fn as_str(&self) -> &'static str {
        match self {
            StateCategory::InBacklog => "IN_BACKLOG",
            StateCategory::InProcess => "IN_PROCESS",
            StateCategory::Done => "DONE",
        }
    }
}

impl fmt::Display for StateCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StateCategory {
    type Err = FlywheelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IN_BACKLOG" => Ok(StateCategory::InBacklog),
            "IN_PROCESS" => Ok(StateCategory::InProcess),
            "DONE" => Ok(StateCategory::Done),
            other => Err(FlywheelError::BadParam(format!("unknown state category: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    pub name: String,
    pub category: StateCategory,
    #[serde(default)]
    pub order: i32,
}

impl State {
    pub fn new(name: impl Into<String>, category: StateCategory) -> Self {
        Self { name: name.into(),
               category,
               order: 0 }
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    #[serde(default)]
    pub name: String,
    pub from: String,
    pub to: String,
}

impl Transition {
    pub fn new(name: impl Into<String>, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self { name: name.into(),
               from: from.into(),
               to: to.into() }
    }

    pub fn between(from: impl Into<String>, to: impl Into<String>) -> Self {
        let from = from.into();
        let to = to.into();
        Self { name: format!("{from} -> {to}"),
               from,
               to }
    }

    pub fn connects(&self, from: &str, to: &str) -> bool {
        self.from == from && self.to == to
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateMachine {
    #[serde(default)]
    pub states: Vec<State>,
    #[serde(default)]
    pub transitions: Vec<Transition>,
}

impl StateMachine {
    pub fn new(states: Vec<State>, transitions: Vec<Transition>) -> Self {
        Self { states, transitions }
    }

    /// Búsqueda exacta (sensible a mayúsculas).
    pub fn find_state(&self, name: &str) -> Option<&State> {
        self.states.iter().find(|s| s.name == name)
    }

    pub fn available_transitions(&self, from: &str, to: &str) -> Vec<&Transition> {
        self.transitions.iter().filter(|t| t.connects(from, to)).collect()
    }

    /// Estados alcanzables en un paso desde `from`.
    pub fn next_states(&self, from: &str) -> Vec<&State> {
        self.transitions
            .iter()
            .filter(|t| t.from == from)
            .filter_map(|t| self.find_state(&t.to))
            .collect()
    }

    /// Re-estampa el `order` según la posición: `base + index + 1`.
    pub fn restamp_orders(&mut self, base: i32) {
        for (idx, state) in self.states.iter_mut().enumerate() {
            state.order = base + idx as i32 + 1;
        }
    }

    /// Verifica integridad referencial y unicidad.
    ///
    /// - nombres de estado únicos (`StateExisted`),
    /// - extremos de cada transición conocidos (`UnknownState`),
    /// - pares `(from, to)` únicos (`TransitionExisted`).
    pub fn validate(&self) -> Result<(), FlywheelError> {
        let mut names = HashSet::new();
        for s in &self.states {
            if !names.insert(s.name.as_str()) {
                return Err(FlywheelError::StateExisted(s.name.clone()));
            }
        }
        let mut pairs = HashSet::new();
        for t in &self.transitions {
            for endpoint in [&t.from, &t.to] {
                if !names.contains(endpoint.as_str()) {
                    return Err(FlywheelError::UnknownState(endpoint.clone()));
                }
            }
            if !pairs.insert((t.from.as_str(), t.to.as_str())) {
                return Err(FlywheelError::TransitionExisted { from: t.from.clone(),
                                                              to: t.to.clone() });
            }
        }
        Ok(())
    }
}
