//! Contexto de sesión y compuerta de autorización.
//!
//! En el borde los roles llegan como strings `"<rol>_<projectId>"`; se
//! parsean una única vez a pares `(rol, project_id)`. El sufijo debe ser el
//! id en forma decimal canónica (`member_04` no es un rol del proyecto 4).
//! Los strings sin ese sufijo no otorgan acceso a ningún proyecto y se
//! descartan.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::constants::PROJECT_ROLE_MANAGER;
use crate::errors::FlywheelError;
use crate::ids::Id;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: Id,
    pub nickname: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectRole {
    pub role: String,
    pub project_id: Id,
}

impl ProjectRole {
    /// Parsea `"<rol>_<projectId>"` separando por el último `_`; el rol
    /// puede quedar vacío (`"_4"`).
    pub fn parse(raw: &str) -> Option<Self> {
        let (role, project) = raw.rsplit_once('_')?;
        let project_id = project.parse::<i64>().ok()?;
        if project_id.to_string() != project {
            return None;
        }
        Some(Self { role: role.to_string(),
                    project_id: Id(project_id) })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub identity: Identity,
    pub roles: Vec<ProjectRole>,
}

impl Session {
    pub fn new(identity: Identity, roles: Vec<ProjectRole>) -> Self {
        Self { identity, roles }
    }

    pub fn from_role_strings<I, S>(identity: Identity, raw_roles: I) -> Self
        where I: IntoIterator<Item = S>,
              S: AsRef<str>
    {
        let roles = raw_roles.into_iter()
                             .filter_map(|raw| ProjectRole::parse(raw.as_ref().trim()))
                             .collect();
        Self { identity, roles }
    }

    /// El caller tiene algún rol sobre el proyecto.
    pub fn may_access(&self, project_id: Id) -> bool {
        self.roles.iter().any(|r| r.project_id == project_id)
    }

    /// El caller es manager del proyecto.
    pub fn may_manage(&self, project_id: Id) -> bool {
        self.roles.iter().any(|r| r.project_id == project_id && r.role == PROJECT_ROLE_MANAGER)
    }

    pub fn visible_projects(&self) -> BTreeSet<Id> {
        self.roles.iter().map(|r| r.project_id).collect()
    }

    pub fn require_access(&self, project_id: Id) -> Result<(), FlywheelError> {
        if self.may_access(project_id) {
            Ok(())
        } else {
            Err(FlywheelError::Forbidden)
        }
    }

    pub fn require_manage(&self, project_id: Id) -> Result<(), FlywheelError> {
        if self.may_manage(project_id) {
            Ok(())
        } else {
            Err(FlywheelError::Forbidden)
        }
    }
}
