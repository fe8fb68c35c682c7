//! Caller identity. Authentication happens upstream; requests arrive with an
//! already-verified actor and every operation checks it against the records
//! it touches.

use serde::Deserialize;

use crate::error::{CoreError, CoreResult};
use crate::records::ClassRoom;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Teacher,
    Student,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Actor {
    pub role: Role,
    pub id: String,
}

impl Actor {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_admin(&self) -> CoreResult<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(CoreError::permission_denied("administrator role required"))
        }
    }

    /// Admins, or the teacher who owns the classroom.
    pub fn require_classroom_teacher(&self, classroom: &ClassRoom) -> CoreResult<()> {
        match self.role {
            Role::Admin => Ok(()),
            Role::Teacher if classroom.teacher_id == self.id => Ok(()),
            Role::Teacher => Err(CoreError::permission_denied(
                "classroom belongs to another teacher",
            )),
            Role::Student => Err(CoreError::permission_denied(
                "students cannot change classroom records",
            )),
        }
    }

    /// Staff may read any student's behaviour; students only their own.
    pub fn require_can_view_student(&self, student_id: &str) -> CoreResult<()> {
        match self.role {
            Role::Admin | Role::Teacher => Ok(()),
            Role::Student if self.id == student_id => Ok(()),
            Role::Student => Err(CoreError::permission_denied(
                "students may only view their own records",
            )),
        }
    }
}

/// Reads `params.actor`. A missing or malformed actor is a permission error,
/// never an anonymous pass.
pub fn from_params(params: &serde_json::Value) -> CoreResult<Actor> {
    let Some(raw) = params.get("actor") else {
        return Err(CoreError::permission_denied("missing actor"));
    };
    let actor = Actor::deserialize(raw)
        .map_err(|e| CoreError::permission_denied(format!("invalid actor: {}", e)))?;
    if actor.id.trim().is_empty() {
        return Err(CoreError::permission_denied("actor id must not be empty"));
    }
    Ok(actor)
}
