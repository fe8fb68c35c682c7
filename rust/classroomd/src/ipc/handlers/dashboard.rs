use rusqlite::Connection;
use serde_json::{json, Value};

use crate::actor::{Actor, Role};
use crate::dashboard;
use crate::error::{CoreError, CoreResult};
use crate::ipc::helpers::{get_opt_str, get_required_str, with_actor};
use crate::ipc::types::{AppState, Request};

/// Teachers get their own overview; admins name the teacher.
fn teacher(conn: &Connection, actor: &Actor, params: &Value) -> CoreResult<Value> {
    let requested = get_opt_str(params, "teacherId")?;
    let teacher_id = match actor.role {
        Role::Admin => requested.ok_or_else(|| CoreError::bad_params("missing teacherId"))?,
        Role::Teacher => match requested {
            Some(id) if id != actor.id => {
                return Err(CoreError::permission_denied(
                    "teachers may only view their own overview",
                ));
            }
            _ => actor.id.clone(),
        },
        Role::Student => {
            return Err(CoreError::permission_denied("staff role required"));
        }
    };
    Ok(json!(dashboard::teacher_overview(conn, &teacher_id)?))
}

fn student(conn: &Connection, actor: &Actor, params: &Value) -> CoreResult<Value> {
    let student_id = get_required_str(params, "studentId")?;
    actor.require_can_view_student(&student_id)?;
    Ok(json!(dashboard::student_dashboard(conn, &student_id)?))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let body: fn(&Connection, &Actor, &Value) -> CoreResult<Value> = match req.method.as_str() {
        "dashboard.teacher" => teacher,
        "dashboard.student" => student,
        _ => return None,
    };
    Some(with_actor(state, req, body))
}
