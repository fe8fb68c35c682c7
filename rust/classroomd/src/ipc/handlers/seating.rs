use rusqlite::Connection;
use serde_json::{json, Value};

use crate::actor::{Actor, Role};
use crate::error::{CoreError, CoreResult};
use crate::grid::Seat;
use crate::ipc::helpers::{get_required_i64, get_required_str, with_actor};
use crate::ipc::types::{AppState, Request};
use crate::records::{self, ClassRoom};
use crate::seating;

fn owned_classroom(conn: &Connection, actor: &Actor, classroom_id: &str) -> CoreResult<ClassRoom> {
    let classroom = records::get_classroom(conn, classroom_id)?;
    actor.require_classroom_teacher(&classroom)?;
    Ok(classroom)
}

/// Resolves a plan to its classroom and checks the actor may edit it.
fn owned_plan(conn: &Connection, actor: &Actor, plan_id: &str) -> CoreResult<seating::SeatingPlan> {
    let plan = seating::get_plan(conn, plan_id)?;
    owned_classroom(conn, actor, &plan.classroom_id)?;
    Ok(plan)
}

fn view(conn: &Connection, actor: &Actor, params: &Value) -> CoreResult<Value> {
    let classroom_id = get_required_str(params, "classroomId")?;
    let classroom = records::get_classroom(conn, &classroom_id)?;
    if actor.role == Role::Student {
        if !records::is_enrolled(conn, &actor.id, &classroom.subject_id)? {
            return Err(CoreError::permission_denied(
                "students may only view classrooms they attend",
            ));
        }
    } else {
        actor.require_classroom_teacher(&classroom)?;
    }
    Ok(json!(seating::view(conn, &classroom_id)?))
}

fn assign(conn: &Connection, actor: &Actor, params: &Value) -> CoreResult<Value> {
    let student_id = get_required_str(params, "studentId")?;
    let plan_id = get_required_str(params, "planId")?;
    let row = get_required_i64(params, "row")?;
    let column = get_required_i64(params, "column")?;
    owned_plan(conn, actor, &plan_id)?;
    let out = seating::assign_seat(conn, &plan_id, &student_id, Seat::new(row, column))?;
    Ok(json!({
        "message": format!("Updated seat assignment for {}", out.student.display_name()),
        "seat": out.seat,
        "previous": out.previous,
    }))
}

fn unassign(conn: &Connection, actor: &Actor, params: &Value) -> CoreResult<Value> {
    let student_id = get_required_str(params, "studentId")?;
    let plan_id = get_required_str(params, "planId")?;
    owned_plan(conn, actor, &plan_id)?;
    let out = seating::unassign(conn, &plan_id, &student_id)?;
    Ok(json!({
        "message": format!("Unassigned {} from their seat", out.student.display_name()),
        "seat": out.seat,
        "category": out.category,
    }))
}

fn randomize(conn: &Connection, actor: &Actor, params: &Value) -> CoreResult<Value> {
    let classroom_id = get_required_str(params, "classroomId")?;
    owned_classroom(conn, actor, &classroom_id)?;
    let out = seating::randomize(conn, &classroom_id)?;
    Ok(json!({
        "message": "Seating plan randomized successfully",
        "plan": out.plan,
        "seated": out.seated,
        "unseated": out.unseated,
    }))
}

fn save(conn: &Connection, actor: &Actor, params: &Value) -> CoreResult<Value> {
    let classroom_id = get_required_str(params, "classroomId")?;
    let plan_name = get_required_str(params, "planName")?;
    owned_classroom(conn, actor, &classroom_id)?;
    let plan = seating::save_as(conn, &classroom_id, &plan_name)?;
    Ok(json!({
        "message": format!("Seating plan \"{}\" saved successfully", plan.name),
        "plan": plan,
    }))
}

fn clear(conn: &Connection, actor: &Actor, params: &Value) -> CoreResult<Value> {
    let classroom_id = get_required_str(params, "classroomId")?;
    owned_classroom(conn, actor, &classroom_id)?;
    let cleared = seating::clear(conn, &classroom_id)?;
    Ok(json!({ "cleared": cleared }))
}

fn plans_list(conn: &Connection, actor: &Actor, params: &Value) -> CoreResult<Value> {
    let classroom_id = get_required_str(params, "classroomId")?;
    owned_classroom(conn, actor, &classroom_id)?;
    Ok(json!({ "plans": seating::list_plans(conn, &classroom_id)? }))
}

fn plans_activate(conn: &Connection, actor: &Actor, params: &Value) -> CoreResult<Value> {
    let plan_id = get_required_str(params, "planId")?;
    owned_plan(conn, actor, &plan_id)?;
    Ok(json!({ "plan": seating::activate_plan(conn, &plan_id)? }))
}

fn plans_delete(conn: &Connection, actor: &Actor, params: &Value) -> CoreResult<Value> {
    let plan_id = get_required_str(params, "planId")?;
    owned_plan(conn, actor, &plan_id)?;
    seating::delete_plan(conn, &plan_id)?;
    Ok(json!({ "deleted": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let body: fn(&Connection, &Actor, &Value) -> CoreResult<Value> = match req.method.as_str() {
        "seating.view" => view,
        "seating.assign" => assign,
        "seating.unassign" => unassign,
        "seating.randomize" => randomize,
        "seating.save" => save,
        "seating.clear" => clear,
        "seating.plans.list" => plans_list,
        "seating.plans.activate" => plans_activate,
        "seating.plans.delete" => plans_delete,
        _ => return None,
    };
    Some(with_actor(state, req, body))
}
