use rusqlite::Connection;
use serde_json::{json, Value};
use tracing::info;

use crate::actor::{Actor, Role};
use crate::db;
use crate::error::{CoreError, CoreResult};
use crate::ipc::helpers::{get_opt_f64, get_opt_str, get_required_i64, get_required_str, with_actor};
use crate::ipc::types::{AppState, Request};
use crate::records::{self, NewClassRoom, NewStudent, StudentUpdate};

fn require_staff(actor: &Actor) -> CoreResult<()> {
    match actor.role {
        Role::Admin | Role::Teacher => Ok(()),
        Role::Student => Err(CoreError::permission_denied("staff role required")),
    }
}

fn subjects_create(conn: &Connection, actor: &Actor, params: &Value) -> CoreResult<Value> {
    actor.require_admin()?;
    let name = get_required_str(params, "name")?;
    let teacher_name = get_opt_str(params, "teacherName")?.unwrap_or_default();
    let tx = db::write_tx(conn)?;
    let subject = records::create_subject(&tx, &name, &teacher_name)?;
    tx.commit()?;
    info!(subject_id = %subject.id, "subject created");
    Ok(json!({ "subject": subject }))
}

fn subjects_list(conn: &Connection, _actor: &Actor, _params: &Value) -> CoreResult<Value> {
    Ok(json!({ "subjects": records::list_subjects(conn)? }))
}

fn teachers_create(conn: &Connection, actor: &Actor, params: &Value) -> CoreResult<Value> {
    actor.require_admin()?;
    let display_name = get_required_str(params, "displayName")?;
    let department = get_opt_str(params, "department")?.unwrap_or_default();
    let office = get_opt_str(params, "office")?.unwrap_or_default();
    let tx = db::write_tx(conn)?;
    let teacher = records::create_teacher(&tx, &display_name, &department, &office)?;
    tx.commit()?;
    info!(teacher_id = %teacher.id, "teacher created");
    Ok(json!({ "teacher": teacher }))
}

fn teachers_list(conn: &Connection, _actor: &Actor, _params: &Value) -> CoreResult<Value> {
    Ok(json!({ "teachers": records::list_teachers(conn)? }))
}

fn students_create(conn: &Connection, actor: &Actor, params: &Value) -> CoreResult<Value> {
    actor.require_admin()?;
    let new = NewStudent {
        username: get_required_str(params, "username")?,
        first_name: get_opt_str(params, "firstName")?.unwrap_or_default(),
        last_name: get_opt_str(params, "lastName")?.unwrap_or_default(),
        date_of_birth: get_opt_str(params, "dateOfBirth")?,
    };
    let tx = db::write_tx(conn)?;
    let student = records::create_student(&tx, &new)?;
    tx.commit()?;
    info!(student_id = %student.id, "student created");
    Ok(json!({ "student": student }))
}

fn students_get(conn: &Connection, actor: &Actor, params: &Value) -> CoreResult<Value> {
    let student_id = get_required_str(params, "studentId")?;
    actor.require_can_view_student(&student_id)?;
    Ok(json!({ "student": records::get_student(conn, &student_id)? }))
}

fn students_list(conn: &Connection, actor: &Actor, _params: &Value) -> CoreResult<Value> {
    require_staff(actor)?;
    Ok(json!({ "students": records::list_students(conn)? }))
}

fn students_update(conn: &Connection, actor: &Actor, params: &Value) -> CoreResult<Value> {
    actor.require_admin()?;
    let student_id = get_required_str(params, "studentId")?;
    let update = StudentUpdate {
        first_name: get_opt_str(params, "firstName")?,
        last_name: get_opt_str(params, "lastName")?,
        date_of_birth: get_opt_str(params, "dateOfBirth")?,
    };
    let tx = db::write_tx(conn)?;
    let student = records::update_student(&tx, &student_id, &update)?;
    tx.commit()?;
    Ok(json!({ "student": student }))
}

fn students_delete(conn: &Connection, actor: &Actor, params: &Value) -> CoreResult<Value> {
    actor.require_admin()?;
    let student_id = get_required_str(params, "studentId")?;
    let tx = db::write_tx(conn)?;
    records::delete_student(&tx, &student_id)?;
    tx.commit()?;
    info!(student_id = %student_id, "student deleted");
    Ok(json!({ "deleted": true }))
}

fn enrollments_set(conn: &Connection, actor: &Actor, params: &Value) -> CoreResult<Value> {
    actor.require_admin()?;
    let student_id = get_required_str(params, "studentId")?;
    let subject_id = get_required_str(params, "subjectId")?;
    let grade = get_opt_f64(params, "grade")?;
    let tx = db::write_tx(conn)?;
    let enrollment = records::set_enrollment(&tx, &student_id, &subject_id, grade)?;
    tx.commit()?;
    Ok(json!({ "enrollment": enrollment }))
}

fn enrollments_delete(conn: &Connection, actor: &Actor, params: &Value) -> CoreResult<Value> {
    actor.require_admin()?;
    let student_id = get_required_str(params, "studentId")?;
    let subject_id = get_required_str(params, "subjectId")?;
    let tx = db::write_tx(conn)?;
    records::delete_enrollment(&tx, &student_id, &subject_id)?;
    tx.commit()?;
    Ok(json!({ "deleted": true }))
}

fn enrollments_list(conn: &Connection, actor: &Actor, params: &Value) -> CoreResult<Value> {
    let student_id = get_required_str(params, "studentId")?;
    actor.require_can_view_student(&student_id)?;
    records::get_student(conn, &student_id)?;
    Ok(json!({ "enrollments": records::enrollments_for_student(conn, &student_id)? }))
}

fn classrooms_create(conn: &Connection, actor: &Actor, params: &Value) -> CoreResult<Value> {
    actor.require_admin()?;
    let new = NewClassRoom {
        name: get_required_str(params, "name")?,
        subject_id: get_required_str(params, "subjectId")?,
        teacher_id: get_required_str(params, "teacherId")?,
        rows: get_required_i64(params, "rows")?,
        columns: get_required_i64(params, "columns")?,
    };
    let tx = db::write_tx(conn)?;
    let classroom = records::create_classroom(&tx, &new)?;
    tx.commit()?;
    info!(classroom_id = %classroom.id, rows = classroom.rows, columns = classroom.columns, "classroom created");
    Ok(json!({ "classroom": classroom }))
}

fn classrooms_get(conn: &Connection, _actor: &Actor, params: &Value) -> CoreResult<Value> {
    let classroom_id = get_required_str(params, "classroomId")?;
    Ok(json!({ "classroom": records::get_classroom(conn, &classroom_id)? }))
}

/// Teachers see their own classrooms unless they ask for another teacher's.
fn classrooms_list(conn: &Connection, actor: &Actor, params: &Value) -> CoreResult<Value> {
    let teacher_id = match get_opt_str(params, "teacherId")? {
        Some(t) => Some(t),
        None if actor.role == Role::Teacher => Some(actor.id.clone()),
        None => None,
    };
    Ok(json!({ "classrooms": records::list_classrooms(conn, teacher_id.as_deref())? }))
}

fn classrooms_delete(conn: &Connection, actor: &Actor, params: &Value) -> CoreResult<Value> {
    actor.require_admin()?;
    let classroom_id = get_required_str(params, "classroomId")?;
    let tx = db::write_tx(conn)?;
    records::delete_classroom(&tx, &classroom_id)?;
    tx.commit()?;
    info!(classroom_id = %classroom_id, "classroom deleted");
    Ok(json!({ "deleted": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let body: fn(&Connection, &Actor, &Value) -> CoreResult<Value> = match req.method.as_str() {
        "subjects.create" => subjects_create,
        "subjects.list" => subjects_list,
        "teachers.create" => teachers_create,
        "teachers.list" => teachers_list,
        "students.create" => students_create,
        "students.get" => students_get,
        "students.list" => students_list,
        "students.update" => students_update,
        "students.delete" => students_delete,
        "enrollments.set" => enrollments_set,
        "enrollments.delete" => enrollments_delete,
        "enrollments.list" => enrollments_list,
        "classrooms.create" => classrooms_create,
        "classrooms.get" => classrooms_get,
        "classrooms.list" => classrooms_list,
        "classrooms.delete" => classrooms_delete,
        _ => return None,
    };
    Some(with_actor(state, req, body))
}
