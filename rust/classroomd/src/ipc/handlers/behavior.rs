use chrono::Utc;
use rusqlite::Connection;
use serde_json::{json, Value};
use tracing::info;

use crate::actor::{Actor, Role};
use crate::db;
use crate::error::{CoreError, CoreResult};
use crate::idempotency::{self, Lookup};
use crate::ipc::helpers::{get_opt_i64, get_opt_str, get_required_str, with_actor};
use crate::ipc::types::{AppState, Request};
use crate::ledger::{self, BehaviorType, HistoryFilters, NewBehavior};
use crate::records;

const SUMMARY_LIMIT: i64 = 10;
const ACTIVITY_DATE_FORMAT: &str = "%b %d, %Y %I:%M %p";

/// `"Other"` plus a non-empty custom reason records the custom text.
fn resolve_reason(params: &Value) -> CoreResult<String> {
    let reason = get_required_str(params, "reason")?;
    let custom = get_opt_str(params, "customReason")?.unwrap_or_default();
    let chosen = if reason == "Other" && !custom.trim().is_empty() {
        custom
    } else {
        reason
    };
    let chosen = chosen.trim();
    if chosen.is_empty() {
        return Err(CoreError::validation("reason must not be empty"));
    }
    Ok(chosen.to_string())
}

/// Name stored in `recorded_by`: the teacher's display name when the actor
/// has a teacher record, otherwise the actor id.
fn recorder_name(conn: &Connection, actor: &Actor) -> CoreResult<String> {
    match records::get_teacher(conn, &actor.id) {
        Ok(t) => Ok(t.display_name),
        Err(CoreError::NotFound(_)) => Ok(actor.id.clone()),
        Err(e) => Err(e),
    }
}

fn record_points(
    conn: &Connection,
    actor: &Actor,
    params: &Value,
    method: &str,
    behavior_type: BehaviorType,
) -> CoreResult<Value> {
    if actor.role == Role::Student {
        return Err(CoreError::permission_denied(
            "students cannot record behaviour",
        ));
    }
    let student_id = get_required_str(params, "studentId")?;
    let classroom_id = get_opt_str(params, "classroomId")?;
    let raw_points = get_opt_i64(params, "points")?.unwrap_or(1);
    if raw_points == 0 || raw_points.unsigned_abs() > ledger::MAX_POINTS {
        return Err(CoreError::validation(format!(
            "points must be between 1 and {} in magnitude",
            ledger::MAX_POINTS
        )));
    }
    let points = match behavior_type {
        BehaviorType::Positive => raw_points,
        BehaviorType::Negative => -raw_points.abs(),
    };
    let description = resolve_reason(params)?;
    let key = get_opt_str(params, "idempotencyKey")?
        .map(|k| idempotency::validate_key(&k))
        .transpose()?;

    // Only admins may deduct outside a classroom.
    let classroom = match (&classroom_id, behavior_type) {
        (Some(id), _) => Some(records::get_classroom(conn, id)?),
        (None, BehaviorType::Negative) if actor.role == Role::Admin => None,
        (None, _) => {
            return Err(CoreError::bad_params("missing classroomId"));
        }
    };
    let student = records::get_student(conn, &student_id)?;
    if let Some(c) = &classroom {
        actor.require_classroom_teacher(c)?;
        if !records::is_enrolled(conn, &student_id, &c.subject_id)? {
            return Err(CoreError::validation(format!(
                "{} is not enrolled in this classroom's subject",
                student.display_name()
            )));
        }
    }
    let recorded_by = recorder_name(conn, actor)?;

    let tx = db::write_tx(conn)?;
    let hash = idempotency::payload_hash(params);
    if let Some(k) = &key {
        if let Lookup::Replay(previous) = idempotency::lookup(&tx, k, method, &hash)? {
            info!(method, student_id = %student_id, "idempotent replay");
            return Ok(previous);
        }
    }

    let record = ledger::record_behavior(
        &tx,
        &NewBehavior {
            student_id: &student_id,
            subject_id: classroom.as_ref().map(|c| c.subject_id.as_str()),
            behavior_type,
            points,
            description: &description,
            recorded_by: &recorded_by,
        },
    )?;
    let total_points = ledger::total_points(&tx, &student_id, None)?;
    let message = match behavior_type {
        BehaviorType::Positive => format!(
            "Awarded {} points to {}",
            points,
            student.display_name()
        ),
        BehaviorType::Negative => format!(
            "Deducted {} points from {}",
            points.abs(),
            student.display_name()
        ),
    };
    let response = json!({
        "behaviorId": record.id,
        "message": message,
        "totalPoints": total_points,
        "record": record,
    });
    if let Some(k) = &key {
        idempotency::store(&tx, k, method, &hash, &response)?;
    }
    tx.commit()?;

    info!(
        method,
        student_id = %student_id,
        points,
        total_points,
        "behaviour recorded"
    );
    Ok(response)
}

fn award(conn: &Connection, actor: &Actor, params: &Value) -> CoreResult<Value> {
    record_points(conn, actor, params, "behavior.award", BehaviorType::Positive)
}

fn deduct(conn: &Connection, actor: &Actor, params: &Value) -> CoreResult<Value> {
    record_points(conn, actor, params, "behavior.deduct", BehaviorType::Negative)
}

fn summary(conn: &Connection, actor: &Actor, params: &Value) -> CoreResult<Value> {
    let student_id = get_required_str(params, "studentId")?;
    actor.require_can_view_student(&student_id)?;
    let student = records::get_student(conn, &student_id)?;
    let total_points = ledger::total_points(conn, &student_id, None)?;
    let activities: Vec<Value> = ledger::recent_activity(conn, &student_id, SUMMARY_LIMIT)?
        .into_iter()
        .map(|r| {
            let date = db::parse_timestamp(&r.recorded_at)
                .map(|t| t.format(ACTIVITY_DATE_FORMAT).to_string())
                .unwrap_or_else(|| r.recorded_at.clone());
            json!({
                "points": r.points,
                "description": r.description,
                "date": date,
            })
        })
        .collect();
    Ok(json!({
        "student": student,
        "totalPoints": total_points,
        "activities": activities,
    }))
}

/// `"all"` and empty strings mean no filter.
fn opt_filter(params: &Value, key: &str) -> CoreResult<Option<String>> {
    Ok(get_opt_str(params, key)?
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && v != "all"))
}

fn history(conn: &Connection, actor: &Actor, params: &Value) -> CoreResult<Value> {
    let student_id = get_required_str(params, "studentId")?;
    actor.require_can_view_student(&student_id)?;

    let behavior_type = match opt_filter(params, "type")? {
        None => None,
        Some(t) => Some(BehaviorType::parse(&t).ok_or_else(|| {
            CoreError::validation("type must be positive, negative or all")
        })?),
    };
    let date_from = get_opt_str(params, "from")?;
    let date_to = get_opt_str(params, "to")?;
    let filters = HistoryFilters {
        subject_id: opt_filter(params, "subjectId")?,
        behavior_type,
        date_from: HistoryFilters::parse_date(date_from.as_deref(), "from")?,
        date_to: HistoryFilters::parse_date(date_to.as_deref(), "to")?,
    };
    let page = get_opt_i64(params, "page")?.unwrap_or(1);

    let result = ledger::history(conn, &student_id, &filters, page)?;
    let counts = ledger::type_counts(conn, &student_id)?;
    Ok(json!({
        "history": result,
        "stats": {
            "totalPoints": ledger::total_points(conn, &student_id, None)?,
            "positiveCount": counts.positive,
            "negativeCount": counts.negative,
            "rank": ledger::rank(conn, &student_id)?,
        },
        "chart": ledger::monthly_chart(conn, &student_id, Utc::now())?,
        "subjects": records::list_subjects(conn)?,
    }))
}

fn purge(conn: &Connection, actor: &Actor, params: &Value) -> CoreResult<Value> {
    actor.require_admin()?;
    let student_id = get_required_str(params, "studentId")?;
    let tx = db::write_tx(conn)?;
    let deleted = ledger::purge(&tx, &student_id)?;
    tx.commit()?;
    info!(student_id = %student_id, deleted, "behaviour history purged");
    Ok(json!({ "deleted": deleted }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let body: fn(&Connection, &Actor, &Value) -> CoreResult<Value> = match req.method.as_str() {
        "behavior.award" => award,
        "behavior.deduct" => deduct,
        "behavior.summary" => summary,
        "behavior.history" => history,
        "behavior.purge" => purge,
        _ => return None,
    };
    Some(with_actor(state, req, body))
}
