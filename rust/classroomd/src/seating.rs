//! Seating plans per classroom.
//!
//! A classroom has no plan until the first randomize, then exactly one
//! active plan that teachers edit in place, plus any number of inactive
//! snapshots made with `save_as`. Every mutation runs inside an immediate
//! write transaction; the grid is loaded, checked in memory, and only the
//! resulting row changes are written.

use rand::seq::SliceRandom;
use rand::Rng;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;
use std::collections::HashSet;
use tracing::info;

use crate::category::{self, Category, Thresholds};
use crate::db;
use crate::error::{CoreError, CoreResult};
use crate::grid::{Seat, SeatingGrid};
use crate::ledger;
use crate::records::{self, ClassRoom, Student};

pub const RANDOMIZED_PLAN_NAME: &str = "Randomized Plan";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatingPlan {
    pub id: String,
    pub classroom_id: String,
    pub name: String,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

const PLAN_COLUMNS: &str = "id, classroom_id, name, is_active, created_at, updated_at";

fn plan_from_row(r: &Row<'_>) -> rusqlite::Result<SeatingPlan> {
    Ok(SeatingPlan {
        id: r.get(0)?,
        classroom_id: r.get(1)?,
        name: r.get(2)?,
        is_active: r.get::<_, i64>(3)? != 0,
        created_at: r.get(4)?,
        updated_at: r.get(5)?,
    })
}

pub fn get_active_plan(conn: &Connection, classroom_id: &str) -> CoreResult<Option<SeatingPlan>> {
    let sql = format!(
        "SELECT {} FROM seating_plans WHERE classroom_id = ? AND is_active = 1",
        PLAN_COLUMNS
    );
    Ok(conn
        .query_row(&sql, [classroom_id], plan_from_row)
        .optional()?)
}

fn require_active_plan(conn: &Connection, classroom_id: &str) -> CoreResult<SeatingPlan> {
    get_active_plan(conn, classroom_id)?
        .ok_or_else(|| CoreError::not_found("classroom has no active seating plan"))
}

pub fn get_plan(conn: &Connection, plan_id: &str) -> CoreResult<SeatingPlan> {
    let sql = format!("SELECT {} FROM seating_plans WHERE id = ?", PLAN_COLUMNS);
    conn.query_row(&sql, [plan_id], plan_from_row)
        .optional()?
        .ok_or_else(|| CoreError::not_found("seating plan not found"))
}

/// Plans for a classroom, active plan first, then newest first.
pub fn list_plans(conn: &Connection, classroom_id: &str) -> CoreResult<Vec<SeatingPlan>> {
    records::get_classroom(conn, classroom_id)?;
    let sql = format!(
        "SELECT {} FROM seating_plans
         WHERE classroom_id = ?
         ORDER BY is_active DESC, created_at DESC, rowid DESC",
        PLAN_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([classroom_id], plan_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn insert_plan(
    conn: &Connection,
    classroom_id: &str,
    name: &str,
    is_active: bool,
) -> CoreResult<SeatingPlan> {
    let now = db::now_timestamp();
    let plan = SeatingPlan {
        id: db::new_id(),
        classroom_id: classroom_id.to_string(),
        name: name.to_string(),
        is_active,
        created_at: now.clone(),
        updated_at: now,
    };
    conn.execute(
        "INSERT INTO seating_plans(id, classroom_id, name, is_active, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &plan.id,
            &plan.classroom_id,
            &plan.name,
            plan.is_active as i64,
            &plan.created_at,
            &plan.updated_at,
        ),
    )?;
    Ok(plan)
}

fn touch_plan(conn: &Connection, plan_id: &str) -> CoreResult<()> {
    conn.execute(
        "UPDATE seating_plans SET updated_at = ? WHERE id = ?",
        (db::now_timestamp(), plan_id),
    )?;
    Ok(())
}

/// Rebuilds the in-memory grid for a plan from its stored assignments.
pub fn load_grid(conn: &Connection, plan_id: &str, classroom: &ClassRoom) -> CoreResult<SeatingGrid> {
    let mut grid = SeatingGrid::new(classroom.rows, classroom.columns)?;
    let mut stmt = conn.prepare(
        "SELECT student_id, seat_row, seat_col FROM seat_assignments
         WHERE plan_id = ?
         ORDER BY seat_row, seat_col",
    )?;
    let rows = stmt
        .query_map([plan_id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, i64>(1)?,
                r.get::<_, i64>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    for (student_id, row, column) in rows {
        grid.place(&student_id, Seat::new(row, column))?;
    }
    Ok(grid)
}

fn write_assignments(conn: &Connection, plan_id: &str, grid: &SeatingGrid) -> CoreResult<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO seat_assignments(id, plan_id, student_id, seat_row, seat_col)
         VALUES(?, ?, ?, ?, ?)",
    )?;
    for (seat, student_id) in grid.occupants() {
        stmt.execute((db::new_id(), plan_id, student_id, seat.row, seat.column))?;
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RandomizeOutcome {
    pub plan: SeatingPlan,
    pub seated: usize,
    pub unseated: Vec<String>,
}

pub fn randomize(conn: &Connection, classroom_id: &str) -> CoreResult<RandomizeOutcome> {
    randomize_with(conn, classroom_id, &mut rand::rng())
}

/// Reshuffles the enrolled students into the active plan, creating the plan
/// on first use. Students beyond the grid's capacity stay unseated.
pub fn randomize_with<R: Rng + ?Sized>(
    conn: &Connection,
    classroom_id: &str,
    rng: &mut R,
) -> CoreResult<RandomizeOutcome> {
    let tx = db::write_tx(conn)?;
    let classroom = records::get_classroom(&tx, classroom_id)?;
    let plan = match get_active_plan(&tx, classroom_id)? {
        Some(p) => {
            tx.execute("DELETE FROM seat_assignments WHERE plan_id = ?", [&p.id])?;
            touch_plan(&tx, &p.id)?;
            p
        }
        None => insert_plan(&tx, classroom_id, RANDOMIZED_PLAN_NAME, true)?,
    };

    let mut students: Vec<String> = records::enrolled_students(&tx, &classroom.subject_id)?
        .into_iter()
        .map(|s| s.id)
        .collect();
    students.shuffle(rng);

    let mut grid = SeatingGrid::new(classroom.rows, classroom.columns)?;
    let unseated = grid.fill_row_major(students);
    write_assignments(&tx, &plan.id, &grid)?;
    let plan = get_plan(&tx, &plan.id)?;
    tx.commit()?;

    info!(
        classroom_id,
        plan_id = %plan.id,
        seated = grid.occupied_count(),
        unseated = unseated.len(),
        "seating randomized"
    );
    Ok(RandomizeOutcome {
        plan,
        seated: grid.occupied_count(),
        unseated,
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignOutcome {
    pub student: Student,
    pub seat: Seat,
    pub previous: Option<Seat>,
}

/// Puts a student at a seat of the plan, moving them if they already sit
/// elsewhere. The seat must be empty or already theirs.
pub fn assign_seat(
    conn: &Connection,
    plan_id: &str,
    student_id: &str,
    seat: Seat,
) -> CoreResult<AssignOutcome> {
    let tx = db::write_tx(conn)?;
    let plan = get_plan(&tx, plan_id)?;
    let classroom = records::get_classroom(&tx, &plan.classroom_id)?;
    let student = records::get_student(&tx, student_id)?;
    if !records::is_enrolled(&tx, student_id, &classroom.subject_id)? {
        return Err(CoreError::validation(format!(
            "{} is not enrolled in this classroom's subject",
            student.display_name()
        )));
    }

    let mut grid = load_grid(&tx, &plan.id, &classroom)?;
    let previous = grid.move_to(student_id, seat)?;
    match previous {
        Some(prev) if prev == seat => {}
        Some(_) => {
            tx.execute(
                "UPDATE seat_assignments SET seat_row = ?, seat_col = ?
                 WHERE plan_id = ? AND student_id = ?",
                (seat.row, seat.column, &plan.id, student_id),
            )?;
            touch_plan(&tx, &plan.id)?;
        }
        None => {
            tx.execute(
                "INSERT INTO seat_assignments(id, plan_id, student_id, seat_row, seat_col)
                 VALUES(?, ?, ?, ?, ?)",
                (db::new_id(), &plan.id, student_id, seat.row, seat.column),
            )?;
            touch_plan(&tx, &plan.id)?;
        }
    }
    tx.commit()?;

    info!(plan_id, student_id, row = seat.row, column = seat.column, "seat assigned");
    Ok(AssignOutcome {
        student,
        seat,
        previous,
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnassignOutcome {
    pub student: Student,
    pub seat: Seat,
    pub category: Category,
}

/// Frees the student's seat and reports their category in the classroom's
/// cohort, so a caller can place them in the unassigned list.
pub fn unassign(conn: &Connection, plan_id: &str, student_id: &str) -> CoreResult<UnassignOutcome> {
    let tx = db::write_tx(conn)?;
    let plan = get_plan(&tx, plan_id)?;
    let classroom = records::get_classroom(&tx, &plan.classroom_id)?;
    let student = records::get_student(&tx, student_id)?;

    let mut grid = load_grid(&tx, &plan.id, &classroom)?;
    let Some(seat) = grid.remove(student_id) else {
        return Err(CoreError::not_found("Student is not assigned to any seat"));
    };
    tx.execute(
        "DELETE FROM seat_assignments WHERE plan_id = ? AND student_id = ?",
        (&plan.id, student_id),
    )?;
    touch_plan(&tx, &plan.id)?;

    let mut cohort = cohort_ids(&tx, &classroom, &grid)?;
    if !cohort.iter().any(|id| id == student_id) {
        cohort.push(student_id.to_string());
    }
    let totals = ledger::totals_for(&tx, &cohort)?;
    let t = category::thresholds(&totals.values().copied().collect::<Vec<_>>());
    let own = totals.get(student_id).copied().unwrap_or(0);
    tx.commit()?;

    info!(plan_id, student_id, "seat released");
    Ok(UnassignOutcome {
        student,
        seat,
        category: category::categorize(own, t),
    })
}

/// Copies the active plan into a new inactive plan with the given name.
pub fn save_as(conn: &Connection, classroom_id: &str, name: &str) -> CoreResult<SeatingPlan> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CoreError::validation("plan name must not be empty"));
    }
    let tx = db::write_tx(conn)?;
    let classroom = records::get_classroom(&tx, classroom_id)?;
    let active = require_active_plan(&tx, classroom_id)?;
    let grid = load_grid(&tx, &active.id, &classroom)?;
    let snapshot = insert_plan(&tx, classroom_id, name, false)?;
    write_assignments(&tx, &snapshot.id, &grid)?;
    tx.commit()?;

    info!(classroom_id, plan_id = %snapshot.id, name, "seating plan saved");
    Ok(snapshot)
}

/// Makes a saved plan the classroom's active plan; the previous active plan
/// becomes a saved one.
pub fn activate_plan(conn: &Connection, plan_id: &str) -> CoreResult<SeatingPlan> {
    let tx = db::write_tx(conn)?;
    let plan = get_plan(&tx, plan_id)?;
    if !plan.is_active {
        let now = db::now_timestamp();
        tx.execute(
            "UPDATE seating_plans SET is_active = 0, updated_at = ?
             WHERE classroom_id = ? AND is_active = 1",
            (&now, &plan.classroom_id),
        )?;
        tx.execute(
            "UPDATE seating_plans SET is_active = 1, updated_at = ? WHERE id = ?",
            (&now, &plan.id),
        )?;
    }
    let plan = get_plan(&tx, plan_id)?;
    tx.commit()?;

    info!(plan_id, classroom_id = %plan.classroom_id, "seating plan activated");
    Ok(plan)
}

pub fn delete_plan(conn: &Connection, plan_id: &str) -> CoreResult<()> {
    let tx = db::write_tx(conn)?;
    let plan = get_plan(&tx, plan_id)?;
    if plan.is_active {
        return Err(CoreError::conflict(
            "the active seating plan cannot be deleted",
        ));
    }
    tx.execute("DELETE FROM seating_plans WHERE id = ?", [plan_id])?;
    tx.commit()?;
    info!(plan_id, "seating plan deleted");
    Ok(())
}

/// Empties the active plan. Returns how many seats were freed.
pub fn clear(conn: &Connection, classroom_id: &str) -> CoreResult<usize> {
    let tx = db::write_tx(conn)?;
    records::get_classroom(&tx, classroom_id)?;
    let plan = require_active_plan(&tx, classroom_id)?;
    let n = tx.execute("DELETE FROM seat_assignments WHERE plan_id = ?", [&plan.id])?;
    touch_plan(&tx, &plan.id)?;
    tx.commit()?;
    info!(classroom_id, cleared = n, "seating plan cleared");
    Ok(n)
}

/// Enrolled students plus anyone still seated in the plan.
fn cohort_ids(conn: &Connection, classroom: &ClassRoom, grid: &SeatingGrid) -> CoreResult<Vec<String>> {
    let mut ids: Vec<String> = records::enrolled_students(conn, &classroom.subject_id)?
        .into_iter()
        .map(|s| s.id)
        .collect();
    let mut seen: HashSet<String> = ids.iter().cloned().collect();
    for (_, student_id) in grid.occupants() {
        if seen.insert(student_id.to_string()) {
            ids.push(student_id.to_string());
        }
    }
    Ok(ids)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentCard {
    pub student_id: String,
    pub display_name: String,
    pub points: i64,
    pub recent_behavior: String,
    pub category: Category,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatCell {
    pub row: i64,
    pub column: i64,
    pub student: Option<StudentCard>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatingView {
    pub classroom: ClassRoom,
    pub plan: Option<SeatingPlan>,
    pub grid: Vec<Vec<SeatCell>>,
    pub unassigned: Vec<StudentCard>,
    pub thresholds: Thresholds,
}

/// The classroom as a teacher sees it: every cell of the active plan with
/// its occupant, the enrolled students without a seat, and everyone's
/// points, latest behaviour note and category.
pub fn view(conn: &Connection, classroom_id: &str) -> CoreResult<SeatingView> {
    let classroom = records::get_classroom(conn, classroom_id)?;
    let plan = get_active_plan(conn, classroom_id)?;
    let grid = match &plan {
        Some(p) => load_grid(conn, &p.id, &classroom)?,
        None => SeatingGrid::new(classroom.rows, classroom.columns)?,
    };

    let enrolled = records::enrolled_students(conn, &classroom.subject_id)?;
    let mut students = enrolled.clone();
    let known: HashSet<String> = enrolled.iter().map(|s| s.id.clone()).collect();
    for (_, student_id) in grid.occupants() {
        if !known.contains(student_id) {
            students.push(records::get_student(conn, student_id)?);
        }
    }
    let ids: Vec<String> = students.iter().map(|s| s.id.clone()).collect();
    let totals = ledger::totals_for(conn, &ids)?;
    let recent = ledger::recent_descriptions(conn, &ids)?;
    let thresholds = category::thresholds(&totals.values().copied().collect::<Vec<_>>());

    let card = |s: &Student| {
        let points = totals.get(&s.id).copied().unwrap_or(0);
        StudentCard {
            student_id: s.id.clone(),
            display_name: s.display_name(),
            points,
            recent_behavior: recent.get(&s.id).cloned().unwrap_or_default(),
            category: category::categorize(points, thresholds),
        }
    };

    let mut cells = Vec::with_capacity(grid.rows() as usize);
    for row in 0..grid.rows() {
        let mut line = Vec::with_capacity(grid.columns() as usize);
        for column in 0..grid.columns() {
            let student = grid
                .occupant(Seat::new(row, column))
                .and_then(|id| students.iter().find(|s| s.id == id))
                .map(&card);
            line.push(SeatCell {
                row,
                column,
                student,
            });
        }
        cells.push(line);
    }

    let unassigned = enrolled
        .iter()
        .filter(|s| grid.seat_of(&s.id).is_none())
        .map(&card)
        .collect();

    Ok(SeatingView {
        classroom,
        plan,
        grid: cells,
        unassigned,
        thresholds,
    })
}
