//! Record storage for the entities the seating and behaviour engine refers
//! to but does not own: subjects, teachers, students, enrollments and
//! classrooms.

use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;

use crate::db;
use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub name: String,
    pub teacher_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Teacher {
    pub id: String,
    pub display_name: String,
    pub department: String,
    pub office: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<String>,
}

impl Student {
    /// Full name, or the username when no name was recorded.
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name.trim(), self.last_name.trim());
        let full = full.trim();
        if full.is_empty() {
            self.username.clone()
        } else {
            full.to_string()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    pub id: String,
    pub student_id: String,
    pub subject_id: String,
    pub subject_name: String,
    pub grade: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassRoom {
    pub id: String,
    pub name: String,
    pub subject_id: String,
    pub teacher_id: String,
    pub rows: i64,
    pub columns: i64,
}

#[derive(Debug, Clone, Default)]
pub struct NewStudent {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct StudentUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub date_of_birth: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewClassRoom {
    pub name: String,
    pub subject_id: String,
    pub teacher_id: String,
    pub rows: i64,
    pub columns: i64,
}

fn require_non_empty(value: &str, field: &str) -> CoreResult<String> {
    let t = value.trim();
    if t.is_empty() {
        return Err(CoreError::validation(format!("{} must not be empty", field)));
    }
    Ok(t.to_string())
}

fn validate_birth_date(raw: Option<&str>) -> CoreResult<Option<String>> {
    let Some(v) = raw.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    NaiveDate::parse_from_str(v, "%Y-%m-%d")
        .map(|d| Some(d.format("%Y-%m-%d").to_string()))
        .map_err(|_| CoreError::validation("dateOfBirth must be YYYY-MM-DD"))
}

// ---- subjects ----

pub fn create_subject(conn: &Connection, name: &str, teacher_name: &str) -> CoreResult<Subject> {
    let subject = Subject {
        id: db::new_id(),
        name: require_non_empty(name, "name")?,
        teacher_name: teacher_name.trim().to_string(),
    };
    conn.execute(
        "INSERT INTO subjects(id, name, teacher_name) VALUES(?, ?, ?)",
        (&subject.id, &subject.name, &subject.teacher_name),
    )?;
    Ok(subject)
}

fn subject_from_row(r: &Row<'_>) -> rusqlite::Result<Subject> {
    Ok(Subject {
        id: r.get(0)?,
        name: r.get(1)?,
        teacher_name: r.get(2)?,
    })
}

pub fn get_subject(conn: &Connection, subject_id: &str) -> CoreResult<Subject> {
    conn.query_row(
        "SELECT id, name, teacher_name FROM subjects WHERE id = ?",
        [subject_id],
        subject_from_row,
    )
    .optional()?
    .ok_or_else(|| CoreError::not_found("subject not found"))
}

pub fn list_subjects(conn: &Connection) -> CoreResult<Vec<Subject>> {
    let mut stmt = conn.prepare("SELECT id, name, teacher_name FROM subjects ORDER BY name, id")?;
    let rows = stmt
        .query_map([], subject_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ---- teachers ----

pub fn create_teacher(
    conn: &Connection,
    display_name: &str,
    department: &str,
    office: &str,
) -> CoreResult<Teacher> {
    let teacher = Teacher {
        id: db::new_id(),
        display_name: require_non_empty(display_name, "displayName")?,
        department: department.trim().to_string(),
        office: office.trim().to_string(),
    };
    conn.execute(
        "INSERT INTO teachers(id, display_name, department, office) VALUES(?, ?, ?, ?)",
        (
            &teacher.id,
            &teacher.display_name,
            &teacher.department,
            &teacher.office,
        ),
    )?;
    Ok(teacher)
}

fn teacher_from_row(r: &Row<'_>) -> rusqlite::Result<Teacher> {
    Ok(Teacher {
        id: r.get(0)?,
        display_name: r.get(1)?,
        department: r.get(2)?,
        office: r.get(3)?,
    })
}

pub fn get_teacher(conn: &Connection, teacher_id: &str) -> CoreResult<Teacher> {
    conn.query_row(
        "SELECT id, display_name, department, office FROM teachers WHERE id = ?",
        [teacher_id],
        teacher_from_row,
    )
    .optional()?
    .ok_or_else(|| CoreError::not_found("teacher not found"))
}

pub fn list_teachers(conn: &Connection) -> CoreResult<Vec<Teacher>> {
    let mut stmt = conn.prepare(
        "SELECT id, display_name, department, office FROM teachers ORDER BY display_name, id",
    )?;
    let rows = stmt
        .query_map([], teacher_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ---- students ----

const STUDENT_COLUMNS: &str = "s.id, s.username, s.first_name, s.last_name, s.date_of_birth";

fn student_from_row(r: &Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: r.get(0)?,
        username: r.get(1)?,
        first_name: r.get(2)?,
        last_name: r.get(3)?,
        date_of_birth: r.get(4)?,
    })
}

pub fn create_student(conn: &Connection, new: &NewStudent) -> CoreResult<Student> {
    let student = Student {
        id: db::new_id(),
        username: require_non_empty(&new.username, "username")?,
        first_name: new.first_name.trim().to_string(),
        last_name: new.last_name.trim().to_string(),
        date_of_birth: validate_birth_date(new.date_of_birth.as_deref())?,
    };
    let taken = conn
        .query_row(
            "SELECT 1 FROM students WHERE username = ?",
            [&student.username],
            |r| r.get::<_, i64>(0),
        )
        .optional()?
        .is_some();
    if taken {
        return Err(CoreError::conflict(format!(
            "username {} is already taken",
            student.username
        )));
    }
    conn.execute(
        "INSERT INTO students(id, username, first_name, last_name, date_of_birth)
         VALUES(?, ?, ?, ?, ?)",
        (
            &student.id,
            &student.username,
            &student.first_name,
            &student.last_name,
            &student.date_of_birth,
        ),
    )?;
    Ok(student)
}

pub fn get_student(conn: &Connection, student_id: &str) -> CoreResult<Student> {
    let sql = format!("SELECT {} FROM students s WHERE s.id = ?", STUDENT_COLUMNS);
    conn.query_row(&sql, [student_id], student_from_row)
        .optional()?
        .ok_or_else(|| CoreError::not_found("student not found"))
}

pub fn list_students(conn: &Connection) -> CoreResult<Vec<Student>> {
    let sql = format!(
        "SELECT {} FROM students s ORDER BY s.last_name, s.first_name, s.id",
        STUDENT_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], student_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn update_student(
    conn: &Connection,
    student_id: &str,
    update: &StudentUpdate,
) -> CoreResult<Student> {
    let mut student = get_student(conn, student_id)?;
    if let Some(v) = &update.first_name {
        student.first_name = v.trim().to_string();
    }
    if let Some(v) = &update.last_name {
        student.last_name = v.trim().to_string();
    }
    if update.date_of_birth.is_some() {
        student.date_of_birth = validate_birth_date(update.date_of_birth.as_deref())?;
    }
    conn.execute(
        "UPDATE students SET first_name = ?, last_name = ?, date_of_birth = ? WHERE id = ?",
        (
            &student.first_name,
            &student.last_name,
            &student.date_of_birth,
            &student.id,
        ),
    )?;
    Ok(student)
}

/// Removes the student together with their behaviour records, enrollments
/// and seats.
pub fn delete_student(conn: &Connection, student_id: &str) -> CoreResult<()> {
    let n = conn.execute("DELETE FROM students WHERE id = ?", [student_id])?;
    if n == 0 {
        return Err(CoreError::not_found("student not found"));
    }
    Ok(())
}

// ---- enrollments ----

/// Creates or updates the (student, subject) enrollment.
pub fn set_enrollment(
    conn: &Connection,
    student_id: &str,
    subject_id: &str,
    grade: Option<f64>,
) -> CoreResult<Enrollment> {
    if let Some(g) = grade {
        if !g.is_finite() {
            return Err(CoreError::validation("grade must be a finite number"));
        }
    }
    get_student(conn, student_id)?;
    let subject = get_subject(conn, subject_id)?;
    conn.execute(
        "INSERT INTO student_subjects(id, student_id, subject_id, grade)
         VALUES(?, ?, ?, ?)
         ON CONFLICT(student_id, subject_id) DO UPDATE SET grade = excluded.grade",
        (db::new_id(), student_id, subject_id, grade),
    )?;
    let id: String = conn.query_row(
        "SELECT id FROM student_subjects WHERE student_id = ? AND subject_id = ?",
        (student_id, subject_id),
        |r| r.get(0),
    )?;
    Ok(Enrollment {
        id,
        student_id: student_id.to_string(),
        subject_id: subject.id,
        subject_name: subject.name,
        grade,
    })
}

pub fn delete_enrollment(conn: &Connection, student_id: &str, subject_id: &str) -> CoreResult<()> {
    let n = conn.execute(
        "DELETE FROM student_subjects WHERE student_id = ? AND subject_id = ?",
        (student_id, subject_id),
    )?;
    if n == 0 {
        return Err(CoreError::not_found("enrollment not found"));
    }
    Ok(())
}

pub fn enrollments_for_student(conn: &Connection, student_id: &str) -> CoreResult<Vec<Enrollment>> {
    let mut stmt = conn.prepare(
        "SELECT e.id, e.student_id, e.subject_id, sub.name, e.grade
         FROM student_subjects e
         JOIN subjects sub ON sub.id = e.subject_id
         WHERE e.student_id = ?
         ORDER BY sub.name, sub.id",
    )?;
    let rows = stmt
        .query_map([student_id], |r| {
            Ok(Enrollment {
                id: r.get(0)?,
                student_id: r.get(1)?,
                subject_id: r.get(2)?,
                subject_name: r.get(3)?,
                grade: r.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Students enrolled in the subject, in roster order.
pub fn enrolled_students(conn: &Connection, subject_id: &str) -> CoreResult<Vec<Student>> {
    let sql = format!(
        "SELECT {}
         FROM student_subjects e
         JOIN students s ON s.id = e.student_id
         WHERE e.subject_id = ?
         ORDER BY s.last_name, s.first_name, s.id",
        STUDENT_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([subject_id], student_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn is_enrolled(conn: &Connection, student_id: &str, subject_id: &str) -> CoreResult<bool> {
    Ok(conn
        .query_row(
            "SELECT 1 FROM student_subjects WHERE student_id = ? AND subject_id = ?",
            (student_id, subject_id),
            |r| r.get::<_, i64>(0),
        )
        .optional()?
        .is_some())
}

// ---- classrooms ----

const CLASSROOM_COLUMNS: &str = "id, name, subject_id, teacher_id, row_count, column_count";

fn classroom_from_row(r: &Row<'_>) -> rusqlite::Result<ClassRoom> {
    Ok(ClassRoom {
        id: r.get(0)?,
        name: r.get(1)?,
        subject_id: r.get(2)?,
        teacher_id: r.get(3)?,
        rows: r.get(4)?,
        columns: r.get(5)?,
    })
}

pub fn create_classroom(conn: &Connection, new: &NewClassRoom) -> CoreResult<ClassRoom> {
    if new.rows < 1 || new.columns < 1 {
        return Err(CoreError::validation("rows and columns must be at least 1"));
    }
    get_subject(conn, &new.subject_id)?;
    get_teacher(conn, &new.teacher_id)?;
    let classroom = ClassRoom {
        id: db::new_id(),
        name: require_non_empty(&new.name, "name")?,
        subject_id: new.subject_id.clone(),
        teacher_id: new.teacher_id.clone(),
        rows: new.rows,
        columns: new.columns,
    };
    conn.execute(
        "INSERT INTO classrooms(id, name, subject_id, teacher_id, row_count, column_count)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &classroom.id,
            &classroom.name,
            &classroom.subject_id,
            &classroom.teacher_id,
            classroom.rows,
            classroom.columns,
        ),
    )?;
    Ok(classroom)
}

pub fn get_classroom(conn: &Connection, classroom_id: &str) -> CoreResult<ClassRoom> {
    let sql = format!("SELECT {} FROM classrooms WHERE id = ?", CLASSROOM_COLUMNS);
    conn.query_row(&sql, [classroom_id], classroom_from_row)
        .optional()?
        .ok_or_else(|| CoreError::not_found("classroom not found"))
}

pub fn list_classrooms(conn: &Connection, teacher_id: Option<&str>) -> CoreResult<Vec<ClassRoom>> {
    let rows = match teacher_id {
        Some(tid) => {
            let sql = format!(
                "SELECT {} FROM classrooms WHERE teacher_id = ? ORDER BY name, id",
                CLASSROOM_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([tid], classroom_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
        None => {
            let sql = format!("SELECT {} FROM classrooms ORDER BY name, id", CLASSROOM_COLUMNS);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], classroom_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
    };
    Ok(rows)
}

/// Deletes the classroom; its seating plans and seats go with it.
pub fn delete_classroom(conn: &Connection, classroom_id: &str) -> CoreResult<()> {
    let n = conn.execute("DELETE FROM classrooms WHERE id = ?", [classroom_id])?;
    if n == 0 {
        return Err(CoreError::not_found("classroom not found"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(conn: &Connection) -> (Subject, Teacher) {
        let subject = create_subject(conn, "Mathematics", "M. Thompson").expect("subject");
        let teacher = create_teacher(conn, "Michael Thompson", "Mathematics", "B305").expect("teacher");
        (subject, teacher)
    }

    #[test]
    fn usernames_are_unique() {
        let conn = db::open_in_memory();
        let new = NewStudent {
            username: "ebrown".into(),
            first_name: "Ethan".into(),
            last_name: "Brown".into(),
            date_of_birth: Some("2009-04-02".into()),
        };
        create_student(&conn, &new).expect("first");
        let err = create_student(&conn, &new).unwrap_err();
        assert_eq!(err.code(), "conflict");
    }

    #[test]
    fn display_name_falls_back_to_username() {
        let s = Student {
            id: "x".into(),
            username: "odavis".into(),
            first_name: " ".into(),
            last_name: "".into(),
            date_of_birth: None,
        };
        assert_eq!(s.display_name(), "odavis");
    }

    #[test]
    fn enrollment_upsert_updates_grade() {
        let conn = db::open_in_memory();
        let (subject, _) = fixture(&conn);
        let student = create_student(
            &conn,
            &NewStudent {
                username: "jwilson".into(),
                ..Default::default()
            },
        )
        .expect("student");

        let first = set_enrollment(&conn, &student.id, &subject.id, None).expect("enroll");
        let second = set_enrollment(&conn, &student.id, &subject.id, Some(88.5)).expect("grade");
        assert_eq!(first.id, second.id);
        let all = enrollments_for_student(&conn, &student.id).expect("list");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].grade, Some(88.5));
        assert!(is_enrolled(&conn, &student.id, &subject.id).expect("enrolled"));
    }

    #[test]
    fn classroom_dimensions_must_be_positive() {
        let conn = db::open_in_memory();
        let (subject, teacher) = fixture(&conn);
        let err = create_classroom(
            &conn,
            &NewClassRoom {
                name: "9A Maths".into(),
                subject_id: subject.id.clone(),
                teacher_id: teacher.id.clone(),
                rows: 0,
                columns: 4,
            },
        )
        .unwrap_err();
        assert_eq!(err.code(), "validation_error");

        let err = get_classroom(&conn, "missing").unwrap_err();
        assert_eq!(err.code(), "not_found");
    }
}
