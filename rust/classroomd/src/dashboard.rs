//! Read models for the teacher overview and the student dashboard.

use rusqlite::Connection;
use serde::Serialize;

use crate::error::CoreResult;
use crate::ledger::{self, BehaviorRecord};
use crate::records::{self, ClassRoom, Enrollment, Student, Teacher};

/// Score shown for a class with nobody enrolled, and for a teacher with no
/// classes.
pub const EMPTY_CLASS_SCORE: i64 = 85;
const SCORE_BASELINE: f64 = 75.0;
const ATTENTION_BELOW: i64 = -3;
const ATTENTION_LIMIT: usize = 4;
const RECENT_LIMIT: i64 = 5;

/// Maps a point total (or a class mean) onto 0..=100 around a baseline of 75.
pub fn behavior_score(points: f64) -> i64 {
    (SCORE_BASELINE + points).clamp(0.0, 100.0).round() as i64
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassScore {
    pub classroom_id: String,
    pub name: String,
    pub enrolled: usize,
    pub score: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentEntry {
    pub student_name: String,
    #[serde(flatten)]
    pub record: BehaviorRecord,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttentionEntry {
    pub student_id: String,
    pub name: String,
    pub classroom: String,
    pub points: i64,
    pub behavior_score: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherOverview {
    pub teacher: Teacher,
    pub classrooms: Vec<ClassRoom>,
    pub total_students: usize,
    pub class_scores: Vec<ClassScore>,
    pub average_behavior_score: i64,
    pub recent_behaviors: Vec<RecentEntry>,
    pub students_requiring_attention: Vec<AttentionEntry>,
}

pub fn teacher_overview(conn: &Connection, teacher_id: &str) -> CoreResult<TeacherOverview> {
    let teacher = records::get_teacher(conn, teacher_id)?;
    let classrooms = records::list_classrooms(conn, Some(teacher_id))?;

    let mut total_students = 0;
    let mut class_scores = Vec::with_capacity(classrooms.len());
    let mut attention = Vec::new();
    for classroom in &classrooms {
        let students = records::enrolled_students(conn, &classroom.subject_id)?;
        total_students += students.len();
        let ids: Vec<String> = students.iter().map(|s| s.id.clone()).collect();
        let totals = ledger::totals_for(conn, &ids)?;

        let score = if students.is_empty() {
            EMPTY_CLASS_SCORE
        } else {
            let sum: f64 = totals.values().map(|&p| p as f64).sum();
            behavior_score(sum / students.len() as f64)
        };
        class_scores.push(ClassScore {
            classroom_id: classroom.id.clone(),
            name: classroom.name.clone(),
            enrolled: students.len(),
            score,
        });

        for s in &students {
            let points = totals.get(&s.id).copied().unwrap_or(0);
            if points < ATTENTION_BELOW {
                attention.push(AttentionEntry {
                    student_id: s.id.clone(),
                    name: s.display_name(),
                    classroom: classroom.name.clone(),
                    points,
                    behavior_score: behavior_score(points as f64),
                });
            }
        }
    }
    attention.sort_by_key(|a| a.points);
    attention.truncate(ATTENTION_LIMIT);

    let average_behavior_score = if class_scores.is_empty() {
        EMPTY_CLASS_SCORE
    } else {
        let sum: i64 = class_scores.iter().map(|c| c.score).sum();
        (sum as f64 / class_scores.len() as f64).round() as i64
    };

    let mut recent_behaviors = Vec::new();
    for record in ledger::recent_by_recorder(conn, &teacher.display_name, RECENT_LIMIT)? {
        let student_name = records::get_student(conn, &record.student_id)?.display_name();
        recent_behaviors.push(RecentEntry {
            student_name,
            record,
        });
    }

    Ok(TeacherOverview {
        teacher,
        classrooms,
        total_students,
        class_scores,
        average_behavior_score,
        recent_behaviors,
        students_requiring_attention: attention,
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentDashboard {
    pub student: Student,
    pub subjects: Vec<Enrollment>,
    pub average_grade: Option<f64>,
    pub total_points: i64,
}

pub fn student_dashboard(conn: &Connection, student_id: &str) -> CoreResult<StudentDashboard> {
    let student = records::get_student(conn, student_id)?;
    let subjects = records::enrollments_for_student(conn, student_id)?;
    let grades: Vec<f64> = subjects.iter().filter_map(|e| e.grade).collect();
    let average_grade = if grades.is_empty() {
        None
    } else {
        let mean = grades.iter().sum::<f64>() / grades.len() as f64;
        Some((mean * 10.0).round() / 10.0)
    };
    let total_points = ledger::total_points(conn, student_id, None)?;
    Ok(StudentDashboard {
        student,
        subjects,
        average_grade,
        total_points,
    })
}
