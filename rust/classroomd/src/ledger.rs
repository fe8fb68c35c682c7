//! Append-only behaviour ledger.
//!
//! Records are immutable once written. The only deletion path is an explicit
//! administrative purge of one student's history.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::collections::HashMap;

use crate::db;
use crate::error::{CoreError, CoreResult};
use crate::records;

pub const HISTORY_PAGE_SIZE: i64 = 10;
/// Largest magnitude a single behaviour record may carry.
pub const MAX_POINTS: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BehaviorType {
    Positive,
    Negative,
}

impl BehaviorType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "positive" => Some(Self::Positive),
            "negative" => Some(Self::Negative),
            _ => None,
        }
    }

    fn accepts(self, points: i64) -> bool {
        match self {
            Self::Positive => points > 0,
            Self::Negative => points < 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorRecord {
    pub id: String,
    pub student_id: String,
    pub subject_id: Option<String>,
    pub behavior_type: BehaviorType,
    pub points: i64,
    pub description: String,
    pub recorded_by: String,
    pub recorded_at: String,
}

#[derive(Debug, Clone)]
pub struct NewBehavior<'a> {
    pub student_id: &'a str,
    pub subject_id: Option<&'a str>,
    pub behavior_type: BehaviorType,
    pub points: i64,
    pub description: &'a str,
    pub recorded_by: &'a str,
}

const RECORD_COLUMNS: &str =
    "id, student_id, subject_id, behavior_type, points, description, recorded_by, recorded_at";

fn record_from_row(r: &Row<'_>) -> rusqlite::Result<BehaviorRecord> {
    let kind: String = r.get(3)?;
    let behavior_type = BehaviorType::parse(&kind).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("unknown behavior_type {}", kind).into(),
        )
    })?;
    Ok(BehaviorRecord {
        id: r.get(0)?,
        student_id: r.get(1)?,
        subject_id: r.get(2)?,
        behavior_type,
        points: r.get(4)?,
        description: r.get(5)?,
        recorded_by: r.get(6)?,
        recorded_at: r.get(7)?,
    })
}

/// Appends one record. Zero points, or points whose sign disagrees with the
/// type, are rejected before anything is written.
pub fn record_behavior(conn: &Connection, new: &NewBehavior<'_>) -> CoreResult<BehaviorRecord> {
    if new.points == 0 {
        return Err(CoreError::validation("points must not be zero"));
    }
    if new.points.unsigned_abs() > MAX_POINTS {
        return Err(CoreError::validation(format!(
            "points must be at most {MAX_POINTS} in magnitude"
        )));
    }
    if !new.behavior_type.accepts(new.points) {
        return Err(CoreError::validation(format!(
            "{} behaviour must carry {} points",
            new.behavior_type.as_str(),
            match new.behavior_type {
                BehaviorType::Positive => "positive",
                BehaviorType::Negative => "negative",
            }
        )));
    }
    records::get_student(conn, new.student_id)?;
    if let Some(subject_id) = new.subject_id {
        records::get_subject(conn, subject_id)?;
    }

    // Keep recorded_at non-decreasing even if the wall clock steps back.
    let now = db::now_timestamp();
    let latest: Option<String> =
        conn.query_row("SELECT MAX(recorded_at) FROM behavior_records", [], |r| {
            r.get(0)
        })?;
    let recorded_at = match latest {
        Some(l) if l > now => l,
        _ => now,
    };

    let record = BehaviorRecord {
        id: db::new_id(),
        student_id: new.student_id.to_string(),
        subject_id: new.subject_id.map(str::to_string),
        behavior_type: new.behavior_type,
        points: new.points,
        description: new.description.to_string(),
        recorded_by: new.recorded_by.to_string(),
        recorded_at,
    };
    conn.execute(
        "INSERT INTO behavior_records(
            id, student_id, subject_id, behavior_type, points, description, recorded_by, recorded_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &record.id,
            &record.student_id,
            &record.subject_id,
            record.behavior_type.as_str(),
            record.points,
            &record.description,
            &record.recorded_by,
            &record.recorded_at,
        ),
    )?;
    Ok(record)
}

pub fn total_points(
    conn: &Connection,
    student_id: &str,
    subject_id: Option<&str>,
) -> CoreResult<i64> {
    let total: i64 = match subject_id {
        Some(sid) => conn.query_row(
            "SELECT COALESCE(SUM(points), 0) FROM behavior_records
             WHERE student_id = ? AND subject_id = ?",
            (student_id, sid),
            |r| r.get(0),
        )?,
        None => conn.query_row(
            "SELECT COALESCE(SUM(points), 0) FROM behavior_records WHERE student_id = ?",
            [student_id],
            |r| r.get(0),
        )?,
    };
    Ok(total)
}

/// Totals for a cohort in one grouped query. Every requested id is present
/// in the result; students without records map to 0.
pub fn totals_for(conn: &Connection, student_ids: &[String]) -> CoreResult<HashMap<String, i64>> {
    let mut out: HashMap<String, i64> = student_ids.iter().map(|id| (id.clone(), 0)).collect();
    if student_ids.is_empty() {
        return Ok(out);
    }
    let placeholders = vec!["?"; student_ids.len()].join(", ");
    let sql = format!(
        "SELECT student_id, SUM(points) FROM behavior_records
         WHERE student_id IN ({})
         GROUP BY student_id",
        placeholders
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(student_ids.iter()), |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    for (id, total) in rows {
        out.insert(id, total);
    }
    Ok(out)
}

pub fn recent_description(conn: &Connection, student_id: &str) -> CoreResult<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT description FROM behavior_records
             WHERE student_id = ?
             ORDER BY recorded_at DESC, rowid DESC
             LIMIT 1",
            [student_id],
            |r| r.get(0),
        )
        .optional()?)
}

pub fn recent_descriptions(
    conn: &Connection,
    student_ids: &[String],
) -> CoreResult<HashMap<String, String>> {
    let mut out = HashMap::new();
    for id in student_ids {
        if let Some(d) = recent_description(conn, id)? {
            out.insert(id.clone(), d);
        }
    }
    Ok(out)
}

pub fn recent_activity(
    conn: &Connection,
    student_id: &str,
    limit: i64,
) -> CoreResult<Vec<BehaviorRecord>> {
    let sql = format!(
        "SELECT {} FROM behavior_records
         WHERE student_id = ?
         ORDER BY recorded_at DESC, rowid DESC
         LIMIT ?",
        RECORD_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map((student_id, limit), record_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Latest records written under the given recorder name, across students.
pub fn recent_by_recorder(
    conn: &Connection,
    recorded_by: &str,
    limit: i64,
) -> CoreResult<Vec<BehaviorRecord>> {
    let sql = format!(
        "SELECT {} FROM behavior_records
         WHERE recorded_by = ?
         ORDER BY recorded_at DESC, rowid DESC
         LIMIT ?",
        RECORD_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map((recorded_by, limit), record_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[derive(Debug, Clone, Default)]
pub struct HistoryFilters {
    pub subject_id: Option<String>,
    pub behavior_type: Option<BehaviorType>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

impl HistoryFilters {
    /// Parses `YYYY-MM-DD` bounds; empty strings mean "no bound".
    pub fn parse_date(raw: Option<&str>, field: &str) -> CoreResult<Option<NaiveDate>> {
        let Some(v) = raw.map(str::trim).filter(|v| !v.is_empty()) else {
            return Ok(None);
        };
        NaiveDate::parse_from_str(v, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| CoreError::validation(format!("{} must be YYYY-MM-DD", field)))
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPage {
    pub records: Vec<BehaviorRecord>,
    pub page: i64,
    pub num_pages: i64,
    pub total_count: i64,
    pub has_next: bool,
    pub has_previous: bool,
}

fn start_of_day(d: NaiveDate) -> String {
    db::format_timestamp(d.and_time(chrono::NaiveTime::MIN).and_utc())
}

/// Newest-first page of a student's records. `date_from` is inclusive;
/// `date_to` includes the whole day. Pages are 1-based and out-of-range
/// requests land on the nearest valid page.
pub fn history(
    conn: &Connection,
    student_id: &str,
    filters: &HistoryFilters,
    page: i64,
) -> CoreResult<HistoryPage> {
    records::get_student(conn, student_id)?;

    let mut clauses = vec!["student_id = ?".to_string()];
    let mut params: Vec<Value> = vec![Value::Text(student_id.to_string())];
    if let Some(sid) = &filters.subject_id {
        clauses.push("subject_id = ?".into());
        params.push(Value::Text(sid.clone()));
    }
    if let Some(t) = filters.behavior_type {
        clauses.push("behavior_type = ?".into());
        params.push(Value::Text(t.as_str().to_string()));
    }
    if let Some(from) = filters.date_from {
        clauses.push("recorded_at >= ?".into());
        params.push(Value::Text(start_of_day(from)));
    }
    if let Some(to) = filters.date_to {
        let Some(next) = to.succ_opt() else {
            return Err(CoreError::validation("to is out of range"));
        };
        clauses.push("recorded_at < ?".into());
        params.push(Value::Text(start_of_day(next)));
    }
    let where_sql = clauses.join(" AND ");

    let total_count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM behavior_records WHERE {}", where_sql),
        params_from_iter(params.iter()),
        |r| r.get(0),
    )?;
    let num_pages = std::cmp::max(1, (total_count + HISTORY_PAGE_SIZE - 1) / HISTORY_PAGE_SIZE);
    let page = page.clamp(1, num_pages);

    let mut page_params = params.clone();
    page_params.push(Value::Integer(HISTORY_PAGE_SIZE));
    page_params.push(Value::Integer((page - 1) * HISTORY_PAGE_SIZE));
    let sql = format!(
        "SELECT {} FROM behavior_records
         WHERE {}
         ORDER BY recorded_at DESC, rowid DESC
         LIMIT ? OFFSET ?",
        RECORD_COLUMNS, where_sql
    );
    let mut stmt = conn.prepare(&sql)?;
    let records = stmt
        .query_map(params_from_iter(page_params.iter()), record_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(HistoryPage {
        records,
        page,
        num_pages,
        total_count,
        has_next: page < num_pages,
        has_previous: page > 1,
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeCounts {
    pub positive: i64,
    pub negative: i64,
}

pub fn type_counts(conn: &Connection, student_id: &str) -> CoreResult<TypeCounts> {
    let mut stmt = conn.prepare(
        "SELECT behavior_type, COUNT(*) FROM behavior_records
         WHERE student_id = ?
         GROUP BY behavior_type",
    )?;
    let rows = stmt
        .query_map([student_id], |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    let mut counts = TypeCounts::default();
    for (kind, n) in rows {
        match BehaviorType::parse(&kind) {
            Some(BehaviorType::Positive) => counts.positive = n,
            Some(BehaviorType::Negative) => counts.negative = n,
            None => {}
        }
    }
    Ok(counts)
}

/// 1-based standing among all students by total points. Ties share a rank;
/// students without records count as 0.
pub fn rank(conn: &Connection, student_id: &str) -> CoreResult<i64> {
    let own = total_points(conn, student_id, None)?;
    let ahead: i64 = conn.query_row(
        "SELECT COUNT(*) FROM (
            SELECT s.id, COALESCE(SUM(b.points), 0) AS total
            FROM students s
            LEFT JOIN behavior_records b ON b.student_id = s.id
            GROUP BY s.id
         ) WHERE total > ?",
        [own],
        |r| r.get(0),
    )?;
    Ok(ahead + 1)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartBucket {
    pub month: String,
    pub positive: i64,
    pub negative: i64,
    pub net: i64,
}

pub const CHART_BUCKETS: i64 = 6;
pub const CHART_BUCKET_DAYS: i64 = 30;

/// Six consecutive 30-day windows ending at `now`. `negative` is reported as
/// a magnitude.
pub fn monthly_chart(
    conn: &Connection,
    student_id: &str,
    now: DateTime<Utc>,
) -> CoreResult<Vec<ChartBucket>> {
    let start = now - Duration::days(CHART_BUCKETS * CHART_BUCKET_DAYS);
    let mut stmt = conn.prepare(
        "SELECT
           COALESCE(SUM(CASE WHEN behavior_type = 'positive' THEN points END), 0),
           COALESCE(SUM(CASE WHEN behavior_type = 'negative' THEN points END), 0)
         FROM behavior_records
         WHERE student_id = ? AND recorded_at >= ? AND recorded_at < ?",
    )?;
    let mut out = Vec::with_capacity(CHART_BUCKETS as usize);
    for i in 0..CHART_BUCKETS {
        let from = start + Duration::days(CHART_BUCKET_DAYS * i);
        let to = start + Duration::days(CHART_BUCKET_DAYS * (i + 1));
        let (positive, negative): (i64, i64) = stmt.query_row(
            (
                student_id,
                db::format_timestamp(from),
                db::format_timestamp(to),
            ),
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;
        let negative = negative.abs();
        out.push(ChartBucket {
            month: from.format("%b").to_string(),
            positive,
            negative,
            net: positive - negative,
        });
    }
    Ok(out)
}

/// Administrative purge of one student's history.
pub fn purge(conn: &Connection, student_id: &str) -> CoreResult<usize> {
    records::get_student(conn, student_id)?;
    Ok(conn.execute(
        "DELETE FROM behavior_records WHERE student_id = ?",
        [student_id],
    )?)
}
