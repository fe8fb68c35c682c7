#![allow(dead_code)]

use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub struct Sidecar {
    pub child: Child,
    pub stdin: ChildStdin,
    pub reader: BufReader<ChildStdout>,
    next_id: u64,
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

pub fn spawn_sidecar() -> Sidecar {
    spawn_sidecar_with_args(&[])
}

pub fn spawn_sidecar_with_args(args: &[&str]) -> Sidecar {
    let exe = env!("CARGO_BIN_EXE_classroomd");
    let mut child = Command::new(exe)
        .args(args)
        .env_remove("CLASSROOMD_WORKSPACE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn classroomd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    Sidecar {
        child,
        stdin,
        reader: BufReader::new(stdout),
        next_id: 1,
    }
}

impl Sidecar {
    /// Sends one request and returns the whole response envelope.
    pub fn request(&mut self, method: &str, params: Value) -> Value {
        let id = self.next_id.to_string();
        self.next_id += 1;
        let payload = json!({
            "id": id,
            "method": method,
            "params": params,
        });
        writeln!(self.stdin, "{}", payload).expect("write request");
        self.stdin.flush().expect("flush request");

        let mut line = String::new();
        self.reader.read_line(&mut line).expect("read response line");
        assert!(!line.trim().is_empty(), "empty response for {}", method);
        let value: Value = serde_json::from_str(line.trim()).expect("parse response json");
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        value
    }

    pub fn request_ok(&mut self, method: &str, params: Value) -> Value {
        let value = self.request(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(true),
            "{} failed: {}",
            method,
            value
        );
        value.get("result").cloned().unwrap_or(Value::Null)
    }

    /// Expects a failure and returns the error code.
    pub fn request_err(&mut self, method: &str, params: Value) -> String {
        let value = self.request(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(false),
            "{} unexpectedly succeeded: {}",
            method,
            value
        );
        value
            .pointer("/error/code")
            .and_then(|v| v.as_str())
            .expect("error code")
            .to_string()
    }

    pub fn select_workspace(&mut self, path: &Path) {
        self.request_ok("workspace.select", json!({ "path": path.to_string_lossy() }));
    }
}

pub fn admin() -> Value {
    json!({ "role": "admin", "id": "admin" })
}

pub fn teacher(id: &str) -> Value {
    json!({ "role": "teacher", "id": id })
}

pub fn student(id: &str) -> Value {
    json!({ "role": "student", "id": id })
}

pub fn str_at<'a>(v: &'a Value, pointer: &str) -> &'a str {
    v.pointer(pointer)
        .and_then(|x| x.as_str())
        .unwrap_or_else(|| panic!("missing string at {} in {}", pointer, v))
}

pub struct School {
    pub subject_id: String,
    pub teacher_id: String,
    pub classroom_id: String,
    pub students: Vec<String>,
}

/// One subject taught by one teacher in a rows x columns classroom, with
/// `n` enrolled students.
pub fn seed_school(sc: &mut Sidecar, rows: i64, columns: i64, n: usize) -> School {
    let subject = sc.request_ok(
        "subjects.create",
        json!({ "actor": admin(), "name": "Science", "teacherName": "J. Johnson" }),
    );
    let subject_id = str_at(&subject, "/subject/id").to_string();
    let t = sc.request_ok(
        "teachers.create",
        json!({
            "actor": admin(),
            "displayName": "Jennifer Johnson",
            "department": "Science",
            "office": "A101"
        }),
    );
    let teacher_id = str_at(&t, "/teacher/id").to_string();
    let classroom = sc.request_ok(
        "classrooms.create",
        json!({
            "actor": admin(),
            "name": "Year 9 Science",
            "subjectId": subject_id,
            "teacherId": teacher_id,
            "rows": rows,
            "columns": columns
        }),
    );
    let classroom_id = str_at(&classroom, "/classroom/id").to_string();

    let mut students = Vec::with_capacity(n);
    for i in 0..n {
        let s = sc.request_ok(
            "students.create",
            json!({
                "actor": admin(),
                "username": format!("pupil{}", i),
                "firstName": format!("Pupil{}", i),
                "lastName": "Test"
            }),
        );
        let student_id = str_at(&s, "/student/id").to_string();
        sc.request_ok(
            "enrollments.set",
            json!({ "actor": admin(), "studentId": student_id, "subjectId": subject_id }),
        );
        students.push(student_id);
    }

    School {
        subject_id,
        teacher_id,
        classroom_id,
        students,
    }
}
