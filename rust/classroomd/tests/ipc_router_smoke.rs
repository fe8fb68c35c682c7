mod test_support;

use serde_json::json;
use test_support::{admin, seed_school, spawn_sidecar, str_at, teacher, temp_dir};

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("classroomd-router-smoke");
    let mut sc = spawn_sidecar();

    let health = sc.request_ok("health", json!({}));
    assert!(health.get("version").and_then(|v| v.as_str()).is_some());
    assert!(health.get("workspacePath").map(|v| v.is_null()).unwrap_or(false));

    assert_eq!(
        sc.request_err("subjects.list", json!({ "actor": admin() })),
        "no_workspace"
    );
    sc.select_workspace(&workspace);

    let school = seed_school(&mut sc, 2, 3, 4);
    let t = teacher(&school.teacher_id);

    let calls = [
        ("subjects.list", json!({ "actor": admin() })),
        ("teachers.list", json!({ "actor": admin() })),
        ("students.list", json!({ "actor": t })),
        ("classrooms.list", json!({ "actor": t })),
        (
            "enrollments.list",
            json!({ "actor": t, "studentId": school.students[0] }),
        ),
        (
            "seating.randomize",
            json!({ "actor": t, "classroomId": school.classroom_id }),
        ),
        (
            "seating.view",
            json!({ "actor": t, "classroomId": school.classroom_id }),
        ),
        (
            "behavior.award",
            json!({
                "actor": t,
                "studentId": school.students[0],
                "classroomId": school.classroom_id,
                "points": 2,
                "reason": "Helping others"
            }),
        ),
        (
            "behavior.summary",
            json!({ "actor": t, "studentId": school.students[0] }),
        ),
        (
            "behavior.history",
            json!({ "actor": t, "studentId": school.students[0] }),
        ),
        (
            "seating.plans.list",
            json!({ "actor": t, "classroomId": school.classroom_id }),
        ),
        ("dashboard.teacher", json!({ "actor": t })),
        (
            "dashboard.student",
            json!({ "actor": t, "studentId": school.students[0] }),
        ),
    ];
    for (method, params) in calls {
        sc.request_ok(method, params);
    }

    assert_eq!(
        sc.request_err("seating.teleport", json!({ "actor": t })),
        "not_implemented"
    );
}

#[test]
fn malformed_lines_get_bad_json_and_the_loop_continues() {
    use std::io::{BufRead, Write};

    let mut sc = spawn_sidecar();
    writeln!(sc.stdin, "{{not json").expect("write");
    sc.stdin.flush().expect("flush");
    let mut line = String::new();
    sc.reader.read_line(&mut line).expect("read");
    let v: serde_json::Value = serde_json::from_str(line.trim()).expect("json");
    assert_eq!(str_at(&v, "/error/code"), "bad_json");

    sc.request_ok("health", json!({}));
}

#[test]
fn workspace_flag_opens_database_at_startup() {
    let workspace = temp_dir("classroomd-startup-workspace");
    let path = workspace.to_string_lossy().to_string();
    let mut sc = test_support::spawn_sidecar_with_args(&["--workspace", &path]);
    let health = sc.request_ok("health", json!({}));
    assert_eq!(str_at(&health, "/workspacePath"), path);
    sc.request_ok("subjects.list", json!({ "actor": admin() }));
    assert!(workspace.join("classroom.sqlite3").is_file());
}
