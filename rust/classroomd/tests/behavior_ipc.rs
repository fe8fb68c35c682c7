mod test_support;

use serde_json::json;
use test_support::{admin, seed_school, spawn_sidecar, str_at, student, teacher, temp_dir};

#[test]
fn award_and_deduct_keep_running_total() {
    let workspace = temp_dir("classroomd-behavior-total");
    let mut sc = spawn_sidecar();
    sc.select_workspace(&workspace);
    let school = seed_school(&mut sc, 2, 2, 1);
    let t = teacher(&school.teacher_id);
    let pupil = &school.students[0];

    let awarded = sc.request_ok(
        "behavior.award",
        json!({
            "actor": t,
            "studentId": pupil,
            "classroomId": school.classroom_id,
            "points": 3,
            "reason": "Other",
            "customReason": "Tidied the lab"
        }),
    );
    assert_eq!(str_at(&awarded, "/message"), "Awarded 3 points to Pupil0 Test");
    assert_eq!(awarded["totalPoints"], json!(3));
    assert_eq!(str_at(&awarded, "/record/description"), "Tidied the lab");
    assert_eq!(str_at(&awarded, "/record/recordedBy"), "Jennifer Johnson");

    // Deductions accept a positive magnitude; admins may leave out the classroom.
    let deducted = sc.request_ok(
        "behavior.deduct",
        json!({ "actor": admin(), "studentId": pupil, "points": 5, "reason": "Late to class" }),
    );
    assert_eq!(str_at(&deducted, "/message"), "Deducted 5 points from Pupil0 Test");
    assert_eq!(deducted["totalPoints"], json!(-2));
    assert_eq!(deducted["record"]["points"], json!(-5));
    assert!(deducted["record"]["subjectId"].is_null());

    sc.request_ok(
        "behavior.award",
        json!({
            "actor": t,
            "studentId": pupil,
            "classroomId": school.classroom_id,
            "points": 1,
            "reason": "Homework"
        }),
    );

    let summary = sc.request_ok("behavior.summary", json!({ "actor": t, "studentId": pupil }));
    assert_eq!(summary["totalPoints"], json!(-1));
    let activities = summary["activities"].as_array().expect("activities");
    assert_eq!(activities.len(), 3);
    assert_eq!(activities[0]["description"], json!("Homework"));
    assert_eq!(activities[1]["points"], json!(-5));
    let date = activities[0]["date"].as_str().expect("date");
    assert!(date.ends_with("AM") || date.ends_with("PM"), "{}", date);

    assert_eq!(
        sc.request_err(
            "behavior.award",
            json!({
                "actor": t,
                "studentId": pupil,
                "classroomId": school.classroom_id,
                "points": 0,
                "reason": "Nothing"
            }),
        ),
        "validation_error"
    );
    assert_eq!(
        sc.request_err(
            "behavior.award",
            json!({ "actor": t, "studentId": "missing", "classroomId": school.classroom_id, "reason": "x" }),
        ),
        "not_found"
    );
}

#[test]
fn idempotency_key_replays_first_response() {
    let workspace = temp_dir("classroomd-behavior-idem");
    let mut sc = spawn_sidecar();
    sc.select_workspace(&workspace);
    let school = seed_school(&mut sc, 2, 2, 1);
    let t = teacher(&school.teacher_id);
    let params = json!({
        "actor": t,
        "studentId": school.students[0],
        "classroomId": school.classroom_id,
        "points": 2,
        "reason": "Teamwork",
        "idempotencyKey": "award-1"
    });

    let first = sc.request_ok("behavior.award", params.clone());
    let again = sc.request_ok("behavior.award", params.clone());
    assert_eq!(first, again);

    let summary = sc.request_ok(
        "behavior.summary",
        json!({ "actor": t, "studentId": school.students[0] }),
    );
    assert_eq!(summary["totalPoints"], json!(2));
    assert_eq!(summary["activities"].as_array().map(|a| a.len()), Some(1));

    let mut changed = params;
    changed["points"] = json!(4);
    assert_eq!(sc.request_err("behavior.award", changed), "conflict");
}

#[test]
fn history_filters_pages_and_stats() {
    let workspace = temp_dir("classroomd-behavior-history");
    let mut sc = spawn_sidecar();
    sc.select_workspace(&workspace);
    let school = seed_school(&mut sc, 3, 3, 2);
    let t = teacher(&school.teacher_id);
    let pupil = &school.students[0];

    for i in 0..12 {
        let method = if i % 4 == 0 { "behavior.deduct" } else { "behavior.award" };
        sc.request_ok(
            method,
            json!({
                "actor": t,
                "studentId": pupil,
                "classroomId": school.classroom_id,
                "points": 1,
                "reason": format!("entry {}", i)
            }),
        );
    }
    sc.request_ok(
        "behavior.award",
        json!({
            "actor": t,
            "studentId": school.students[1],
            "classroomId": school.classroom_id,
            "points": 20,
            "reason": "Top effort"
        }),
    );

    let page1 = sc.request_ok("behavior.history", json!({ "actor": student(pupil), "studentId": pupil }));
    assert_eq!(page1["history"]["totalCount"], json!(12));
    assert_eq!(page1["history"]["numPages"], json!(2));
    assert_eq!(page1["history"]["hasNext"], json!(true));
    assert_eq!(page1["history"]["records"][0]["description"], json!("entry 11"));
    assert_eq!(page1["stats"]["positiveCount"], json!(9));
    assert_eq!(page1["stats"]["negativeCount"], json!(3));
    assert_eq!(page1["stats"]["totalPoints"], json!(6));
    assert_eq!(page1["stats"]["rank"], json!(2));
    assert_eq!(page1["chart"].as_array().map(|a| a.len()), Some(6));
    assert_eq!(page1["chart"][5]["net"], json!(6));

    let clamped = sc.request_ok(
        "behavior.history",
        json!({ "actor": t, "studentId": pupil, "page": 40 }),
    );
    assert_eq!(clamped["history"]["page"], json!(2));
    assert_eq!(clamped["history"]["records"].as_array().map(|a| a.len()), Some(2));

    let negatives = sc.request_ok(
        "behavior.history",
        json!({ "actor": t, "studentId": pupil, "type": "negative", "subjectId": "all" }),
    );
    assert_eq!(negatives["history"]["totalCount"], json!(3));

    let future = sc.request_ok(
        "behavior.history",
        json!({ "actor": t, "studentId": pupil, "from": "2999-01-01" }),
    );
    assert_eq!(future["history"]["totalCount"], json!(0));
    assert_eq!(future["history"]["page"], json!(1));

    assert_eq!(
        sc.request_err(
            "behavior.history",
            json!({ "actor": t, "studentId": pupil, "to": "31/12/2024" }),
        ),
        "validation_error"
    );
}

#[test]
fn purge_is_admin_only() {
    let workspace = temp_dir("classroomd-behavior-purge");
    let mut sc = spawn_sidecar();
    sc.select_workspace(&workspace);
    let school = seed_school(&mut sc, 2, 2, 1);
    let t = teacher(&school.teacher_id);
    let pupil = &school.students[0];
    sc.request_ok(
        "behavior.award",
        json!({ "actor": t, "studentId": pupil, "classroomId": school.classroom_id, "reason": "Kind" }),
    );

    assert_eq!(
        sc.request_err("behavior.purge", json!({ "actor": t, "studentId": pupil })),
        "permission_denied"
    );
    let purged = sc.request_ok("behavior.purge", json!({ "actor": admin(), "studentId": pupil }));
    assert_eq!(purged["deleted"], json!(1));
    let summary = sc.request_ok("behavior.summary", json!({ "actor": t, "studentId": pupil }));
    assert_eq!(summary["totalPoints"], json!(0));
}

#[test]
fn out_of_range_points_are_rejected_and_sidecar_keeps_serving() {
    let workspace = temp_dir("classroomd-behavior-range");
    let mut sc = spawn_sidecar();
    sc.select_workspace(&workspace);
    let school = seed_school(&mut sc, 2, 2, 2);
    let t = teacher(&school.teacher_id);
    let pupil = &school.students[0];

    for (method, points) in [
        ("behavior.deduct", json!(i64::MIN)),
        ("behavior.deduct", json!(-1001)),
        ("behavior.award", json!(i64::MAX)),
        ("behavior.award", json!(1001)),
        ("behavior.award", json!(0)),
    ] {
        assert_eq!(
            sc.request_err(
                method,
                json!({
                    "actor": t,
                    "studentId": pupil,
                    "classroomId": school.classroom_id,
                    "points": points,
                    "reason": "Off the scale"
                }),
            ),
            "validation_error",
            "{} with {}",
            method,
            points
        );
    }
    sc.request_ok("health", json!({}));

    let deducted = sc.request_ok(
        "behavior.deduct",
        json!({
            "actor": t,
            "studentId": pupil,
            "classroomId": school.classroom_id,
            "points": -1000,
            "reason": "Limit"
        }),
    );
    assert_eq!(deducted["totalPoints"], json!(-1000));

    for s in &school.students {
        sc.request_ok(
            "behavior.award",
            json!({
                "actor": t,
                "studentId": s,
                "classroomId": school.classroom_id,
                "points": 1000,
                "reason": "Limit"
            }),
        );
    }
    let overview = sc.request_ok("dashboard.teacher", json!({ "actor": t }));
    assert_eq!(overview["classScores"][0]["score"], json!(100));
}
