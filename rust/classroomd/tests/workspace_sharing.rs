mod test_support;

use serde_json::json;
use test_support::{seed_school, spawn_sidecar, str_at, teacher, temp_dir};

#[test]
fn two_processes_on_one_workspace_see_each_others_writes() {
    let workspace = temp_dir("classroomd-shared-workspace");
    let mut a = spawn_sidecar();
    let mut b = spawn_sidecar();
    a.select_workspace(&workspace);
    b.select_workspace(&workspace);

    let school = seed_school(&mut a, 2, 2, 3);
    let t = teacher(&school.teacher_id);

    let plan = a.request_ok("seating.randomize", json!({ "actor": t, "classroomId": school.classroom_id }));
    let plan_id = str_at(&plan, "/plan/id").to_string();

    // b reads a's plan and is refused a seat a already filled.
    let view = b.request_ok("seating.view", json!({ "actor": t, "classroomId": school.classroom_id }));
    assert_eq!(view["plan"]["id"], json!(plan_id));
    let occupant = view["grid"][0][0]["student"]["studentId"]
        .as_str()
        .expect("seat 0,0 taken")
        .to_string();
    let other = school
        .students
        .iter()
        .find(|s| **s != occupant)
        .expect("another student")
        .clone();
    assert_eq!(
        b.request_err(
            "seating.assign",
            json!({ "actor": t, "planId": plan_id, "studentId": other, "row": 0, "column": 0 }),
        ),
        "conflict"
    );

    // Both processes write to the ledger; totals add up.
    for sc in [&mut a, &mut b] {
        sc.request_ok(
            "behavior.award",
            json!({
                "actor": t,
                "studentId": occupant,
                "classroomId": school.classroom_id,
                "points": 2,
                "reason": "Focus"
            }),
        );
    }
    let summary = a.request_ok("behavior.summary", json!({ "actor": t, "studentId": occupant }));
    assert_eq!(summary["totalPoints"], json!(4));

    // Still a single active plan after both randomize.
    b.request_ok("seating.randomize", json!({ "actor": t, "classroomId": school.classroom_id }));
    let plans = a.request_ok("seating.plans.list", json!({ "actor": t, "classroomId": school.classroom_id }));
    let active = plans["plans"]
        .as_array()
        .expect("plans")
        .iter()
        .filter(|p| p["isActive"] == json!(true))
        .count();
    assert_eq!(active, 1);
}
