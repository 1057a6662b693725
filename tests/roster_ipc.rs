mod test_support;

use serde_json::json;
use test_support::{open_workspace_with_year, request_err, request_ok, spawn_sidecar};

#[test]
fn students_crud_search_and_csv_roundtrip() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let (workspace, _) = open_workspace_with_year(&mut stdin, &mut reader, "attendanced-roster");

    let csv = "\u{feff}first_name,last_name,grade,active\n\
               Ada,Lovelace,5,1\n\
               Alan,Turing,6,no\n\
               ,Nameless,4,1\n";
    let in_path = workspace.join("students.csv");
    std::fs::write(&in_path, csv).expect("write csv");
    let summary = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "students.importCsv",
        json!({ "inPath": in_path.to_string_lossy() }),
    );
    assert_eq!(summary.get("created").and_then(|v| v.as_u64()), Some(2));
    assert_eq!(
        summary.pointer("/skippedByReason/missingName").and_then(|v| v.as_u64()),
        Some(1)
    );

    let found = request_ok(&mut stdin, &mut reader, "2", "students.list", json!({ "q": "tur" }));
    let students = found.get("students").and_then(|v| v.as_array()).expect("students");
    assert_eq!(students.len(), 1);
    assert_eq!(students[0].get("active").and_then(|v| v.as_bool()), Some(false));
    let alan = students[0]
        .get("id")
        .and_then(|v| v.as_str())
        .expect("id")
        .to_string();

    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "3",
            "students.create",
            json!({ "firstName": "Ada", "lastName": "Lovelace" }),
        ),
        "conflict"
    );

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "students.update",
        json!({ "id": alan, "firstName": "Alan", "lastName": "Turing", "grade": "7", "active": true }),
    );
    assert_eq!(
        updated.pointer("/student/currentGrade").and_then(|v| v.as_str()),
        Some("7")
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "attendance.saveDay",
        json!({ "date": "2024-09-03", "entries": [{ "studentId": alan }] }),
    );
    let _ = request_ok(&mut stdin, &mut reader, "6", "students.delete", json!({ "id": alan }));
    let daily = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "reports.daily",
        json!({ "date": "2024-09-03" }),
    );
    assert_eq!(
        daily.get("records").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(0)
    );
    assert_eq!(
        request_err(&mut stdin, &mut reader, "8", "students.delete", json!({ "id": alan })),
        "not_found"
    );

    let out_path = workspace.join("students-out.csv");
    let exported = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "students.exportCsv",
        json!({ "outPath": out_path.to_string_lossy() }),
    );
    assert_eq!(exported.get("rowsExported").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(
        std::fs::read_to_string(&out_path).expect("read export"),
        "first_name,last_name,grade,active\nAda,Lovelace,5,1\n"
    );
}

#[test]
fn users_never_expose_password_hashes() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = open_workspace_with_year(&mut stdin, &mut reader, "attendanced-users");

    assert_eq!(
        request_err(&mut stdin, &mut reader, "1", "users.create", json!({ "username": "mrs.k" })),
        "bad_params"
    );
    let created = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "users.create",
        json!({ "username": "mrs.k", "password": "chalkboard", "email": "k@example.org" }),
    );
    let user_id = created
        .get("userId")
        .and_then(|v| v.as_str())
        .expect("userId")
        .to_string();
    assert_eq!(created.pointer("/user/role").and_then(|v| v.as_str()), Some("teacher"));
    assert!(created.pointer("/user/passwordHash").is_none());

    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "3",
            "users.create",
            json!({ "username": "mrs.k", "password": "again" }),
        ),
        "conflict"
    );
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "3b",
            "users.create",
            json!({ "username": "mr.b", "password": "   " }),
        ),
        "bad_params"
    );
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "4",
            "users.update",
            json!({ "id": user_id, "username": "mrs.k", "role": "principal" }),
        ),
        "bad_params"
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "users.update",
        json!({ "id": user_id, "username": "mrs.k", "role": "admin", "password": "eraser" }),
    );

    let listed = request_ok(&mut stdin, &mut reader, "6", "users.list", json!({}));
    let users = listed.get("users").and_then(|v| v.as_array()).expect("users");
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].get("role").and_then(|v| v.as_str()), Some("admin"));
    assert!(!listed.to_string().contains("$argon2id$"));

    let _ = request_ok(&mut stdin, &mut reader, "7", "users.delete", json!({ "id": user_id }));
    assert_eq!(
        request_err(&mut stdin, &mut reader, "8", "users.delete", json!({ "id": user_id })),
        "not_found"
    );
}

#[test]
fn overlapping_school_years_are_rejected() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let (_, year_id) = open_workspace_with_year(&mut stdin, &mut reader, "attendanced-years");

    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "1",
            "years.create",
            json!({ "name": "Summer 2025", "startDate": "2025-06-01", "endDate": "2025-08-01" }),
        ),
        "conflict"
    );
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "2",
            "years.create",
            json!({ "name": "Backwards", "startDate": "2026-06-01", "endDate": "2025-08-01" }),
        ),
        "invalid_range"
    );

    let found = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "years.forDate",
        json!({ "date": "2025-01-15" }),
    );
    assert_eq!(
        found.pointer("/year/id").and_then(|v| v.as_str()),
        Some(year_id.as_str())
    );
    let none = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "years.forDate",
        json!({ "date": "2025-07-04" }),
    );
    assert!(none.get("year").map(|v| v.is_null()).unwrap_or(false));
}
