mod test_support;

use serde_json::json;
use test_support::{open_workspace_with_year, request_err, request_ok, spawn_sidecar_with};

fn create_student(
    stdin: &mut std::process::ChildStdin,
    reader: &mut std::io::BufReader<std::process::ChildStdout>,
    id: &str,
    first: &str,
    last: &str,
    grade: &str,
) -> String {
    let created = request_ok(
        stdin,
        reader,
        id,
        "students.create",
        json!({ "firstName": first, "lastName": last, "grade": grade }),
    );
    created
        .get("studentId")
        .and_then(|v| v.as_str())
        .expect("studentId")
        .to_string()
}

#[test]
fn save_day_is_refused_on_holidays_and_weekends() {
    let (_child, mut stdin, mut reader) = spawn_sidecar_with(&[]);
    let _ = open_workspace_with_year(&mut stdin, &mut reader, "attendanced-save-day");
    let ada = create_student(&mut stdin, &mut reader, "1", "Ada", "Lovelace", "5");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "calendar.upsertDay",
        json!({ "date": "2024-09-02", "type": "Holiday", "description": "Labor Day" }),
    );

    let sheet = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "attendance.openDay",
        json!({ "date": "2024-09-02" }),
    );
    assert_eq!(sheet.get("nonSchoolDay").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(
        sheet.pointer("/schoolYear/name").and_then(|v| v.as_str()),
        Some("2024-25")
    );

    for (id, date) in [("4", "2024-09-02"), ("5", "2024-09-07")] {
        assert_eq!(
            request_err(
                &mut stdin,
                &mut reader,
                id,
                "attendance.saveDay",
                json!({ "date": date, "entries": [{ "studentId": ada }] }),
            ),
            "non_school_day"
        );
    }

    let saved = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "attendance.saveDay",
        json!({ "date": "2024-09-03", "entries": [{ "studentId": ada, "status": "Tardy", "notes": "bus" }] }),
    );
    assert_eq!(saved.get("saved").and_then(|v| v.as_u64()), Some(1));

    let sheet = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "attendance.openDay",
        json!({ "date": "2024-09-03" }),
    );
    let records = sheet.get("records").and_then(|v| v.as_array()).expect("records");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].get("status").and_then(|v| v.as_str()), Some("Tardy"));
    assert_eq!(records[0].get("gradeAtTime").and_then(|v| v.as_str()), Some("5"));
}

#[test]
fn importing_the_same_attendance_csv_twice_is_idempotent() {
    let (_child, mut stdin, mut reader) =
        spawn_sidecar_with(&["--school-name", "Springfield Elementary"]);
    let (workspace, _) = open_workspace_with_year(&mut stdin, &mut reader, "attendanced-att-csv");
    let _ = create_student(&mut stdin, &mut reader, "1", "Ada", "Lovelace", "5");

    let csv = "date,last_name,first_name,grade,status,notes,year\n\
               9/3/2024,Lovelace,Ada,5,Absent,sick,\n\
               2024-09-04,Hopper,Grace,5,Present,,\n\
               2024-09-05,Lovelace,Ada,5,Present,,1999-00\n";
    let in_path = workspace.join("attendance.csv");
    std::fs::write(&in_path, csv).expect("write csv");

    let first = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "attendance.importCsv",
        json!({ "inPath": in_path.to_string_lossy() }),
    );
    assert_eq!(first.get("created").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(first.get("skipped").and_then(|v| v.as_u64()), Some(2));
    assert_eq!(
        first.pointer("/skippedByReason/unknownStudent").and_then(|v| v.as_u64()),
        Some(1)
    );

    let second = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "attendance.importCsv",
        json!({ "inPath": in_path.to_string_lossy() }),
    );
    assert_eq!(second.get("created").and_then(|v| v.as_u64()), Some(0));
    assert_eq!(second.get("updated").and_then(|v| v.as_u64()), Some(1));

    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "4",
            "attendance.importCsv",
            json!({ "inPath": in_path.to_string_lossy(), "unknownYear": "abort" }),
        ),
        "unknown_school_year"
    );

    let out_path = workspace.join("out").join("attendance.csv");
    let exported = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "attendance.exportCsv",
        json!({ "start": "2024-09-01", "end": "2024-09-30", "outPath": out_path.to_string_lossy() }),
    );
    assert_eq!(exported.get("rowsExported").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(
        std::fs::read_to_string(&out_path).expect("read export"),
        "Springfield Elementary Attendance\n\n\
         date,last_name,first_name,grade,status,notes,year\n\
         2024-09-03,Lovelace,Ada,5,Absent,sick,2024-25\n"
    );

    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "6",
            "attendance.exportCsv",
            json!({ "start": "2024-09-30", "end": "2024-09-01", "outPath": out_path.to_string_lossy() }),
        ),
        "invalid_range"
    );
}
