mod test_support;

use rusqlite::Connection;
use std::process::Command;
use test_support::temp_dir;

fn run(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_attendanced"))
        .args(args)
        .env_remove("ATTENDANCED_WORKSPACE")
        .output()
        .expect("run attendanced")
}

#[test]
fn init_db_and_create_admin_prepare_a_workspace() {
    let workspace = temp_dir("attendanced-cli");
    let ws = workspace.to_string_lossy().to_string();

    let out = run(&["--workspace", &ws, "init-db"]);
    assert!(out.status.success(), "init-db failed: {:?}", out);
    assert!(workspace.join("attendance.sqlite3").is_file());

    for _ in 0..2 {
        let out = run(&["--workspace", &ws, "create-admin", "--password", "changeme"]);
        assert!(out.status.success(), "create-admin failed: {:?}", out);
    }

    let conn = Connection::open(workspace.join("attendance.sqlite3")).expect("open db");
    let (count, role): (i64, String) = conn
        .query_row(
            "SELECT COUNT(*), MAX(role) FROM users WHERE username = 'admin'",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .expect("query users");
    assert_eq!((count, role.as_str()), (1, "admin"));
}

#[test]
fn commands_needing_a_workspace_fail_without_one() {
    let out = run(&["init-db"]);
    assert!(!out.status.success());
}
