use assert_cmd::Command;
use scorekeep::auth::AuthService;
use scorekeep::model::User;
use scorekeep::session::SessionService;
use scorekeep::storage::{SqliteStore, Storage};
use tempfile::tempdir;

#[test]
fn export_writes_history_csv() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("data.db");
    let out = dir.path().join("history.csv");

    {
        let storage = Storage::new(SqliteStore::open(&db).unwrap());
        scorekeep::migration::migrate(&storage).unwrap();
        let auth = AuthService::new(&storage);
        auth.register(User::new("ana", "pw")).unwrap();
        auth.login("ana", "pw").unwrap();
        let service = SessionService::new(&storage);
        let s = service.start_session("Chess", &[]).unwrap();
        service.add_outcome(&s.id, "Victory").unwrap();
    }

    Command::cargo_bin("scorekeep")
        .unwrap()
        .arg("--data")
        .arg(&db)
        .arg("--log-file")
        .arg(dir.path().join("test.log"))
        .arg("--export")
        .arg(&out)
        .assert()
        .success();

    let csv = std::fs::read_to_string(&out).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("id,name,start"));
    assert!(lines[1].contains(",Chess,"));
}

#[test]
fn export_without_login_fails() {
    let dir = tempdir().unwrap();

    Command::cargo_bin("scorekeep")
        .unwrap()
        .arg("--data")
        .arg(dir.path().join("empty.db"))
        .arg("--log-file")
        .arg(dir.path().join("test.log"))
        .arg("--export")
        .arg(dir.path().join("out.csv"))
        .assert()
        .failure();

    assert!(!dir.path().join("out.csv").exists());
}

#[test]
fn migrate_only_reports_and_exits() {
    let dir = tempdir().unwrap();

    let output = Command::cargo_bin("scorekeep")
        .unwrap()
        .arg("--data")
        .arg(dir.path().join("fresh.db"))
        .arg("--log-file")
        .arg(dir.path().join("test.log"))
        .arg("--migrate-only")
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("schema v0 -> v2"));
}
