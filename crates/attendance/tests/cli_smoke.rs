use assert_cmd::Command;

fn base_cmd(db: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("attendance").expect("bin");
    cmd.arg("--db").arg(db);
    cmd
}

#[test]
fn help_describes_the_recorder() {
    let mut cmd = Command::cargo_bin("attendance").expect("bin");
    let out = cmd.arg("--help").assert().success();
    let stdout = String::from_utf8(out.get_output().stdout.clone()).expect("utf8");
    assert!(stdout.contains("attendance recording"));
    assert!(stdout.contains("--member"));
}

#[test]
fn offline_add_queues_and_survives_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = dir.path().join("records.sqlite");

    let mut add = base_cmd(&db);
    add.current_dir(dir.path())
        .arg("--offline")
        .arg("--member")
        .arg("m1")
        .arg("--service")
        .arg("s1")
        .arg("--location")
        .arg("main");
    let out = add.assert().success();
    let stdout = String::from_utf8(out.get_output().stdout.clone()).expect("utf8");
    assert!(stdout.contains("checkin queued"));
    assert!(stdout.contains("pending=1"));

    // A fresh process hydrates the same pending record.
    let mut status = base_cmd(&db);
    status.current_dir(dir.path()).arg("--offline");
    let out = status.assert().success();
    let stdout = String::from_utf8(out.get_output().stdout.clone()).expect("utf8");
    assert!(stdout.contains("pending=1"));
}

#[test]
fn online_add_with_accepting_remote_drains_the_queue() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = dir.path().join("records.sqlite");

    let mut add = base_cmd(&db);
    add.current_dir(dir.path())
        .arg("--remote-command")
        .arg("true")
        .arg("--member")
        .arg("m1")
        .arg("--service")
        .arg("s1")
        .arg("--location")
        .arg("main");
    let out = add.assert().success();
    let stdout = String::from_utf8(out.get_output().stdout.clone()).expect("utf8");
    assert!(stdout.contains("checkin syncing"));
    assert!(stdout.contains("pending=0"));
}

#[test]
fn rejecting_remote_surfaces_the_failure_in_status() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = dir.path().join("records.sqlite");

    let mut add = base_cmd(&db);
    add.current_dir(dir.path())
        .arg("--remote-command")
        .arg("false")
        .arg("--member")
        .arg("m1")
        .arg("--service")
        .arg("s1")
        .arg("--location")
        .arg("main");
    let out = add.assert().success();
    let stdout = String::from_utf8(out.get_output().stdout.clone()).expect("utf8");
    assert!(stdout.contains("pending=1"));
    assert!(stdout.contains("error=sync command exited with code 1"));
}

#[test]
fn manual_retry_flushes_a_previously_failed_record() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = dir.path().join("records.sqlite");

    let mut add = base_cmd(&db);
    add.current_dir(dir.path())
        .arg("--offline")
        .arg("--member")
        .arg("m1")
        .arg("--service")
        .arg("s1")
        .arg("--location")
        .arg("main");
    add.assert().success();

    let mut retry = base_cmd(&db);
    retry
        .current_dir(dir.path())
        .arg("--remote-command")
        .arg("true")
        .arg("--retry");
    let out = retry.assert().success();
    let stdout = String::from_utf8(out.get_output().stdout.clone()).expect("utf8");
    assert!(stdout.contains("pending=0"));
}

#[test]
fn partial_checkin_flags_are_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = dir.path().join("records.sqlite");

    let mut add = base_cmd(&db);
    add.current_dir(dir.path()).arg("--member").arg("m1");
    add.assert().failure();
}
