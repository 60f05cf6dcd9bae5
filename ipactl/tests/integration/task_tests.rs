use crate::common::{TestWorkspace, assert_contains, init_test_logging, ipactl};

fn ensure(ws: &TestWorkspace, task: &std::path::Path) -> std::process::Output {
    ipactl()
        .arg("--config")
        .arg(ws.unreachable_config())
        .args(["ensure", "--task"])
        .arg(task)
        .output()
        .expect("Failed to run ipactl ensure")
}

#[test]
fn test_ensure_missing_task_file() {
    init_test_logging();
    crate::test_log!("TEST START: test_ensure_missing_task_file");

    let ws = TestWorkspace::new();
    let output = ensure(&ws, &ws.dir.path().join("missing.toml"));

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_contains(&stderr, "[IPA-E007]");
    assert_contains(&stderr, "missing.toml");
    crate::test_log!("TEST PASS: test_ensure_missing_task_file");
}

#[test]
fn test_ensure_rejects_malformed_task() {
    init_test_logging();
    crate::test_log!("TEST START: test_ensure_rejects_malformed_task");

    let ws = TestWorkspace::new();
    let task = ws.write("task.toml", "type = \"group\"\nstate = \"vanished\"\n");
    let output = ensure(&ws, &task);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_contains(&stderr, "[IPA-E008]");
    assert_contains(&stderr, "ipactl task-schema");
    crate::test_log!("TEST PASS: test_ensure_rejects_malformed_task");
}

#[test]
fn test_ensure_unknown_object_type() {
    init_test_logging();

    let ws = TestWorkspace::new();
    let task = ws.write("task.json", r#"{"type": "printer", "params": {"cn": "lp0"}}"#);
    let output = ensure(&ws, &task);

    assert_eq!(output.status.code(), Some(1));
    assert_contains(&String::from_utf8_lossy(&output.stderr), "[IPA-E301]");
}

#[test]
fn test_ensure_unreachable_server_is_login_failure() {
    init_test_logging();
    crate::test_log!("TEST START: test_ensure_unreachable_server_is_login_failure");

    let ws = TestWorkspace::new();
    let task = ws.write(
        "task.toml",
        "type = \"group\"\nstate = \"present\"\n\n[params]\ncn = \"ops\"\nmember_user = [\"alice\"]\n",
    );
    let output = ensure(&ws, &task);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_contains(&stderr, "[IPA-E100]");
    assert_contains(&stderr, "login");
    assert!(output.stdout.is_empty(), "nothing printed on failure");
    crate::test_log!("TEST PASS: test_ensure_unreachable_server_is_login_failure");
}
