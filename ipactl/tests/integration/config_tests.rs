use crate::common::{TestWorkspace, assert_contains, assert_not_contains, init_test_logging, ipactl};

#[test]
fn test_config_show_reports_sources() {
    init_test_logging();
    crate::test_log!("TEST START: test_config_show_reports_sources");

    let ws = TestWorkspace::new();
    let config = ws.write(
        "config.toml",
        "[server]\nhost = \"ipa.corp.test\"\n\n[auth]\npassword = \"hunter2\"\n",
    );

    let output = ipactl()
        .arg("--config")
        .arg(&config)
        .args(["config", "show"])
        .env("IPA_USER", "robot")
        .output()
        .expect("Failed to run ipactl config show");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_contains(&stdout, "server.host = \"ipa.corp.test\"  (file ");
    assert_contains(&stdout, "auth.user = \"robot\"  (environment)");
    assert_contains(&stdout, "server.port = 443  (default)");
    assert_contains(&stdout, "# base url: https://ipa.corp.test");
    assert_not_contains(&stdout, "hunter2");
    crate::test_log!("TEST PASS: test_config_show_reports_sources");
}

#[test]
fn test_config_show_json() {
    init_test_logging();
    crate::test_log!("TEST START: test_config_show_json");

    let ws = TestWorkspace::new();
    let config = ws.write("config.toml", "[server]\nprotocol = \"http\"\nport = 8080\n");

    let output = ipactl()
        .arg("--config")
        .arg(&config)
        .args(["config", "show", "--json"])
        .env("IPA_PASS", "hunter2")
        .output()
        .expect("Failed to run ipactl config show --json");

    assert!(output.status.success());
    let shown: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("config show --json output is JSON");
    assert_eq!(shown["base_url"], "http://ipa.example.com:8080");
    assert_eq!(shown["config"]["auth"]["password"], "***");
    assert_eq!(shown["sources"]["auth.password"]["kind"], "environment");
    assert_eq!(shown["sources"]["server.port"]["kind"], "file");
    crate::test_log!("TEST PASS: test_config_show_json");
}

#[test]
fn test_bad_environment_override_is_config_error() {
    init_test_logging();
    crate::test_log!("TEST START: test_bad_environment_override_is_config_error");

    let ws = TestWorkspace::new();
    let config = ws.write("config.toml", "");

    let output = ipactl()
        .arg("--config")
        .arg(&config)
        .args(["config", "show"])
        .env("IPA_PORT", "not-a-port")
        .output()
        .expect("Failed to run ipactl config show");

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_contains(&stderr, "[IPA-E005]");
    assert_contains(&stderr, "IPA_PORT");
    crate::test_log!("TEST PASS: test_bad_environment_override_is_config_error");
}

#[test]
fn test_missing_explicit_config_file() {
    init_test_logging();

    let ws = TestWorkspace::new();
    let output = ipactl()
        .arg("--config")
        .arg(ws.dir.path().join("absent.toml"))
        .args(["config", "show"])
        .output()
        .expect("Failed to run ipactl config show");

    assert_eq!(output.status.code(), Some(1));
    assert_contains(&String::from_utf8_lossy(&output.stderr), "[IPA-E001]");
}
