use crate::common::{assert_contains, init_test_logging, ipactl};

#[test]
fn test_help_includes_description() {
    init_test_logging();
    crate::test_log!("TEST START: test_help_includes_description");

    let output = ipactl()
        .arg("--help")
        .output()
        .expect("Failed to run ipactl --help");

    assert!(output.status.success(), "ipactl --help failed");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_contains(&stdout, "declarative directory object management");
    for command in ["ensure", "find", "schema", "task-schema", "filter", "config"] {
        assert_contains(&stdout, command);
    }
    crate::test_log!("TEST PASS: test_help_includes_description");
}

#[test]
fn test_schema_lists_builtin_types() {
    init_test_logging();
    crate::test_log!("TEST START: test_schema_lists_builtin_types");

    let output = ipactl().arg("schema").output().expect("Failed to run ipactl schema");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for name in ["caacl", "ca", "dnsrecord", "dnszone", "group", "service", "user"] {
        assert_contains(&stdout, name);
    }
    assert_contains(&stdout, "identity=dnszoneidnsname,idnsname");
    crate::test_log!("TEST PASS: test_schema_lists_builtin_types");
}

#[test]
fn test_schema_describes_one_type() {
    init_test_logging();
    crate::test_log!("TEST START: test_schema_describes_one_type");

    let output = ipactl()
        .args(["schema", "group"])
        .output()
        .expect("Failed to run ipactl schema group");

    assert!(output.status.success());
    let schema: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("schema output is JSON");
    assert_eq!(schema["name"], "group");
    assert_eq!(schema["methods"]["find"], "group_find");
    assert_eq!(schema["find_predicate"], "identity_matches");
    let routed = schema["attributes"]
        .as_array()
        .unwrap()
        .iter()
        .find(|a| a["name"] == "member_user")
        .expect("member_user attribute");
    assert_eq!(routed["route"]["add_method"], "group_add_member");
    crate::test_log!("TEST PASS: test_schema_describes_one_type");
}

#[test]
fn test_unknown_schema_reports_catalog_entry() {
    init_test_logging();
    crate::test_log!("TEST START: test_unknown_schema_reports_catalog_entry");

    let output = ipactl()
        .args(["schema", "host"])
        .output()
        .expect("Failed to run ipactl schema host");

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_contains(&stderr, "[IPA-E301]");
    assert_contains(&stderr, "host");
    assert_contains(&stderr, "Remediation steps:");
    assert_contains(&stderr, "ipactl schema");
    crate::test_log!("TEST PASS: test_unknown_schema_reports_catalog_entry");
}

#[test]
fn test_task_schema_is_json_schema() {
    init_test_logging();
    crate::test_log!("TEST START: test_task_schema_is_json_schema");

    let output = ipactl()
        .arg("task-schema")
        .output()
        .expect("Failed to run ipactl task-schema");

    assert!(output.status.success());
    let schema: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("task-schema output is JSON");
    assert_eq!(schema["title"], "TaskFile");
    assert!(schema["required"].as_array().unwrap().contains(&"type".into()));
    assert!(schema["properties"]["state"].is_object());
    crate::test_log!("TEST PASS: test_task_schema_is_json_schema");
}

#[test]
fn test_find_refuses_non_identity_keys_before_connecting() {
    init_test_logging();
    crate::test_log!("TEST START: test_find_refuses_non_identity_keys_before_connecting");

    let output = ipactl()
        .args(["find", "group", "description=ops"])
        .output()
        .expect("Failed to run ipactl find");

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_contains(&stderr, "not an identity key");
    assert_contains(&stderr, "(expected cn)");
    crate::test_log!("TEST PASS: test_find_refuses_non_identity_keys_before_connecting");
}
