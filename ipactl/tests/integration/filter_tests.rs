use crate::common::{assert_contains, init_test_logging, ipactl};

fn filter(args: &[&str]) -> std::process::Output {
    ipactl()
        .arg("filter")
        .args(args)
        .output()
        .expect("Failed to run ipactl filter")
}

#[test]
fn test_filter_list_names_every_filter() {
    init_test_logging();
    crate::test_log!("TEST START: test_filter_list_names_every_filter");

    let output = filter(&["--list"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.lines().count(), 13);
    assert_contains(&stdout, "systemd_escape");
    assert_contains(&stdout, "ipa_cert_to_pem");
    crate::test_log!("TEST PASS: test_filter_list_names_every_filter");
}

#[test]
fn test_filter_host_name_helpers() {
    init_test_logging();
    crate::test_log!("TEST START: test_filter_host_name_helpers");

    let cases: &[(&[&str], &str)] = &[
        (&["shortname", "ipa.example.com"], "ipa"),
        (&["domainname", "ipa.example.com"], "example.com"),
        (&["domain_to_dn", "example.com"], "dc=example,dc=com"),
        (&["reverse_ip", "192.0.2.10"], "10.2.0.192"),
        (&["reverse_zone", "192.0.2"], "2.0.192.in-addr.arpa."),
        (&["last_octet", "192.0.2.10"], "10"),
    ];
    for (args, expected) in cases {
        let output = filter(args);
        assert!(output.status.success(), "filter {args:?} failed");
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim_end(), *expected);
    }
    crate::test_log!("TEST PASS: test_filter_host_name_helpers");
}

#[test]
fn test_filter_dns_server_ips_reads_inventory_json() {
    init_test_logging();
    crate::test_log!("TEST START: test_filter_dns_server_ips_reads_inventory_json");

    let hostvars = r#"{
        "ipa1": {"groups": {"freeipa_servers": ["ipa1", "ipa2"]}, "ipa_ip_addr": "192.0.2.11"},
        "ipa2": {"ipa_ip_addr": "192.0.2.12"}
    }"#;
    let output = filter(&["dns_server_ips", hostvars]);

    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim_end(),
        "192.0.2.11\n192.0.2.12"
    );

    let output = filter(&["dns_server_ips", "not json"]);
    assert_eq!(output.status.code(), Some(1));
    assert_contains(&String::from_utf8_lossy(&output.stderr), "needs JSON input");
    crate::test_log!("TEST PASS: test_filter_dns_server_ips_reads_inventory_json");
}

#[test]
fn test_filter_format_map_str_with_separator() {
    init_test_logging();
    crate::test_log!("TEST START: test_filter_format_map_str_with_separator");

    let output = filter(&["format_map_str", "53,80", "publish:{}", " "]);

    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim_end(),
        "publish:53 publish:80"
    );
    crate::test_log!("TEST PASS: test_filter_format_map_str_with_separator");
}

#[test]
fn test_unknown_filter_fails_with_remediation() {
    init_test_logging();
    crate::test_log!("TEST START: test_unknown_filter_fails_with_remediation");

    let output = filter(&["rot13", "text"]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_contains(&stderr, "[IPA-E401]");
    assert_contains(&stderr, "unknown filter 'rot13'");
    assert_contains(&stderr, "ipactl filter --list");
    crate::test_log!("TEST PASS: test_unknown_filter_fails_with_remediation");
}

#[test]
fn test_filter_without_input_is_a_usage_error() {
    init_test_logging();

    let output = filter(&["shortname"]);

    assert_eq!(output.status.code(), Some(2));
    assert_contains(&String::from_utf8_lossy(&output.stderr), "required");
}
