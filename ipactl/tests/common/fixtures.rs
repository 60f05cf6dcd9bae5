use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::TempDir;

const IPA_VARS: &[&str] = &[
    "IPA_HOST",
    "IPA_PORT",
    "IPA_PROT",
    "IPA_USER",
    "IPA_PASS",
    "IPA_PASS_FILE",
    "IPA_VALIDATE_CERTS",
    "IPA_TIMEOUT_SECS",
    "IPA_LOG_LEVEL",
    "IPA_LOG_FORMAT",
    "IPA_LOG_FILE",
    "RUST_LOG",
];

/// The binary with every `IPA_*` variable removed, so the caller's
/// environment cannot leak into a test.
pub fn ipactl() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_ipactl"));
    for var in IPA_VARS {
        cmd.env_remove(var);
    }
    cmd
}

/// A scratch directory for config and task files.
pub struct TestWorkspace {
    pub dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        crate::test_log!("FIXTURE: Creating test workspace");
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, contents).expect("Failed to write fixture file");
        path
    }

    /// Config for a server nothing listens on.
    pub fn unreachable_config(&self) -> PathBuf {
        self.write(
            "config.toml",
            r#"[server]
host = "127.0.0.1"
port = 9
protocol = "http"
timeout_secs = 2

[auth]
user = "admin"
password = "not-used"
"#,
        )
    }
}
