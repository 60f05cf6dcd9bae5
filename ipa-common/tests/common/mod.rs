#![allow(dead_code)]

pub mod mock_server;

use ipa_common::testing::{FakeDirectory, TestLogger};
use ipa_common::{
    DesiredState, EnsureOutcome, JsonRpcGateway, ReconcileError, Reconciler, Registry,
};
use serde_json::json;

pub use ipa_common::testing::{TestPhase, init_test_logging};

#[macro_export]
macro_rules! test_log {
    ($($arg:tt)*) => {
        tracing::info!(target: "test", $($arg)*);
    };
}

/// A fake directory plus the registry the reconciler reads schemas from.
/// Every run is written to `target/test-logs/<test>.jsonl`.
pub struct Harness {
    pub fake: FakeDirectory,
    pub registry: Registry,
    pub logger: TestLogger,
}

impl Harness {
    pub fn for_test(test_name: &str) -> Self {
        init_test_logging();
        Self {
            fake: FakeDirectory::builtin().expect("builtin schemas"),
            registry: Registry::builtin().expect("builtin schemas"),
            logger: TestLogger::for_test(test_name),
        }
    }

    pub fn ensure(
        &self,
        object_type: &str,
        desired: &DesiredState,
    ) -> Result<EnsureOutcome, ReconcileError> {
        self.logger.log_with_data(
            TestPhase::Execute,
            format!("ensure {object_type}"),
            json!({"state": desired.state.to_string(), "dry_run": desired.dry_run}),
        );
        let schema = self.registry.get(object_type)?;
        let gateway = JsonRpcGateway::new(&self.fake);
        let result = Reconciler::new(schema, &gateway).ensure(desired);
        match &result {
            Ok(outcome) => self.logger.log_with_data(
                TestPhase::Verify,
                format!("ensure {object_type} done"),
                json!({"changed": outcome.changed, "calls": self.fake.mutating_methods()}),
            ),
            Err(err) => self.logger.log_with_data(
                TestPhase::Verify,
                format!("ensure {object_type} failed"),
                json!({"code": err.code().code_string(), "error": err.to_string()}),
            ),
        }
        result
    }

    /// Mutating methods received since the last call, then forget them.
    pub fn take_mutations(&self) -> Vec<String> {
        let methods = self.fake.mutating_methods();
        self.fake.clear_calls();
        methods
    }

    pub fn pass(self) {
        self.logger.pass();
    }
}
