//! Test support shared by this crate's tests and downstream integration
//! tests.

mod fake_directory;
mod log;

pub use fake_directory::{FakeDirectory, RecordedCall};
pub use log::{TestLogEntry, TestLogger, TestPhase, init_test_logging};
