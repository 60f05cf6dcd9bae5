//! Declarative reconciliation of directory objects.
//!
//! A caller states what one object (group, user, service, DNS record, ...)
//! should look like; the [`Reconciler`] finds it over JSON-RPC, diffs it
//! against the request and issues the add, modify, enable/disable and list
//! membership calls needed to converge, reporting whether anything changed.
//!
//! Object types are data ([`ObjectSchema`]) with a handful of named hook
//! functions; the built-in ones live in [`builtin`].

pub mod builtin;
pub mod config;
pub mod diff;
pub mod error;
pub mod errors;
pub mod filters;
pub mod gateway;
pub mod logging;
pub mod reconcile;
pub mod schema;
pub mod session;
pub mod testing;
pub mod trace;
pub mod types;
pub mod util;

pub use builtin::Registry;
pub use config::{ClientConfig, ConfigError, ConfigSource, LoadedConfig, Protocol, Sourced};
pub use diff::ChangeSet;
pub use error::{ReconcileError, SchemaError};
pub use errors::{ErrorCategory, ErrorCode, ErrorEntry};
pub use gateway::{JsonRpcGateway, RemoteObjectGateway, RpcTransport};
pub use logging::{LogConfig, LogFormat, LoggingGuards, init_logging};
pub use reconcile::{EnsureOutcome, Reconciler};
pub use schema::{Action, ActionSet, AttributeSpec, Creation, Encoding, ObjectSchema};
pub use session::HttpSession;
pub use trace::RequestTrace;
pub use types::{AttrValue, DesiredState, Identity, RemoteCall, RemoteObject, Scalar, TargetState};
