#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Authorization decision traces
//!
//! A narrow, versioned event schema recording every permission decision and
//! evaluator failure, one JSON object per line:
//!
//! - [`AuthzEvent`] - the event envelope (`authz_check` / `authz_error`)
//! - [`TraceEmitter`] - buffered, thread-safe JSONL sink (or a no-op)
//! - [`TraceValidator`] - schema checks for single events and whole files
//!   (plain or gzip-compressed)
//!
//! ## Usage
//!
//! ```ignore
//! use authz_trace::{Action, Actor, AuthzEvent, Decision, Outcome, Target, TraceEmitter};
//!
//! let emitter = TraceEmitter::from_output(Some("/tmp/authz.jsonl"))?;
//! emitter.emit(&AuthzEvent::check(
//!     Actor::new("user:alice@example.com"),
//!     Target::new("projects/p/secrets/s"),
//!     Action::new("secretmanager.secrets.get"),
//!     Decision::new(Outcome::Allow),
//! ))?;
//! emitter.close()?;
//!
//! authz_trace::TraceValidator::new().validate_file("/tmp/authz.jsonl")?;
//! ```

pub mod emitter;
pub mod error;
pub mod types;
pub mod validator;

pub use emitter::{ActiveEmitter, STDOUT_DESTINATION, TraceEmitter};
pub use error::{EventError, FileValidationError, LineError, TraceError};
pub use types::{
    Action, Actor, ApiDetails, AuthzError, AuthzEvent, CiContext, Condition, Decision,
    EVENT_TYPE_AUTHZ_CHECK, EVENT_TYPE_AUTHZ_ERROR, Environment, MatchedBinding, Outcome, Policy,
    SCHEMA_V1_0, Source, Target, TraceContext, now_rfc3339_nano,
};
pub use validator::TraceValidator;
