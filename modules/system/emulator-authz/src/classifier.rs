//! Failure taxonomy for policy evaluator calls.
//!
//! Classification is a pure function of the gRPC status code. Messages are
//! never inspected.

use tonic::{Code, Status};

/// Trace error kind for connectivity failures.
pub const KIND_IAM_UNREACHABLE: &str = "iam_unreachable";
/// Trace error kind for malformed requests and evaluator bugs.
pub const KIND_INVALID_REQUEST: &str = "invalid_request";
/// Trace error kind for every other evaluator failure.
pub const KIND_POLICY_ERROR: &str = "policy_error";

/// Status codes meaning the evaluator could not be reached in time.
pub const CONNECTIVITY_CODES: [Code; 3] =
    [Code::Unavailable, Code::DeadlineExceeded, Code::Cancelled];

/// Status codes meaning the request or the evaluator is broken.
pub const CONFIGURATION_CODES: [Code; 3] =
    [Code::InvalidArgument, Code::Internal, Code::Unimplemented];

/// Bucket of a failed evaluator call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Unreachable, timed out or cancelled. Outcome depends on the mode.
    Connectivity,
    /// Malformed request or evaluator bug. Always denied.
    Configuration,
    /// Anything else, including an explicit `PermissionDenied`. Always
    /// denied, not retryable, not a bug.
    Policy,
}

impl ErrorClass {
    /// Classify a status code. `Code::Ok` is not a failure and yields `None`.
    #[must_use]
    pub fn of_code(code: Code) -> Option<Self> {
        if code == Code::Ok {
            None
        } else if is_connectivity_code(code) {
            Some(Self::Connectivity)
        } else if is_configuration_code(code) {
            Some(Self::Configuration)
        } else {
            Some(Self::Policy)
        }
    }

    #[must_use]
    pub fn of(status: &Status) -> Option<Self> {
        Self::of_code(status.code())
    }

    /// Value of `error.kind` in `authz_error` trace events.
    #[must_use]
    pub const fn trace_kind(self) -> &'static str {
        match self {
            Self::Connectivity => KIND_IAM_UNREACHABLE,
            Self::Configuration => KIND_INVALID_REQUEST,
            Self::Policy => KIND_POLICY_ERROR,
        }
    }

    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Connectivity)
    }
}

#[must_use]
pub fn is_connectivity_code(code: Code) -> bool {
    CONNECTIVITY_CODES.contains(&code)
}

#[must_use]
pub fn is_configuration_code(code: Code) -> bool {
    CONFIGURATION_CODES.contains(&code)
}

/// `true` if the evaluator was unreachable, timed out or the call was
/// cancelled. `None` (no error) is never a connectivity error.
#[must_use]
pub fn is_connectivity_error(status: Option<&Status>) -> bool {
    status.is_some_and(|s| is_connectivity_code(s.code()))
}

/// `true` if the failure indicates a malformed request or evaluator bug,
/// which is denied in every mode. `None` (no error) is never a
/// configuration error.
#[must_use]
pub fn is_configuration_error(status: Option<&Status>) -> bool {
    status.is_some_and(|s| is_configuration_code(s.code()))
}
