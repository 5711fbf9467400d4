//! Permission Check Client.
//!
//! [`PermissionClient`] asks the policy evaluator whether a principal holds
//! one permission on one resource, and turns the answer (or the failure)
//! into an allow/deny decision under the configured [`AuthMode`]:
//!
//! | call result                     | `off` / `strict`  | `permissive`      |
//! |---------------------------------|-------------------|-------------------|
//! | permission granted              | allow             | allow             |
//! | nothing granted                 | deny              | deny              |
//! | connectivity failure            | deny + error      | allow             |
//! | configuration failure           | deny + error      | deny + error      |
//! | any other failure               | deny + error      | deny + error      |
//!
//! Every decision and failure is recorded on the [`TraceEmitter`]. Trace
//! failures never change the decision.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use authz_trace::{
    Action, Actor, AuthzError, AuthzEvent, Decision, Environment, Outcome, Target, TraceContext,
    TraceEmitter, TraceError,
};
use tokio_util::sync::CancellationToken;
use tonic::metadata::MetadataMap;
use tonic::{Extensions, Request, Status};

use crate::classifier::ErrorClass;
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::mode::AuthMode;
use crate::principal;
use crate::proto::{TestIamPermissionsRequest, TestIamPermissionsResponse};
use crate::transport::{GrpcIamPolicyClient, IamPolicyClient};

/// Name recorded as `decision.evaluated_by` and `environment.component`.
pub const COMPONENT_NAME: &str = "emulator-authz";

/// Per-call deadline unless overridden with [`PermissionClient::with_timeout`].
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

pub const REASON_BINDING_MATCH: &str = "binding_match";
pub const REASON_NO_MATCHING_BINDING: &str = "no_matching_binding";

const CHECK_METHOD: &str = "check_permission";

/// One permission check. Not persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionCheckRequest {
    /// Caller identity, carried verbatim. May be empty.
    pub principal: String,
    pub resource: String,
    pub permission: String,
    /// Correlation ids copied onto every trace event of this check.
    pub trace: Option<TraceContext>,
}

impl PermissionCheckRequest {
    #[must_use]
    pub fn new(
        principal: impl Into<String>,
        resource: impl Into<String>,
        permission: impl Into<String>,
    ) -> Self {
        Self {
            principal: principal.into(),
            resource: resource.into(),
            permission: permission.into(),
            trace: None,
        }
    }

    #[must_use]
    pub fn with_trace(mut self, trace: TraceContext) -> Self {
        self.trace = Some(trace);
        self
    }
}

/// Decision for one check.
///
/// Only `allowed == true` may proceed to the protected operation. `error`
/// is diagnostic: it is the evaluator's status, unchanged, so callers can
/// run it through [`crate::classifier`] themselves.
#[derive(Debug, Clone)]
#[must_use]
pub struct PermissionCheckResult {
    pub allowed: bool,
    pub error: Option<Status>,
}

impl PermissionCheckResult {
    pub const fn allow() -> Self {
        Self {
            allowed: true,
            error: None,
        }
    }

    pub const fn deny() -> Self {
        Self {
            allowed: false,
            error: None,
        }
    }

    pub const fn deny_with(error: Status) -> Self {
        Self {
            allowed: false,
            error: Some(error),
        }
    }

    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        self.allowed
    }

    /// Denied because the check itself failed. The error should be logged.
    #[must_use]
    pub const fn is_denied_with_diagnostic(&self) -> bool {
        !self.allowed && self.error.is_some()
    }
}

/// Client for the remote policy evaluator.
///
/// Safe to share across tasks; wrap in an `Arc` to do so.
pub struct PermissionClient {
    iam: Arc<dyn IamPolicyClient>,
    mode: AuthMode,
    trace: TraceEmitter,
    timeout: Duration,
}

impl PermissionClient {
    /// Build a client from configuration: a lazily connected channel to
    /// `emulator_host` and the configured trace output.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`ClientError::InvalidEndpoint`] if the host is not a valid address
    /// - [`ClientError::Trace`] if the trace output cannot be opened
    pub fn connect(config: &ClientConfig) -> Result<Self, ClientError> {
        let iam = GrpcIamPolicyClient::connect_lazy(&config.emulator_host)?;
        let trace = TraceEmitter::from_output(config.trace_output.as_deref())?;

        tracing::info!(
            endpoint = iam.endpoint(),
            mode = %config.mode,
            tracing_enabled = trace.is_enabled(),
            "permission client configured"
        );

        Ok(Self::new(Arc::new(iam), config.mode, trace))
    }

    #[must_use]
    pub fn new(iam: Arc<dyn IamPolicyClient>, mode: AuthMode, trace: TraceEmitter) -> Self {
        Self {
            iam,
            mode,
            trace,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub const fn mode(&self) -> AuthMode {
        self.mode
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Ask the evaluator whether `req.principal` holds `req.permission` on
    /// `req.resource`.
    ///
    /// Issues exactly one remote call bounded by the client timeout and by
    /// `cancel`. Cancellation and timeout are connectivity failures.
    #[tracing::instrument(
        name = "check_permission",
        skip_all,
        fields(
            principal = %req.principal,
            resource = %req.resource,
            permission = %req.permission,
            mode = %self.mode,
        )
    )]
    pub async fn check_permission(
        &self,
        cancel: &CancellationToken,
        req: &PermissionCheckRequest,
    ) -> PermissionCheckResult {
        let started = Instant::now();
        let outcome = self.invoke(cancel, req).await;
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match outcome {
            Ok(response) => {
                let allowed = response.permissions.len() == 1;
                tracing::debug!(allowed, latency_ms, "permission check completed");
                self.record_check(req, allowed, latency_ms);
                if allowed {
                    PermissionCheckResult::allow()
                } else {
                    PermissionCheckResult::deny()
                }
            }
            Err(status) => self.resolve_failure(req, status),
        }
    }

    /// Close the evaluator connection, then the trace output.
    ///
    /// # Errors
    ///
    /// [`TraceError`] if the final trace flush fails. Later calls succeed.
    pub fn close(&self) -> Result<(), TraceError> {
        self.iam.close();
        self.trace.close()
    }

    async fn invoke(
        &self,
        cancel: &CancellationToken,
        req: &PermissionCheckRequest,
    ) -> Result<TestIamPermissionsResponse, Status> {
        let metadata = principal::inject_for_outbound(MetadataMap::new(), &req.principal)
            .map_err(|err| Status::invalid_argument(err.to_string()))?;
        let mut request = Request::from_parts(
            metadata,
            Extensions::default(),
            TestIamPermissionsRequest::single(&req.resource, &req.permission),
        );
        request.set_timeout(self.timeout);

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                Err(Status::cancelled("permission check cancelled by caller"))
            }
            result = tokio::time::timeout(self.timeout, self.iam.test_iam_permissions(request)) => {
                result.unwrap_or_else(|_| {
                    Err(Status::deadline_exceeded("permission check timed out"))
                })
            }
        }
    }

    fn resolve_failure(
        &self,
        req: &PermissionCheckRequest,
        status: Status,
    ) -> PermissionCheckResult {
        let class = ErrorClass::of(&status).unwrap_or(ErrorClass::Policy);
        self.record_error(req, class, &status);

        match class {
            ErrorClass::Connectivity if self.mode.fails_open() => {
                tracing::warn!(
                    code = %status.code(),
                    error = status.message(),
                    "IAM evaluator unreachable, allowing request in permissive mode"
                );
                PermissionCheckResult::allow()
            }
            ErrorClass::Connectivity => {
                tracing::debug!(code = %status.code(), "IAM evaluator unreachable, denying");
                PermissionCheckResult::deny_with(status)
            }
            ErrorClass::Configuration => {
                tracing::warn!(
                    code = %status.code(),
                    error = status.message(),
                    "IAM evaluator rejected the check as malformed, denying"
                );
                PermissionCheckResult::deny_with(status)
            }
            ErrorClass::Policy => {
                tracing::debug!(code = %status.code(), "IAM evaluator returned an error, denying");
                PermissionCheckResult::deny_with(status)
            }
        }
    }

    fn record_check(&self, req: &PermissionCheckRequest, allowed: bool, latency_ms: u64) {
        if !self.trace.is_enabled() {
            return;
        }
        let reason = if allowed {
            REASON_BINDING_MATCH
        } else {
            REASON_NO_MATCHING_BINDING
        };
        let event = AuthzEvent::check(
            Actor::new(&req.principal),
            Target::new(&req.resource),
            Action::new(&req.permission).with_method(CHECK_METHOD),
            Decision::new(Outcome::from_allowed(allowed))
                .with_reason(reason)
                .evaluated_by(COMPONENT_NAME)
                .with_latency_ms(latency_ms),
        )
        .with_environment(self.environment())
        .with_trace(req.trace.clone());
        self.write_trace(&event);
    }

    fn record_error(&self, req: &PermissionCheckRequest, class: ErrorClass, status: &Status) {
        if !self.trace.is_enabled() {
            return;
        }
        let message = if status.message().is_empty() {
            status.code().description()
        } else {
            status.message()
        };
        let mut event = AuthzEvent::error(AuthzError::new(
            class.trace_kind(),
            message,
            class.is_retryable(),
        ))
        .with_environment(self.environment())
        .with_trace(req.trace.clone());
        event.actor = Some(Actor::new(&req.principal)).filter(|a| !a.principal.is_empty());
        event.target = Some(Target::new(&req.resource));
        event.action = Some(Action::new(&req.permission).with_method(CHECK_METHOD));
        self.write_trace(&event);
    }

    fn environment(&self) -> Environment {
        Environment::new(self.mode.as_str(), COMPONENT_NAME)
    }

    fn write_trace(&self, event: &AuthzEvent) {
        if let Err(err) = self.trace.emit(event).and_then(|()| self.trace.flush()) {
            tracing::debug!(error = %err, "failed to write authz trace event");
        }
    }
}

impl fmt::Debug for PermissionClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermissionClient")
            .field("mode", &self.mode)
            .field("trace", &self.trace)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
