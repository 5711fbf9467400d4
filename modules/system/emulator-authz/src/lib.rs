#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Emulator authorization client
//!
//! Lets a data-plane emulator ask an IAM policy evaluator whether a caller
//! may perform an action before serving a request:
//!
//! - [`PermissionClient`] - one remote check per call, resolved to allow/deny
//!   under an [`AuthMode`]
//! - [`AuthMode`] - `off` / `permissive` (fail-open) / `strict` (fail-closed)
//! - [`classifier`] - connectivity vs configuration vs policy failures
//! - [`principal`] - caller identity in gRPC metadata and HTTP headers
//! - [`ClientConfig`] - `IAM_*` environment configuration
//!
//! Decisions are recorded through [`authz_trace`].
//!
//! ## Usage
//!
//! ```ignore
//! use emulator_authz::{ClientConfig, PermissionCheckRequest, PermissionClient, principal};
//! use tokio_util::sync::CancellationToken;
//!
//! let config = ClientConfig::from_env()?;
//! let client = PermissionClient::connect(&config)?;
//!
//! // Inside a gRPC handler
//! if config.mode.is_enabled() {
//!     let req = PermissionCheckRequest::new(
//!         principal::extract_from_request(&request),
//!         "projects/p/secrets/s",
//!         "secretmanager.secrets.get",
//!     );
//!     let result = client.check_permission(&CancellationToken::new(), &req).await;
//!     if !result.is_allowed() {
//!         return Err(result.error.unwrap_or_else(|| Status::permission_denied("denied")));
//!     }
//! }
//!
//! client.close()?;
//! ```

pub mod classifier;
pub mod client;
pub mod config;
pub mod error;
pub mod mode;
pub mod principal;
pub mod proto;
mod scalar;
pub mod transport;

pub use classifier::{ErrorClass, is_configuration_error, is_connectivity_error};
pub use client::{
    COMPONENT_NAME, DEFAULT_TIMEOUT, PermissionCheckRequest, PermissionCheckResult,
    PermissionClient,
};
pub use config::{ClientConfig, DEFAULT_EMULATOR_HOST};
pub use error::{ClientError, ConfigError, InvalidPrincipal};
pub use mode::AuthMode;
pub use principal::{PRINCIPAL_HEADER_KEY, PRINCIPAL_METADATA_KEY};
pub use proto::{TestIamPermissionsRequest, TestIamPermissionsResponse};
pub use transport::{GrpcIamPolicyClient, IamPolicyClient};
