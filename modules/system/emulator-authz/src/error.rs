use thiserror::Error;

/// The principal contains bytes that cannot travel as a gRPC metadata value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("principal cannot be encoded as gRPC metadata")]
pub struct InvalidPrincipal;

/// Construction-time failures of [`crate::PermissionClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid IAM emulator endpoint '{endpoint}': {source}")]
    InvalidEndpoint {
        endpoint: String,
        #[source]
        source: tonic::transport::Error,
    },

    #[error("failed to open authz trace output: {0}")]
    Trace(#[from] authz_trace::TraceError),
}

/// Configuration could not be extracted from its providers.
#[derive(Debug, Error)]
#[error("invalid emulator authz configuration: {0}")]
pub struct ConfigError(#[source] Box<figment::Error>);

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self(Box::new(err))
    }
}
