//! Connection to the remote policy evaluator.

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use tonic::transport::Endpoint;
use tonic::{Request, Status};

use crate::error::ClientError;
use crate::proto::{IamPolicyStub, TestIamPermissionsRequest, TestIamPermissionsResponse};

/// Remote `TestIamPermissions` call.
///
/// Implementations must be safe for concurrent use from many checks.
#[async_trait]
pub trait IamPolicyClient: Send + Sync {
    /// # Errors
    ///
    /// The evaluator's [`Status`], returned unchanged.
    async fn test_iam_permissions(
        &self,
        request: Request<TestIamPermissionsRequest>,
    ) -> Result<TestIamPermissionsResponse, Status>;

    /// Release the connection. Calling it again does nothing.
    fn close(&self) {}
}

/// [`IamPolicyClient`] over one lazily connected gRPC channel.
#[derive(Debug)]
pub struct GrpcIamPolicyClient {
    endpoint: String,
    stub: ArcSwapOption<IamPolicyStub>,
}

impl GrpcIamPolicyClient {
    /// Build a channel to `host` (`host:port`, or a full `http(s)://` URI).
    ///
    /// No connection is made until the first call. Must be called from
    /// within a tokio runtime.
    ///
    /// # Errors
    ///
    /// [`ClientError::InvalidEndpoint`] if `host` is not a valid URI authority.
    pub fn connect_lazy(host: &str) -> Result<Self, ClientError> {
        let endpoint = endpoint_uri(host);
        let channel = Endpoint::from_shared(endpoint.clone())
            .map_err(|source| ClientError::InvalidEndpoint {
                endpoint: host.to_owned(),
                source,
            })?
            .connect_lazy();

        Ok(Self {
            endpoint,
            stub: ArcSwapOption::from_pointee(IamPolicyStub::new(channel)),
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.stub.load().is_none()
    }
}

#[async_trait]
impl IamPolicyClient for GrpcIamPolicyClient {
    async fn test_iam_permissions(
        &self,
        request: Request<TestIamPermissionsRequest>,
    ) -> Result<TestIamPermissionsResponse, Status> {
        let Some(stub) = self.stub.load_full() else {
            return Err(Status::unavailable("IAM client connection is closed"));
        };
        // tonic clients are cheap handles onto the shared channel
        let mut stub = IamPolicyStub::clone(&stub);
        stub.test_iam_permissions(request)
            .await
            .map(tonic::Response::into_inner)
    }

    fn close(&self) {
        if self.stub.swap(None).is_some() {
            tracing::debug!(endpoint = %self.endpoint, "IAM client connection closed");
        }
    }
}

fn endpoint_uri(host: &str) -> String {
    if host.contains("://") {
        host.to_owned()
    } else {
        format!("http://{host}")
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn bare_host_gets_http_scheme() {
        assert_eq!(endpoint_uri("localhost:8080"), "http://localhost:8080");
        assert_eq!(endpoint_uri("https://iam.example:443"), "https://iam.example:443");
    }

    #[tokio::test]
    async fn invalid_host_is_rejected() {
        let err = GrpcIamPolicyClient::connect_lazy("bad host:80").unwrap_err();
        assert!(matches!(err, ClientError::InvalidEndpoint { .. }), "got {err}");
    }

    #[tokio::test]
    async fn close_is_idempotent_and_later_calls_are_unavailable() {
        let client = GrpcIamPolicyClient::connect_lazy("127.0.0.1:1").unwrap();
        assert!(!client.is_closed());

        client.close();
        client.close();
        assert!(client.is_closed());

        let status = client
            .test_iam_permissions(Request::new(TestIamPermissionsRequest::single("r", "p")))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unavailable);
    }
}
