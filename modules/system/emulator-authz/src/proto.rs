//! Wire types and client stub for `google.iam.v1.IAMPolicy/TestIamPermissions`.
//!
//! Only the one unary method the permission client needs is modeled.

use http::uri::PathAndQuery;
use tonic::client::Grpc;
use tonic::transport::Channel;
use tonic::{GrpcMethod, Request, Response, Status};

pub const SERVICE_NAME: &str = "google.iam.v1.IAMPolicy";
pub const TEST_IAM_PERMISSIONS_METHOD: &str = "TestIamPermissions";
pub const TEST_IAM_PERMISSIONS_PATH: &str = "/google.iam.v1.IAMPolicy/TestIamPermissions";

#[derive(Clone, PartialEq, Eq, Hash, prost::Message)]
pub struct TestIamPermissionsRequest {
    /// Full resource name, e.g. `projects/p/secrets/s`.
    #[prost(string, tag = "1")]
    pub resource: String,
    #[prost(string, repeated, tag = "2")]
    pub permissions: Vec<String>,
}

impl TestIamPermissionsRequest {
    /// Request testing a single permission.
    #[must_use]
    pub fn single(resource: impl Into<String>, permission: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            permissions: vec![permission.into()],
        }
    }
}

#[derive(Clone, PartialEq, Eq, Hash, prost::Message)]
pub struct TestIamPermissionsResponse {
    /// Subset of the requested permissions the caller holds.
    #[prost(string, repeated, tag = "1")]
    pub permissions: Vec<String>,
}

/// Thin unary client over a tonic [`Channel`].
#[derive(Debug, Clone)]
pub struct IamPolicyStub {
    inner: Grpc<Channel>,
}

impl IamPolicyStub {
    #[must_use]
    pub fn new(channel: Channel) -> Self {
        Self {
            inner: Grpc::new(channel),
        }
    }

    /// # Errors
    ///
    /// The [`Status`] returned by the server, or `Unavailable` if the
    /// channel cannot become ready.
    pub async fn test_iam_permissions(
        &mut self,
        mut request: Request<TestIamPermissionsRequest>,
    ) -> Result<Response<TestIamPermissionsResponse>, Status> {
        self.inner
            .ready()
            .await
            .map_err(|e| Status::unavailable(format!("IAM service was not ready: {e}")))?;

        request
            .extensions_mut()
            .insert(GrpcMethod::new(SERVICE_NAME, TEST_IAM_PERMISSIONS_METHOD));
        let path = PathAndQuery::from_static(TEST_IAM_PERMISSIONS_PATH);
        self.inner
            .unary(request, path, tonic_prost::ProstCodec::default())
            .await
    }
}
