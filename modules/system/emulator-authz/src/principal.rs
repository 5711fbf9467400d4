//! Caller identity carried in transport metadata.
//!
//! The principal is an opaque string (e.g. `user:alice@example.com`). It is
//! never parsed here; the policy evaluator decides whether it is valid.

use http::HeaderMap;
use tonic::metadata::{MetadataMap, MetadataValue};

use crate::error::InvalidPrincipal;

/// gRPC metadata key for the principal identity.
pub const PRINCIPAL_METADATA_KEY: &str = "x-emulator-principal";

/// HTTP header for the principal identity. Lookup is case-insensitive.
pub const PRINCIPAL_HEADER_KEY: &str = "X-Emulator-Principal";

/// Principal from inbound gRPC metadata, or an empty string when absent.
///
/// Only the first value counts. A value that is not visible ASCII is
/// treated as absent.
#[must_use]
pub fn extract_from_metadata(metadata: &MetadataMap) -> String {
    metadata
        .get(PRINCIPAL_METADATA_KEY)
        .and_then(|value| value.to_str().ok())
        .map(ToOwned::to_owned)
        .unwrap_or_default()
}

/// Principal from an inbound gRPC request.
#[must_use]
pub fn extract_from_request<T>(request: &tonic::Request<T>) -> String {
    extract_from_metadata(request.metadata())
}

/// Principal from an inbound HTTP request's headers, or an empty string
/// when absent or not valid UTF-8. Only the first value counts.
#[must_use]
pub fn extract_from_headers(headers: &HeaderMap) -> String {
    headers
        .get(PRINCIPAL_HEADER_KEY)
        .and_then(|value| std::str::from_utf8(value.as_bytes()).ok())
        .map(ToOwned::to_owned)
        .unwrap_or_default()
}

/// Attach the principal to outbound gRPC metadata.
///
/// An empty principal leaves the metadata untouched. Other entries are
/// preserved; an existing principal entry is kept and the new one appended.
///
/// # Errors
///
/// [`InvalidPrincipal`] if the principal cannot be encoded as an ASCII
/// metadata value.
pub fn inject_for_outbound(
    mut metadata: MetadataMap,
    principal: &str,
) -> Result<MetadataMap, InvalidPrincipal> {
    if principal.is_empty() {
        return Ok(metadata);
    }
    let value = MetadataValue::try_from(principal).map_err(|_| InvalidPrincipal)?;
    metadata.append(PRINCIPAL_METADATA_KEY, value);
    Ok(metadata)
}
