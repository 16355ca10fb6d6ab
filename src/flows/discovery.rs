//! Discovery step: fetch and vet the issuer's metadata.

// self
use crate::{
	_prelude::*,
	config::FlowConfig,
	error::{FlowError, ProtocolError},
	http::{HttpRequest, HttpResponse},
	json,
	provider::{DISCOVERY_FIELDS, ProviderMetadata},
};

pub(crate) const FETCH_CONTEXT: &str = "failed to fetch OpenID discovery document";
pub(crate) const PARSE_CONTEXT: &str = "failed to parse OpenID discovery document";
pub(crate) const CAPABILITY_CONTEXT: &str = "cannot run OAuth device authorization";

/// GET for the configured discovery document.
pub fn discovery_request(config: &FlowConfig) -> HttpRequest {
	HttpRequest::get(&config.discovery_url)
}

/// Validates the discovery response and the provider it describes.
///
/// Only `200` is accepted. The claimed issuer must equal the configured one exactly, and the
/// provider must advertise the device code grant and a device authorization endpoint, which is
/// returned alongside the metadata.
pub fn finish_discovery(
	response: &HttpResponse,
	config: &FlowConfig,
) -> Result<(ProviderMetadata, String), FlowError> {
	if response.status != 200 {
		return Err(FlowError::new(
			Some(FETCH_CONTEXT),
			ProtocolError::UnexpectedStatus { status: response.status },
		));
	}

	let parse_error = |e| FlowError::new(Some(PARSE_CONTEXT), e);
	let document =
		json::parse_response(response.content_type.as_deref(), &response.body, DISCOVERY_FIELDS)
			.map_err(parse_error)?;
	let metadata = ProviderMetadata::from_document(document).map_err(parse_error)?;

	metadata.check_issuer(&config.issuer).map_err(|e| parse_error(e.into()))?;
	let endpoint = metadata
		.check_device_flow()
		.map_err(|e| FlowError::new(Some(CAPABILITY_CONTEXT), e))?
		.to_owned();

	Ok((metadata, endpoint))
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{_preludet::test_config, error::SecurityError};

	fn response(status: u32, content_type: Option<&str>, body: &str) -> HttpResponse {
		HttpResponse {
			status,
			content_type: content_type.map(Into::into),
			body: body.as_bytes().to_vec(),
		}
	}

	const CAPABLE: &str = r#"{"issuer":"https://idp.example","token_endpoint":"https://idp.example/token","device_authorization_endpoint":"https://idp.example/device","grant_types_supported":["urn:ietf:params:oauth:grant-type:device_code"]}"#;

	#[test]
	fn accepts_a_capable_provider() {
		let (metadata, endpoint) =
			finish_discovery(&response(200, Some("application/json"), CAPABLE), &test_config())
				.expect("Capable provider should pass.");

		assert_eq!(metadata.token_endpoint, "https://idp.example/token");
		assert_eq!(endpoint, "https://idp.example/device");
	}

	#[test]
	fn non_200_is_a_fetch_failure() {
		let err = finish_discovery(&response(404, Some("text/html"), "nope"), &test_config())
			.expect_err("404 should fail.");

		assert_eq!(err.to_string(), "failed to fetch OpenID discovery document: unexpected response code 404");
	}

	#[test]
	fn issuer_mismatch_is_a_security_failure() {
		let mut config = test_config();

		config.issuer = "https://idp.example/".into();

		let err = finish_discovery(&response(200, Some("application/json"), CAPABLE), &config)
			.expect_err("Mismatch should fail.");

		assert!(matches!(err.error(), Error::Security(SecurityError::IssuerMismatch { .. })));
		assert_eq!(err.context(), Some(PARSE_CONTEXT));
	}

	#[test]
	fn missing_capability_uses_its_own_context() {
		let body = r#"{"issuer":"https://idp.example","token_endpoint":"https://idp.example/token","grant_types_supported":["urn:ietf:params:oauth:grant-type:device_code"]}"#;
		let err = finish_discovery(&response(200, Some("application/json"), body), &test_config())
			.expect_err("Missing endpoint should fail.");

		assert_eq!(
			err.to_string(),
			"cannot run OAuth device authorization: issuer \"https://idp.example\" does not provide a device authorization endpoint"
		);
	}
}
