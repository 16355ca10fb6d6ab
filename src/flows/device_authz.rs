//! Device authorization step: obtain the device code, user code, and verification URI.

// self
use crate::{
	_prelude::*,
	config::FlowConfig,
	encode::FormBody,
	error::{FlowError, ProtocolError},
	flows::{
		client_auth::{self, ClientAuthMethod},
		token,
	},
	http::{HttpRequest, HttpResponse},
	json::{self, Field, FieldKind},
};

pub(crate) const OBTAIN_CONTEXT: &str = "failed to obtain device authorization";
pub(crate) const PARSE_CONTEXT: &str = "failed to parse device authorization";

/// Polling interval used when the provider does not send one (RFC 8628 3.2).
pub const DEFAULT_INTERVAL: u32 = 5;

/// Device authorization response members.
///
/// `verification_url` is accepted in place of `verification_uri` for providers that predate
/// the final RFC.
pub const DEVICE_AUTHZ_FIELDS: &[Field] = &[
	Field::required(&["device_code"], FieldKind::String),
	Field::required(&["user_code"], FieldKind::String),
	Field::required(&["verification_uri", "verification_url"], FieldKind::String),
	Field::optional(&["verification_uri_complete"], FieldKind::String),
	Field::optional(&["expires_in"], FieldKind::Number),
	Field::optional(&["interval"], FieldKind::Number),
];

/// Parsed device authorization response.
#[derive(Clone, PartialEq, Eq)]
pub struct DeviceAuthorization {
	/// Opaque code the client polls with.
	pub device_code: String,
	/// Code the user types at the verification URI.
	pub user_code: String,
	/// Where the user goes to approve the device.
	pub verification_uri: String,
	/// Verification URI with the user code embedded, if offered.
	pub verification_uri_complete: Option<String>,
	/// Lifetime of the codes in seconds, if stated.
	pub expires_in: Option<u64>,
	/// Seconds to wait between token polls.
	pub interval: u32,
}
impl Debug for DeviceAuthorization {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("DeviceAuthorization")
			.field("device_code", &"<redacted>")
			.field("user_code", &self.user_code)
			.field("verification_uri", &self.verification_uri)
			.field("verification_uri_complete", &self.verification_uri_complete)
			.field("expires_in", &self.expires_in)
			.field("interval", &self.interval)
			.finish()
	}
}

/// Converts the provider's `interval` into whole seconds.
///
/// Fractions round up and huge values saturate. The floor is one second, or zero under
/// unsafe debug so tests can poll without sleeping.
pub fn parse_interval(interval: Option<f64>, unsafe_debug: bool) -> u32 {
	let Some(interval) = interval else {
		return DEFAULT_INTERVAL;
	};
	let floor = if unsafe_debug { 0 } else { 1 };
	let interval = interval.ceil();

	if interval.is_nan() || interval < f64::from(floor) {
		floor
	} else if interval >= f64::from(u32::MAX) {
		u32::MAX
	} else {
		interval as u32
	}
}

fn parse_expires_in(expires_in: Option<f64>) -> Option<u64> {
	expires_in.filter(|secs| secs.is_finite() && *secs >= 0.).map(|secs| secs.ceil() as u64)
}

/// POST to the device authorization endpoint, carrying the configured scope.
pub fn device_authorization_request(
	endpoint: &str,
	config: &FlowConfig,
) -> (HttpRequest, ClientAuthMethod) {
	let mut form = FormBody::new();

	if let Some(scope) = config.scope.as_deref().filter(|scope| !scope.is_empty()) {
		form.append("scope", scope);
	}

	client_auth::identified_post(endpoint, form, &config.client_id, config.client_secret.as_ref())
}

/// Parses a `200` device authorization body.
pub fn parse_device_authorization(
	response: &HttpResponse,
	unsafe_debug: bool,
) -> Result<DeviceAuthorization> {
	let mut document = json::parse_response(
		response.content_type.as_deref(),
		&response.body,
		DEVICE_AUTHZ_FIELDS,
	)?;

	Ok(DeviceAuthorization {
		device_code: document.required_string("device_code")?,
		user_code: document.required_string("user_code")?,
		verification_uri: document.required_string("verification_uri")?,
		verification_uri_complete: document.take_string("verification_uri_complete"),
		expires_in: parse_expires_in(document.take_number("expires_in")),
		interval: parse_interval(document.take_number("interval"), unsafe_debug),
	})
}

/// Interprets the device authorization response.
///
/// `400` and `401` carry an OAuth error body, which is always fatal at this step.
pub fn finish_device_authorization(
	response: &HttpResponse,
	auth: ClientAuthMethod,
	unsafe_debug: bool,
) -> Result<DeviceAuthorization, FlowError> {
	match response.status {
		200 => parse_device_authorization(response, unsafe_debug)
			.map_err(|e| FlowError::new(Some(PARSE_CONTEXT), e)),
		400 | 401 => {
			let error = token::parse_token_error(response)?;

			Err(FlowError::new(
				Some(OBTAIN_CONTEXT),
				error.into_provider_error(response.status, auth),
			))
		},
		status =>
			Err(FlowError::new(Some(OBTAIN_CONTEXT), ProtocolError::UnexpectedStatus { status })),
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{_preludet::test_config, error::ProviderError};

	fn json_response(status: u32, body: &str) -> HttpResponse {
		HttpResponse {
			status,
			content_type: Some("application/json; charset=utf-8".into()),
			body: body.as_bytes().to_vec(),
		}
	}

	#[test]
	fn interval_rounding_and_bounds() {
		assert_eq!(parse_interval(None, false), DEFAULT_INTERVAL);
		assert_eq!(parse_interval(Some(2.1), false), 3);
		assert_eq!(parse_interval(Some(0.), false), 1);
		assert_eq!(parse_interval(Some(-7.), false), 1);
		assert_eq!(parse_interval(Some(0.), true), 0);
		assert_eq!(parse_interval(Some(1e12), false), u32::MAX);
	}

	#[test]
	fn request_form_skips_an_empty_scope() {
		let mut config = test_config();

		config.scope = Some(String::new());

		let (request, _) = device_authorization_request("https://idp.example/device", &config);

		assert_eq!(request.body_text(), Some("client_id=client-1"));

		config.scope = Some("openid email".into());

		let (request, _) = device_authorization_request("https://idp.example/device", &config);

		assert_eq!(request.body_text(), Some("scope=openid+email&client_id=client-1"));
	}

	#[test]
	fn parses_the_legacy_verification_url() {
		let authz = finish_device_authorization(
			&json_response(
				200,
				r#"{"device_code":"D","user_code":"U-1","verification_url":"https://idp.example/activate","expires_in":600}"#,
			),
			ClientAuthMethod::RequestBody,
			false,
		)
		.expect("Legacy member should be accepted.");

		assert_eq!(authz.verification_uri, "https://idp.example/activate");
		assert_eq!(authz.expires_in, Some(600));
		assert_eq!(authz.interval, DEFAULT_INTERVAL);
		assert!(!format!("{authz:?}").contains("\"D\""));
	}

	#[test]
	fn missing_user_code_is_a_parse_failure() {
		let err = finish_device_authorization(
			&json_response(200, r#"{"device_code":"D","verification_uri":"https://v"}"#),
			ClientAuthMethod::RequestBody,
			false,
		)
		.expect_err("Missing user_code should fail.");

		assert_eq!(err.to_string(), "failed to parse device authorization: field \"user_code\" is missing");
	}

	#[test]
	fn error_bodies_are_fatal() {
		let err = finish_device_authorization(
			&json_response(400, r#"{"error":"invalid_scope","error_description":"no such scope"}"#),
			ClientAuthMethod::RequestBody,
			false,
		)
		.expect_err("invalid_scope is fatal.");

		assert_eq!(err.context(), Some(OBTAIN_CONTEXT));
		assert!(matches!(
			err.error(),
			Error::Provider(ProviderError { error, hint: None, .. }) if error == "invalid_scope"
		));

		let err = finish_device_authorization(
			&json_response(401, r#"{"error":"invalid_client"}"#),
			ClientAuthMethod::RequestBody,
			false,
		)
		.expect_err("invalid_client is fatal.");

		assert_eq!(
			err.to_string(),
			"failed to obtain device authorization: provider requires client authentication, and no client secret is set (invalid_client)"
		);

		let err = finish_device_authorization(
			&json_response(500, "{}"),
			ClientAuthMethod::RequestBody,
			false,
		)
		.expect_err("500 should fail.");

		assert_eq!(err.to_string(), "failed to obtain device authorization: unexpected response code 500");
	}
}
