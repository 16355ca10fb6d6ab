//! Token polling: request construction, response parsing, and `slow_down` backoff.

// self
use crate::{
	_prelude::*,
	auth::AccessToken,
	config::FlowConfig,
	encode::FormBody,
	error::{FlowError, ProtocolError, ProviderError},
	flows::client_auth::{self, ClientAuthMethod},
	http::{HttpRequest, HttpResponse},
	json::{self, Field, FieldKind},
	provider::GrantType,
};

pub(crate) const OBTAIN_CONTEXT: &str = "failed to obtain access token";
pub(crate) const PARSE_CONTEXT: &str = "failed to parse access token response";
pub(crate) const ERROR_PARSE_CONTEXT: &str = "failed to parse token error response";

/// Seconds added to the polling interval on every `slow_down`.
pub const SLOW_DOWN_STEP: u32 = 5;

/// Successful token response members.
pub const TOKEN_FIELDS: &[Field] = &[
	Field::required(&["access_token"], FieldKind::String),
	Field::required(&["token_type"], FieldKind::String),
];
/// Error response members shared by the token and device authorization endpoints.
pub const TOKEN_ERROR_FIELDS: &[Field] = &[
	Field::required(&["error"], FieldKind::String),
	Field::optional(&["error_description"], FieldKind::String),
];

/// In-band OAuth error body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenError {
	/// The `error` code.
	pub error: String,
	/// The optional `error_description`.
	pub description: Option<String>,
}
impl TokenError {
	/// Turns the body into a fatal provider error, with a hint derived from `status` when the
	/// provider gave no description.
	pub fn into_provider_error(self, status: u32, auth: ClientAuthMethod) -> ProviderError {
		let hint = match (status, auth.used_secret()) {
			(401, true) => Some("provider rejected the client secret"),
			(401, false) => Some("provider requires client authentication, and no client secret is set"),
			_ => None,
		};

		ProviderError { error: self.error, description: self.description, hint }
	}
}

/// A token endpoint answer: either a token or an in-band error, never both.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TokenResponse {
	/// `200` with an access token.
	Token(AccessToken),
	/// `400`/`401` with an error body.
	Error(TokenError),
}

/// What the flow does after a token poll.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PollOutcome {
	/// The token was issued.
	Granted(AccessToken),
	/// `authorization_pending`: wait one interval and poll again.
	Pending,
	/// `slow_down`: the interval was lengthened; wait and poll again.
	SlowDown,
}

/// POST polling the token endpoint for `device_code`.
pub fn token_request(
	token_endpoint: &str,
	device_code: &str,
	config: &FlowConfig,
) -> (HttpRequest, ClientAuthMethod) {
	let mut form = FormBody::new();

	form.append("device_code", device_code).append("grant_type", GrantType::DeviceCode.as_str());

	client_auth::identified_post(
		token_endpoint,
		form,
		&config.client_id,
		config.client_secret.as_ref(),
	)
}

/// Parses an error body returned with `400` or `401`.
pub fn parse_token_error(response: &HttpResponse) -> Result<TokenError, FlowError> {
	let mut document = json::parse_response(
		response.content_type.as_deref(),
		&response.body,
		TOKEN_ERROR_FIELDS,
	)
	.map_err(|e| FlowError::new(Some(ERROR_PARSE_CONTEXT), e))?;
	let error = document
		.required_string("error")
		.map_err(|e| FlowError::new(Some(ERROR_PARSE_CONTEXT), e))?;

	Ok(TokenError { error, description: document.take_string("error_description") })
}

/// Classifies a token endpoint response by status and parses the matching body.
pub fn parse_token_response(response: &HttpResponse) -> Result<TokenResponse, FlowError> {
	match response.status {
		200 => {
			let parse_error = |e| FlowError::new(Some(PARSE_CONTEXT), e);
			let mut document = json::parse_response(
				response.content_type.as_deref(),
				&response.body,
				TOKEN_FIELDS,
			)
			.map_err(parse_error)?;
			let token = document.required_string("access_token").map_err(|e| parse_error(e.into()))?;
			let token_type =
				document.required_string("token_type").map_err(|e| parse_error(e.into()))?;

			Ok(TokenResponse::Token(AccessToken::new(token, token_type)))
		},
		// RFC 6749 5.2 allows either status for error bodies.
		400 | 401 => parse_token_error(response).map(TokenResponse::Error),
		status =>
			Err(FlowError::new(Some(OBTAIN_CONTEXT), ProtocolError::UnexpectedStatus { status })),
	}
}

/// Lengthens the interval after `slow_down`, failing instead of wrapping.
pub fn slow_down(interval: u32) -> Result<u32, ProtocolError> {
	interval.checked_add(SLOW_DOWN_STEP).ok_or(ProtocolError::IntervalOverflow)
}

/// Decides what follows a token response; `slow_down` lengthens `interval` in place.
pub fn handle_token_response(
	response: TokenResponse,
	status: u32,
	auth: ClientAuthMethod,
	interval: &mut u32,
) -> Result<PollOutcome, FlowError> {
	let error = match response {
		TokenResponse::Token(token) => return Ok(PollOutcome::Granted(token)),
		TokenResponse::Error(error) => error,
	};

	match error.error.as_str() {
		"authorization_pending" => Ok(PollOutcome::Pending),
		"slow_down" => {
			*interval = slow_down(*interval).map_err(|e| FlowError::new(Some(OBTAIN_CONTEXT), e))?;

			Ok(PollOutcome::SlowDown)
		},
		_ => Err(FlowError::new(Some(OBTAIN_CONTEXT), error.into_provider_error(status, auth))),
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::_preludet::test_config;

	fn json_response(status: u32, body: &str) -> HttpResponse {
		HttpResponse {
			status,
			content_type: Some("application/json".into()),
			body: body.as_bytes().to_vec(),
		}
	}

	#[test]
	fn request_carries_the_device_code_grant() {
		let (request, method) = token_request("https://idp.example/token", "D 1", &test_config());

		assert_eq!(method, ClientAuthMethod::RequestBody);
		assert_eq!(
			request.body_text(),
			Some(
				"device_code=D+1&grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Adevice_code&client_id=client-1"
			)
		);
	}

	#[test]
	fn slow_down_adds_five_until_overflow() {
		assert_eq!(slow_down(5).expect("5 should grow."), 10);
		assert_eq!(slow_down(u32::MAX - 5).expect("The last step should fit."), u32::MAX);
		assert!(matches!(slow_down(u32::MAX - 4), Err(ProtocolError::IntervalOverflow)));
	}

	#[test]
	fn repeated_slow_down_is_monotonic() {
		let mut interval = 5;

		for expected in [10, 15, 20] {
			let outcome = handle_token_response(
				TokenResponse::Error(TokenError { error: "slow_down".into(), description: None }),
				400,
				ClientAuthMethod::RequestBody,
				&mut interval,
			)
			.expect("slow_down is recoverable.");

			assert_eq!(outcome, PollOutcome::SlowDown);
			assert_eq!(interval, expected);
		}

		interval = u32::MAX - 1;

		let err = handle_token_response(
			TokenResponse::Error(TokenError { error: "slow_down".into(), description: None }),
			400,
			ClientAuthMethod::RequestBody,
			&mut interval,
		)
		.expect_err("Overflow is fatal.");

		assert_eq!(err.to_string(), "failed to obtain access token: slow_down interval overflow");
		assert_eq!(interval, u32::MAX - 1);
	}

	#[test]
	fn pending_leaves_the_interval_alone() {
		let mut interval = 7;
		let response = parse_token_response(&json_response(400, r#"{"error":"authorization_pending"}"#))
			.expect("Error body should parse.");

		let outcome = handle_token_response(response, 400, ClientAuthMethod::Basic, &mut interval)
			.expect("Pending is recoverable.");

		assert_eq!(outcome, PollOutcome::Pending);
		assert_eq!(interval, 7);
	}

	#[test]
	fn unauthorized_hints_at_the_secret() {
		for (auth, expected) in [
			(
				ClientAuthMethod::RequestBody,
				"failed to obtain access token: provider requires client authentication, and no client secret is set (invalid_client)",
			),
			(
				ClientAuthMethod::Basic,
				"failed to obtain access token: provider rejected the client secret (invalid_client)",
			),
		] {
			let mut interval = 5;
			let response = parse_token_response(&json_response(401, r#"{"error":"invalid_client"}"#))
				.expect("Error body should parse.");
			let err = handle_token_response(response, 401, auth, &mut interval)
				.expect_err("invalid_client is fatal.");

			assert_eq!(err.to_string(), expected);
		}
	}

	#[test]
	fn description_wins_over_the_hint() {
		let mut interval = 5;
		let response = parse_token_response(&json_response(
			401,
			r#"{"error":"access_denied","error_description":"user declined"}"#,
		))
		.expect("Error body should parse.");
		let err = handle_token_response(response, 401, ClientAuthMethod::RequestBody, &mut interval)
			.expect_err("access_denied is fatal.");

		assert_eq!(err.to_string(), "failed to obtain access token: user declined (access_denied)");
	}

	#[test]
	fn success_and_parse_contexts() {
		let token = parse_token_response(&json_response(
			200,
			r#"{"access_token":"tok123","token_type":"Bearer","expires_in":3600}"#,
		))
		.expect("Token should parse.");

		assert_eq!(token, TokenResponse::Token(AccessToken::new("tok123", "Bearer")));

		let err = parse_token_response(&json_response(200, r#"{"token_type":"Bearer"}"#))
			.expect_err("Missing token should fail.");

		assert_eq!(err.to_string(), "failed to parse access token response: field \"access_token\" is missing");

		let err = parse_token_response(&json_response(400, r#"{"error":5}"#))
			.expect_err("Bad error body should fail.");

		assert_eq!(err.context(), Some(ERROR_PARSE_CONTEXT));

		let err = parse_token_response(&json_response(503, "{}")).expect_err("503 should fail.");

		assert_eq!(err.to_string(), "failed to obtain access token: unexpected response code 503");
	}
}
