//! Client identification on the device authorization and token endpoints.

// crates.io
use base64::{Engine, engine::general_purpose::STANDARD};
// self
use crate::{
	_prelude::*,
	auth::Secret,
	encode::{FormBody, urlencode},
	http::HttpRequest,
};

/// How the client identified itself on a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientAuthMethod {
	/// HTTP Basic with the client id and secret (`client_secret_basic`).
	Basic,
	/// `client_id` in the form body, no secret (public client).
	RequestBody,
}
impl ClientAuthMethod {
	/// Whether a client secret was sent.
	pub const fn used_secret(self) -> bool {
		matches!(self, ClientAuthMethod::Basic)
	}
}

/// Identifies the client on a form POST.
///
/// A configured secret, even an empty one, selects HTTP Basic and keeps `client_id` out of
/// the body, since some providers reject requests that carry both.
pub fn identify_client(
	client_id: &str,
	secret: Option<&Secret>,
	form: &mut FormBody,
) -> (ClientAuthMethod, Option<String>) {
	match secret {
		Some(secret) => {
			let credentials = format!("{}:{}", urlencode(client_id), urlencode(secret.expose()));

			(ClientAuthMethod::Basic, Some(format!("Basic {}", STANDARD.encode(credentials))))
		},
		None => {
			form.append("client_id", client_id);

			(ClientAuthMethod::RequestBody, None)
		},
	}
}

/// Builds an identified form POST to `url`.
pub fn identified_post(
	url: &str,
	mut form: FormBody,
	client_id: &str,
	secret: Option<&Secret>,
) -> (HttpRequest, ClientAuthMethod) {
	let (method, authorization) = identify_client(client_id, secret, &mut form);
	let mut request = HttpRequest::post_form(url, form.into_bytes());

	if let Some(authorization) = authorization {
		request = request.with_header("Authorization", authorization);
	}

	(request, method)
}
