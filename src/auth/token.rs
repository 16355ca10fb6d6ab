//! Bearer token produced by a completed device flow.

// self
use crate::{_prelude::*, auth::Secret};

/// Access token issued by the token endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessToken {
	token: Secret,
	token_type: String,
}
impl AccessToken {
	/// Wraps a token and its type.
	pub fn new(token: impl Into<Secret>, token_type: impl Into<String>) -> Self {
		Self { token: token.into(), token_type: token_type.into() }
	}

	/// The token value to transmit to the resource server.
	pub fn secret(&self) -> &Secret {
		&self.token
	}

	/// The token type, usually `Bearer`.
	pub fn token_type(&self) -> &str {
		&self.token_type
	}

	/// Consumes the token, returning the raw value.
	pub fn into_secret(self) -> Secret {
		self.token
	}
}
