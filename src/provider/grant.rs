//! Grant type identifiers advertised in discovery documents.

// self
use crate::_prelude::*;

/// Grant types the device flow reasons about when reading `grant_types_supported`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GrantType {
	/// Authorization Code grant.
	AuthorizationCode,
	/// Implicit grant.
	Implicit,
	/// Device Authorization Grant (RFC 8628).
	DeviceCode,
}
impl GrantType {
	/// Grants a provider supports when its discovery document omits `grant_types_supported`.
	pub const DEFAULTS: [GrantType; 2] = [GrantType::AuthorizationCode, GrantType::Implicit];

	/// Returns the identifier used in discovery documents and token requests.
	pub const fn as_str(self) -> &'static str {
		match self {
			GrantType::AuthorizationCode => "authorization_code",
			GrantType::Implicit => "implicit",
			GrantType::DeviceCode => "urn:ietf:params:oauth:grant-type:device_code",
		}
	}
}
impl Display for GrantType {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
