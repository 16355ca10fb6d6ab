//! Authorization server metadata and the checks run against it.

// self
use crate::{
	_prelude::*,
	error::SecurityError,
	json::{Field, FieldKind, ParsedObject},
	provider::GrantType,
};

/// Discovery document members the flow reads.
pub const DISCOVERY_FIELDS: &[Field] = &[
	Field::required(&["issuer"], FieldKind::String),
	Field::required(&["token_endpoint"], FieldKind::String),
	Field::optional(&["device_authorization_endpoint"], FieldKind::String),
	Field::optional(&["grant_types_supported"], FieldKind::StringArray),
];

/// Authorization server metadata (OIDC Discovery / RFC 8414 subset).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderMetadata {
	/// Issuer identifier claimed by the document.
	pub issuer: String,
	/// Token endpoint.
	pub token_endpoint: String,
	/// Device authorization endpoint, when the provider has one.
	pub device_authorization_endpoint: Option<String>,
	/// Supported grant type identifiers.
	pub grant_types_supported: Vec<String>,
}
impl ProviderMetadata {
	/// Builds metadata from a document parsed against [`DISCOVERY_FIELDS`].
	pub fn from_document(mut document: ParsedObject) -> Result<Self> {
		Ok(Self {
			issuer: document.required_string("issuer")?,
			token_endpoint: document.required_string("token_endpoint")?,
			device_authorization_endpoint: document.take_string("device_authorization_endpoint"),
			grant_types_supported: document.take_strings("grant_types_supported").unwrap_or_else(
				|| GrantType::DEFAULTS.iter().map(|grant| grant.as_str().to_owned()).collect(),
			),
		})
	}

	/// Requires the claimed issuer to equal `expected` byte for byte.
	///
	/// No normalization happens: a trailing slash, letter case, or an explicit default port all
	/// count as a different issuer.
	pub fn check_issuer(&self, expected: &str) -> Result<(), SecurityError> {
		if self.issuer.as_bytes() == expected.as_bytes() {
			Ok(())
		} else {
			Err(SecurityError::IssuerMismatch {
				reported: self.issuer.clone(),
				expected: expected.to_owned(),
			})
		}
	}

	/// Whether `grant` is advertised.
	pub fn supports(&self, grant: GrantType) -> bool {
		self.grant_types_supported.iter().any(|supported| supported == grant.as_str())
	}

	/// Requires device-code support and returns the device authorization endpoint.
	pub fn check_device_flow(&self) -> Result<&str, SecurityError> {
		if !self.supports(GrantType::DeviceCode) {
			return Err(SecurityError::DeviceGrantUnsupported { issuer: self.issuer.clone() });
		}

		self.device_authorization_endpoint
			.as_deref()
			.ok_or_else(|| SecurityError::MissingDeviceEndpoint { issuer: self.issuer.clone() })
	}
}
