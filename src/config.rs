//! Caller-supplied configuration for one device flow.

// std
use std::path::PathBuf;
// self
use crate::{_prelude::*, auth::Secret, error::ConfigError, http};

/// Environment variable that opts into [`FlowConfig::unsafe_debug`] when set to `UNSAFE`.
pub const DEBUG_ENV: &str = "OAUTH2_DEVICE_FLOW_DEBUG";

const WELL_KNOWN: &str = "/.well-known/";
const OPENID_CONFIGURATION: &str = "/.well-known/openid-configuration";

/// Everything a device flow needs before it starts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowConfig {
	/// Well-known discovery document URL.
	pub discovery_url: String,
	/// Issuer identifier the discovery document must claim, byte for byte.
	pub issuer: String,
	/// OAuth client identifier.
	pub client_id: String,
	/// Client secret; `Some("")` is a configured (empty) secret, distinct from `None`.
	#[serde(default)]
	pub client_secret: Option<Secret>,
	/// Space-delimited scope requested at device authorization.
	#[serde(default)]
	pub scope: Option<String>,
	/// Allows plain HTTP, zero-second polling intervals, and wire tracing.
	///
	/// Never enable this outside local testing.
	#[serde(default)]
	pub unsafe_debug: bool,
	/// CA bundle for the HTTP engine; honored only under [`unsafe_debug`](Self::unsafe_debug).
	#[serde(default)]
	pub ca_file: Option<PathBuf>,
}
impl FlowConfig {
	/// Starts a builder from the three required values.
	pub fn builder(
		discovery_url: impl Into<String>,
		issuer: impl Into<String>,
		client_id: impl Into<String>,
	) -> FlowConfigBuilder {
		FlowConfigBuilder {
			config: Self {
				discovery_url: discovery_url.into(),
				issuer: issuer.into(),
				client_id: client_id.into(),
				client_secret: None,
				scope: None,
				unsafe_debug: false,
				ca_file: None,
			},
		}
	}

	/// Starts a builder from either an issuer identifier or a discovery URL.
	///
	/// A URL containing `/.well-known/` is taken as the discovery document and the issuer is
	/// derived from it (both the OIDC and RFC 8414 placements are understood). Anything else is
	/// taken as the issuer, with the OIDC discovery suffix appended.
	pub fn for_issuer(
		issuer_or_discovery_url: &str,
		client_id: impl Into<String>,
	) -> Result<FlowConfigBuilder, ConfigError> {
		let (discovery_url, issuer) = derive_discovery(issuer_or_discovery_url)?;

		Ok(Self::builder(discovery_url, issuer, client_id))
	}

	/// Enables [`unsafe_debug`](Self::unsafe_debug) only if [`DEBUG_ENV`] is exactly `UNSAFE`.
	pub fn with_unsafe_debug_from_env(mut self) -> Self {
		if std::env::var(DEBUG_ENV).is_ok_and(|value| value == "UNSAFE") {
			self.unsafe_debug = true;
		}

		self
	}

	/// Checks the configuration before any request is built.
	pub fn validate(&self) -> Result<()> {
		if self.client_id.is_empty() {
			return Err(ConfigError::MissingClientId.into());
		}
		if self.issuer.is_empty() {
			return Err(ConfigError::MissingIssuer.into());
		}

		Url::parse(&self.discovery_url)
			.map_err(|source| ConfigError::InvalidUrl { name: "discovery", source })?;
		http::check_scheme(&self.discovery_url, self.unsafe_debug)?;

		Ok(())
	}
}

/// Fluent builder returned by [`FlowConfig::builder`] and [`FlowConfig::for_issuer`].
#[derive(Clone, Debug)]
pub struct FlowConfigBuilder {
	config: FlowConfig,
}
impl FlowConfigBuilder {
	/// Sets the client secret (an empty string is a valid secret).
	pub fn client_secret(mut self, secret: impl Into<Secret>) -> Self {
		self.config.client_secret = Some(secret.into());

		self
	}

	/// Sets the requested scope.
	pub fn scope(mut self, scope: impl Into<String>) -> Self {
		self.config.scope = Some(scope.into());

		self
	}

	/// Sets the unsafe debug flag.
	pub fn unsafe_debug(mut self, enabled: bool) -> Self {
		self.config.unsafe_debug = enabled;

		self
	}

	/// Sets the CA bundle used under unsafe debug.
	pub fn ca_file(mut self, path: impl Into<PathBuf>) -> Self {
		self.config.ca_file = Some(path.into());

		self
	}

	/// Finishes the builder.
	pub fn build(self) -> FlowConfig {
		self.config
	}
}

fn derive_discovery(input: &str) -> Result<(String, String), ConfigError> {
	let invalid = || ConfigError::InvalidUrl {
		name: "issuer",
		source: url::ParseError::RelativeUrlWithoutBase,
	};
	let authority = input.find("://").map(|idx| idx + 3).ok_or_else(invalid)?;
	let path_start = input[authority..].find('/').map_or(input.len(), |idx| authority + idx);
	let (origin, path) = input.split_at(path_start);

	let Some(idx) = path.find(WELL_KNOWN) else {
		let base = input.strip_suffix('/').unwrap_or(input);

		return Ok((format!("{base}{OPENID_CONFIGURATION}"), input.to_owned()));
	};
	let prefix = &path[..idx];
	// RFC 8414 places the issuer path after the well-known name.
	let suffix = &path[idx + WELL_KNOWN.len()..];
	let issuer_path = suffix.find('/').map_or("", |slash| &suffix[slash..]);

	Ok((input.to_owned(), format!("{origin}{prefix}{issuer_path}")))
}
