//! Provider metadata learned from the issuer's discovery document.
//!
//! `metadata` holds the parsed [`ProviderMetadata`] together with the checks that decide
//! whether the provider may be used for a device flow at all. `grant` names the grant
//! types those checks look for.

pub mod grant;
pub mod metadata;

pub use grant::*;
pub use metadata::*;
