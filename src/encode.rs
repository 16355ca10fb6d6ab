//! `application/x-www-form-urlencoded` serialization for request bodies.

// crates.io
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

/// Everything outside the RFC 3986 unreserved set gets percent-encoded.
const FORM_VALUE: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_').remove(b'~');

/// Percent-encodes `value`, writing spaces as `+`.
pub fn urlencode(value: &str) -> String {
	utf8_percent_encode(value, FORM_VALUE).to_string().replace("%20", "+")
}

/// Ordered `key=value&key=value` body builder; each pair is encoded independently.
#[derive(Clone, Debug, Default)]
pub struct FormBody {
	encoded: String,
}
impl FormBody {
	/// Creates an empty body.
	pub fn new() -> Self {
		Self::default()
	}

	/// Appends one encoded pair.
	pub fn append(&mut self, key: &str, value: &str) -> &mut Self {
		if !self.encoded.is_empty() {
			self.encoded.push('&');
		}

		self.encoded.push_str(&urlencode(key));
		self.encoded.push('=');
		self.encoded.push_str(&urlencode(value));

		self
	}

	/// Whether no pair was appended.
	pub fn is_empty(&self) -> bool {
		self.encoded.is_empty()
	}

	/// Returns the encoded body.
	pub fn as_str(&self) -> &str {
		&self.encoded
	}

	/// Consumes the builder, returning the body bytes.
	pub fn into_bytes(self) -> Vec<u8> {
		self.encoded.into_bytes()
	}
}
