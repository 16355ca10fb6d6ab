//! Schema-driven validation of provider JSON responses.
//!
//! A response schema is a static list of [`Field`]s. [`parse_response`] checks the
//! `Content-Type` and body encoding, then walks the top-level object once: members
//! named by the schema are type-checked and captured, anything else is skipped
//! without being materialized. Nested values are only inspected when they belong to
//! a schema field.

// crates.io
use serde::de::{DeserializeSeed, Error as _, IgnoredAny, MapAccess, Visitor};
use serde_json::Value;
// self
use crate::{_prelude::*, error::ProtocolError};

/// Expected JSON type of a schema field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
	/// A JSON string.
	String,
	/// A JSON number.
	Number,
	/// A JSON array whose elements are all strings.
	StringArray,
}
impl FieldKind {
	/// Human-readable description used in error messages.
	pub const fn describe(self) -> &'static str {
		match self {
			FieldKind::String => "a string",
			FieldKind::Number => "a number",
			FieldKind::StringArray => "an array of strings",
		}
	}
}
impl Display for FieldKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.describe())
	}
}

/// One top-level member the schema extracts.
#[derive(Clone, Copy, Debug)]
pub struct Field {
	/// Accepted member names; the first is canonical. Every alias fills the same slot.
	pub names: &'static [&'static str],
	/// Expected type.
	pub kind: FieldKind,
	/// Whether the member must be present.
	pub required: bool,
}
impl Field {
	/// Required field with a single name.
	pub const fn required(name: &'static [&'static str], kind: FieldKind) -> Self {
		Self { names: name, kind, required: true }
	}

	/// Optional field with a single name.
	pub const fn optional(name: &'static [&'static str], kind: FieldKind) -> Self {
		Self { names: name, kind, required: false }
	}

	/// Canonical member name.
	pub fn name(&self) -> &'static str {
		self.names.first().copied().unwrap_or_default()
	}
}

/// Value captured for a schema field.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
	/// A string member.
	String(String),
	/// A numeric member.
	Number(f64),
	/// An array-of-strings member.
	StringArray(Vec<String>),
}

/// Schema violation detected while parsing a response body.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum SchemaError {
	/// The document is not a JSON object.
	#[error("top-level element must be an object")]
	NotObject,
	/// A schema field has the wrong JSON type.
	#[error("field \"{field}\" must be {expected}")]
	WrongType {
		/// Member name as it appeared in the document.
		field: String,
		/// Expected type.
		expected: FieldKind,
	},
	/// A schema field appeared more than once.
	#[error("field \"{0}\" is duplicated")]
	Duplicate(String),
	/// A required schema field is absent.
	#[error("field \"{0}\" is missing")]
	Missing(&'static str),
	/// The body is not well-formed JSON.
	#[error("{0}")]
	Syntax(String),
}

/// Fields captured by [`parse_object`], addressable by canonical name.
#[derive(Clone, Debug)]
pub struct ParsedObject {
	schema: &'static [Field],
	values: Vec<Option<FieldValue>>,
}
impl ParsedObject {
	fn take(&mut self, name: &str) -> Option<FieldValue> {
		let idx = self.schema.iter().position(|field| field.name() == name)?;

		self.values.get_mut(idx)?.take()
	}

	/// Takes a string field.
	pub fn take_string(&mut self, name: &str) -> Option<String> {
		match self.take(name)? {
			FieldValue::String(value) => Some(value),
			_ => None,
		}
	}

	/// Takes a numeric field.
	pub fn take_number(&mut self, name: &str) -> Option<f64> {
		match self.take(name)? {
			FieldValue::Number(value) => Some(value),
			_ => None,
		}
	}

	/// Takes an array-of-strings field.
	pub fn take_strings(&mut self, name: &str) -> Option<Vec<String>> {
		match self.take(name)? {
			FieldValue::StringArray(value) => Some(value),
			_ => None,
		}
	}

	/// Takes a string field the schema marks as required.
	pub fn required_string(&mut self, name: &'static str) -> Result<String, SchemaError> {
		self.take_string(name).ok_or(SchemaError::Missing(name))
	}
}

/// Checks that `content_type` is `application/json`, optionally followed by parameters.
pub fn check_content_type(content_type: Option<&str>) -> Result<(), ProtocolError> {
	const JSON: &str = "application/json";

	let Some(content_type) = content_type else {
		return Err(ProtocolError::MissingContentType);
	};
	let unexpected =
		|| ProtocolError::UnexpectedContentType { content_type: content_type.to_owned() };
	let Some(prefix) = content_type.get(..JSON.len()) else {
		return Err(unexpected());
	};

	if !prefix.eq_ignore_ascii_case(JSON) {
		return Err(unexpected());
	}

	let rest = &content_type[JSON.len()..];

	if rest.is_empty() {
		return Ok(());
	}

	match rest.trim_start_matches([' ', '\t']).chars().next() {
		Some(';') => Ok(()),
		_ => Err(unexpected()),
	}
}

/// Validates the response envelope and parses `body` against `schema`.
pub fn parse_response(
	content_type: Option<&str>,
	body: &[u8],
	schema: &'static [Field],
) -> Result<ParsedObject> {
	check_content_type(content_type)?;

	if body.contains(&0) {
		return Err(ProtocolError::EmbeddedNul.into());
	}

	let text = std::str::from_utf8(body).map_err(|_| ProtocolError::InvalidUtf8)?;

	Ok(parse_object(text, schema)?)
}

/// Parses a JSON document against `schema`.
pub fn parse_object(text: &str, schema: &'static [Field]) -> Result<ParsedObject, SchemaError> {
	if !text.trim_start_matches([' ', '\t', '\n', '\r']).starts_with('{') {
		return Err(SchemaError::NotObject);
	}

	let mut failure = None;
	let mut de = serde_json::Deserializer::from_str(text);
	let parsed = SchemaSeed { schema, failure: &mut failure }
		.deserialize(&mut de)
		.and_then(|parsed| de.end().map(|_| parsed));
	let parsed = match (parsed, failure) {
		(_, Some(failure)) => return Err(failure),
		(Err(e), None) => return Err(SchemaError::Syntax(e.to_string())),
		(Ok(parsed), None) => parsed,
	};

	for (field, value) in schema.iter().zip(&parsed.values) {
		if field.required && value.is_none() {
			return Err(SchemaError::Missing(field.name()));
		}
	}

	Ok(parsed)
}

fn capture(field: &Field, name: &str, value: Value) -> Result<FieldValue, SchemaError> {
	let wrong_type = || SchemaError::WrongType { field: name.to_owned(), expected: field.kind };

	match (field.kind, value) {
		(FieldKind::String, Value::String(s)) => Ok(FieldValue::String(s)),
		(FieldKind::Number, Value::Number(n)) =>
			n.as_f64().map(FieldValue::Number).ok_or_else(wrong_type),
		(FieldKind::StringArray, Value::Array(items)) => items
			.into_iter()
			.map(|item| match item {
				Value::String(s) => Ok(s),
				_ => Err(wrong_type()),
			})
			.collect::<Result<_, _>>()
			.map(FieldValue::StringArray),
		_ => Err(wrong_type()),
	}
}

struct SchemaSeed<'f> {
	schema: &'static [Field],
	failure: &'f mut Option<SchemaError>,
}
impl<'de> DeserializeSeed<'de> for SchemaSeed<'_> {
	type Value = ParsedObject;

	fn deserialize<D>(self, deserializer: D) -> std::result::Result<Self::Value, D::Error>
	where
		D: serde::Deserializer<'de>,
	{
		deserializer.deserialize_map(self)
	}
}
impl<'de> Visitor<'de> for SchemaSeed<'_> {
	type Value = ParsedObject;

	fn expecting(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("a JSON object")
	}

	fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
	where
		A: MapAccess<'de>,
	{
		let mut values = vec![None; self.schema.len()];

		while let Some(key) = map.next_key::<String>()? {
			let Some(idx) = self.schema.iter().position(|field| field.names.contains(&key.as_str()))
			else {
				map.next_value::<IgnoredAny>()?;

				continue;
			};

			if values[idx].is_some() {
				*self.failure = Some(SchemaError::Duplicate(key));

				return Err(A::Error::custom("duplicate field"));
			}

			match capture(&self.schema[idx], &key, map.next_value::<Value>()?) {
				Ok(value) => values[idx] = Some(value),
				Err(e) => {
					let message = e.to_string();

					*self.failure = Some(e);

					return Err(A::Error::custom(message));
				},
			}
		}

		Ok(ParsedObject { schema: self.schema, values })
	}
}
