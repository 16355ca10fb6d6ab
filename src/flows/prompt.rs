//! Presenting the verification URI and user code to the end user.

// self
use crate::{_prelude::*, error::BoxError, flows::device_authz::DeviceAuthorization};

/// What the user needs to approve the device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DevicePrompt<'a> {
	/// Where to go.
	pub verification_uri: &'a str,
	/// What to type there.
	pub user_code: &'a str,
	/// Verification URI with the code embedded, if the provider sent one.
	pub verification_uri_complete: Option<&'a str>,
	/// Seconds until the codes expire, if stated.
	pub expires_in: Option<u64>,
}
impl<'a> DevicePrompt<'a> {
	/// Borrows the prompt out of a device authorization.
	pub fn from_authorization(authz: &'a DeviceAuthorization) -> Self {
		Self {
			verification_uri: &authz.verification_uri,
			user_code: &authz.user_code,
			verification_uri_complete: authz.verification_uri_complete.as_deref(),
			expires_in: authz.expires_in,
		}
	}
}
impl Display for DevicePrompt<'_> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "Visit {} and enter the code: {}", self.verification_uri, self.user_code)
	}
}

/// Caller-supplied prompt presentation.
///
/// Returning `Ok(false)` declines, and the default prompt is written to stderr instead.
pub trait PromptHook: Send {
	/// Shows `prompt` to the user.
	fn prompt(&mut self, prompt: &DevicePrompt<'_>) -> Result<bool, BoxError>;
}
impl<F> PromptHook for F
where
	F: Send + FnMut(&DevicePrompt<'_>) -> Result<bool, BoxError>,
{
	fn prompt(&mut self, prompt: &DevicePrompt<'_>) -> Result<bool, BoxError> {
		self(prompt)
	}
}

/// Presents `prompt` through `hook`, falling back to stderr.
pub fn present<H>(hook: Option<&mut H>, prompt: &DevicePrompt<'_>) -> Result<()>
where
	H: ?Sized + PromptHook,
{
	let handled = match hook {
		Some(hook) => hook.prompt(prompt).map_err(Error::Prompt)?,
		None => false,
	};

	if !handled {
		eprintln!("{prompt}");
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	const PROMPT: DevicePrompt<'static> = DevicePrompt {
		verification_uri: "https://idp.example/activate",
		user_code: "ABCD-EFGH",
		verification_uri_complete: None,
		expires_in: Some(600),
	};

	#[test]
	fn default_prompt_text() {
		assert_eq!(
			PROMPT.to_string(),
			"Visit https://idp.example/activate and enter the code: ABCD-EFGH"
		);
	}

	#[test]
	fn hook_sees_the_prompt() {
		let mut seen = Vec::new();
		let mut hook = |prompt: &DevicePrompt<'_>| -> Result<bool, BoxError> {
			seen.push(prompt.user_code.to_owned());

			Ok(true)
		};

		present(Some(&mut hook), &PROMPT).expect("Hook should succeed.");
		present(None::<&mut dyn PromptHook>, &PROMPT).expect("Fallback should succeed.");

		assert_eq!(seen, ["ABCD-EFGH"]);
	}

	#[test]
	fn hook_failure_is_reported() {
		let mut hook =
			|_: &DevicePrompt<'_>| -> Result<bool, BoxError> { Err("terminal is gone".into()) };
		let err = present(Some(&mut hook), &PROMPT).expect_err("Hook failure should surface.");

		assert!(matches!(err, Error::Prompt(_)));
	}
}
