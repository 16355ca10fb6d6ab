#![cfg(feature = "tokio")]

// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
// self
use oauth2_device_flow::{
	config::FlowConfig,
	error::BoxError,
	flows::{DeviceFlow, DevicePrompt},
};

#[tokio::test(flavor = "multi_thread")]
async fn run_async_completes_against_a_live_provider() -> Result<()> {
	let server = MockServer::start_async().await;
	let discovery = format!(
		r#"{{"issuer":"{}","token_endpoint":"{}","device_authorization_endpoint":"{}","grant_types_supported":["urn:ietf:params:oauth:grant-type:device_code"]}}"#,
		server.base_url(),
		server.url("/token"),
		server.url("/device"),
	);

	server
		.mock_async(|when, then| {
			when.method(GET).path("/.well-known/openid-configuration");
			then.status(200).header("content-type", "application/json").body(discovery);
		})
		.await;
	server
		.mock_async(|when, then| {
			when.method(POST).path("/device");
			then.status(200).header("content-type", "application/json").body(
				r#"{"device_code":"dev-async","user_code":"ASYNC","verification_uri":"https://idp.example/verify","interval":0}"#,
			);
		})
		.await;

	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token").body_includes("device_code=dev-async");
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"access_token":"tok-async","token_type":"Bearer"}"#);
		})
		.await;
	let config = FlowConfig::builder(
		server.url("/.well-known/openid-configuration"),
		server.base_url(),
		"async-client",
	)
	.unsafe_debug(true)
	.build();
	let mut flow = DeviceFlow::new(config)?
		.with_prompt(|_: &DevicePrompt<'_>| -> std::result::Result<bool, BoxError> { Ok(true) });
	let token = flow.run_async().await?;

	assert_eq!(token.secret().expose(), "tok-async");

	token_mock.assert_calls_async(1).await;

	Ok(())
}
