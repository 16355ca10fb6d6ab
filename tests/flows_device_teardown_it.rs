//! Dropping a flow mid-transfer or mid-wait must release its descriptors.
//!
//! Kept apart from the other device flow tests so no parallel test opens descriptors while
//! these ones count them.

#![cfg(target_os = "linux")]

// std
use std::{fs, thread, time::Duration};
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
// self
use oauth2_device_flow::{
	blocking,
	config::FlowConfig,
	error::BoxError,
	flows::{DeviceFlow, DevicePrompt, Step},
};

const PENDING: &str = r#"{"error":"authorization_pending"}"#;
const TOKEN: &str = r#"{"access_token":"tok123","token_type":"Bearer"}"#;

fn open_fds() -> usize {
	fs::read_dir("/proc/self/fd").map(Iterator::count).unwrap_or(0)
}

// Server-side sockets close asynchronously, so give the count time to fall back.
fn settle_fds(at_most: usize) -> usize {
	let mut count = open_fds();

	for _ in 0..100 {
		if count <= at_most {
			break;
		}

		thread::sleep(Duration::from_millis(100));

		count = open_fds();
	}

	count
}

fn quiet_flow(server: &MockServer) -> Result<DeviceFlow> {
	let config = FlowConfig::builder(
		server.url("/.well-known/openid-configuration"),
		server.base_url(),
		"device-client",
	)
	.unsafe_debug(true)
	.build();

	Ok(DeviceFlow::new(config)?
		.with_prompt(|_: &DevicePrompt<'_>| -> std::result::Result<bool, BoxError> { Ok(true) }))
}

fn mock_provider(
	server: &MockServer,
	discovery_delay: Duration,
	interval: u32,
	token_status: u16,
) {
	let discovery = format!(
		r#"{{"issuer":"{}","token_endpoint":"{}","device_authorization_endpoint":"{}","grant_types_supported":["urn:ietf:params:oauth:grant-type:device_code"]}}"#,
		server.base_url(),
		server.url("/token"),
		server.url("/device"),
	);
	let device = format!(
		r#"{{"device_code":"dev-1","user_code":"ABCD-EFGH","verification_uri":"https://idp.example/verify","interval":{interval},"expires_in":600}}"#
	);
	let token = if token_status == 200 { TOKEN } else { PENDING };

	server.mock(|when, then| {
		when.method(GET).path("/.well-known/openid-configuration");
		then.status(200)
			.header("content-type", "application/json")
			.body(discovery)
			.delay(discovery_delay);
	});
	server.mock(|when, then| {
		when.method(POST).path("/device");
		then.status(200).header("content-type", "application/json").body(device);
	});
	server.mock(|when, then| {
		when.method(POST).path("/token");
		then.status(token_status).header("content-type", "application/json").body(token);
	});
}

#[test]
fn dropping_a_flow_releases_its_descriptors() -> Result<()> {
	let complete = MockServer::start();
	let slow = MockServer::start();
	let waiting = MockServer::start();

	mock_provider(&complete, Duration::ZERO, 0, 200);
	mock_provider(&slow, Duration::from_secs(2), 0, 400);
	mock_provider(&waiting, Duration::ZERO, 5, 400);

	// Pay for process-wide libcurl setup before taking the baseline.
	quiet_flow(&complete)?.run_blocking()?;
	thread::sleep(Duration::from_millis(500));

	let baseline = open_fds();
	let mut flow = quiet_flow(&slow)?;

	flow.advance()?;
	blocking::wait_readable(flow.altsock(), Some(Duration::from_millis(200)))?;
	flow.advance()?;

	assert_eq!(flow.step(), Step::Discovery);
	assert!(open_fds() > baseline);

	drop(flow);

	let after_discovery = settle_fds(baseline + 1);

	assert!(
		after_discovery <= baseline + 1,
		"{after_discovery} descriptors open after dropping mid-discovery, baseline {baseline}"
	);

	let mut flow = quiet_flow(&waiting)?;

	for _ in 0..20 {
		flow.advance()?;

		if flow.step() == Step::WaitInterval {
			break;
		}

		blocking::wait_readable(flow.altsock(), Some(Duration::from_secs(2)))?;
	}

	assert_eq!(flow.step(), Step::WaitInterval);

	drop(flow);

	let after_wait = settle_fds(baseline + 1);

	assert!(
		after_wait <= baseline + 1,
		"{after_wait} descriptors open after dropping mid-wait, baseline {baseline}"
	);

	Ok(())
}
