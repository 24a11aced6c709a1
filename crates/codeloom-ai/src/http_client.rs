use std::time::Duration;

use reqwest::Client;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
/// Idle gap allowed between response bytes; streamed completions can be long.
const READ_TIMEOUT: Duration = Duration::from_secs(120);
const NO_PROXY_ENV: &str = "CODELOOM_NO_PROXY";

pub(crate) fn build_http_client() -> Client {
    let mut builder = Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .read_timeout(READ_TIMEOUT)
        .user_agent(concat!("codeloom/", env!("CARGO_PKG_VERSION")));

    // Test runs never go through a system proxy.
    if cfg!(test) || std::env::var_os(NO_PROXY_ENV).is_some() {
        builder = builder.no_proxy();
    }

    builder.build().unwrap_or_else(|error| {
        tracing::warn!(error = %error, "Falling back to default HTTP client");
        Client::new()
    })
}
