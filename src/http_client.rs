use anyhow::Result;
use reqwest::{Client, ClientBuilder, header};
use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str = concat!(
    "sitepulse/",
    env!("CARGO_PKG_VERSION"),
    " (+https://github.com/sitepulse/sitepulse)"
);

const ACCEPT: &str = "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8";
const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

/// Creates a reqwest client shared by the fetcher, robots.txt lookups and
/// the keyword provider
pub fn build_http_client(user_agent: &str, timeout_secs: u64) -> Result<Client> {
    let mut headers = header::HeaderMap::new();
    headers.insert(header::ACCEPT, header::HeaderValue::from_static(ACCEPT));
    headers.insert(
        header::ACCEPT_LANGUAGE,
        header::HeaderValue::from_static(ACCEPT_LANGUAGE),
    );

    let client = ClientBuilder::new()
        .user_agent(user_agent)
        .default_headers(headers)
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(timeout_secs.min(10)))
        .redirect(reqwest::redirect::Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .deflate(true)
        .build()?;

    Ok(client)
}
