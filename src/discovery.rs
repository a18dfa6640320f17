use std::net::Ipv4Addr;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use reqwest::Client;

use crate::error::RunError;

/// Source of the raw `key=value` trace text that carries the public address.
#[async_trait]
pub trait AddressSource: Send + Sync {
    async fn trace(&self) -> Result<String>;
}

pub struct TraceClient {
    client: Client,
    url: String,
}

impl TraceClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build trace HTTP client")?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl AddressSource for TraceClient {
    async fn trace(&self) -> Result<String> {
        debug!("Fetching public address from {}", self.url);

        self.client
            .get(&self.url)
            .send()
            .await
            .context("Failed to send trace request")?
            .error_for_status()
            .context("Trace endpoint returned an error status")?
            .text()
            .await
            .context("Failed to read trace response")
    }
}

/// Returns the value of the first line containing `ip=`.
///
/// Only the text between the first and second `=` is kept.
pub fn parse_trace(body: &str) -> Option<&str> {
    body.lines()
        .find(|line| line.contains("ip="))
        .and_then(|line| line.split('=').nth(1))
        .map(str::trim)
}

lazy_static! {
    static ref IPV4: Regex = Regex::new(
        r"^(25[0-5]|2[0-4][0-9]|1[0-9][0-9]|[1-9]?[0-9])\.(25[0-5]|2[0-4][0-9]|1[0-9][0-9]|[1-9]?[0-9])\.(25[0-5]|2[0-4][0-9]|1[0-9][0-9]|[1-9]?[0-9])\.(25[0-5]|2[0-4][0-9]|1[0-9][0-9]|[1-9]?[0-9])$"
    )
    .unwrap();
}

/// Checks dotted-decimal IPv4 grammar over the whole string.
pub fn validate(text: &str) -> Result<Ipv4Addr, RunError> {
    if !IPV4.is_match(text) {
        return Err(RunError::InvalidAddress(text.to_string()));
    }

    text.parse()
        .map_err(|_| RunError::InvalidAddress(text.to_string()))
}
