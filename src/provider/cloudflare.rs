use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{DnsProvider, DnsRecord};

const PER_PAGE: u32 = 100;

pub struct CloudflareProvider {
    client: Client,
    api_base: String,
    api_token: String,
}

impl fmt::Debug for CloudflareProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudflareProvider")
            .field("api_base", &self.api_base)
            .field("api_token", &"<REDACTED>")
            .finish()
    }
}

impl CloudflareProvider {
    pub fn new(api_base: impl Into<String>, api_token: impl Into<String>, timeout: Duration) -> Result<Self> {
        let api_token = api_token.into();
        if api_token.trim().is_empty() {
            anyhow::bail!("Cloudflare API token cannot be empty");
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build Cloudflare HTTP client")?;

        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_token,
        })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("Authorization", format!("Bearer {}", self.api_token))
            .header("Content-Type", "application/json")
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<CloudflareResponse<T>> {
        let response: CloudflareResponse<T> = self
            .authorized(request)
            .send()
            .await
            .with_context(|| format!("Failed to send {} request to Cloudflare", what))?
            .json()
            .await
            .with_context(|| format!("Failed to parse Cloudflare {} response", what))?;

        if !response.success {
            let errors: Vec<String> = response
                .errors
                .iter()
                .map(|e| format!("{}: {}", e.code, e.message))
                .collect();
            anyhow::bail!("Cloudflare API error: {}", errors.join(", "));
        }

        Ok(response)
    }
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    async fn zone_id(&self, name: &str) -> Result<String> {
        let url = format!("{}/zones", self.api_base);
        let request = self.client.get(&url).query(&[("name", name)]);

        let response: CloudflareResponse<Vec<Zone>> = self.send(request, "zone lookup").await?;

        response
            .result
            .unwrap_or_default()
            .into_iter()
            .find(|zone| zone.name == name)
            .map(|zone| zone.id)
            .ok_or_else(|| anyhow::anyhow!("No zone found for {}", name))
    }

    async fn list_records(&self, zone_id: &str) -> Result<Vec<DnsRecord>> {
        let url = format!("{}/zones/{}/dns_records", self.api_base, zone_id);
        let mut records = Vec::new();
        let mut page = 1;

        loop {
            let request = self
                .client
                .get(&url)
                .query(&[("page", page), ("per_page", PER_PAGE)]);
            let response: CloudflareResponse<Vec<ApiRecord>> = self.send(request, "record list").await?;

            records.extend(response.result.unwrap_or_default().into_iter().map(DnsRecord::from));

            let total_pages = response.result_info.map(|info| info.total_pages).unwrap_or(1);
            if page >= total_pages {
                break;
            }
            page += 1;
        }

        debug!("Listed {} record(s) in zone {}", records.len(), zone_id);
        Ok(records)
    }

    async fn update_record(&self, zone_id: &str, record: &DnsRecord) -> Result<DnsRecord> {
        let url = format!("{}/zones/{}/dns_records/{}", self.api_base, zone_id, record.id);

        let body = UpdateRecordRequest {
            record_type: &record.record_type,
            name: &record.name,
            content: &record.content,
            ttl: record.ttl,
            proxied: record.proxied,
            comment: &record.comment,
        };

        let response: CloudflareResponse<ApiRecord> =
            self.send(self.client.put(&url).json(&body), "update").await?;

        response
            .result
            .map(DnsRecord::from)
            .ok_or_else(|| anyhow::anyhow!("No result in Cloudflare response"))
    }
}

// Cloudflare API types

#[derive(Debug, Serialize)]
struct UpdateRecordRequest<'a> {
    #[serde(rename = "type")]
    record_type: &'a str,
    name: &'a str,
    content: &'a str,
    ttl: u32,
    proxied: bool,
    comment: &'a str,
}

#[derive(Debug, Deserialize)]
struct CloudflareResponse<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<CloudflareError>,
    result: Option<T>,
    #[serde(default)]
    result_info: Option<ResultInfo>,
}

#[derive(Debug, Deserialize)]
struct CloudflareError {
    code: i32,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ResultInfo {
    #[serde(default = "one")]
    total_pages: u32,
}

fn one() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
struct Zone {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiRecord {
    id: String,
    #[serde(rename = "type")]
    record_type: String,
    name: String,
    content: String,
    #[serde(default)]
    proxied: bool,
    #[serde(default = "one")]
    ttl: u32,
    #[serde(default)]
    comment: Option<String>,
}

impl From<ApiRecord> for DnsRecord {
    fn from(record: ApiRecord) -> Self {
        DnsRecord {
            id: record.id,
            name: record.name,
            record_type: record.record_type,
            content: record.content,
            proxied: record.proxied,
            ttl: record.ttl,
            comment: record.comment.unwrap_or_default(),
        }
    }
}
