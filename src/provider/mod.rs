pub mod cloudflare;

use anyhow::Result;
use async_trait::async_trait;

/// Provider-side view of a DNS record, read fresh on every run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsRecord {
    pub id: String,
    pub name: String,
    pub record_type: String,
    pub content: String,
    pub proxied: bool,
    pub ttl: u32,
    /// Empty when the record carries no comment.
    pub comment: String,
}

#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Resolves the zone identifier that owns `name`.
    async fn zone_id(&self, name: &str) -> Result<String>;

    /// Every record in the zone, in provider order.
    async fn list_records(&self, zone_id: &str) -> Result<Vec<DnsRecord>>;

    /// Full replacement write of `record`, keyed by its id.
    async fn update_record(&self, zone_id: &str, record: &DnsRecord) -> Result<DnsRecord>;
}
