use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::discovery::{parse_trace, validate, AddressSource};
use crate::error::{describe, RunError};
use crate::provider::{DnsProvider, DnsRecord};

/// What every run reconciles against. Fixed at startup.
#[derive(Debug, Clone)]
pub struct ReconcileRequest {
    /// Domain used to resolve the zone.
    pub zone_name: String,
    /// Records whose comment equals this value are the ones kept in sync.
    pub record_comment: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordChange {
    Unchanged { name: String, address: String },
    Updated { name: String, previous: String, current: String },
}

impl fmt::Display for RecordChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordChange::Unchanged { name, address } => {
                write!(f, "no update required, {}: {} -> {}", name, address, address)
            }
            RecordChange::Updated { name, previous, current } => {
                write!(f, "successfully updated {}: {} -> {}", name, previous, current)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    NoUpdateNeeded,
    Updated,
    NoMatchingRecord { comment: String },
    Failed(RunError),
}

/// Result of one run. `changes` keeps whatever was done before a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileResult {
    pub outcome: Outcome,
    pub changes: Vec<RecordChange>,
}

impl ReconcileResult {
    fn finished(changes: Vec<RecordChange>, comment: &str) -> Self {
        let outcome = if changes.is_empty() {
            Outcome::NoMatchingRecord {
                comment: comment.to_string(),
            }
        } else if changes.iter().any(|c| matches!(c, RecordChange::Updated { .. })) {
            Outcome::Updated
        } else {
            Outcome::NoUpdateNeeded
        };

        Self { outcome, changes }
    }

    fn failed(changes: Vec<RecordChange>, err: RunError) -> Self {
        Self {
            outcome: Outcome::Failed(err),
            changes,
        }
    }

    /// Human-readable report, one line per evaluated record plus the failure if any.
    pub fn message(&self) -> String {
        let mut lines: Vec<String> = self.changes.iter().map(ToString::to_string).collect();

        match &self.outcome {
            Outcome::NoMatchingRecord { comment } => {
                lines.push(format!("no dns record found with comment {:?}", comment));
            }
            Outcome::Failed(err) => lines.push(err.to_string()),
            Outcome::NoUpdateNeeded | Outcome::Updated => {}
        }

        lines.join("\n")
    }

    /// Writes the report to the process log at a level matching the outcome.
    pub fn log(&self) {
        let message = self.message();
        match self.outcome {
            Outcome::NoUpdateNeeded | Outcome::Updated => info!("{}", message),
            Outcome::NoMatchingRecord { .. } => warn!("{}", message),
            Outcome::Failed(_) => error!("{}", message),
        }
    }
}

pub struct Reconciler {
    source: Arc<dyn AddressSource>,
    provider: Arc<dyn DnsProvider>,
    request: ReconcileRequest,
    timeout: Duration,
}

impl Reconciler {
    pub fn new(
        source: Arc<dyn AddressSource>,
        provider: Arc<dyn DnsProvider>,
        request: ReconcileRequest,
        timeout: Duration,
    ) -> Self {
        Self {
            source,
            provider,
            request,
            timeout,
        }
    }

    /// Runs discover, compare and update once, bounded by the run timeout.
    ///
    /// Dropping the returned future cancels any in-flight call.
    pub async fn run(&self) -> ReconcileResult {
        match tokio::time::timeout(self.timeout, self.reconcile()).await {
            Ok(result) => result,
            Err(_) => ReconcileResult::failed(Vec::new(), RunError::Timeout(self.timeout)),
        }
    }

    async fn reconcile(&self) -> ReconcileResult {
        let mut changes = Vec::new();

        match self.apply(&mut changes).await {
            Ok(()) => ReconcileResult::finished(changes, &self.request.record_comment),
            Err(err) => ReconcileResult::failed(changes, err),
        }
    }

    async fn apply(&self, changes: &mut Vec<RecordChange>) -> Result<(), RunError> {
        let body = self
            .source
            .trace()
            .await
            .map_err(|e| RunError::Discovery(describe(&e)))?;
        let address = validate(parse_trace(&body).ok_or(RunError::NoAddress)?)?.to_string();
        debug!("Current public address: {}", address);

        let zone_id = self
            .provider
            .zone_id(&self.request.zone_name)
            .await
            .map_err(|e| RunError::ZoneLookup {
                zone: self.request.zone_name.clone(),
                reason: describe(&e),
            })?;

        let records = self
            .provider
            .list_records(&zone_id)
            .await
            .map_err(|e| RunError::ListRecords(describe(&e)))?;

        // Every record sharing the comment is kept in sync, in provider order.
        for record in records
            .into_iter()
            .filter(|r| r.comment == self.request.record_comment)
        {
            if record.content == address {
                debug!("Record {} already has IP {}, no update needed", record.name, address);
                changes.push(RecordChange::Unchanged {
                    name: record.name,
                    address: address.clone(),
                });
                continue;
            }

            let previous = record.content.clone();
            let replacement = DnsRecord {
                content: address.clone(),
                ..record
            };

            self.provider
                .update_record(&zone_id, &replacement)
                .await
                .map_err(|e| RunError::Update {
                    name: replacement.name.clone(),
                    reason: describe(&e),
                })?;

            debug!("Updated record {} from {} to {}", replacement.name, previous, address);
            changes.push(RecordChange::Updated {
                name: replacement.name,
                previous,
                current: address.clone(),
            });
        }

        Ok(())
    }
}
