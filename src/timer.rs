use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use log::info;
use tokio::time::{interval, MissedTickBehavior};

use crate::error::RunError;
use crate::reconcile::{Outcome, Reconciler};

/// Runs one update at start and then once per `period` until `shutdown` resolves.
///
/// Runs never overlap. A discovered address that fails validation ends the
/// loop with an error.
pub async fn run<F>(reconciler: Arc<Reconciler>, period: Duration, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = &mut shutdown => {
                info!("Timer stopped");
                return Ok(());
            }
        }

        let result = reconciler.run().await;
        result.log();

        if let Outcome::Failed(err @ RunError::InvalidAddress(_)) = result.outcome {
            return Err(err.into());
        }
    }
}
