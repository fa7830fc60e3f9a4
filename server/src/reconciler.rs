use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use crate::ledger::RecordBacklog;
use crate::store::UserDirectory;

/// Periodically re-applies record adjustments that failed during settlement.
pub struct RecordReconciler<D> {
    directory: D,
    backlog: RecordBacklog,
    every: Duration,
}

//NOTE: nothing in here may end the task, failures stay in the backlog
impl<D: UserDirectory> RecordReconciler<D> {
    pub fn new(directory: D, backlog: RecordBacklog, every: Duration) -> Self {
        Self {
            directory,
            backlog,
            every,
        }
    }

    pub async fn run_once(&self) -> usize {
        let before = self.backlog.len().await;
        if before == 0 {
            return 0;
        }
        let remaining = self.backlog.retry(&self.directory).await;
        if remaining > 0 {
            warn!(remaining, "record adjustments still unapplied");
        } else {
            info!(applied = before, "record backlog drained");
        }
        remaining
    }

    pub async fn manage(&self) {
        let mut ticker = interval(self.every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.run_once().await;
        }
    }
}
