//! Background scheduler for automatic matching sweeps
//!
//! Provides optional scheduled auto-match runs that can be enabled via
//! environment variables:
//!
//! - `CHIT_AUTOMATCH_SCHEDULE`: Interval in hours (e.g., "1" for hourly, "24" for daily)
//!
//! The scheduler runs in the background and sweeps every owner with data,
//! sequentially per owner, recording each run in the run history.

use std::time::Duration;

use tokio::time::interval;
use tracing::{error, info, warn};

use chit_core::{AutoMatchOrchestrator, CancelFlag, Database, MatchingConfig, OwnerLocks};

/// Configuration for scheduled auto-match sweeps
#[derive(Debug, Clone)]
pub struct AutoMatchScheduleConfig {
    /// Interval between sweeps in hours
    pub interval_hours: u64,
}

impl AutoMatchScheduleConfig {
    /// Parse configuration from environment variables
    ///
    /// Returns None if scheduling is not configured (CHIT_AUTOMATCH_SCHEDULE not set)
    pub fn from_env() -> Option<Self> {
        let interval_hours: u64 = std::env::var("CHIT_AUTOMATCH_SCHEDULE")
            .ok()
            .and_then(|s| s.parse().ok())?;

        if interval_hours == 0 {
            warn!("CHIT_AUTOMATCH_SCHEDULE is 0, scheduled auto-match disabled");
            return None;
        }

        Some(Self { interval_hours })
    }
}

/// Start the auto-match scheduler as a background task
///
/// This function spawns a tokio task that runs indefinitely, sweeping all
/// owners at the configured interval. The lock registry is shared with the
/// API so a scheduled sweep and a concurrent confirm serialize on the same
/// per-owner lock.
pub fn start_automatch_scheduler(
    db: Database,
    matching: MatchingConfig,
    locks: OwnerLocks,
    config: AutoMatchScheduleConfig,
) {
    info!(
        "Starting auto-match scheduler: every {} hours",
        config.interval_hours
    );

    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(config.interval_hours * 3600));

        // Skip the first immediate tick - we don't want to sweep on startup
        ticker.tick().await;

        loop {
            ticker.tick().await;

            info!("Running scheduled auto-match sweep...");

            let orchestrator = AutoMatchOrchestrator::new(&db, &matching, &locks);
            match orchestrator.run_all(&CancelFlag::new()) {
                Ok(results) => {
                    let proposed: i64 = results.iter().map(|(_, s)| s.proposed).sum();
                    info!(
                        "Scheduled sweep completed: {} owner(s), {} proposal(s)",
                        results.len(),
                        proposed
                    );
                }
                Err(e) => {
                    error!("Scheduled auto-match sweep failed: {}", e);
                }
            }
        }
    });
}
