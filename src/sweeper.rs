//! Periodic circulation housekeeping.
//!
//! Each cycle expires lapsed reservation holds (handing their copies on) and
//! then sends due-soon and overdue reminders.

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::{config::SweeperConfig, error::AppResult, services::Services};

/// Work done by one cycle
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub holds_expired: usize,
    pub reminders_sent: usize,
}

pub struct Sweeper {
    services: Arc<Services>,
    interval: Duration,
}

impl Sweeper {
    pub fn new(services: Arc<Services>, config: &SweeperConfig) -> Self {
        Self {
            services,
            interval: Duration::from_secs(config.interval_seconds.max(1)),
        }
    }

    /// Runs a single cycle.
    ///
    /// Reminders still go out when expiring holds fails.
    pub async fn run_cycle(&self) -> AppResult<SweepReport> {
        let now = Utc::now();

        let holds_expired = match self.services.reservations.expire_holds(now).await {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "Expiring reservation holds failed");
                0
            }
        };
        let reminders_sent = self.services.notifications.send_due_reminders(now).await?;

        Ok(SweepReport {
            holds_expired,
            reminders_sent,
        })
    }

    /// Starts the sweeper as a background tokio task.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval_secs = self.interval.as_secs(), "Circulation sweeper started");

            loop {
                ticker.tick().await;

                let start = std::time::Instant::now();
                match self.run_cycle().await {
                    Ok(report) if report == SweepReport::default() => {
                        debug!("Sweeper cycle found nothing to do");
                    }
                    Ok(report) => {
                        info!(
                            holds_expired = report.holds_expired,
                            reminders_sent = report.reminders_sent,
                            elapsed_ms = start.elapsed().as_millis() as u64,
                            "Sweeper cycle complete"
                        );
                    }
                    Err(e) => warn!(error = %e, "Sweeper cycle failed"),
                }
            }
        })
    }
}
