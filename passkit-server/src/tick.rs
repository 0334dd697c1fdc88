//! Periodic trigger for the drip-campaign scheduler.

use passkit_core::DripScheduler;
use std::sync::Arc;
use std::time::Duration;
use tokio::time;

pub fn spawn_scheduler_task(scheduler: Arc<DripScheduler>, interval_secs: u64) {
    tokio::spawn(async move {
        let mut interval = time::interval(Duration::from_secs(interval_secs.max(1)));
        loop {
            interval.tick().await;
            let now = chrono::Utc::now().timestamp();
            match scheduler.run_due(now).await {
                Ok(report) if report.processed > 0 => {
                    tracing::info!(
                        processed = report.processed,
                        advanced = report.advanced,
                        completed = report.completed,
                        failed = report.failed,
                        "scheduler pass"
                    );
                }
                Ok(_) => {}
                Err(e) => tracing::error!("scheduler pass failed: {}", e),
            }
        }
    });
}
