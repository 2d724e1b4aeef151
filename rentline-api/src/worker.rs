use rentline_core::RequestContext;
use rentline_order::BookingOrchestrator;
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info, warn};

/// Periodic reconciliation of due holds. Runs for the life of the process,
/// independent of any request; a failed sweep is logged and retried next tick.
pub async fn start_hold_sweeper(orchestrator: Arc<BookingOrchestrator>, every: Duration) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Hold sweeper started, running every {:?}", every);

    loop {
        ticker.tick().await;
        let ctx = RequestContext::new();
        match orchestrator.reconcile_holds(&ctx).await {
            Ok(report) if report.failed > 0 || report.late > 0 || report.errors > 0 => {
                warn!(request_id = %ctx.request_id, ?report, "Hold sweep needs attention");
            }
            Ok(report) if report.examined > 0 => {
                info!(request_id = %ctx.request_id, ?report, "Hold sweep complete");
            }
            Ok(_) => {}
            Err(e) => error!(request_id = %ctx.request_id, "Hold sweep failed: {}", e),
        }
    }
}
