use anyhow::Context;
use tracing::info;

use invoicely_service::{Billing, BillingConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = BillingConfig::load().context("failed to load configuration")?;
    invoicely_observability::init_with_filter(&config.log_filter);

    let billing = Billing::in_memory(&config);
    let worker = billing.spawn_recurring_worker();
    info!(
        tick_secs = config.recurring_tick_secs,
        generated_due_days = config.generated_due_days,
        "recurring scheduler running"
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    info!("shutdown requested");
    let stats = worker.stats();
    // Joining waits for an in-flight run; keep it off the async workers.
    tokio::task::spawn_blocking(move || worker.shutdown())
        .await
        .context("recurring worker panicked")?;
    info!(
        ticks = stats.ticks,
        generated = stats.generated,
        failed = stats.failed,
        "recurring scheduler stopped"
    );
    Ok(())
}
