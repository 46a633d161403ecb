use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use tracing::{info, warn};

use resale_db::Database;
use resale_types::api::MaintenanceReport;

use crate::archival::{ArchivalError, ArchivalTransfer};
use crate::store::{CallError, TicketStore, call};

/// Background task that finishes interrupted archival transfers and expires
/// listings for past events.
pub async fn run_maintenance_loop(db: Arc<Database>, timeout: Duration, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        match run_maintenance_pass(&db, timeout).await {
            Ok(report) => {
                if report != MaintenanceReport::default() {
                    info!(
                        "Maintenance: {} reconciled, {} stale, {} failed, {} expired",
                        report.reconciled, report.stale, report.failed, report.expired
                    );
                }
            }
            Err(e) => {
                warn!("Maintenance error: {}", e);
            }
        }
    }
}

pub async fn run_maintenance_pass(db: &Arc<Database>, timeout: Duration) -> Result<MaintenanceReport, CallError> {
    let transfer = ArchivalTransfer::new(db.clone(), timeout);
    let mut report = reconcile_partial_transfers(&transfer).await?;
    report.expired = expire_past_events(db, Utc::now().date_naive(), timeout).await?;
    Ok(report)
}

/// Retries the delete step for every confirmed copy whose live ticket still
/// exists. Tickets sold or edited in the meantime are left alone, their copy is
/// abandoned and counted as stale.
pub async fn reconcile_partial_transfers<S: TicketStore>(
    transfer: &ArchivalTransfer<S>,
) -> Result<MaintenanceReport, CallError> {
    let pending = transfer.unreconciled().await?;
    let mut report = MaintenanceReport::default();

    for archived in &pending {
        match transfer.retry_delete(archived).await {
            // Removed by us, or by a concurrent transfer
            Ok(()) | Err(ArchivalError::NotFound(_)) => report.reconciled += 1,
            Err(ArchivalError::Unauthorized(_) | ArchivalError::ArchiveFailed { .. }) => {
                warn!(
                    "Archive {} is stale: live ticket {} changed since it was copied",
                    archived.id, archived.original_id
                );
                report.stale += 1;
            }
            Err(e) => {
                warn!("Reconciling ticket {} failed, retrying next pass: {}", archived.original_id, e);
                report.failed += 1;
            }
        }
    }

    Ok(report)
}

pub async fn expire_past_events(db: &Arc<Database>, today: NaiveDate, timeout: Duration) -> Result<usize, CallError> {
    call(db, timeout, move |db| db.expire_tickets_before(today, Utc::now())).await
}
