//! Background Workers
//!
//! - [`StatusPoller`] asks providers about ACTIVE purchases
//! - [`RecoveryWorker`] resumes purchases stuck in an intermediate state
//! - [`ReconcileWorker`] detects (and optionally corrects) phantom frozen funds

use futures::StreamExt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::WorkersConfig;
use crate::purchase::{PurchaseCoordinator, PurchaseError, PurchaseState};
use crate::reconcile::{ReconcileError, ReconcileReport, Reconciler};

/// Retries after which a stuck purchase is reported loudly
const ALERT_RETRY_COUNT: i32 = 10;

/// Polls ACTIVE purchases for their SMS
pub struct StatusPoller {
    coordinator: Arc<PurchaseCoordinator>,
    interval: Duration,
    batch_size: i64,
    concurrency: usize,
}

impl StatusPoller {
    pub fn new(coordinator: Arc<PurchaseCoordinator>, config: &WorkersConfig) -> Self {
        Self {
            coordinator,
            interval: config.poll_interval(),
            batch_size: config.poll_batch_size,
            concurrency: config.poll_concurrency.max(1),
        }
    }

    pub async fn run(&self) -> ! {
        info!(
            interval_secs = self.interval.as_secs(),
            batch_size = self.batch_size,
            concurrency = self.concurrency,
            "Starting status poller"
        );

        loop {
            if let Err(e) = self.poll_once().await {
                error!(error = %e, "Status poll failed");
            }
            tokio::time::sleep(self.interval).await;
        }
    }

    /// Poll one batch; returns how many purchases left ACTIVE
    pub async fn poll_once(&self) -> Result<usize, PurchaseError> {
        let active = self.coordinator.store().find_active(self.batch_size).await?;
        if active.is_empty() {
            return Ok(0);
        }
        debug!(count = active.len(), "Polling active purchases");

        let closed = AtomicUsize::new(0);
        futures::stream::iter(active)
            .for_each_concurrent(self.concurrency, |record| {
                let closed = &closed;
                async move {
                    match self.coordinator.poll(record.purchase_id).await {
                        Ok(updated) if updated.state != PurchaseState::Active => {
                            closed.fetch_add(1, Ordering::Relaxed);
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!(purchase_id = %record.purchase_id, error = %e, "Poll failed");
                        }
                    }
                }
            })
            .await;

        Ok(closed.into_inner())
    }
}

/// Resumes purchases stuck in PENDING, FROZEN, ORDERING or REFUNDING
pub struct RecoveryWorker {
    coordinator: Arc<PurchaseCoordinator>,
    scan_interval: Duration,
    stale_threshold: Duration,
    batch_size: i64,
}

impl RecoveryWorker {
    pub fn new(coordinator: Arc<PurchaseCoordinator>, config: &WorkersConfig) -> Self {
        Self {
            coordinator,
            scan_interval: config.scan_interval(),
            stale_threshold: config.stale_threshold(),
            batch_size: config.recovery_batch_size,
        }
    }

    pub async fn run(&self) -> ! {
        info!(
            scan_interval_secs = self.scan_interval.as_secs(),
            stale_threshold_secs = self.stale_threshold.as_secs(),
            "Starting recovery worker"
        );

        loop {
            if let Err(e) = self.scan_and_recover().await {
                error!(error = %e, "Recovery scan failed");
            }
            tokio::time::sleep(self.scan_interval).await;
        }
    }

    /// Run a single scan and recovery cycle
    pub async fn scan_and_recover(&self) -> Result<usize, PurchaseError> {
        let stale = self
            .coordinator
            .store()
            .find_stale(self.stale_threshold, self.batch_size)
            .await?;

        if stale.is_empty() {
            debug!("No stale purchases found");
            return Ok(0);
        }
        info!(count = stale.len(), "Found stale purchases to recover");

        let mut recovered = 0;
        for record in &stale {
            if record.retry_count > ALERT_RETRY_COUNT {
                warn!(
                    purchase_id = %record.purchase_id,
                    state = %record.state,
                    retry_count = record.retry_count,
                    "Purchase stuck with many retries"
                );
            }

            // Drive to ACTIVE or terminal; a stale ORDERING is refunded here
            match self.coordinator.execute(record.purchase_id).await {
                Ok(new_state) if new_state != record.state => {
                    info!(
                        purchase_id = %record.purchase_id,
                        old_state = %record.state,
                        new_state = %new_state,
                        "Purchase state advanced"
                    );
                    recovered += 1;
                }
                Ok(_) => {}
                Err(e) => {
                    error!(purchase_id = %record.purchase_id, error = %e, "Failed to recover purchase");
                }
            }
        }

        if recovered > 0 {
            info!(count = recovered, "Recovered purchases this scan");
        }
        Ok(recovered)
    }
}

/// Periodic phantom frozen check
pub struct ReconcileWorker {
    reconciler: Arc<Reconciler>,
    interval: Duration,
    auto_apply: bool,
}

impl ReconcileWorker {
    pub fn new(reconciler: Arc<Reconciler>, config: &WorkersConfig) -> Self {
        Self {
            reconciler,
            interval: config.reconcile_interval(),
            auto_apply: config.reconcile_auto_apply,
        }
    }

    pub async fn run(&self) -> ! {
        info!(
            interval_secs = self.interval.as_secs(),
            auto_apply = self.auto_apply,
            "Starting reconcile worker"
        );

        loop {
            tokio::time::sleep(self.interval).await;
            if let Err(e) = self.check_once().await {
                error!(error = %e, "Reconciliation failed");
            }
        }
    }

    pub async fn check_once(&self) -> Result<ReconcileReport, ReconcileError> {
        let report = self.reconciler.scan().await?;
        if report.drifted == 0 && report.stranded == 0 {
            return Ok(report);
        }

        for drift in &report.drifts {
            warn!(
                user_id = %drift.user_id,
                recorded = %drift.recorded,
                expected = %drift.expected,
                "Frozen balance drift"
            );
        }

        if self.auto_apply {
            return self.reconciler.run().await;
        }
        Ok(report)
    }
}
