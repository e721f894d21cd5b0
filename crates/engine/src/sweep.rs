//! Low-stock sweep and its background worker.
//!
//! Stock-driven alerts are maintained on every movement; the sweep catches
//! everything else (threshold edits done outside the service, products
//! imported with stock already low) and keeps the system-level replenishment
//! alert current.

use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use stockledger_alerts::Transition;
use stockledger_catalog::{ProductFilter, ProductRegistry};
use stockledger_core::{InventoryError, InventoryResult};
use stockledger_documents::DocumentStore;
use stockledger_ledger::MovementLedger;

use crate::service::InventoryService;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Active products looked at.
    pub evaluated: usize,
    /// Products at or below their minimum, skipped ones included as listed.
    pub below_minimum: usize,
    pub opened: usize,
    pub resolved: usize,
    /// Products skipped because their lock stayed busy.
    pub skipped: usize,
}

impl<R, L, D> InventoryService<R, L, D>
where
    R: ProductRegistry,
    L: MovementLedger,
    D: DocumentStore,
{
    /// Evaluate every active product under its own lock.
    pub fn sweep_low_stock(&self) -> InventoryResult<SweepReport> {
        let mutator = self.mutator();
        let mut report = SweepReport::default();

        for listed in mutator.registry().list(&ProductFilter::default())? {
            let id = listed.id_typed();
            let _locks = match mutator.lock([id]) {
                Ok(locks) => locks,
                Err(InventoryError::Busy { .. }) => {
                    // Counted from the listing so the replenishment total stays whole.
                    report.skipped += 1;
                    if listed.is_low_stock() {
                        report.below_minimum += 1;
                    }
                    continue;
                }
                Err(err) => return Err(err),
            };
            // Re-read under the lock; the listing may be stale.
            let product = match mutator.registry().get(id) {
                Ok(product) if product.is_active() => product,
                Ok(_) | Err(InventoryError::NotFound(_)) => continue,
                Err(err) => return Err(err),
            };

            report.evaluated += 1;
            if product.is_low_stock() {
                report.below_minimum += 1;
            }
            match mutator.observe(&product) {
                Transition::Opened { .. } => report.opened += 1,
                Transition::Resolved { .. } => report.resolved += 1,
                _ => {}
            }
        }

        mutator.alerts().update_replenishment(report.below_minimum);

        info!(
            evaluated = report.evaluated,
            below_minimum = report.below_minimum,
            opened = report.opened,
            resolved = report.resolved,
            skipped = report.skipped,
            "low-stock sweep finished"
        );
        Ok(report)
    }
}

/// Handle to control and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    /// Request graceful shutdown and wait for the worker to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Periodic low-stock sweep on a dedicated thread.
#[derive(Debug)]
pub struct SweepWorker;

impl SweepWorker {
    /// Spawn a worker on the service's configured sweep interval.
    pub fn spawn_configured<R, L, D>(
        name: &'static str,
        service: Arc<InventoryService<R, L, D>>,
    ) -> std::io::Result<WorkerHandle>
    where
        R: ProductRegistry + 'static,
        L: MovementLedger + 'static,
        D: DocumentStore + 'static,
    {
        let interval = service.config().sweep_interval();
        Self::spawn(name, service, interval)
    }

    /// Spawn a worker that sweeps every `interval` until shut down.
    pub fn spawn<R, L, D>(
        name: &'static str,
        service: Arc<InventoryService<R, L, D>>,
        interval: Duration,
    ) -> std::io::Result<WorkerHandle>
    where
        R: ProductRegistry + 'static,
        L: MovementLedger + 'static,
        D: DocumentStore + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || worker_loop(name, &service, shutdown_rx, interval))?;

        Ok(WorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        })
    }
}

fn worker_loop<R, L, D>(
    name: &'static str,
    service: &InventoryService<R, L, D>,
    shutdown_rx: mpsc::Receiver<()>,
    interval: Duration,
) where
    R: ProductRegistry,
    L: MovementLedger,
    D: DocumentStore,
{
    loop {
        match shutdown_rx.recv_timeout(interval) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if let Err(err) = service.sweep_low_stock() {
                    warn!(worker = name, error = ?err, "low-stock sweep failed");
                }
            }
        }
    }
}
