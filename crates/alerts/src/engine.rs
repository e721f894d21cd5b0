use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use stockledger_core::{AlertId, InventoryError, InventoryResult, ProductId};

use crate::alert::{Alert, AlertClosure, AlertFilter, AlertKind, StockObservation};

/// Outcome of feeding one observation to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Stock is healthy and nothing was open.
    Clear,
    /// A new alert was opened, possibly superseding one of the other kind.
    Opened {
        alert: AlertId,
        kind: AlertKind,
        superseded: Option<AlertId>,
    },
    /// The open alert already had the right kind; its message was refreshed.
    Refreshed { alert: AlertId, kind: AlertKind },
    /// The open alert was closed because the condition went away.
    Resolved { alert: AlertId, kind: AlertKind },
    /// Still violating, but an operator acknowledged this exact level.
    Acknowledged,
}

#[derive(Debug, Default)]
struct Tracked {
    open: Option<AlertId>,
    last_stock: Option<i64>,
    /// Kind and stock level at which the operator marked the alert read.
    acknowledged: Option<(AlertKind, i64)>,
}

#[derive(Debug, Default)]
struct Book {
    /// Creation order.
    alerts: Vec<Alert>,
    index: HashMap<AlertId, usize>,
    products: HashMap<ProductId, Tracked>,
    system_open: Option<AlertId>,
    system_acknowledged: Option<usize>,
    system_last: usize,
    /// Alerts with no closure yet.
    open_count: usize,
}

impl Book {
    fn push(&mut self, alert: Alert) -> AlertId {
        let id = alert.id;
        self.index.insert(id, self.alerts.len());
        self.alerts.push(alert);
        self.open_count += 1;
        id
    }

    /// Close an open alert; `None` if it is unknown or already closed.
    fn close(&mut self, id: AlertId, closure: AlertClosure, now: DateTime<Utc>) -> Option<&Alert> {
        let idx = *self.index.get(&id)?;
        let alert = self.alerts.get_mut(idx).filter(|a| a.is_open())?;
        alert.close(closure, now);
        self.open_count -= 1;
        Some(&*alert)
    }

    fn alert_mut(&mut self, id: AlertId) -> Option<&mut Alert> {
        let idx = *self.index.get(&id)?;
        self.alerts.get_mut(idx)
    }

    fn acknowledge(&mut self, idx: usize) -> bool {
        let now = Utc::now();
        let Some(alert) = self.alerts.get_mut(idx) else {
            return false;
        };
        if alert.is_read() {
            return false;
        }
        alert.close(AlertClosure::Acknowledged, now);
        let (id, kind, product_id) = (alert.id, alert.kind, alert.product_id);
        self.open_count -= 1;

        match product_id {
            Some(product_id) => {
                if let Some(tracked) = self.products.get_mut(&product_id) {
                    if tracked.open == Some(id) {
                        tracked.open = None;
                        tracked.acknowledged = tracked.last_stock.map(|stock| (kind, stock));
                    }
                }
            }
            None => {
                if self.system_open == Some(id) {
                    self.system_open = None;
                    self.system_acknowledged = Some(self.system_last);
                }
            }
        }
        true
    }
}

/// Threshold alert state machine.
///
/// Per product: none -> open -> (read) -> none, reopened on the next
/// violating stock change. At most one of {critical, low} is open for a
/// product at any time.
///
/// All state sits behind one mutex, so stock-driven and operator-driven
/// transitions are serialized. A read signal only sticks for the stock level
/// it was given at; any later stock change that still violates reopens.
#[derive(Debug, Default)]
pub struct AlertEngine {
    book: Mutex<Book>,
}

impl AlertEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn book(&self) -> MutexGuard<'_, Book> {
        // Every transition leaves the book consistent, so a panic elsewhere
        // does not invalidate it.
        self.book.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply a post-commit stock observation for one product.
    pub fn notify(&self, obs: &StockObservation) -> Transition {
        let now = Utc::now();
        let wanted = AlertKind::for_stock(obs.stock, obs.minimum);

        let mut book = self.book();
        let book = &mut *book;
        let tracked = book.products.entry(obs.product_id).or_default();
        tracked.last_stock = Some(obs.stock);
        let open_idx = tracked.open.and_then(|id| book.index.get(&id).copied());

        match (wanted, open_idx) {
            (None, None) => {
                tracked.acknowledged = None;
                Transition::Clear
            }
            (None, Some(idx)) => {
                let alert = &mut book.alerts[idx];
                alert.close(AlertClosure::Recovered, now);
                book.open_count -= 1;
                tracked.open = None;
                tracked.acknowledged = None;
                info!(
                    product_id = %obs.product_id,
                    alert_id = %alert.id,
                    kind = %alert.kind,
                    stock = obs.stock,
                    "alert resolved"
                );
                Transition::Resolved {
                    alert: alert.id,
                    kind: alert.kind,
                }
            }
            (Some(kind), Some(idx)) if book.alerts[idx].kind == kind => {
                let alert = &mut book.alerts[idx];
                alert.message = obs.message(kind);
                alert.updated_at = now;
                debug!(product_id = %obs.product_id, alert_id = %alert.id, stock = obs.stock, "alert refreshed");
                Transition::Refreshed { alert: alert.id, kind }
            }
            (Some(kind), open_idx) => {
                if open_idx.is_none() && tracked.acknowledged == Some((kind, obs.stock)) {
                    return Transition::Acknowledged;
                }

                let superseded = open_idx.map(|idx| {
                    let old = &mut book.alerts[idx];
                    old.close(AlertClosure::Superseded, now);
                    book.open_count -= 1;
                    old.id
                });
                let alert = Alert::open(Some(obs.product_id), kind, obs.message(kind), now);
                let id = alert.id;
                tracked.open = Some(id);
                tracked.acknowledged = None;
                book.push(alert);

                info!(
                    product_id = %obs.product_id,
                    alert_id = %id,
                    kind = %kind,
                    stock = obs.stock,
                    minimum = obs.minimum,
                    superseded = ?superseded,
                    "alert opened"
                );
                Transition::Opened {
                    alert: id,
                    kind,
                    superseded,
                }
            }
        }
    }

    /// Maintain the single system-level replenishment alert.
    ///
    /// `below_minimum` is the number of active products at or below their
    /// threshold. Zero resolves the alert.
    pub fn update_replenishment(&self, below_minimum: usize) -> Transition {
        let now = Utc::now();
        let mut book = self.book();
        book.system_last = below_minimum;
        let open = book.system_open;

        if below_minimum == 0 {
            book.system_acknowledged = None;
            let Some(id) = open else {
                return Transition::Clear;
            };
            book.system_open = None;
            book.close(id, AlertClosure::Recovered, now);
            info!(alert_id = %id, "replenishment alert resolved");
            return Transition::Resolved {
                alert: id,
                kind: AlertKind::Replenishment,
            };
        }

        let message = format!("{below_minimum} product(s) at or below minimum stock need replenishment");
        if let Some(id) = open {
            if let Some(alert) = book.alert_mut(id) {
                alert.message = message;
                alert.updated_at = now;
            }
            return Transition::Refreshed {
                alert: id,
                kind: AlertKind::Replenishment,
            };
        }
        if book.system_acknowledged == Some(below_minimum) {
            return Transition::Acknowledged;
        }

        let id = book.push(Alert::open(None, AlertKind::Replenishment, message, now));
        book.system_open = Some(id);
        book.system_acknowledged = None;
        info!(alert_id = %id, below_minimum, "replenishment alert opened");
        Transition::Opened {
            alert: id,
            kind: AlertKind::Replenishment,
            superseded: None,
        }
    }

    /// Close a product's open alert because it left the catalog and forget
    /// its tracked state. A reactivated product starts from scratch.
    pub fn withdraw(&self, product_id: ProductId) -> Option<AlertId> {
        let now = Utc::now();
        let mut book = self.book();
        let id = book.products.remove(&product_id)?.open?;
        book.close(id, AlertClosure::Withdrawn, now)?;
        info!(product_id = %product_id, alert_id = %id, "alert withdrawn");
        Some(id)
    }

    pub fn get(&self, id: AlertId) -> InventoryResult<Alert> {
        let book = self.book();
        book.index
            .get(&id)
            .and_then(|&idx| book.alerts.get(idx))
            .cloned()
            .ok_or_else(|| InventoryError::not_found(format!("alert {id}")))
    }

    /// Alerts matching `filter`, newest first.
    pub fn list(&self, filter: &AlertFilter) -> Vec<Alert> {
        let book = self.book();
        book.alerts.iter().rev().filter(|a| filter.matches(a)).cloned().collect()
    }

    pub fn list_open(&self, product_id: Option<ProductId>) -> Vec<Alert> {
        self.list(&AlertFilter {
            open_only: true,
            kind: None,
            product_id,
        })
    }

    /// The open threshold alert for a product, if any.
    pub fn open_for(&self, product_id: ProductId) -> Option<Alert> {
        let book = self.book();
        let id = book.products.get(&product_id)?.open?;
        book.index.get(&id).and_then(|&idx| book.alerts.get(idx)).cloned()
    }

    pub fn count_open(&self) -> usize {
        self.book().open_count
    }

    /// Operator acknowledgment. Marking an already read alert is a no-op.
    pub fn mark_read(&self, id: AlertId) -> InventoryResult<Alert> {
        let mut book = self.book();
        let idx = *book
            .index
            .get(&id)
            .ok_or_else(|| InventoryError::not_found(format!("alert {id}")))?;
        if book.acknowledge(idx) {
            debug!(alert_id = %id, "alert marked read");
        }
        Ok(book.alerts[idx].clone())
    }

    /// Acknowledge every open alert; returns how many were marked.
    pub fn mark_all_read(&self) -> usize {
        let mut book = self.book();
        let open: Vec<usize> = book
            .alerts
            .iter()
            .enumerate()
            .filter(|(_, a)| a.is_open())
            .map(|(idx, _)| idx)
            .collect();
        let marked = open.into_iter().filter(|&idx| book.acknowledge(idx)).count();
        if marked > 0 {
            info!(marked, "all alerts marked read");
        }
        marked
    }
}
