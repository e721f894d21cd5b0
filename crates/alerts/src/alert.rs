use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{AlertId, Entity, ProductId};

/// What an alert is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    /// Stock is zero.
    Critical,
    /// Stock is above zero but at or below the minimum threshold.
    Low,
    /// Informational, system-level: products need restocking.
    Replenishment,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Critical => "critical",
            AlertKind::Low => "low",
            AlertKind::Replenishment => "replenishment",
        }
    }

    /// Threshold kind for a stock level, if any.
    pub fn for_stock(stock: i64, minimum: i64) -> Option<Self> {
        if stock <= 0 {
            Some(AlertKind::Critical)
        } else if stock <= minimum {
            Some(AlertKind::Low)
        } else {
            None
        }
    }
}

impl core::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an alert stopped being open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertClosure {
    /// Marked read by an operator.
    Acknowledged,
    /// Stock rose back above the minimum.
    Recovered,
    /// Replaced by an alert of the other threshold kind.
    Superseded,
    /// The product was deactivated or deleted.
    Withdrawn,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    /// `None` for system-level alerts.
    pub product_id: Option<ProductId>,
    pub kind: AlertKind,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
    pub closure: Option<AlertClosure>,
}

impl Alert {
    pub(crate) fn open(
        product_id: Option<ProductId>,
        kind: AlertKind,
        message: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: AlertId::new(),
            product_id,
            kind,
            message,
            created_at: now,
            updated_at: now,
            read_at: None,
            closure: None,
        }
    }

    /// Open means unread.
    pub fn is_open(&self) -> bool {
        self.read_at.is_none()
    }

    pub fn is_read(&self) -> bool {
        !self.is_open()
    }

    pub(crate) fn close(&mut self, closure: AlertClosure, now: DateTime<Utc>) {
        self.read_at = Some(now);
        self.closure = Some(closure);
        self.updated_at = now;
    }
}

impl Entity for Alert {
    type Id = AlertId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Listing filter for alerts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertFilter {
    #[serde(default)]
    pub open_only: bool,
    pub kind: Option<AlertKind>,
    pub product_id: Option<ProductId>,
}

impl AlertFilter {
    pub fn open() -> Self {
        Self {
            open_only: true,
            ..Default::default()
        }
    }

    pub fn matches(&self, alert: &Alert) -> bool {
        (!self.open_only || alert.is_open())
            && self.kind.is_none_or(|k| alert.kind == k)
            && self.product_id.is_none_or(|p| alert.product_id == Some(p))
    }
}

/// Post-commit stock reading handed to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockObservation {
    pub product_id: ProductId,
    /// Human-readable product label, e.g. `Widget (SKU: WID-001)`.
    pub label: String,
    pub stock: i64,
    pub minimum: i64,
}

impl StockObservation {
    pub(crate) fn message(&self, kind: AlertKind) -> String {
        let headline = match kind {
            AlertKind::Critical => "Out of stock",
            AlertKind::Low => "Low stock",
            AlertKind::Replenishment => "Replenishment needed",
        };
        format!(
            "{headline} for {}. Current: {}, minimum: {}",
            self.label, self.stock, self.minimum
        )
    }
}
