use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKind {
    /// Card declined or processor error at T-48
    HoldPlacementFailed,
    /// A pending hold was found by the sweep well after its scheduled instant
    HoldFiredLate,
    /// Cancellation could not release a placed hold
    HoldReleaseFailed,
    /// Inspection found damage but there was no placed hold to capture from
    UnsecuredDamage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorAlert {
    pub booking_id: Uuid,
    pub kind: AlertKind,
    pub message: String,
    pub raised_at: DateTime<Utc>,
}

impl OperatorAlert {
    pub fn new(booking_id: Uuid, kind: AlertKind, message: impl Into<String>) -> Self {
        Self {
            booking_id,
            kind,
            message: message.into(),
            raised_at: Utc::now(),
        }
    }
}

/// Operations-facing escalation channel. Never customer visible.
#[async_trait]
pub trait OperatorAlerts: Send + Sync {
    async fn raise(&self, alert: OperatorAlert);
}

pub struct TracingAlerts;

#[async_trait]
impl OperatorAlerts for TracingAlerts {
    async fn raise(&self, alert: OperatorAlert) {
        error!(
            booking_id = %alert.booking_id,
            kind = ?alert.kind,
            "OPERATOR ALERT: {}",
            alert.message
        );
    }
}

/// Keeps every alert in memory so tests can assert on what was raised
#[derive(Default)]
pub struct AlertLog {
    alerts: Mutex<Vec<OperatorAlert>>,
}

impl AlertLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts(&self) -> Vec<OperatorAlert> {
        self.alerts.lock().map(|a| a.clone()).unwrap_or_default()
    }

    pub fn count(&self, kind: AlertKind) -> usize {
        self.alerts().iter().filter(|a| a.kind == kind).count()
    }
}

#[async_trait]
impl OperatorAlerts for AlertLog {
    async fn raise(&self, alert: OperatorAlert) {
        TracingAlerts.raise(alert.clone()).await;
        if let Ok(mut alerts) = self.alerts.lock() {
            alerts.push(alert);
        }
    }
}
