use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rentline_shared::Masked;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use uuid::Uuid;

use crate::CoreError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    Succeeded,
    RequiresAction,
    Failed,
}

/// Result of the processor's card-verification flow for one attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardVerification {
    pub verification_ref: String,
    pub status: VerificationStatus,
    pub payment_method_id: Option<Masked<String>>,
}

#[derive(Debug, Clone)]
pub struct HoldRequest {
    pub booking_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub payment_method_id: Masked<String>,
    /// Same key on every attempt for the same booking and pickup date
    pub idempotency_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HoldAuthorization {
    pub authorization_id: String,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum PaymentFailure {
    #[error("card declined: {0}")]
    Declined(String),

    #[error("customer authentication required: {0}")]
    RequiresAction(String),

    #[error("payment gateway failure: {0}")]
    Gateway(String),
}

impl From<PaymentFailure> for CoreError {
    fn from(err: PaymentFailure) -> Self {
        CoreError::PaymentError(err.to_string())
    }
}

/// Opaque payment-processor operations. This system only decides when to
/// call them and with what amount.
#[async_trait]
pub trait PaymentAdapter: Send + Sync {
    /// Retrieve the outcome of a card-verification attempt
    async fn verify_card(&self, verification_ref: &str) -> Result<CardVerification, PaymentFailure>;

    /// Authorize (not charge) the security hold
    async fn place_hold(&self, request: &HoldRequest) -> Result<HoldAuthorization, PaymentFailure>;

    /// Capture part or all of an authorization; the processor releases the remainder.
    /// A repeated `idempotency_key` returns the first capture instead of charging again.
    async fn capture_hold(
        &self,
        authorization_id: &str,
        amount: Decimal,
        idempotency_key: &str,
    ) -> Result<Decimal, PaymentFailure>;

    /// Release an authorization in full
    async fn release_hold(&self, authorization_id: &str) -> Result<(), PaymentFailure>;
}

#[derive(Default)]
struct SimulatedState {
    authorizations: HashMap<String, HoldAuthorization>,
    place_calls: usize,
    declined_methods: HashSet<String>,
    failed_verifications: HashSet<String>,
    captures: Vec<(String, Decimal)>,
    capture_keys: HashMap<String, Decimal>,
    releases: Vec<String>,
}

/// In-process processor used by local runs and tests. Honors idempotency keys
/// the way a real processor does: a repeated key returns the first authorization.
#[derive(Default)]
pub struct SimulatedPaymentAdapter {
    state: Mutex<SimulatedState>,
}

impl SimulatedPaymentAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decline_payment_method(&self, payment_method_id: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.declined_methods.insert(payment_method_id.to_string());
        }
    }

    pub fn fail_verification(&self, verification_ref: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.failed_verifications.insert(verification_ref.to_string());
        }
    }

    pub fn place_calls(&self) -> usize {
        self.state.lock().map(|s| s.place_calls).unwrap_or_default()
    }

    pub fn authorization_count(&self) -> usize {
        self.state.lock().map(|s| s.authorizations.len()).unwrap_or_default()
    }

    pub fn captures(&self) -> Vec<(String, Decimal)> {
        self.state.lock().map(|s| s.captures.clone()).unwrap_or_default()
    }

    pub fn releases(&self) -> Vec<String> {
        self.state.lock().map(|s| s.releases.clone()).unwrap_or_default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, SimulatedState>, PaymentFailure> {
        self.state
            .lock()
            .map_err(|_| PaymentFailure::Gateway("simulated processor poisoned".to_string()))
    }
}

#[async_trait]
impl PaymentAdapter for SimulatedPaymentAdapter {
    async fn verify_card(&self, verification_ref: &str) -> Result<CardVerification, PaymentFailure> {
        let state = self.lock()?;
        if state.failed_verifications.contains(verification_ref) {
            return Ok(CardVerification {
                verification_ref: verification_ref.to_string(),
                status: VerificationStatus::Failed,
                payment_method_id: None,
            });
        }

        Ok(CardVerification {
            verification_ref: verification_ref.to_string(),
            status: VerificationStatus::Succeeded,
            payment_method_id: Some(Masked(format!("pm_{}", verification_ref))),
        })
    }

    async fn place_hold(&self, request: &HoldRequest) -> Result<HoldAuthorization, PaymentFailure> {
        let mut state = self.lock()?;
        state.place_calls += 1;

        if let Some(existing) = state.authorizations.get(&request.idempotency_key) {
            return Ok(existing.clone());
        }
        if state.declined_methods.contains(request.payment_method_id.expose()) {
            return Err(PaymentFailure::Declined("insufficient funds".to_string()));
        }

        let authorization = HoldAuthorization {
            authorization_id: format!("sim_auth_{}", Uuid::new_v4().simple()),
            amount: request.amount,
            created_at: Utc::now(),
        };
        state
            .authorizations
            .insert(request.idempotency_key.clone(), authorization.clone());
        Ok(authorization)
    }

    async fn capture_hold(
        &self,
        authorization_id: &str,
        amount: Decimal,
        idempotency_key: &str,
    ) -> Result<Decimal, PaymentFailure> {
        let mut state = self.lock()?;
        if let Some(captured) = state.capture_keys.get(idempotency_key) {
            return Ok(*captured);
        }
        let authorized = state
            .authorizations
            .values()
            .find(|a| a.authorization_id == authorization_id)
            .map(|a| a.amount)
            .ok_or_else(|| PaymentFailure::Gateway(format!("unknown authorization {}", authorization_id)))?;

        let captured = amount.min(authorized);
        state.captures.push((authorization_id.to_string(), captured));
        state.capture_keys.insert(idempotency_key.to_string(), captured);
        Ok(captured)
    }

    async fn release_hold(&self, authorization_id: &str) -> Result<(), PaymentFailure> {
        let mut state = self.lock()?;
        state.releases.push(authorization_id.to_string());
        Ok(())
    }
}
