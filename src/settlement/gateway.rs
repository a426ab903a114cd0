use crate::core::currency::CurrencyCode;
use crate::core::error::CaptureError;
use crate::core::idempotency::IdempotencyKey;
use crate::core::ids::PaymentMethodRef;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;
use uuid::Uuid;

/// A single charge against the customer's payment method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureRequest {
    pub idempotency_key: IdempotencyKey,
    pub payment_method: PaymentMethodRef,
    pub amount: Decimal,
    pub currency: CurrencyCode,
    /// How long the caller will wait. The committer enforces this bound and
    /// voids anything that lands later; a gateway may also use it to give up early.
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureReceipt {
    pub reference: String,
    pub amount: Decimal,
    pub currency: CurrencyCode,
    pub captured_at: DateTime<Utc>,
}

/// Charges customers. Implementations must treat a repeated idempotency key
/// as the same charge.
pub trait PaymentGateway: Send + Sync {
    fn capture(&self, request: &CaptureRequest) -> Result<CaptureReceipt, CaptureError>;

    /// Void a capture by key. `Ok(false)` means the gateway cannot cancel.
    fn cancel(&self, _key: &IdempotencyKey) -> Result<bool, CaptureError> {
        Ok(false)
    }
}

#[derive(Debug, Default)]
struct GatewayState {
    receipts: HashMap<IdempotencyKey, CaptureReceipt>,
    scripted: VecDeque<CaptureError>,
    voided: Vec<IdempotencyKey>,
}

/// In-process gateway with scripted failures.
///
/// Each key is charged at most once; repeats get the original receipt back.
/// A configured latency longer than the request timeout models a capture
/// that lands after the caller gave up: the charge is recorded and
/// `TimedOut` is returned, so only `cancel` can undo it.
#[derive(Debug)]
pub struct SimulatedGateway {
    state: Mutex<GatewayState>,
    latency: Duration,
    stall: Duration,
    cancellable: bool,
    calls: AtomicUsize,
}

impl Default for SimulatedGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedGateway {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GatewayState::default()),
            latency: Duration::ZERO,
            stall: Duration::ZERO,
            cancellable: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Block for `stall` before handling each capture, ignoring the request
    /// timeout, as an unresponsive gateway would.
    pub fn with_stall(mut self, stall: Duration) -> Self {
        self.stall = stall;
        self
    }

    pub fn without_cancellation(mut self) -> Self {
        self.cancellable = false;
        self
    }

    /// Queue a failure for the next capture call that is not a replay.
    pub fn fail_next(&self, err: CaptureError) {
        self.state().scripted.push_back(err);
    }

    /// Number of capture calls received, replays included.
    pub fn capture_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Charges that currently stand (captured and not voided).
    pub fn charges(&self) -> Vec<CaptureReceipt> {
        let mut charges: Vec<CaptureReceipt> = self.state().receipts.values().cloned().collect();
        charges.sort_by(|a, b| {
            a.captured_at
                .cmp(&b.captured_at)
                .then_with(|| a.reference.cmp(&b.reference))
        });
        charges
    }

    pub fn voided(&self) -> Vec<IdempotencyKey> {
        self.state().voided.clone()
    }

    fn state(&self) -> MutexGuard<'_, GatewayState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl PaymentGateway for SimulatedGateway {
    fn capture(&self, request: &CaptureRequest) -> Result<CaptureReceipt, CaptureError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.stall.is_zero() {
            thread::sleep(self.stall);
        }
        let mut state = self.state();

        if let Some(existing) = state.receipts.get(&request.idempotency_key) {
            log::debug!("gateway replaying capture {}", existing.reference);
            return Ok(existing.clone());
        }
        if let Some(err) = state.scripted.pop_front() {
            return Err(err);
        }

        let receipt = CaptureReceipt {
            reference: format!("cap_{}", Uuid::new_v4().simple()),
            amount: request.amount,
            currency: request.currency.clone(),
            captured_at: Utc::now(),
        };
        state
            .receipts
            .insert(request.idempotency_key.clone(), receipt.clone());

        if self.latency > request.timeout {
            return Err(CaptureError::TimedOut);
        }
        Ok(receipt)
    }

    fn cancel(&self, key: &IdempotencyKey) -> Result<bool, CaptureError> {
        if !self.cancellable {
            return Ok(false);
        }
        let mut state = self.state();
        state.receipts.remove(key);
        state.voided.push(key.clone());
        Ok(true)
    }
}
