//! # Credit Gate
//!
//! Billable operations ask a [`CreditGate`] before doing any work and
//! confirm only what actually succeeded. The engine never changes a balance
//! on its own; [`LedgerGate`] charges on `confirm`.
//!
//! ```text
//! check(op, n) ──allowed──▶ work ──▶ confirm(op, succeeded)
//!      │
//!      └──denied──▶ CertforgeError::CreditDenied (nothing rendered)
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tokio::sync::Mutex;

use crate::error::CertforgeError;

/// A billable operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditOperation {
    Export,
    BatchGenerate,
    BatchUpload,
}

impl fmt::Display for CreditOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CreditOperation::Export => "export",
            CreditOperation::BatchGenerate => "batch generation",
            CreditOperation::BatchUpload => "batch upload",
        };
        f.write_str(name)
    }
}

/// Result of a credit query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditCheck {
    pub allowed: bool,
    pub cost: f64,
    pub current_balance: f64,
}

#[async_trait]
pub trait CreditGate: Send + Sync {
    /// Whether `count` units of `operation` may run.
    async fn check(&self, operation: CreditOperation, count: usize) -> Result<CreditCheck, CertforgeError>;

    /// Record that `count` units of `operation` completed.
    async fn confirm(&self, operation: CreditOperation, count: usize) -> Result<(), CertforgeError>;
}

/// Check and turn a refusal into [`CertforgeError::CreditDenied`].
pub async fn ensure_allowed(
    gate: &dyn CreditGate,
    operation: CreditOperation,
    count: usize,
) -> Result<CreditCheck, CertforgeError> {
    let check = gate.check(operation, count).await?;
    if !check.allowed {
        log::warn!(
            "[credit] {} x{} denied: cost {} > balance {}",
            operation,
            count,
            check.cost,
            check.current_balance
        );
        return Err(CertforgeError::CreditDenied {
            operation,
            cost: check.cost,
            balance: check.current_balance,
        });
    }
    Ok(check)
}

/// Allows everything for free.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnmeteredGate;

#[async_trait]
impl CreditGate for UnmeteredGate {
    async fn check(&self, _operation: CreditOperation, _count: usize) -> Result<CreditCheck, CertforgeError> {
        Ok(CreditCheck {
            allowed: true,
            cost: 0.0,
            current_balance: f64::MAX,
        })
    }

    async fn confirm(&self, _operation: CreditOperation, _count: usize) -> Result<(), CertforgeError> {
        Ok(())
    }
}

/// In-memory balance with a per-operation price.
#[derive(Debug)]
pub struct LedgerGate {
    balance: Mutex<f64>,
    prices: HashMap<CreditOperation, f64>,
    /// Confirmed units per operation.
    confirmed: Mutex<HashMap<CreditOperation, usize>>,
}

impl LedgerGate {
    /// One credit per unit of every operation.
    pub fn new(balance: f64) -> Self {
        let prices = [
            CreditOperation::Export,
            CreditOperation::BatchGenerate,
            CreditOperation::BatchUpload,
        ]
        .into_iter()
        .map(|op| (op, 1.0))
        .collect();
        Self {
            balance: Mutex::new(balance),
            prices,
            confirmed: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_price(mut self, operation: CreditOperation, price: f64) -> Self {
        self.prices.insert(operation, price);
        self
    }

    pub async fn balance(&self) -> f64 {
        *self.balance.lock().await
    }

    /// Units confirmed so far for `operation`.
    pub async fn confirmed(&self, operation: CreditOperation) -> usize {
        self.confirmed
            .lock()
            .await
            .get(&operation)
            .copied()
            .unwrap_or(0)
    }

    fn cost(&self, operation: CreditOperation, count: usize) -> f64 {
        self.prices.get(&operation).copied().unwrap_or(0.0) * count as f64
    }
}

#[async_trait]
impl CreditGate for LedgerGate {
    async fn check(&self, operation: CreditOperation, count: usize) -> Result<CreditCheck, CertforgeError> {
        let balance = *self.balance.lock().await;
        let cost = self.cost(operation, count);
        Ok(CreditCheck {
            allowed: cost <= balance,
            cost,
            current_balance: balance,
        })
    }

    async fn confirm(&self, operation: CreditOperation, count: usize) -> Result<(), CertforgeError> {
        let cost = self.cost(operation, count);
        {
            let mut balance = self.balance.lock().await;
            *balance -= cost;
            log::info!(
                "[credit] charged {} for {} x{}, balance {}",
                cost,
                operation,
                count,
                *balance
            );
        }
        *self.confirmed.lock().await.entry(operation).or_insert(0) += count;
        Ok(())
    }
}
