//! Purchase transactions to scan grants.
//!
//! The store front delivers transactions on a channel. Each verified
//! transaction for the scan pack adds `scans_per_purchase` to the quota,
//! once per transaction id.

use crate::config::LedgerConfig;
use crate::ledger::LedgerError;
use crate::service::LedgerHandle;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Store-front verification result for a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum Verification {
    Verified,
    Unverified(String),
}

/// A completed purchase as reported by the store front.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub product_id: String,
    pub verification: Verification,
}

impl Transaction {
    pub fn verified(id: impl Into<String>, product_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            product_id: product_id.into(),
            verification: Verification::Verified,
        }
    }
}

/// Errors that can occur while applying a transaction.
#[derive(Debug, Error)]
pub enum PurchaseError {
    #[error("transaction {id} failed verification: {reason}")]
    Unverified { id: String, reason: String },
    #[error("unknown product {0}")]
    UnknownProduct(String),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// What applying a transaction did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantOutcome {
    /// Scans were added; carries the new remaining count.
    Granted(u32),
    /// The transaction id was already granted.
    AlreadyGranted,
}

/// Applies purchase transactions to the ledger.
pub struct PurchaseListener {
    ledger: LedgerHandle,
    product_id: String,
    scans_per_purchase: u32,
    granted: HashSet<String>,
}

impl PurchaseListener {
    pub fn new(ledger: LedgerHandle, config: &LedgerConfig) -> Self {
        Self {
            ledger,
            product_id: config.product_id.clone(),
            scans_per_purchase: config.scans_per_purchase,
            granted: HashSet::new(),
        }
    }

    /// Applies one transaction.
    ///
    /// A transaction whose grant could not be persisted is still counted as
    /// granted, since the in-memory quota already reflects it.
    pub async fn apply(
        &mut self,
        transaction: &Transaction,
    ) -> Result<GrantOutcome, PurchaseError> {
        if let Verification::Unverified(reason) = &transaction.verification {
            tracing::warn!(id = %transaction.id, %reason, "Unverified transaction");
            return Err(PurchaseError::Unverified {
                id: transaction.id.clone(),
                reason: reason.clone(),
            });
        }
        if transaction.product_id != self.product_id {
            tracing::warn!(
                id = %transaction.id,
                product = %transaction.product_id,
                "Transaction for unknown product"
            );
            return Err(PurchaseError::UnknownProduct(transaction.product_id.clone()));
        }
        if self.granted.contains(&transaction.id) {
            tracing::debug!(id = %transaction.id, "Transaction already granted");
            return Ok(GrantOutcome::AlreadyGranted);
        }

        let result = self.ledger.grant(self.scans_per_purchase).await;
        if matches!(result, Ok(_) | Err(LedgerError::NotPersisted { .. })) {
            self.granted.insert(transaction.id.clone());
        }
        let remaining = result?;

        tracing::info!(
            id = %transaction.id,
            scans = self.scans_per_purchase,
            remaining,
            "Purchase granted"
        );
        Ok(GrantOutcome::Granted(remaining))
    }

    /// Applies transactions until the channel closes.
    pub async fn run(mut self, mut transactions: mpsc::Receiver<Transaction>) {
        while let Some(transaction) = transactions.recv().await {
            if let Err(err) = self.apply(&transaction).await {
                tracing::error!(id = %transaction.id, error = %err, "Transaction not applied");
            }
        }
        tracing::debug!("Purchase listener stopped");
    }

    /// Runs the listener on its own task.
    pub fn spawn(self, capacity: usize) -> (mpsc::Sender<Transaction>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, tokio::spawn(self.run(rx)))
    }
}
