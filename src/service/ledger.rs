//! Single-writer task owning the entitlement ledger.
//!
//! Every mutation goes through one channel, so a `submit` racing a
//! `clear` is applied entirely before or entirely after it.

use crate::ledger::{
    EntitlementLedger, LedgerError, LedgerOutcome, ResolvedCountry, ScanHistoryItem,
};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

const COMMAND_CAPACITY: usize = 32;

/// Read-only snapshot of the ledger, published after every change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LedgerView {
    /// Most recent first.
    pub history: Arc<Vec<ScanHistoryItem>>,
    pub remaining: u32,
    /// True while the last durable write has not succeeded.
    pub unsaved: bool,
    /// Submissions charged since the service started.
    pub charged: u64,
    /// Submissions refreshed since the service started.
    pub refreshed: u64,
}

enum LedgerCommand {
    Submit {
        barcode: String,
        country: ResolvedCountry,
        reply: oneshot::Sender<Result<LedgerOutcome, LedgerError>>,
    },
    CanSubmit {
        reply: oneshot::Sender<bool>,
    },
    Clear {
        reply: oneshot::Sender<Result<(), LedgerError>>,
    },
    Grant {
        scans: u32,
        reply: oneshot::Sender<Result<u32, LedgerError>>,
    },
    Flush {
        reply: oneshot::Sender<Result<(), LedgerError>>,
    },
}

struct LedgerTask {
    ledger: EntitlementLedger,
    commands: mpsc::Receiver<LedgerCommand>,
    view: watch::Sender<LedgerView>,
    charged: u64,
    refreshed: u64,
}

impl LedgerTask {
    async fn run(mut self) {
        while let Some(command) = self.commands.recv().await {
            match command {
                LedgerCommand::Submit {
                    barcode,
                    country,
                    reply,
                } => {
                    let result = self.ledger.submit(&barcode, &country);
                    let applied = match &result {
                        Ok(outcome) => Some(outcome.is_charged()),
                        Err(err) => err.applied_outcome().map(LedgerOutcome::is_charged),
                    };
                    match applied {
                        Some(true) => self.charged += 1,
                        Some(false) => self.refreshed += 1,
                        None => {}
                    }
                    self.publish();
                    let _ = reply.send(result);
                }
                LedgerCommand::CanSubmit { reply } => {
                    let _ = reply.send(self.ledger.can_submit());
                }
                LedgerCommand::Clear { reply } => {
                    let result = self.ledger.clear();
                    self.publish();
                    let _ = reply.send(result);
                }
                LedgerCommand::Grant { scans, reply } => {
                    let result = self.ledger.grant(scans);
                    self.publish();
                    let _ = reply.send(result);
                }
                LedgerCommand::Flush { reply } => {
                    let result = self.ledger.flush();
                    self.publish();
                    let _ = reply.send(result);
                }
            }
        }
        tracing::debug!("Ledger task stopped");
    }

    fn publish(&self) {
        self.view.send_replace(LedgerView {
            history: Arc::new(self.ledger.history().to_vec()),
            remaining: self.ledger.remaining(),
            unsaved: self.ledger.is_dirty(),
            charged: self.charged,
            refreshed: self.refreshed,
        });
    }
}

/// Cloneable handle to the ledger task.
#[derive(Debug, Clone)]
pub struct LedgerHandle {
    commands: mpsc::Sender<LedgerCommand>,
    view: watch::Receiver<LedgerView>,
}

impl LedgerHandle {
    /// Moves `ledger` into its own task.
    ///
    /// The task stops once every handle is dropped.
    pub fn spawn(ledger: EntitlementLedger) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_CAPACITY);
        let (view_tx, view_rx) = watch::channel(LedgerView::default());

        let task = LedgerTask {
            ledger,
            commands: rx,
            view: view_tx,
            charged: 0,
            refreshed: 0,
        };
        task.publish();
        let join = tokio::spawn(task.run());

        (
            Self {
                commands: tx,
                view: view_rx,
            },
            join,
        )
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> LedgerCommand,
    ) -> Result<T, LedgerError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| LedgerError::ServiceClosed)?;
        rx.await.map_err(|_| LedgerError::ServiceClosed)
    }

    /// Records a resolved scan. See [`EntitlementLedger::submit`].
    pub async fn submit(
        &self,
        barcode: impl Into<String>,
        country: ResolvedCountry,
    ) -> Result<LedgerOutcome, LedgerError> {
        let barcode = barcode.into();
        self.request(|reply| LedgerCommand::Submit {
            barcode,
            country,
            reply,
        })
        .await?
    }

    /// Returns true if a scan remains. False if the service is gone.
    pub async fn can_submit(&self) -> bool {
        self.request(|reply| LedgerCommand::CanSubmit { reply })
            .await
            .unwrap_or(false)
    }

    pub async fn clear(&self) -> Result<(), LedgerError> {
        self.request(|reply| LedgerCommand::Clear { reply }).await?
    }

    pub async fn grant(&self, scans: u32) -> Result<u32, LedgerError> {
        self.request(|reply| LedgerCommand::Grant { scans, reply })
            .await?
    }

    pub async fn flush(&self) -> Result<(), LedgerError> {
        self.request(|reply| LedgerCommand::Flush { reply }).await?
    }

    /// Latest published snapshot.
    pub fn view(&self) -> LedgerView {
        self.view.borrow().clone()
    }

    pub fn history(&self) -> Arc<Vec<ScanHistoryItem>> {
        Arc::clone(&self.view.borrow().history)
    }

    pub fn remaining(&self) -> u32 {
        self.view.borrow().remaining
    }

    /// Subscribes to ledger snapshots.
    pub fn watch(&self) -> watch::Receiver<LedgerView> {
        self.view.clone()
    }
}
