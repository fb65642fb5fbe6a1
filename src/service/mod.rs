//! Async service surface.
//!
//! The capture session and the ledger each live in their own task and are
//! driven through handles. State is published on watch channels so readers
//! never block writers; orchestrator actions fan out on a broadcast channel.
//!
//! ```text
//! capture pipeline ──DetectionSender──┐
//!                                     ▼
//! UI ──ScannerHandle──commands──▶ CaptureEngine ──actions──▶ UI
//!          │                          │
//!          │                          └──SessionView (watch)
//!          ▼
//!     LedgerHandle ──commands──▶ LedgerTask ──LedgerView (watch)
//! ```

mod engine;
mod flow;
mod ledger;
mod scanner;

pub use engine::{DetectionSender, ScannerHandle, SessionView};
pub use flow::{process_barcode, FlowError};
pub use ledger::{LedgerHandle, LedgerView};
pub use scanner::{Scanner, ScannerTasks};
