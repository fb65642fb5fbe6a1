//! Wires the collaborators into running tasks.

use super::engine::ScannerHandle;
use super::ledger::LedgerHandle;
use crate::capture::{CameraDevice, PermissionAuthority};
use crate::config::{LedgerConfig, ScannerConfig};
use crate::ledger::{EntitlementLedger, LedgerError, LedgerStore};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Platform collaborators for a scanner.
pub struct Scanner {
    device: Box<dyn CameraDevice>,
    permission: Arc<dyn PermissionAuthority>,
    store: Box<dyn LedgerStore>,
}

/// Join handles of the tasks started by [`Scanner::spawn`].
#[derive(Debug)]
pub struct ScannerTasks {
    pub engine: JoinHandle<()>,
    pub ledger: JoinHandle<()>,
}

impl ScannerTasks {
    /// Waits for both tasks to stop. They stop once every handle is dropped.
    pub async fn join(self) {
        if let Err(err) = self.engine.await {
            tracing::error!(error = %err, "Capture engine task failed");
        }
        if let Err(err) = self.ledger.await {
            tracing::error!(error = %err, "Ledger task failed");
        }
    }
}

impl Scanner {
    pub fn new(
        device: Box<dyn CameraDevice>,
        permission: Arc<dyn PermissionAuthority>,
        store: Box<dyn LedgerStore>,
    ) -> Self {
        Self {
            device,
            permission,
            store,
        }
    }

    /// Opens the ledger and starts the capture engine and ledger tasks.
    pub fn spawn(
        self,
        scanner: &ScannerConfig,
        ledger: &LedgerConfig,
    ) -> Result<(ScannerHandle, ScannerTasks), LedgerError> {
        let entitlement = EntitlementLedger::open(self.store, ledger.free_scans)?;
        let (ledger_handle, ledger_task) = LedgerHandle::spawn(entitlement);
        let (handle, engine_task) =
            ScannerHandle::spawn(scanner, self.device, self.permission, ledger_handle);

        tracing::info!(
            facing = %scanner.initial_facing,
            gating = scanner.gating_enabled,
            "Scanner started"
        );

        Ok((
            handle,
            ScannerTasks {
                engine: engine_task,
                ledger: ledger_task,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CaptureState, MockCameraDevice, StaticPermission};
    use crate::ledger::MemoryStore;

    #[tokio::test]
    async fn test_spawn_and_shutdown() {
        let scanner = Scanner::new(
            Box::new(MockCameraDevice::new()),
            Arc::new(StaticPermission::authorized()),
            Box::new(MemoryStore::new()),
        );
        let (handle, tasks) = scanner
            .spawn(&ScannerConfig::default(), &LedgerConfig::default())
            .unwrap();

        handle.start_default_session().await.unwrap();
        assert_eq!(handle.capture_state(), CaptureState::Running);
        assert_eq!(handle.remaining_scans(), LedgerConfig::default().free_scans);

        drop(handle);
        tasks.join().await;
    }
}
