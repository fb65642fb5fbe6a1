//! Camera permission authority.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::oneshot;

/// Camera authorization status as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionStatus {
    NotDetermined,
    Authorized,
    Denied,
    Restricted,
}

/// Platform capability that grants camera access.
#[async_trait]
pub trait PermissionAuthority: Send + Sync {
    fn check_permission(&self) -> PermissionStatus;

    /// Prompts the user. May suspend for as long as the prompt is open.
    async fn request_permission(&self) -> bool;

    /// Dismisses an open prompt. Its answer, if one still arrives, is dropped.
    fn cancel_request(&self) {}
}

/// Permission authority with a fixed answer.
#[derive(Debug, Clone)]
pub struct StaticPermission {
    status: PermissionStatus,
    grant_on_request: bool,
}

impl StaticPermission {
    pub fn authorized() -> Self {
        Self {
            status: PermissionStatus::Authorized,
            grant_on_request: true,
        }
    }

    pub fn denied() -> Self {
        Self {
            status: PermissionStatus::Denied,
            grant_on_request: false,
        }
    }

    /// Undetermined status; the prompt answers with `grant`.
    pub fn prompt(grant: bool) -> Self {
        Self {
            status: PermissionStatus::NotDetermined,
            grant_on_request: grant,
        }
    }
}

#[async_trait]
impl PermissionAuthority for StaticPermission {
    fn check_permission(&self) -> PermissionStatus {
        self.status
    }

    async fn request_permission(&self) -> bool {
        self.grant_on_request
    }
}

/// Reply slot of the currently open prompt.
type OpenPrompt = Arc<Mutex<Option<oneshot::Sender<bool>>>>;

fn lock_prompt(slot: &OpenPrompt) -> MutexGuard<'_, Option<oneshot::Sender<bool>>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Permission authority whose prompt stays open until answered through the
/// paired [`PermissionPrompt`].
///
/// Each request gets its own reply channel. An answer given while no
/// request is open is refused rather than kept for the next one.
#[derive(Debug)]
pub struct DeferredPermission {
    open: OpenPrompt,
}

/// Answers prompts raised by a [`DeferredPermission`].
#[derive(Debug, Clone)]
pub struct PermissionPrompt {
    open: OpenPrompt,
}

impl DeferredPermission {
    pub fn new() -> (Self, PermissionPrompt) {
        let open = OpenPrompt::default();
        (
            Self {
                open: Arc::clone(&open),
            },
            PermissionPrompt { open },
        )
    }
}

impl PermissionPrompt {
    /// Answers the open prompt. Returns false if no prompt is open.
    pub fn answer(&self, granted: bool) -> bool {
        match lock_prompt(&self.open).take() {
            Some(reply) => reply.send(granted).is_ok(),
            None => false,
        }
    }

    /// Returns true while a request is waiting for an answer.
    pub fn is_open(&self) -> bool {
        lock_prompt(&self.open)
            .as_ref()
            .is_some_and(|reply| !reply.is_closed())
    }
}

#[async_trait]
impl PermissionAuthority for DeferredPermission {
    fn check_permission(&self) -> PermissionStatus {
        PermissionStatus::NotDetermined
    }

    async fn request_permission(&self) -> bool {
        let (reply, answer) = oneshot::channel();
        if lock_prompt(&self.open).replace(reply).is_some() {
            tracing::debug!("Unanswered permission prompt replaced");
        }
        // A dismissed prompt counts as a refusal.
        answer.await.unwrap_or(false)
    }

    fn cancel_request(&self) {
        if lock_prompt(&self.open).take().is_some() {
            tracing::debug!("Permission prompt dismissed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn wait_until_open(prompt: &PermissionPrompt) {
        while !prompt.is_open() {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_deferred_permission_waits_for_answer() {
        let (authority, prompt) = DeferredPermission::new();
        assert_eq!(authority.check_permission(), PermissionStatus::NotDetermined);

        let request = tokio::spawn(async move { authority.request_permission().await });
        wait_until_open(&prompt).await;
        assert!(prompt.answer(true));
        assert!(request.await.unwrap());
        assert!(!prompt.is_open());
    }

    #[tokio::test]
    async fn test_answer_without_open_prompt_is_refused() {
        let (authority, prompt) = DeferredPermission::new();
        assert!(!prompt.answer(true));

        // The refused answer must not satisfy a later request.
        let authority = Arc::new(authority);
        let requester = Arc::clone(&authority);
        let request = tokio::spawn(async move { requester.request_permission().await });
        wait_until_open(&prompt).await;
        assert!(prompt.answer(false));
        assert!(!request.await.unwrap());
    }

    #[tokio::test]
    async fn test_cancelled_request_drops_late_answer() {
        let (authority, prompt) = DeferredPermission::new();
        let authority = Arc::new(authority);
        let requester = Arc::clone(&authority);
        let request = tokio::spawn(async move { requester.request_permission().await });
        wait_until_open(&prompt).await;

        authority.cancel_request();
        assert!(!prompt.answer(true));
        assert!(!request.await.unwrap());
    }
}
