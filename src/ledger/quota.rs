//! Remaining-scan counter.

use serde::{Deserialize, Serialize};

/// Number of scans the user may still perform.
///
/// Unsigned and saturating, so it can never go below zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QuotaState {
    remaining: u32,
}

impl QuotaState {
    pub fn new(remaining: u32) -> Self {
        Self { remaining }
    }

    #[inline]
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Returns true if at least one scan is left.
    #[inline]
    pub fn can_charge(&self) -> bool {
        self.remaining > 0
    }

    /// Consumes one scan. Returns false if the counter was already zero.
    pub fn charge(&mut self) -> bool {
        let charged = self.can_charge();
        self.remaining = self.remaining.saturating_sub(1);
        charged
    }

    /// Adds purchased scans.
    pub fn grant(&mut self, scans: u32) {
        self.remaining = self.remaining.saturating_add(scans);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_charge_stops_at_zero() {
        let mut quota = QuotaState::new(1);
        assert!(quota.charge());
        assert!(!quota.charge());
        assert_eq!(quota.remaining(), 0);
        assert!(!quota.can_charge());
    }

    #[test]
    fn test_grant_saturates() {
        let mut quota = QuotaState::new(u32::MAX - 1);
        quota.grant(100);
        assert_eq!(quota.remaining(), u32::MAX);
    }
}
