//! Per-item exponential backoff.

use std::collections::HashMap;
use std::time::Duration;

use super::item::ItemIdentity;

/// Default base delay for the first retry.
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(5);

/// Default cap on the retry delay.
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(1000);

/// Tracks consecutive failures per item identity and computes the
/// exponential delay before the next retry.
///
/// The delay doubles with every failure of the same identity, starting at
/// the base delay and capped at the maximum. [`ItemBackoff::forget`] resets
/// the counter once an item succeeds.
#[derive(Debug)]
pub struct ItemBackoff {
    base: Duration,
    max: Duration,
    failures: HashMap<ItemIdentity, u32>,
}

impl ItemBackoff {
    /// Creates a tracker with the default limits (5ms doubling up to 1000s).
    #[must_use]
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY)
    }

    /// Creates a tracker with custom base and maximum delays.
    #[must_use]
    pub fn with_limits(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            failures: HashMap::new(),
        }
    }

    /// Records one more failure for the identity and returns the delay to
    /// wait before re-enqueueing it.
    ///
    /// The first call for an identity returns the base delay.
    pub fn next_delay(&mut self, identity: &ItemIdentity) -> Duration {
        let failures = self.failures.entry(identity.clone()).or_insert(0);
        // Exponent is clamped; beyond ~32 doublings the cap dominates anyway.
        let exp = (*failures).min(32);
        *failures = failures.saturating_add(1);

        let delay = self.base.saturating_mul(1_u32.checked_shl(exp).unwrap_or(u32::MAX));
        delay.min(self.max)
    }

    /// Resets the failure counter for the identity.
    pub fn forget(&mut self, identity: &ItemIdentity) {
        self.failures.remove(identity);
    }

    /// Returns the number of consecutive failures recorded for the identity.
    #[must_use]
    pub fn failures(&self, identity: &ItemIdentity) -> u32 {
        self.failures.get(identity).copied().unwrap_or(0)
    }
}

impl Default for ItemBackoff {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::ObjectKey;

    fn identity(name: &str) -> ItemIdentity {
        ItemIdentity::Upsert(ObjectKey::new("default", name))
    }

    #[test]
    fn delay_doubles_per_failure() {
        let mut backoff = ItemBackoff::new();
        let id = identity("a");

        assert_eq!(backoff.next_delay(&id), Duration::from_millis(5));
        assert_eq!(backoff.next_delay(&id), Duration::from_millis(10));
        assert_eq!(backoff.next_delay(&id), Duration::from_millis(20));
        assert_eq!(backoff.failures(&id), 3);
    }

    #[test]
    fn delay_is_capped() {
        let mut backoff = ItemBackoff::with_limits(
            Duration::from_millis(5),
            Duration::from_millis(50),
        );
        let id = identity("a");

        for _ in 0..20 {
            let delay = backoff.next_delay(&id);
            assert!(delay <= Duration::from_millis(50));
        }
        assert_eq!(backoff.next_delay(&id), Duration::from_millis(50));
    }

    #[test]
    fn forget_resets_the_counter() {
        let mut backoff = ItemBackoff::new();
        let id = identity("a");

        backoff.next_delay(&id);
        backoff.next_delay(&id);
        backoff.forget(&id);

        assert_eq!(backoff.failures(&id), 0);
        assert_eq!(backoff.next_delay(&id), Duration::from_millis(5));
    }

    #[test]
    fn identities_back_off_independently() {
        let mut backoff = ItemBackoff::new();
        backoff.next_delay(&identity("a"));
        backoff.next_delay(&identity("a"));

        assert_eq!(backoff.next_delay(&identity("b")), Duration::from_millis(5));
    }

    #[test]
    fn huge_failure_counts_do_not_overflow() {
        let mut backoff = ItemBackoff::new();
        let id = identity("a");

        for _ in 0..100 {
            backoff.next_delay(&id);
        }
        assert_eq!(backoff.next_delay(&id), Duration::from_secs(1000));
    }
}
