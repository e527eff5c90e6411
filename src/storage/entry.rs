//! The stored unit and the value-equality capability used by FIND.

use std::time::{Duration, Instant};

/// Identifies one entry instance for the lifetime of a store.
///
/// Scheduled expirations carry the id of the entry they were created for, so a
/// stale expiration never removes a newer entry stored under the same key.
pub type EntryId = u64;

/// Represents a stored key-value pair with optional expiry.
#[derive(Debug, Clone)]
pub struct Entry<K, V> {
    /// Unique id assigned by the owning store
    pub id: EntryId,
    /// The key
    pub key: K,
    /// The value
    pub value: V,
    /// Time-to-live measured from `created_at` (None = never expires)
    pub ttl: Option<Duration>,
    /// When this entry was created
    pub created_at: Instant,
}

impl<K, V> Entry<K, V> {
    /// Creates a new entry without expiry.
    pub fn new(id: EntryId, key: K, value: V) -> Self {
        Self {
            id,
            key,
            value,
            ttl: None,
            created_at: Instant::now(),
        }
    }

    /// Creates a new entry with TTL. A zero TTL means no expiry.
    pub fn with_ttl(id: EntryId, key: K, value: V, ttl: Duration) -> Self {
        Self {
            ttl: (!ttl.is_zero()).then_some(ttl),
            ..Self::new(id, key, value)
        }
    }

    /// The instant at which this entry becomes eligible for removal.
    ///
    /// `None` when there is no TTL or when the deadline lies beyond what
    /// `Instant` can represent; such an entry never expires.
    pub fn expires_at(&self) -> Option<Instant> {
        self.ttl.and_then(|ttl| self.created_at.checked_add(ttl))
    }

    /// Remaining whole seconds: `ttl - elapsed`, saturating at `i64::MAX`.
    /// Negative once the deadline has passed but the entry has not yet been
    /// removed.
    pub fn ttl_secs(&self) -> Option<i64> {
        self.ttl.map(|ttl| {
            let elapsed = i64::try_from(self.created_at.elapsed().as_secs()).unwrap_or(i64::MAX);
            i64::try_from(ttl.as_secs())
                .unwrap_or(i64::MAX)
                .saturating_sub(elapsed)
        })
    }
}

/// Decides whether a stored value matches the probe passed to FIND.
pub trait ValueEquality<V>: Send {
    fn matches(&self, stored: &V, probe: &V) -> bool;
}

/// Plain `PartialEq` comparison.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactMatch;

impl<V: PartialEq> ValueEquality<V> for ExactMatch {
    #[inline]
    fn matches(&self, stored: &V, probe: &V) -> bool {
        stored == probe
    }
}

impl<V, F> ValueEquality<V> for F
where
    F: Fn(&V, &V) -> bool + Send,
{
    fn matches(&self, stored: &V, probe: &V) -> bool {
        self(stored, probe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_ttl_means_no_expiry() {
        let entry = Entry::with_ttl(1, "k", 1, Duration::ZERO);
        assert!(entry.ttl.is_none());
        assert!(entry.expires_at().is_none());
        assert_eq!(entry.ttl_secs(), None);
    }

    #[test]
    fn test_ttl_secs_counts_down_from_ttl() {
        let entry = Entry::with_ttl(1, "k", 1, Duration::from_secs(10));
        let remaining = entry.ttl_secs().unwrap();
        assert!(remaining == 10 || remaining == 9);
    }

    #[test]
    fn test_huge_ttl_never_expires() {
        let entry = Entry::with_ttl(1, "k", 1, Duration::from_secs(u64::MAX));
        assert!(entry.ttl.is_some());
        assert_eq!(entry.expires_at(), None);
        assert_eq!(entry.ttl_secs(), Some(i64::MAX));

        let entry = Entry::with_ttl(1, "k", 1, Duration::MAX);
        assert_eq!(entry.expires_at(), None);
        assert_eq!(entry.ttl_secs(), Some(i64::MAX));
    }

    #[test]
    fn test_closure_equality() {
        let same_parity = |a: &i32, b: &i32| a % 2 == b % 2;
        assert!(same_parity.matches(&4, &10));
        assert!(!same_parity.matches(&3, &10));
        assert!(ExactMatch.matches(&3, &3));
    }
}
