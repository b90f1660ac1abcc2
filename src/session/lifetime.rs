//! Absolute session lifetimes.

use std::time::Duration;

use time::{macros::datetime, OffsetDateTime};

/// A point in the past used to expire cookies and records immediately.
pub const EXPIRE_IMMEDIATELY: OffsetDateTime = datetime!(2009-11-10 23:00 UTC);

/// Wall-clock expiration of a session.
///
/// An unset lifetime means the backend has no opinion and the manager's
/// [`Expiry`](crate::Expiry) policy decides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LifeTime {
    expires_at: Option<OffsetDateTime>,
}

impl LifeTime {
    pub const fn unset() -> Self {
        Self { expires_at: None }
    }

    pub const fn at(instant: OffsetDateTime) -> Self {
        Self {
            expires_at: Some(instant),
        }
    }

    /// Sentinel telling the manager to expire the session right away.
    pub const fn expired() -> Self {
        Self::at(EXPIRE_IMMEDIATELY)
    }

    /// A lifetime ending `ttl` from now. Saturates to unset when the
    /// instant is not representable.
    pub fn after(ttl: Duration) -> Self {
        let expires_at = time::Duration::try_from(ttl)
            .ok()
            .and_then(|ttl| OffsetDateTime::now_utc().checked_add(ttl));
        Self { expires_at }
    }

    pub fn is_unset(&self) -> bool {
        self.expires_at.is_none()
    }

    pub fn expires_at(&self) -> Option<OffsetDateTime> {
        self.expires_at
    }

    pub fn has_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|at| at <= OffsetDateTime::now_utc())
    }

    /// Time left before expiration; `None` when unset, zero once expired.
    pub fn remaining(&self) -> Option<Duration> {
        self.expires_at.map(|at| {
            let left = at - OffsetDateTime::now_utc();
            Duration::try_from(left).unwrap_or(Duration::ZERO)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset() {
        let lifetime = LifeTime::default();
        assert!(lifetime.is_unset());
        assert!(!lifetime.has_expired());
        assert_eq!(lifetime.remaining(), None);
    }

    #[test]
    fn test_expired_sentinel() {
        let lifetime = LifeTime::expired();
        assert!(lifetime.has_expired());
        assert_eq!(lifetime.remaining(), Some(Duration::ZERO));
        assert_eq!(lifetime.expires_at(), Some(EXPIRE_IMMEDIATELY));
    }

    #[test]
    fn test_after() {
        let lifetime = LifeTime::after(Duration::from_secs(60));
        assert!(!lifetime.has_expired());
        let left = lifetime.remaining().unwrap();
        assert!(left > Duration::from_secs(58) && left <= Duration::from_secs(60));
    }

    #[test]
    fn test_after_overflow_is_unset() {
        assert!(LifeTime::after(Duration::MAX).is_unset());
    }
}
