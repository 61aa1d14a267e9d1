use super::service::Inner;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Weak;
use uuid::Uuid;

/// Handle to a registered status callback.
///
/// Dropping the handle keeps the callback registered; call
/// [`Subscription::unsubscribe`] to remove it.
pub struct Subscription {
    id: Uuid,
    created_at: DateTime<Utc>,
    inner: Weak<Inner>,
}

impl Subscription {
    pub(super) fn new(id: Uuid, created_at: DateTime<Utc>, inner: Weak<Inner>) -> Self {
        Self {
            id,
            created_at,
            inner,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Remove the callback. Removing the last subscriber stops the watch and timer.
    ///
    /// Idempotent; once this returns the callback is never invoked again.
    pub fn unsubscribe(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.remove_subscriber(self.id);
        }
    }

    pub fn is_active(&self) -> bool {
        self.inner
            .upgrade()
            .map(|inner| inner.has_subscriber(self.id))
            .unwrap_or(false)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .finish()
    }
}
