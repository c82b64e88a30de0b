use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::database::Connection;

/// Shared owner of a boxed [`Connection`].
///
/// A new handle is the only owner. [`duplicate`](Self::duplicate) adds an
/// owner and [`release`](Self::release) gives one up; the connection is
/// closed and dropped when the last owner releases it. Handles are not
/// `Clone`, so every extra owner is visible at the call site.
pub struct ConnectionRef {
    inner: Arc<Mutex<Box<dyn Connection>>>,
}

impl ConnectionRef {
    pub fn new(conn: Box<dyn Connection>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(conn)),
        }
    }

    /// Add an owner.
    pub fn duplicate(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Number of live owners.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Exclusive access to the connection for the duration of the guard.
    ///
    /// A panic in another owner while it held the guard does not make the
    /// connection unusable; the backend's own error state still applies.
    pub fn lock(&self) -> MutexGuard<'_, Box<dyn Connection>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Give up this owner. Returns `true` when it was the last one, in which
    /// case the connection has been closed and dropped.
    pub fn release(self) -> bool {
        match Arc::try_unwrap(self.inner) {
            Ok(mutex) => {
                let mut conn = mutex.into_inner().unwrap_or_else(PoisonError::into_inner);
                conn.close();
                debug!("last connection owner released");
                true
            }
            Err(_) => false,
        }
    }
}

impl fmt::Debug for ConnectionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRef")
            .field("ref_count", &self.ref_count())
            .finish()
    }
}
