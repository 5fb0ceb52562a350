//! Customer session flag shared by the manager and its background tasks.

use std::sync::Arc;

use tokio::sync::watch;

/// Whether a customer is logged in. Clones share the flag.
#[derive(Debug, Clone)]
pub struct Session {
    logged_in: Arc<watch::Sender<bool>>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(false)
    }
}

impl Session {
    #[must_use]
    pub fn new(logged_in: bool) -> Self {
        let (sender, _) = watch::channel(logged_in);
        Self {
            logged_in: Arc::new(sender),
        }
    }

    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        *self.logged_in.borrow()
    }

    /// Set the flag, returning the previous value.
    pub fn set_logged_in(&self, logged_in: bool) -> bool {
        self.logged_in.send_replace(logged_in)
    }

    /// Watch login state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.logged_in.subscribe()
    }
}
