//! Explicitly constructed context shared by the cart manager.

use std::sync::Arc;

use crate::api::{ApiError, CartBackend, HttpBackend};
use crate::config::ClientConfig;
use crate::events::EventBus;
use crate::session::Session;
use crate::storage::{FileStorage, Storage};

/// Everything a [`crate::CartManager`] depends on.
///
/// This struct is cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct AppContext {
    inner: Arc<AppContextInner>,
}

struct AppContextInner {
    config: ClientConfig,
    backend: Arc<dyn CartBackend>,
    storage: Arc<dyn Storage>,
    events: EventBus,
    session: Session,
}

impl AppContext {
    /// Assemble a context from its parts.
    ///
    /// The session starts logged in when the config carries a token.
    #[must_use]
    pub fn new(
        config: ClientConfig,
        backend: Arc<dyn CartBackend>,
        storage: Arc<dyn Storage>,
    ) -> Self {
        let session = Session::new(config.has_session());
        Self {
            inner: Arc::new(AppContextInner {
                config,
                backend,
                storage,
                events: EventBus::new(),
                session,
            }),
        }
    }

    /// Production wiring: HTTP backend and file storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: ClientConfig) -> Result<Self, ApiError> {
        let backend = HttpBackend::new(&config)?;
        let storage = FileStorage::new(config.storage_dir.clone());
        Ok(Self::new(config, Arc::new(backend), Arc::new(storage)))
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn backend(&self) -> &dyn CartBackend {
        self.inner.backend.as_ref()
    }

    #[must_use]
    pub fn storage(&self) -> &dyn Storage {
        self.inner.storage.as_ref()
    }

    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.inner.session
    }
}
