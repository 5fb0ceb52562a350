use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::broadcast;
use url::Url;

use super::CartManager;
use crate::api::MockBackend;
use crate::config::ClientConfig;
use crate::events::CartEvent;
use crate::state::AppContext;
use crate::storage::MemoryStorage;

pub struct Harness {
    pub manager: CartManager,
    pub backend: MockBackend,
    pub storage: MemoryStorage,
    pub config: ClientConfig,
}

impl Harness {
    /// A second manager over the same storage and backend, like a new tab.
    pub fn reopen(&self) -> CartManager {
        CartManager::new(AppContext::new(
            self.config.clone(),
            Arc::new(self.backend.clone()),
            Arc::new(self.storage.clone()),
        ))
    }
}

/// Next event that is not a recompute or save notification.
pub async fn next_event(events: &mut broadcast::Receiver<CartEvent>) -> CartEvent {
    loop {
        match events.recv().await {
            Ok(CartEvent::Recalculated { .. } | CartEvent::SavedToStorage) => {}
            Ok(event) => return event,
            Err(e) => panic!("event stream closed: {e}"),
        }
    }
}

pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap_or_else(|e| panic!("bad decimal {s}: {e}"))
}

/// Catalog: `sku-1` at 25.00 and `sku-2` at 10.00, 10 units each.
pub fn harness() -> Harness {
    harness_with(|_| {})
}

pub fn harness_with(configure: impl FnOnce(&mut ClientConfig)) -> Harness {
    let url = Url::parse("http://storefront.test/api/").unwrap_or_else(|e| panic!("{e}"));
    let mut config = ClientConfig::new(url);
    configure(&mut config);

    let backend = MockBackend::new()
        .with_product(MockBackend::product("sku-1", dec("25.00"), 10))
        .with_product(MockBackend::product("sku-2", dec("10.00"), 10));
    let storage = MemoryStorage::new();

    Harness {
        manager: CartManager::new(AppContext::new(
            config.clone(),
            Arc::new(backend.clone()),
            Arc::new(storage.clone()),
        )),
        backend,
        storage,
        config,
    }
}
