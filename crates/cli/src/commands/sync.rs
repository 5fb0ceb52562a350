//! Storefront reconciliation.

use basket_client::{CartManager, SyncOutcome};
use tracing::{info, warn};

use super::CommandError;

/// Reconcile with the storefront and push the result.
///
/// # Errors
///
/// Returns an error when the server copy cannot be fetched.
pub async fn run(manager: &CartManager) -> Result<(), CommandError> {
    match manager.sync_with_server().await? {
        SyncOutcome::Skipped => {
            warn!("Sync skipped: no session token or server sync disabled");
        }
        SyncOutcome::Completed {
            cart_items,
            wishlist_items,
        } => {
            manager.push_now().await;
            info!(cart_items, wishlist_items, "Synced with storefront");
        }
    }
    Ok(())
}
