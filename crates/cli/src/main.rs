//! Basket CLI - inspect and edit the local cart and wishlist.
//!
//! # Usage
//!
//! ```bash
//! # Show the cart with its totals
//! basket show
//!
//! # Add two units of a product, picking a variant and an engraving
//! basket add sku-1 -q 2 --variant sku-1-red -o engraving=AB
//!
//! # Apply a coupon
//! basket coupon apply SAVE10
//!
//! # Save the first cart line for later
//! basket to-wishlist 0
//!
//! # Reconcile with the storefront (needs BASKET_SESSION_TOKEN)
//! basket sync
//! ```
//!
//! Configuration comes from the environment (see `ClientConfig::from_env`).

#![cfg_attr(not(test), forbid(unsafe_code))]

use basket_client::{CartManager, ClientConfig};
use clap::{Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "basket")]
#[command(author, version, about = "Cart and wishlist tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show cart lines and totals
    Show,
    /// Add a product to the cart
    Add {
        /// Product ID
        product: String,

        /// Units to add
        #[arg(short, long, default_value_t = 1)]
        quantity: u32,

        /// Variant ID
        #[arg(long)]
        variant: Option<String>,

        /// Customization as key=value (repeatable)
        #[arg(short = 'o', long = "option")]
        options: Vec<String>,

        /// Skip the stock check
        #[arg(long)]
        force: bool,
    },
    /// Remove the cart line at an index
    Remove { index: usize },
    /// Change the quantity of a cart line (0 removes it)
    Update { index: usize, quantity: u32 },
    /// Remove every cart line
    Clear,
    /// Manage the cart coupon
    Coupon {
        #[command(subcommand)]
        action: CouponAction,
    },
    /// Manage the wishlist
    Wishlist {
        #[command(subcommand)]
        action: WishlistAction,
    },
    /// Move the cart line at an index to the wishlist
    ToWishlist { index: usize },
    /// Reconcile local state with the storefront
    Sync,
}

#[derive(Subcommand)]
enum CouponAction {
    /// Validate and apply a coupon code
    Apply { code: String },
    /// Remove the applied coupon
    Remove,
}

#[derive(Subcommand)]
enum WishlistAction {
    /// List saved products
    List,
    /// Save a product
    Add { product: String },
    /// Remove a saved product
    Remove { product: String },
    /// Move a saved product into the cart
    Move {
        product: String,

        #[arg(short, long, default_value_t = 1)]
        quantity: u32,
    },
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &ClientConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::debug!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "basket_client=info,basket_cli=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().without_time().with_target(false))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = ClientConfig::from_env()?;
    let _sentry_guard = init_sentry(&config);

    let manager = CartManager::from_config(config)?;
    manager.init().await;

    let result = dispatch(&manager, cli.command).await;

    // Flush pending pushes and unsaved state even when the command failed
    manager.shutdown().await;
    result?;
    Ok(())
}

async fn dispatch(
    manager: &CartManager,
    command: Commands,
) -> Result<(), commands::CommandError> {
    match command {
        Commands::Show => commands::cart::show(manager).await,
        Commands::Add {
            product,
            quantity,
            variant,
            options,
            force,
        } => {
            commands::cart::add(manager, &product, quantity, variant, &options, force).await?;
        }
        Commands::Remove { index } => commands::cart::remove(manager, index).await?,
        Commands::Update { index, quantity } => {
            commands::cart::update(manager, index, quantity).await?;
        }
        Commands::Clear => commands::cart::clear(manager).await,
        Commands::Coupon { action } => match action {
            CouponAction::Apply { code } => commands::cart::apply_coupon(manager, &code).await?,
            CouponAction::Remove => commands::cart::remove_coupon(manager).await,
        },
        Commands::Wishlist { action } => match action {
            WishlistAction::List => commands::wishlist::list(manager).await,
            WishlistAction::Add { product } => commands::wishlist::add(manager, &product).await?,
            WishlistAction::Remove { product } => {
                commands::wishlist::remove(manager, &product).await?;
            }
            WishlistAction::Move { product, quantity } => {
                commands::wishlist::move_to_cart(manager, &product, quantity).await?;
            }
        },
        Commands::ToWishlist { index } => commands::wishlist::from_cart(manager, index).await?,
        Commands::Sync => commands::sync::run(manager).await?,
    }
    Ok(())
}
