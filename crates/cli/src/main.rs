//! Kestrel CLI - Database migrations, catalog seeding and order inspection.
//!
//! # Usage
//!
//! ```bash
//! # Run storefront database migrations
//! kestrel-cli migrate
//!
//! # Load the catalog from YAML, replacing existing products
//! kestrel-cli seed products fixtures/products.yaml --clear
//!
//! # Print an order with its line items
//! kestrel-cli order show 3F2B9C0D4E5A6B7C8D9E0F1A2B3C4D5E
//!
//! # Change a line item's quantity (0 deletes it); totals are recomputed
//! kestrel-cli order set-item-quantity 42 3
//! ```
//!
//! # Environment Variables
//!
//! - `STOREFRONT_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `FREE_DELIVERY_THRESHOLD`, `STANDARD_DELIVERY_PERCENTAGE` - delivery policy
//!   used when order totals are recomputed

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

use kestrel_core::LineItemId;

mod commands;

#[derive(Parser)]
#[command(name = "kestrel-cli")]
#[command(author, version, about = "Kestrel CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run storefront database migrations
    Migrate,
    /// Seed the database from YAML files
    Seed {
        #[command(subcommand)]
        target: SeedTarget,
    },
    /// Inspect and correct orders
    Order {
        #[command(subcommand)]
        action: OrderAction,
    },
}

#[derive(Subcommand)]
enum SeedTarget {
    /// Upsert categories and products, matched by SKU
    Products {
        /// Path to the catalog YAML file
        file: String,

        /// Delete every product before loading
        #[arg(long)]
        clear: bool,
    },
}

#[derive(Subcommand)]
enum OrderAction {
    /// Print an order and its line items
    Show {
        /// Public order number
        order_number: String,
    },
    /// Change a line item's quantity and recompute the order totals
    SetItemQuantity {
        /// Line item ID
        line_item_id: LineItemId,

        /// New quantity; 0 deletes the line item
        quantity: u32,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::storefront().await?,
        Commands::Seed { target } => match target {
            SeedTarget::Products { file, clear } => {
                commands::seed::products(&file, clear).await?;
            }
        },
        Commands::Order { action } => match action {
            OrderAction::Show { order_number } => commands::order::show(&order_number).await?,
            OrderAction::SetItemQuantity {
                line_item_id,
                quantity,
            } => commands::order::set_item_quantity(line_item_id, quantity).await?,
        },
    }
    Ok(())
}
