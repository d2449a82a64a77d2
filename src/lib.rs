// Lot Watch - dealership inventory tracker
// Scrapes one dealership's used-inventory page and reconciles the result
// into a persistent VIN-keyed store.

pub mod config;
pub mod db;
pub mod export;
pub mod extract;
pub mod reconcile;

// Re-export commonly used types
pub use config::Config;
pub use db::{InventoryEntry, InventoryStore, VehicleStatus};
pub use export::export_inventory;
pub use extract::{page_confirms_empty, parse_inventory_page, Extract, PageExtractor, VehicleRecord};
pub use reconcile::{reconcile, ReconcileSummary};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
