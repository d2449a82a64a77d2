use anyhow::{bail, Result};
use chrono::Utc;
use std::env;
use std::path::Path;

use lot_watch::{export_inventory, reconcile, Config, Extract, InventoryStore, PageExtractor};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(String::as_str).unwrap_or("scrape");

    // Config comes first: a missing DATABASE_URL is fatal before any
    // store or network resource is acquired.
    let config = Config::from_env()?;

    match command {
        "scrape" => run_scrape(&config),
        "export" => run_export(&config),
        "verify" => run_verify(&config),
        other => bail!("unknown command '{}' (expected scrape, export or verify)", other),
    }
}

/// One full pass: scrape the inventory page, reconcile into the store.
fn run_scrape(config: &Config) -> Result<()> {
    println!("🚗 lot-watch v{} - scraping used inventory", lot_watch::VERSION);

    let extractor = PageExtractor::new(config)?;
    let snapshot = extractor.extract()?;
    println!("✓ Found {} listings", snapshot.len());

    // The store handle is scoped to this function and dropped on every exit
    // path, error or not.
    let store = InventoryStore::open(Path::new(&config.database_url))?;
    let summary = reconcile(&store, &snapshot, Utc::now())?;

    println!("✓ Upserted {} vehicles", summary.upserted);
    println!("✓ Marked {} vehicles as removed", summary.newly_removed);
    println!(
        "✓ Store now holds {} active / {} removed",
        summary.active_total, summary.removed_total
    );
    println!("Scraping completed successfully.");

    Ok(())
}

/// Dump the whole store to a timestamped JSON file under exports/.
fn run_export(config: &Config) -> Result<()> {
    let store = InventoryStore::open(Path::new(&config.database_url))?;
    let (path, count) = export_inventory(&store, Path::new("exports"), Utc::now())?;

    println!("✓ Exported {} entries to {}", count, path.display());

    Ok(())
}

/// Quick sanity report: total count plus the 5 most recent insertions.
fn run_verify(config: &Config) -> Result<()> {
    let store = InventoryStore::open(Path::new(&config.database_url))?;

    let count = store.count()?;
    println!("Total entries in inventory: {}", count);

    let latest = store.latest(5)?;
    println!("Latest {} entries:", latest.len());
    println!("{}", serde_json::to_string_pretty(&latest)?);

    Ok(())
}
