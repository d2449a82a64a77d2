use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::extract::VehicleRecord;

// ============================================================================
// INVENTORY ENTRY
// ============================================================================

/// Lifecycle status of an inventory entry.
///
/// `Active` means the VIN appeared in the most recent completed scrape;
/// `Removed` means it was seen before but is no longer listed. Entries are
/// never deleted, so removed rows stay around as historical record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleStatus {
    Active,
    Removed,
}

impl VehicleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleStatus::Active => "active",
            VehicleStatus::Removed => "removed",
        }
    }

    fn from_db(s: &str) -> VehicleStatus {
        match s {
            "removed" => VehicleStatus::Removed,
            _ => VehicleStatus::Active,
        }
    }
}

/// Persisted vehicle record, keyed by VIN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryEntry {
    pub vin: String,

    // Scraped attributes (all optional - the page may omit any of them)
    pub title: Option<String>,
    pub price: Option<i64>,
    pub mileage: Option<i64>,
    pub year: Option<i32>,
    #[serde(rename = "fuelType")]
    pub fuel_type: Option<String>,
    pub transmission: Option<String>,
    pub listing_url: Option<String>,
    pub website_url: Option<String>,

    pub status: VehicleStatus,

    /// Set once on first observation, never overwritten.
    pub first_seen: DateTime<Utc>,

    /// Refreshed on every reconciliation pass that touches this VIN.
    pub last_seen: DateTime<Utc>,
}

// ============================================================================
// STORE
// ============================================================================

/// Scoped handle over the SQLite inventory store.
///
/// Opened before a pass, dropped unconditionally after it - the connection is
/// released on every exit path, success or failure.
pub struct InventoryStore {
    conn: Connection,
}

impl InventoryStore {
    /// Open (creating if needed) the inventory database at `path`.
    pub fn open(path: &Path) -> Result<InventoryStore> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open inventory database at {}", path.display()))?;
        Self::setup(&conn)?;
        Ok(InventoryStore { conn })
    }

    /// In-memory store, used by tests and throwaway runs.
    pub fn open_in_memory() -> Result<InventoryStore> {
        let conn = Connection::open_in_memory()?;
        Self::setup(&conn)?;
        Ok(InventoryStore { conn })
    }

    fn setup(conn: &Connection) -> Result<()> {
        // WAL mode for crash recovery
        conn.pragma_update(None, "journal_mode", "WAL")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS inventory (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                vin TEXT UNIQUE NOT NULL,
                title TEXT,
                price INTEGER,
                mileage INTEGER,
                year INTEGER,
                fuel_type TEXT,
                transmission TEXT,
                listing_url TEXT,
                website_url TEXT,
                status TEXT NOT NULL,
                first_seen TEXT NOT NULL,
                last_seen TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_inventory_status ON inventory(status)",
            [],
        )?;

        Ok(())
    }

    /// Upsert one scraped record under `vin`.
    ///
    /// Existing rows get all scraped fields overwritten, `status = active`
    /// and `last_seen = now`; `first_seen` is deliberately absent from the
    /// conflict clause so it survives every re-scrape. New rows are inserted
    /// with `first_seen = last_seen = now`.
    pub fn upsert(&self, vin: &str, record: &VehicleRecord, now: DateTime<Utc>) -> Result<()> {
        let now_str = now.to_rfc3339();

        self.conn
            .execute(
                "INSERT INTO inventory (
                    vin, title, price, mileage, year, fuel_type, transmission,
                    listing_url, website_url, status, first_seen, last_seen
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 'active', ?10, ?10)
                ON CONFLICT(vin) DO UPDATE SET
                    title = excluded.title,
                    price = excluded.price,
                    mileage = excluded.mileage,
                    year = excluded.year,
                    fuel_type = excluded.fuel_type,
                    transmission = excluded.transmission,
                    listing_url = excluded.listing_url,
                    website_url = excluded.website_url,
                    status = 'active',
                    last_seen = excluded.last_seen",
                params![
                    vin,
                    record.title,
                    record.price,
                    record.mileage,
                    record.year,
                    record.fuel_type,
                    record.transmission,
                    record.listing_url,
                    record.website_url,
                    now_str,
                ],
            )
            .with_context(|| format!("failed to upsert vehicle {}", vin))?;

        Ok(())
    }

    /// Mark every still-active entry whose VIN is not in `active_vins` as
    /// removed, stamping `last_seen = now`. Returns the number of entries
    /// flipped. Callers skip this step for an empty scrape - an empty VIN set
    /// must never wipe the whole inventory.
    pub fn mark_removed_except(
        &self,
        active_vins: &[String],
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let placeholders: Vec<String> = (2..active_vins.len() + 2)
            .map(|i| format!("?{}", i))
            .collect();

        let sql = format!(
            "UPDATE inventory
             SET status = 'removed', last_seen = ?1
             WHERE status = 'active' AND vin NOT IN ({})",
            placeholders.join(", ")
        );

        let mut stmt_params: Vec<String> = Vec::with_capacity(active_vins.len() + 1);
        stmt_params.push(now.to_rfc3339());
        stmt_params.extend(active_vins.iter().cloned());

        let changed = self
            .conn
            .execute(&sql, params_from_iter(stmt_params))
            .context("failed to mark absent vehicles as removed")?;

        Ok(changed)
    }

    /// Fetch one entry by VIN.
    pub fn get(&self, vin: &str) -> Result<Option<InventoryEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM inventory WHERE vin = ?1",
            ENTRY_COLUMNS
        ))?;

        let mut rows = stmt
            .query_map(params![vin], entry_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows.pop())
    }

    /// Every entry, in natural store order (insertion order).
    pub fn all_entries(&self) -> Result<Vec<InventoryEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM inventory ORDER BY id",
            ENTRY_COLUMNS
        ))?;

        let entries = stmt
            .query_map([], entry_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    /// The `limit` most-recently-inserted entries, newest first.
    pub fn latest(&self, limit: usize) -> Result<Vec<InventoryEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM inventory ORDER BY id DESC LIMIT ?1",
            ENTRY_COLUMNS
        ))?;

        let entries = stmt
            .query_map(params![limit as i64], entry_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    /// Total number of entries, active and removed alike.
    pub fn count(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM inventory", [], |row| row.get(0))?;

        Ok(count)
    }

    /// (active, removed) entry counts.
    pub fn status_counts(&self) -> Result<(i64, i64)> {
        let (active, removed): (Option<i64>, Option<i64>) = self.conn.query_row(
            "SELECT
                SUM(CASE WHEN status = 'active' THEN 1 ELSE 0 END),
                SUM(CASE WHEN status = 'removed' THEN 1 ELSE 0 END)
             FROM inventory",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok((active.unwrap_or(0), removed.unwrap_or(0)))
    }
}

const ENTRY_COLUMNS: &str = "vin, title, price, mileage, year, fuel_type, transmission, \
                             listing_url, website_url, status, first_seen, last_seen";

fn entry_from_row(row: &Row) -> rusqlite::Result<InventoryEntry> {
    let status_str: String = row.get(9)?;
    let first_seen_str: String = row.get(10)?;
    let last_seen_str: String = row.get(11)?;

    let first_seen = DateTime::parse_from_rfc3339(&first_seen_str)
        .map_err(|_| rusqlite::Error::InvalidQuery)?
        .with_timezone(&Utc);
    let last_seen = DateTime::parse_from_rfc3339(&last_seen_str)
        .map_err(|_| rusqlite::Error::InvalidQuery)?
        .with_timezone(&Utc);

    Ok(InventoryEntry {
        vin: row.get(0)?,
        title: row.get(1)?,
        price: row.get(2)?,
        mileage: row.get(3)?,
        year: row.get(4)?,
        fuel_type: row.get(5)?,
        transmission: row.get(6)?,
        listing_url: row.get(7)?,
        website_url: row.get(8)?,
        status: VehicleStatus::from_db(&status_str),
        first_seen,
        last_seen,
    })
}
