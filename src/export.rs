use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use log::info;
use std::fs;
use std::path::{Path, PathBuf};

use crate::db::InventoryStore;

/// Dump every inventory entry to a timestamped JSON snapshot file under
/// `out_dir` (created if missing). Returns the file path and the number of
/// entries written.
pub fn export_inventory(
    store: &InventoryStore,
    out_dir: &Path,
    now: DateTime<Utc>,
) -> Result<(PathBuf, usize)> {
    let entries = store.all_entries()?;

    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create export directory {}", out_dir.display()))?;

    let path = out_dir.join(format!("inventory_export_{}.json", export_timestamp(now)));

    let json = serde_json::to_string_pretty(&entries)?;
    fs::write(&path, json)
        .with_context(|| format!("failed to write export file {}", path.display()))?;

    info!("Exported {} entries to {}", entries.len(), path.display());

    Ok((path, entries.len()))
}

/// ISO 8601 timestamp with ':' and '.' replaced by '-' so it is safe in a
/// filename on every platform.
fn export_timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InventoryEntry;
    use crate::extract::VehicleRecord;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_export_timestamp_has_no_colons_or_dots() {
        let stamp = export_timestamp(
            Utc.with_ymd_and_hms(2025, 3, 14, 15, 9, 26).unwrap(),
        );
        assert_eq!(stamp, "2025-03-14T15-09-26-000Z");
    }

    #[test]
    fn test_export_writes_every_entry() {
        let store = InventoryStore::open_in_memory().unwrap();
        for vin in ["A1", "B2", "C3"] {
            let record = VehicleRecord {
                vin: Some(vin.to_string()),
                title: Some("2020 Civic".to_string()),
                price: Some(12_500),
                ..VehicleRecord::default()
            };
            store.upsert(vin, &record, ts(100)).unwrap();
        }

        let dir = tempfile::tempdir().unwrap();
        let (path, count) = export_inventory(&store, dir.path(), ts(200)).unwrap();

        assert_eq!(count, 3);
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("inventory_export_"));
        assert!(name.ends_with(".json"));

        let json = fs::read_to_string(&path).unwrap();
        let entries: Vec<InventoryEntry> = serde_json::from_str(&json).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].vin, "A1");
        assert_eq!(entries[0].price, Some(12_500));
    }

    #[test]
    fn test_export_of_empty_store_writes_empty_array() {
        let store = InventoryStore::open_in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();

        let (path, count) = export_inventory(&store, dir.path(), ts(100)).unwrap();

        assert_eq!(count, 0);
        let json = fs::read_to_string(&path).unwrap();
        assert_eq!(json.trim(), "[]");
    }
}
